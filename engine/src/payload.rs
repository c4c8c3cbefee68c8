//! Payload schemas and typed field extraction.
//!
//! Every action type declares the fields its `data` object may carry. A payload
//! is checked against that declaration before anything touches the store, so a
//! malformed action fails with a validation error rather than a store error.
//!
//! Clients built on HTML forms tend to send numbers as strings, so numeric
//! field types accept both `5` and `"5"`.

use crate::{error::Result, Cents, EntityId, Error};
use chrono::NaiveDate;
use serde_json::{Map, Value};

/// Calendar date format of every `Date` field.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Field types a payload may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    /// Non-negative integer (stock, thresholds, quantities)
    Count,
    /// Positive integer identity
    Id,
    /// Non-negative amount in major units, stored as cents
    Money,
    /// Any finite number
    Float,
    /// `YYYY-MM-DD`
    Date,
    /// Array of line objects, validated by their own schema
    Lines,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Count => write!(f, "Count"),
            FieldType::Id => write!(f, "Id"),
            FieldType::Money => write!(f, "Money"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Date => write!(f, "Date"),
            FieldType::Lines => write!(f, "Lines"),
        }
    }
}

/// Definition of a payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

impl FieldDef {
    /// A field that must be present and non-null.
    pub const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: true,
        }
    }

    /// A field that may be absent or null.
    pub const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
        }
    }

    /// Validate a JSON value against this field definition.
    pub fn validate(&self, value: Option<&Value>) -> Result<()> {
        match value {
            None | Some(Value::Null) if self.required => {
                Err(Error::MissingRequiredField(self.name.to_string()))
            }
            None | Some(Value::Null) => Ok(()),
            Some(v) => self.validate_type(v),
        }
    }

    fn validate_type(&self, value: &Value) -> Result<()> {
        let valid = match self.field_type {
            FieldType::String => value.is_string(),
            FieldType::Count => {
                return match as_int(value) {
                    Some(n) if n >= 0 => Ok(()),
                    Some(_) => Err(Error::invalid_value(self.name, "must not be negative")),
                    None => Err(self.mismatch(value)),
                };
            }
            FieldType::Id => {
                return match as_int(value) {
                    Some(n) if n > 0 => Ok(()),
                    Some(_) => Err(Error::invalid_value(self.name, "must be a positive id")),
                    None => Err(self.mismatch(value)),
                };
            }
            FieldType::Money => {
                return match money_text(value).map(parse_cents) {
                    Some(Ok(c)) if c >= 0 => Ok(()),
                    Some(Ok(_)) => Err(Error::invalid_value(self.name, "must not be negative")),
                    Some(Err(MoneyError::SubCent)) => Err(Error::invalid_value(
                        self.name,
                        "must have at most two decimal places",
                    )),
                    Some(Err(MoneyError::OutOfRange)) => {
                        Err(Error::invalid_value(self.name, "amount out of range"))
                    }
                    Some(Err(MoneyError::NotANumber)) | None => Err(self.mismatch(value)),
                };
            }
            FieldType::Float => as_float(value).is_some(),
            FieldType::Date => {
                return match value.as_str() {
                    Some(s) if is_iso_date(s) => Ok(()),
                    Some(_) => Err(Error::invalid_value(self.name, "expected YYYY-MM-DD")),
                    None => Err(self.mismatch(value)),
                };
            }
            FieldType::Lines => value
                .as_array()
                .is_some_and(|lines| lines.iter().all(Value::is_object)),
        };

        if valid {
            Ok(())
        } else {
            Err(self.mismatch(value))
        }
    }

    fn mismatch(&self, value: &Value) -> Error {
        Error::TypeMismatch {
            field: self.name.to_string(),
            expected: self.field_type.to_string(),
            got: json_type_name(value).to_string(),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        Value::Number(_) => "Float",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn as_cents(value: &Value) -> Option<Cents> {
    money_text(value).and_then(|text| parse_cents(text).ok())
}

fn money_text(value: &Value) -> Option<std::borrow::Cow<'_, str>> {
    match value {
        Value::Number(n) => Some(n.to_string().into()),
        Value::String(s) => Some(s.as_str().into()),
        _ => None,
    }
}

/// Why a decimal amount is not a whole number of cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MoneyError {
    NotANumber,
    /// More than two significant decimal places.
    SubCent,
    OutOfRange,
}

/// Read a decimal amount of major units, such as `19.99` or `1.5e1`, as
/// exact cents.
pub(crate) fn parse_cents(text: impl AsRef<str>) -> std::result::Result<Cents, MoneyError> {
    let text = text.as_ref().trim();
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (mantissa, exponent) = match unsigned.split_once(|c| c == 'e' || c == 'E') {
        Some((mantissa, exponent)) => (
            mantissa,
            exponent.parse::<i32>().map_err(|_| MoneyError::NotANumber)?,
        ),
        None => (unsigned, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if (whole.is_empty() && fraction.is_empty())
        || !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit())
    {
        return Err(MoneyError::NotANumber);
    }

    let mut digits = format!("{whole}{fraction}");
    // Decimal places held by `digits`.
    let mut scale = fraction.len() as i64 - i64::from(exponent);
    while scale > 2 && digits.ends_with('0') {
        digits.pop();
        scale -= 1;
    }
    if scale > 2 {
        return Err(MoneyError::SubCent);
    }

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    let units: Cents = digits.parse().map_err(|_| MoneyError::OutOfRange)?;
    let cents = u32::try_from(2 - scale)
        .ok()
        .and_then(|shift| Cents::from(10u8).checked_pow(shift))
        .and_then(|factor| units.checked_mul(factor))
        .ok_or(MoneyError::OutOfRange)?;
    Ok(if negative { -cents } else { cents })
}

fn is_iso_date(s: &str) -> bool {
    s.len() == 10 && NaiveDate::parse_from_str(s, DATE_FORMAT).is_ok()
}

/// The declared fields of one action type's payload.
#[derive(Debug, Clone, Copy)]
pub struct PayloadSchema {
    pub fields: &'static [FieldDef],
}

impl PayloadSchema {
    pub const fn new(fields: &'static [FieldDef]) -> Self {
        Self { fields }
    }

    /// Check a payload and return a typed view over it.
    ///
    /// Unknown fields are rejected, not ignored: a typo in a field name would
    /// otherwise silently drop the client's change.
    pub fn validate<'a>(&self, payload: &'a Value) -> Result<Payload<'a>> {
        let obj = payload
            .as_object()
            .ok_or_else(|| Error::InvalidPayload("payload must be an object".into()))?;

        if let Some(unknown) = obj
            .keys()
            .find(|key| !self.fields.iter().any(|f| f.name == key.as_str()))
        {
            return Err(Error::UnknownField(unknown.clone()));
        }

        for field in self.fields {
            field.validate(obj.get(field.name))?;
        }

        Ok(Payload { fields: obj })
    }
}

/// A validated payload.
#[derive(Debug, Clone, Copy)]
pub struct Payload<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> Payload<'a> {
    fn present(&self, name: &str) -> Option<&'a Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Whether the field was sent at all, including as `null`.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn string(&self, name: &str) -> Option<String> {
        self.present(name).and_then(Value::as_str).map(str::to_owned)
    }

    pub fn required_string(&self, name: &str) -> Result<String> {
        self.string(name)
            .ok_or_else(|| Error::MissingRequiredField(name.to_string()))
    }

    /// Like [`Payload::required_string`], but also rejects blank strings.
    pub fn non_empty_string(&self, name: &str) -> Result<String> {
        let value = self.required_string(name)?;
        if value.trim().is_empty() {
            return Err(Error::invalid_value(name, "must not be empty"));
        }
        Ok(value)
    }

    /// Absent: `None`. Explicit `null`: `Some(None)`. Otherwise the value.
    pub fn nullable_string(&self, name: &str) -> Option<Option<String>> {
        if !self.contains(name) {
            return None;
        }
        Some(self.string(name))
    }

    /// For update payloads: a field that may be omitted but never nulled.
    pub fn not_null(&self, name: &str) -> Result<()> {
        match self.fields.get(name) {
            Some(Value::Null) => Err(Error::invalid_value(name, "must not be null")),
            _ => Ok(()),
        }
    }

    pub fn count(&self, name: &str) -> Result<Option<i64>> {
        self.convert(name, FieldType::Count, as_int)
    }

    pub fn id(&self, name: &str) -> Result<Option<EntityId>> {
        self.convert(name, FieldType::Id, as_int)
    }

    pub fn required_id(&self, name: &str) -> Result<EntityId> {
        self.id(name)?
            .ok_or_else(|| Error::MissingRequiredField(name.to_string()))
    }

    pub fn money(&self, name: &str) -> Result<Option<Cents>> {
        self.convert(name, FieldType::Money, as_cents)
    }

    pub fn float(&self, name: &str) -> Result<Option<f64>> {
        self.convert(name, FieldType::Float, as_float)
    }

    /// Line objects of a `Lines` field; absent means no lines.
    pub fn lines(&self, name: &str) -> Vec<&'a Value> {
        self.present(name)
            .and_then(Value::as_array)
            .map(|lines| lines.iter().collect())
            .unwrap_or_default()
    }

    fn convert<T>(
        &self,
        name: &str,
        field_type: FieldType,
        f: impl Fn(&Value) -> Option<T>,
    ) -> Result<Option<T>> {
        match self.present(name) {
            None => Ok(None),
            Some(value) => f(value).map(Some).ok_or_else(|| Error::TypeMismatch {
                field: name.to_string(),
                expected: field_type.to_string(),
                got: json_type_name(value).to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: PayloadSchema = PayloadSchema::new(&[
        FieldDef::required("name", FieldType::String),
        FieldDef::optional("stock", FieldType::Count),
        FieldDef::optional("price", FieldType::Money),
        FieldDef::optional("exp_date", FieldType::Date),
        FieldDef::optional("items", FieldType::Lines),
    ]);

    #[test]
    fn accepts_valid_payload() {
        let data = json!({"name": "Paracetamol", "stock": 100, "price": 50});
        let payload = SCHEMA.validate(&data).unwrap();

        assert_eq!(payload.required_string("name").unwrap(), "Paracetamol");
        assert_eq!(payload.count("stock").unwrap(), Some(100));
        assert_eq!(payload.money("price").unwrap(), Some(5000));
    }

    #[test]
    fn missing_required_field() {
        let data = json!({"stock": 1});
        assert_eq!(
            SCHEMA.validate(&data).unwrap_err(),
            Error::MissingRequiredField("name".into())
        );

        let data = json!({"name": null});
        assert_eq!(
            SCHEMA.validate(&data).unwrap_err(),
            Error::MissingRequiredField("name".into())
        );
    }

    #[test]
    fn unknown_field_rejected() {
        let data = json!({"name": "x", "colour": "red"});
        assert_eq!(
            SCHEMA.validate(&data).unwrap_err(),
            Error::UnknownField("colour".into())
        );
    }

    #[test]
    fn numeric_strings_accepted() {
        let data = json!({"name": "x", "stock": "12", "price": "19.99"});
        let payload = SCHEMA.validate(&data).unwrap();
        assert_eq!(payload.count("stock").unwrap(), Some(12));
        assert_eq!(payload.money("price").unwrap(), Some(1999));
    }

    #[test]
    fn money_is_exact_to_the_cent() {
        assert_eq!(parse_cents("19.99"), Ok(1999));
        assert_eq!(parse_cents("1.500"), Ok(150));
        assert_eq!(parse_cents("0.07"), Ok(7));
        assert_eq!(parse_cents("1.5e1"), Ok(1500));
        assert_eq!(parse_cents("-2.5"), Ok(-250));
        assert_eq!(parse_cents("1.005"), Err(MoneyError::SubCent));
        assert_eq!(parse_cents("0.004"), Err(MoneyError::SubCent));
        assert_eq!(parse_cents("abc"), Err(MoneyError::NotANumber));
        assert_eq!(parse_cents("."), Err(MoneyError::NotANumber));
        assert_eq!(
            parse_cents("99999999999999999999"),
            Err(MoneyError::OutOfRange)
        );

        let data = json!({"name": "x", "price": 0.29});
        let payload = SCHEMA.validate(&data).unwrap();
        assert_eq!(payload.money("price").unwrap(), Some(29));

        for price in [json!(0.145), json!("1.005")] {
            let data = json!({"name": "x", "price": price});
            assert!(matches!(
                SCHEMA.validate(&data).unwrap_err(),
                Error::InvalidValue { ref field, ref reason }
                    if field == "price" && reason.contains("two decimal places")
            ));
        }
    }

    #[test]
    fn negative_values_rejected() {
        let data = json!({"name": "x", "stock": -1});
        assert!(matches!(
            SCHEMA.validate(&data).unwrap_err(),
            Error::InvalidValue { ref field, .. } if field == "stock"
        ));

        let data = json!({"name": "x", "price": -0.5});
        assert!(matches!(
            SCHEMA.validate(&data).unwrap_err(),
            Error::InvalidValue { ref field, .. } if field == "price"
        ));
    }

    #[test]
    fn type_mismatch() {
        let data = json!({"name": 42});
        assert_eq!(
            SCHEMA.validate(&data).unwrap_err(),
            Error::TypeMismatch {
                field: "name".into(),
                expected: "String".into(),
                got: "Int".into(),
            }
        );

        let data = json!({"name": "x", "stock": 1.5});
        assert!(matches!(
            SCHEMA.validate(&data).unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }

    #[test]
    fn dates() {
        assert!(is_iso_date("2026-10-19"));
        assert!(!is_iso_date("2026-13-01"));
        assert!(!is_iso_date("19/10/2026"));
        assert!(!is_iso_date("2026-1-019"));
        assert!(!is_iso_date("2026-02-29"));
        assert!(is_iso_date("2028-02-29"));
        assert!(!is_iso_date("2026-04-31"));
        assert!(!is_iso_date("2026-é-01"));
        assert!(!is_iso_date("2026-10-19T00:00"));

        let data = json!({"name": "x", "exp_date": "next year"});
        assert!(SCHEMA.validate(&data).is_err());
    }

    #[test]
    fn lines_must_be_objects() {
        let data = json!({"name": "x", "items": [{"item_id": 1}, 3]});
        assert!(matches!(
            SCHEMA.validate(&data).unwrap_err(),
            Error::TypeMismatch { .. }
        ));

        let data = json!({"name": "x", "items": [{"item_id": 1}]});
        let payload = SCHEMA.validate(&data).unwrap();
        assert_eq!(payload.lines("items").len(), 1);
    }

    #[test]
    fn nullable_string_distinguishes_absent_and_null() {
        const BRAND: PayloadSchema =
            PayloadSchema::new(&[FieldDef::optional("brand", FieldType::String)]);

        let data = json!({});
        assert_eq!(BRAND.validate(&data).unwrap().nullable_string("brand"), None);

        let data = json!({"brand": null});
        assert_eq!(
            BRAND.validate(&data).unwrap().nullable_string("brand"),
            Some(None)
        );

        let data = json!({"brand": "Emzor"});
        assert_eq!(
            BRAND.validate(&data).unwrap().nullable_string("brand"),
            Some(Some("Emzor".into()))
        );
    }

    #[test]
    fn non_object_payload() {
        assert!(matches!(
            SCHEMA.validate(&json!([1, 2])).unwrap_err(),
            Error::InvalidPayload(_)
        ));
    }
}
