//! End-to-end tests for the sync protocol.
//!
//! Each test binds a server with the in-memory store to an ephemeral port and
//! drives it over HTTP.

use pharmsync_engine::{Atomicity, InitialData};
use pharmsync_server::{app, config::Config, config::MEMORY_URL, AppState};
use reqwest::StatusCode;
use serde_json::{json, Value};

struct TestServer {
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(config: Config) -> Self {
        let state = AppState::from_config(config).await.unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.unwrap();
        });
        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
        }
    }

    async fn per_batch() -> Self {
        Self::start(Config::new(MEMORY_URL)).await
    }

    async fn per_action() -> Self {
        let mut config = Config::new(MEMORY_URL);
        config.atomicity = Atomicity::PerAction;
        Self::start(config).await
    }

    async fn sync(&self, domain: &str, actions: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(format!("{}/api/{domain}/sync/", self.base))
            .json(&json!({ "pendingActions": actions }))
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn initial_data(&self) -> InitialData {
        self.client
            .get(format!("{}/api/data/initial/", self.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod protocol_tests {
    use super::*;

    #[tokio::test]
    async fn test_add_then_update_item() {
        let server = TestServer::per_batch().await;

        let (status, body) = server
            .sync(
                "inventory",
                json!([
                    {"actionType": "add_item", "data": {"name": "Paracetamol", "stock": 100}},
                    {"actionType": "update_item", "data": {"id": 1, "stock": 80}}
                ]),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["results"][0]["status"], "applied");
        assert_eq!(body["results"][0]["entityId"], 1);

        let data = server.initial_data().await;
        assert_eq!(data.inventory.len(), 1);
        assert_eq!(data.inventory[0].name, "Paracetamol");
        assert_eq!(data.inventory[0].stock, 80);
    }

    #[tokio::test]
    async fn test_oversell_is_rejected() {
        let server = TestServer::per_batch().await;
        server
            .sync(
                "inventory",
                json!([{"actionType": "add_item", "data": {"name": "Amoxicillin", "stock": 3, "price": 2.5}}]),
            )
            .await;

        let (status, body) = server
            .sync(
                "sales",
                json!([{
                    "actionType": "add_sale",
                    "data": {"payment_method": "Cash", "items": [{"item_id": 1, "quantity": 5}]}
                }]),
            )
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("insufficient stock"));
        assert_eq!(body["results"][0]["errorKind"], "insufficient_stock");

        let data = server.initial_data().await;
        assert_eq!(data.inventory[0].stock, 3);
    }

    #[tokio::test]
    async fn test_sale_decrements_stock() {
        let server = TestServer::per_batch().await;
        server
            .sync(
                "inventory",
                json!([{"actionType": "add_item", "data": {"name": "Amoxicillin", "stock": 10, "price": 2.5}}]),
            )
            .await;

        let (status, body) = server
            .sync(
                "sales",
                json!([{
                    "actionType": "add_sale",
                    "data": {"payment_method": "Cash", "items": [{"item_id": 1, "quantity": 4}]}
                }]),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(server.initial_data().await.inventory[0].stock, 6);
    }

    #[tokio::test]
    async fn test_unknown_action_type() {
        let server = TestServer::per_batch().await;

        let (status, body) = server
            .sync(
                "inventory",
                json!([
                    {"actionType": "add_item", "data": {"name": "Ibuprofen"}},
                    {"actionType": "bogus_type", "data": {}}
                ]),
            )
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("bogus_type"));
        assert_eq!(body["results"][0]["errorKind"], "batch_aborted");
        assert_eq!(body["results"][1]["errorKind"], "unknown_action_type");
        assert!(server.initial_data().await.inventory.is_empty());
    }

    #[tokio::test]
    async fn test_per_action_partial() {
        let server = TestServer::per_action().await;

        let (status, body) = server
            .sync(
                "inventory",
                json!([
                    {"actionType": "add_item", "data": {"name": "Cetirizine"}},
                    {"actionType": "update_item", "data": {"id": 42, "stock": 1}},
                    {"actionType": "add_item", "data": {"name": "Loratadine"}}
                ]),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "partial");
        assert_eq!(body["results"][1]["errorKind"], "not_found");
        assert_eq!(server.initial_data().await.inventory.len(), 2);
    }

    #[tokio::test]
    async fn test_idempotent_resubmission() {
        let server = TestServer::per_batch().await;
        let actions = json!([
            {"actionType": "add_customer", "data": {"name": "Ada", "phone": "555-0100"}, "idempotencyKey": "till-1:1"},
            {"actionType": "top_up_wallet", "data": {"id": 1, "amount": 20}, "idempotencyKey": "till-1:2"}
        ]);

        let (status, _) = server.sync("customers", actions.clone()).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = server.sync("customers", actions).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["duplicate"], true);
        assert_eq!(body["results"][1]["duplicate"], true);

        let data = server.initial_data().await;
        assert_eq!(data.customers.len(), 1);
        assert_eq!(data.customers[0].wallet_balance, 2000);
    }

    #[tokio::test]
    async fn test_wallet_sale() {
        let server = TestServer::per_batch().await;
        server
            .sync(
                "inventory",
                json!([{"actionType": "add_item", "data": {"name": "Vitamin C", "stock": 50, "price": 3}}]),
            )
            .await;
        server
            .sync(
                "customers",
                json!([
                    {"actionType": "add_customer", "data": {"name": "Ada", "phone": "555-0100"}},
                    {"actionType": "top_up_wallet", "data": {"id": 1, "amount": 10}}
                ]),
            )
            .await;

        let sale = |quantity: i64| {
            json!([{
                "actionType": "add_sale",
                "data": {
                    "customer_id": 1,
                    "payment_method": "Wallet",
                    "items": [{"item_id": 1, "quantity": quantity}]
                }
            }])
        };

        let (status, body) = server.sync("sales", sale(5)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["results"][0]["errorKind"], "insufficient_balance");

        let (status, _) = server.sync("sales", sale(2)).await;
        assert_eq!(status, StatusCode::OK);

        let data = server.initial_data().await;
        assert_eq!(data.customers[0].wallet_balance, 400);
        assert_eq!(data.inventory[0].stock, 48);
    }

    #[tokio::test]
    async fn test_wholesale_pool_is_separate() {
        let server = TestServer::per_batch().await;
        server
            .sync(
                "wholesale",
                json!([{"actionType": "add_wholesale_item", "data": {"name": "Saline 1L", "stock": 40}}]),
            )
            .await;

        let (status, _) = server
            .sync(
                "wholesale",
                json!([{"actionType": "add_wholesale_sale", "data": {"items": [{"item_id": 1, "quantity": 15}]}}]),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let data = server.initial_data().await;
        assert!(data.inventory.is_empty());
        assert_eq!(data.wholesale[0].stock, 25);
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_method() {
        let server = TestServer::per_batch().await;

        let response = server
            .client
            .get(format!("{}/api/inventory/sync/", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Invalid method");

        let response = server
            .client
            .post(format!("{}/api/data/initial/", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let server = TestServer::per_batch().await;

        let response = server
            .client
            .post(format!("{}/api/inventory/sync/", server.base))
            .header("content-type", "application/json")
            .body("{\"pendingActions\": [")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_domain() {
        let server = TestServer::per_batch().await;

        let (status, body) = server.sync("prescriptions", json!([])).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("prescriptions"));
    }

    #[tokio::test]
    async fn test_route_without_trailing_slash() {
        let server = TestServer::per_batch().await;

        let response = server
            .client
            .post(format!("{}/api/suppliers/sync", server.base))
            .json(&json!({"pendingActions": [
                {"actionType": "add_supplier", "data": {"name": "MedSupply Ltd"}}
            ]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(server.initial_data().await.suppliers.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let server = TestServer::per_batch().await;

        let (status, body) = server.sync("inventory", json!([])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["results"], json!([]));
    }

    #[tokio::test]
    async fn test_offline_store() {
        let mut config = Config::new(MEMORY_URL);
        config.offline_database_url = Some(MEMORY_URL.to_string());
        let server = TestServer::start(config).await;

        let response = server
            .client
            .post(format!("{}/api/inventory/sync/", server.base))
            .header("x-pharmsync-database", "offline")
            .json(&json!({"pendingActions": [
                {"actionType": "add_item", "data": {"name": "Oral Rehydration Salts"}}
            ]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-pharmsync-database"], "offline");

        // The main store is untouched.
        assert!(server.initial_data().await.inventory.is_empty());

        let offline: InitialData = server
            .client
            .get(format!("{}/api/data/initial/", server.base))
            .header("x-pharmsync-database", "offline")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(offline.inventory.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_store_not_configured() {
        let server = TestServer::per_batch().await;

        let response = server
            .client
            .get(format!("{}/api/data/initial/", server.base))
            .header("x-pharmsync-database", "offline")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let server = TestServer::per_batch().await;

        let body: Value = server
            .client
            .get(format!("{}/health", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
        assert_eq!(body["atomicity"], "batch");
    }
}
