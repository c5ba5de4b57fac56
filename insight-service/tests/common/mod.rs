#![allow(dead_code)]

use insight_service::config::{DatabaseBackend, InsightConfig, StorageBackend};
use insight_service::startup::Application;
use reqwest::{multipart, Client, Response};
use secrecy::Secret;
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const TEST_PASSWORD: &str = "s3cure-passw0rd";
pub const RAZORPAY_SECRET: &str = "test_key_secret";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: Client,
    pub analytics: MockServer,
    pub razorpay: MockServer,
    pub storage_path: String,
}

/// Echoes the requested amount and notes back the way the Orders API does.
fn echo_order(request: &Request) -> ResponseTemplate {
    let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
    ResponseTemplate::new(200).set_body_json(json!({
        "id": format!("order_{}", Uuid::new_v4().simple()),
        "amount": body["amount"],
        "currency": body["currency"],
        "receipt": body["receipt"],
        "status": "created",
        "notes": body["notes"],
    }))
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(customize: impl FnOnce(&mut InsightConfig)) -> Self {
        let analytics = MockServer::start().await;
        let razorpay = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(echo_order)
            .mount(&razorpay)
            .await;

        let storage_path = format!("target/test-storage-{}", Uuid::new_v4());

        let mut config = InsightConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.database.backend = DatabaseBackend::Memory;
        config.storage.backend = StorageBackend::Local;
        config.storage.local_path = storage_path.clone();
        config.storage.public_base_url = "http://blobs.test".to_string();
        config.analytics.base_url = analytics.uri();
        config.razorpay.key_id = "rzp_test_key".to_string();
        config.razorpay.key_secret = Secret::new(RAZORPAY_SECRET.to_string());
        config.razorpay.api_base_url = razorpay.uri();
        config.rate_limit.login_attempts = 1000;
        customize(&mut config);

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = Client::builder()
            .cookie_store(true)
            .build()
            .expect("Failed to build client");

        for _ in 0..50 {
            if client.get(format!("{}/health", address)).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            client,
            analytics,
            razorpay,
            storage_path,
        }
    }

    pub fn url(&self, route: &str) -> String {
        format!("{}{}", self.address, route)
    }

    pub async fn register(&self, email: &str) -> Response {
        self.client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "first_name": "Test",
                "last_name": "User",
                "email": email,
                "password": TEST_PASSWORD,
            }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Registers a fresh user, logs in with the shared cookie client and
    /// returns the user's id.
    pub async fn register_and_login(&self) -> String {
        let email = format!("user-{}@example.com", Uuid::new_v4());
        assert_eq!(self.register(&email).await.status().as_u16(), 201);

        let response = self.login(&email, TEST_PASSWORD).await;
        assert_eq!(response.status().as_u16(), 200);
        let profile: Value = response.json().await.expect("Failed to parse JSON");
        profile["id"].as_str().expect("profile id").to_string()
    }

    pub async fn upload_csv(&self, name: &str, content: &str) -> Response {
        let form = multipart::Form::new().part(
            "file",
            multipart::Part::bytes(content.as_bytes().to_vec())
                .file_name(name.to_string())
                .mime_str("text/csv")
                .expect("valid mime"),
        );
        self.client
            .post(self.url("/api/files-section/upload"))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn pro_plan(&self) -> Value {
        let plans: Vec<Value> = self
            .client
            .get(self.url("/api/plans/plans"))
            .send()
            .await
            .expect("Failed to execute request")
            .json()
            .await
            .expect("Failed to parse JSON");
        plans
            .into_iter()
            .find(|p| p["name"] == "Pro")
            .expect("Pro plan seeded")
    }

    /// Makes `GET /orders/{order_id}` report a paid order bound to the user
    /// and plan.
    pub async fn mount_paid_order(&self, order_id: &str, user_id: &str, plan_id: &str, amount: i64) {
        Mock::given(method("GET"))
            .and(path(format!("/orders/{}", order_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": order_id,
                "amount": amount,
                "currency": "INR",
                "receipt": "rcpt_test",
                "status": "paid",
                "notes": { "user_id": user_id, "plan_id": plan_id },
            })))
            .mount(&self.razorpay)
            .await;
    }

    pub async fn cleanup(&self) {
        let _ = tokio::fs::remove_dir_all(&self.storage_path).await;
    }
}

pub fn sign_payment(order_id: &str, payment_id: &str) -> String {
    service_core::utils::hmac_sha256_hex(RAZORPAY_SECRET, &format!("{}|{}", order_id, payment_id))
        .expect("hmac accepts any key length")
}
