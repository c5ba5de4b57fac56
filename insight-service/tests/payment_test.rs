mod common;

use common::{sign_payment, TestApp};
use serde_json::{json, Value};

const CSV: &str = "month,units\n2024-01,120\n";

struct Order {
    order_id: String,
    plan_id: String,
    amount: i64,
}

async fn create_pro_order(app: &TestApp) -> Order {
    let plan = app.pro_plan().await;
    let plan_id = plan["id"].as_str().unwrap().to_string();

    let response = app
        .client
        .post(app.url("/api/plans/create-order"))
        .json(&json!({ "plan_id": plan_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["key"], "rzp_test_key");
    assert_eq!(body["currency"], "INR");

    Order {
        order_id: body["order_id"].as_str().unwrap().to_string(),
        plan_id,
        amount: body["amount"].as_i64().unwrap(),
    }
}

async fn verify(app: &TestApp, order: &Order, payment_id: &str, signature: &str) -> reqwest::Response {
    app.client
        .post(app.url("/api/plans/verify-payment"))
        .json(&json!({
            "razorpay_order_id": order.order_id,
            "razorpay_payment_id": payment_id,
            "razorpay_signature": signature,
            "plan_id": order.plan_id,
        }))
        .send()
        .await
        .expect("Failed to execute request")
}

async fn my_plan(app: &TestApp) -> Value {
    app.client
        .get(app.url("/api/plans/my-plan"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn invoices(app: &TestApp) -> Vec<Value> {
    app.client
        .get(app.url("/api/invoice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn plans_are_seeded_and_public() {
    let app = TestApp::spawn().await;

    let plans: Vec<Value> = app
        .client
        .get(app.url("/api/plans/plans"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(plans.iter().any(|p| p["name"] == "Pro" && p["price"] == 499.0));

    app.cleanup().await;
}

#[tokio::test]
async fn order_amount_is_in_paise() {
    let app = TestApp::spawn().await;
    app.register_and_login().await;

    let order = create_pro_order(&app).await;
    assert_eq!(order.amount, 49_900);

    app.cleanup().await;
}

#[tokio::test]
async fn invalid_signature_changes_nothing() {
    let app = TestApp::spawn().await;
    let user_id = app.register_and_login().await;
    let order = create_pro_order(&app).await;
    app.mount_paid_order(&order.order_id, &user_id, &order.plan_id, order.amount)
        .await;

    let forged = sign_payment(&order.order_id, "pay_other");
    let response = verify(&app, &order, "pay_123", &forged).await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid payment signature");

    assert_eq!(my_plan(&app).await["plan"], "free");
    assert!(invoices(&app).await.is_empty());

    app.cleanup().await;
}

#[tokio::test]
async fn verified_payment_upgrades_plan_and_issues_invoice() {
    let app = TestApp::spawn().await;
    let user_id = app.register_and_login().await;

    for i in 0..3 {
        let response = app.upload_csv(&format!("free-{}.csv", i), CSV).await;
        assert_eq!(response.status().as_u16(), 201);
    }
    assert_eq!(app.upload_csv("blocked.csv", CSV).await.status().as_u16(), 403);

    let order = create_pro_order(&app).await;
    app.mount_paid_order(&order.order_id, &user_id, &order.plan_id, order.amount)
        .await;
    let signature = sign_payment(&order.order_id, "pay_123");

    let response = verify(&app, &order, "pay_123", &signature).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["plan"], "pro");
    assert!(body["invoice"]["invoice_number"]
        .as_str()
        .unwrap()
        .starts_with("INV-"));
    assert_eq!(body["invoice"]["items"][0]["description"], "Pro Subscription");

    let plan = my_plan(&app).await;
    assert_eq!(plan["plan"], "pro");
    assert_eq!(plan["is_active"], true);

    // Pro allows more than the free three.
    assert_eq!(app.upload_csv("pro.csv", CSV).await.status().as_u16(), 201);

    let listed = invoices(&app).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["razorpay_payment_id"], "pay_123");
    assert_eq!(listed[0]["plan"]["name"], "Pro");

    let response = app
        .client
        .get(app.url(&format!(
            "/api/invoice/{}",
            listed[0]["id"].as_str().unwrap()
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    app.cleanup().await;
}

#[tokio::test]
async fn replayed_payment_is_rejected() {
    let app = TestApp::spawn().await;
    let user_id = app.register_and_login().await;
    let order = create_pro_order(&app).await;
    app.mount_paid_order(&order.order_id, &user_id, &order.plan_id, order.amount)
        .await;
    let signature = sign_payment(&order.order_id, "pay_replay");

    assert_eq!(
        verify(&app, &order, "pay_replay", &signature).await.status().as_u16(),
        200
    );
    let response = verify(&app, &order, "pay_replay", &signature).await;
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Payment already processed");

    assert_eq!(invoices(&app).await.len(), 1);

    app.cleanup().await;
}

#[tokio::test]
async fn order_for_another_user_is_rejected() {
    let app = TestApp::spawn().await;
    app.register_and_login().await;
    let order = create_pro_order(&app).await;
    app.mount_paid_order(&order.order_id, "someone-else", &order.plan_id, order.amount)
        .await;
    let signature = sign_payment(&order.order_id, "pay_stolen");

    let response = verify(&app, &order, "pay_stolen", &signature).await;
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(my_plan(&app).await["plan"], "free");

    app.cleanup().await;
}

#[tokio::test]
async fn subscriber_cannot_order_same_plan() {
    let app = TestApp::spawn().await;
    let user_id = app.register_and_login().await;
    let order = create_pro_order(&app).await;
    app.mount_paid_order(&order.order_id, &user_id, &order.plan_id, order.amount)
        .await;
    let signature = sign_payment(&order.order_id, "pay_1");
    assert_eq!(verify(&app, &order, "pay_1", &signature).await.status().as_u16(), 200);

    let response = app
        .client
        .post(app.url("/api/plans/create-order"))
        .json(&json!({ "plan_id": order.plan_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn cancel_returns_to_free_and_keeps_invoices() {
    let app = TestApp::spawn().await;
    let user_id = app.register_and_login().await;

    let response = app
        .client
        .post(app.url("/api/plans/cancel-subscription"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let order = create_pro_order(&app).await;
    app.mount_paid_order(&order.order_id, &user_id, &order.plan_id, order.amount)
        .await;
    let signature = sign_payment(&order.order_id, "pay_cancel");
    assert_eq!(
        verify(&app, &order, "pay_cancel", &signature).await.status().as_u16(),
        200
    );
    let before = invoices(&app).await;
    assert_eq!(before.len(), 1);
    let invoice_id = before[0]["id"].as_str().unwrap().to_string();
    let detail_before: Value = app
        .client
        .get(app.url(&format!("/api/invoice/{}", invoice_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let response = app
        .client
        .post(app.url("/api/plans/cancel-subscription"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let plan = my_plan(&app).await;
    assert_eq!(plan["plan"], "free");
    assert!(plan["expiry"].is_null());

    assert_eq!(invoices(&app).await, before);
    let with_slash: Vec<Value> = app
        .client
        .get(app.url("/api/invoice/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(with_slash, before);
    let detail_after: Value = app
        .client
        .get(app.url(&format!("/api/invoice/{}", invoice_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail_after, detail_before);

    app.cleanup().await;
}

#[tokio::test]
async fn unknown_plan_is_not_found() {
    let app = TestApp::spawn().await;
    app.register_and_login().await;

    let response = app
        .client
        .post(app.url("/api/plans/create-order"))
        .json(&json!({ "plan_id": "no-such-plan" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    app.cleanup().await;
}
