use crate::dtos::{
    CreateOrderRequest, CreateOrderResponse, InvoiceResponse, MessageResponse, MyPlanResponse,
    PlanResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::middleware::CurrentUser;
use crate::startup::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use service_core::error::AppError;
use validator::Validate;

pub async fn list_plans(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let plans: Vec<PlanResponse> = state
        .billing
        .list_plans()
        .await?
        .into_iter()
        .map(PlanResponse::from)
        .collect();
    Ok(Json(plans))
}

pub async fn my_plan(CurrentUser(ctx): CurrentUser) -> Json<MyPlanResponse> {
    let user = ctx.user;
    Json(MyPlanResponse {
        is_active: user.plan_is_active(Utc::now()),
        plan: user.plan,
        expiry: user.plan_expiry.map(|d| d.to_rfc3339()),
    })
}

pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let (order, _plan) = state
        .billing
        .create_order(&ctx.user, &request.plan_id)
        .await?;

    Ok(Json(CreateOrderResponse {
        order_id: order.id,
        amount: order.amount,
        currency: order.currency,
        key: state.billing.checkout_key().to_string(),
    }))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let activation = state.billing.verify_payment(&ctx.user, request).await?;

    Ok(Json(VerifyPaymentResponse {
        message: "Payment verified successfully".to_string(),
        plan: activation.plan,
        expiry: activation.expiry.to_rfc3339(),
        invoice: InvoiceResponse::new(activation.invoice, Some(activation.catalog_plan)),
    }))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    state.billing.cancel_subscription(&ctx.user).await?;
    Ok(Json(MessageResponse::new("Subscription cancelled")))
}
