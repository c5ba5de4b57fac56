use crate::dtos::InvoiceResponse;
use crate::middleware::CurrentUser;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

pub async fn list_invoices(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let invoices: Vec<InvoiceResponse> = state
        .billing
        .list_invoices(&ctx.user.id)
        .await?
        .into_iter()
        .map(|(invoice, plan)| InvoiceResponse::new(invoice, plan))
        .collect();
    Ok(Json(invoices))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(invoice_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (invoice, plan) = state
        .billing
        .get_invoice(&ctx.user.id, &invoice_id)
        .await?;
    Ok(Json(InvoiceResponse::new(invoice, plan)))
}
