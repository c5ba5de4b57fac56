use crate::models::{Invoice, InvoiceItem, InvoiceStatus, Plan, PlanTier};
use serde::{Deserialize, Serialize};
use validator::Validate;

fn major_units(minor: i64) -> f64 {
    minor as f64 / 100.0
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub currency: String,
    pub billing_cycle: String,
    pub features: Vec<String>,
}

impl From<Plan> for PlanResponse {
    fn from(plan: Plan) -> Self {
        Self {
            id: plan.id,
            name: plan.name,
            price: major_units(plan.price_minor),
            currency: plan.currency,
            billing_cycle: plan.billing_cycle,
            features: plan.features,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MyPlanResponse {
    pub plan: PlanTier,
    pub expiry: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "plan_id is required"))]
    pub plan_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    /// Minor currency units, as the checkout widget expects.
    pub amount: i64,
    pub currency: String,
    pub key: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "razorpay_order_id is required"))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, message = "razorpay_payment_id is required"))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, message = "razorpay_signature is required"))]
    pub razorpay_signature: String,
    #[validate(length(min = 1, message = "plan_id is required"))]
    pub plan_id: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub message: String,
    pub plan: PlanTier,
    pub expiry: String,
    pub invoice: InvoiceResponse,
}

#[derive(Debug, Serialize)]
pub struct InvoiceItemResponse {
    pub description: String,
    pub amount: f64,
}

impl From<InvoiceItem> for InvoiceItemResponse {
    fn from(item: InvoiceItem) -> Self {
        Self {
            description: item.description,
            amount: major_units(item.amount_minor),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub id: String,
    pub invoice_number: String,
    pub amount: f64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub items: Vec<InvoiceItemResponse>,
    pub payment_date: String,
    pub expiry_date: String,
    pub plan: Option<PlanResponse>,
}

impl InvoiceResponse {
    pub fn new(invoice: Invoice, plan: Option<Plan>) -> Self {
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number,
            amount: major_units(invoice.amount_minor),
            currency: invoice.currency,
            status: invoice.status,
            razorpay_order_id: invoice.razorpay_order_id,
            razorpay_payment_id: invoice.razorpay_payment_id,
            items: invoice.items.into_iter().map(Into::into).collect(),
            payment_date: invoice.payment_date.to_rfc3339(),
            expiry_date: invoice.expiry_date.to_rfc3339(),
            plan: plan.map(Into::into),
        }
    }
}
