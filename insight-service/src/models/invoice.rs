use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Created,
    Pending,
    Paid,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceItem {
    pub description: String,
    pub amount_minor: i64,
}

/// Append-only billing record written once per verified payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(rename = "_id")]
    pub id: String,
    pub invoice_number: String,
    pub user_id: String,
    pub plan_id: String,
    pub plan_name: String,
    pub amount_minor: i64,
    pub currency: String,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    pub status: InvoiceStatus,
    pub items: Vec<InvoiceItem>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub payment_date: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expiry_date: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    #[allow(clippy::too_many_arguments)]
    pub fn paid(
        invoice_number: String,
        user_id: String,
        plan_id: String,
        plan_name: String,
        amount_minor: i64,
        currency: String,
        razorpay_order_id: String,
        razorpay_payment_id: String,
        razorpay_signature: String,
        paid_at: DateTime<Utc>,
        expiry_date: DateTime<Utc>,
    ) -> Self {
        let items = vec![InvoiceItem {
            description: format!("{} Subscription", plan_name),
            amount_minor,
        }];
        Self {
            id: Uuid::new_v4().to_string(),
            invoice_number,
            user_id,
            plan_id,
            plan_name,
            amount_minor,
            currency,
            razorpay_order_id,
            razorpay_payment_id,
            razorpay_signature,
            status: InvoiceStatus::Paid,
            items,
            payment_date: paid_at,
            expiry_date,
            created_at: paid_at,
        }
    }
}

/// `INV-<YYYYMMDD>-<seq:06>`; `seq` comes from the atomic invoice counter.
pub fn format_invoice_number(date: DateTime<Utc>, seq: i64) -> String {
    format!("INV-{}-{:06}", date.format("%Y%m%d"), seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn invoice_numbers_are_dated_and_zero_padded() {
        let date = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap();
        assert_eq!(format_invoice_number(date, 42), "INV-20240309-000042");
        assert_eq!(format_invoice_number(date, 1_234_567), "INV-20240309-1234567");
    }

    #[test]
    fn paid_invoice_carries_single_subscription_item() {
        let now = Utc::now();
        let invoice = Invoice::paid(
            "INV-1".into(),
            "u".into(),
            "p".into(),
            "Pro".into(),
            49_900,
            "INR".into(),
            "order_1".into(),
            "pay_1".into(),
            "sig".into(),
            now,
            now,
        );
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(
            invoice.items,
            vec![InvoiceItem {
                description: "Pro Subscription".into(),
                amount_minor: 49_900
            }]
        );
    }
}
