//! Plan catalog, gateway orders, payment verification and invoices.

use super::metrics::{record_payment_verification, record_plan_activation};
use super::razorpay::{OrderNotes, PaymentVerification, RazorpayClient, RazorpayOrder};
use crate::dtos::VerifyPaymentRequest;
use crate::error::InsightError;
use crate::models::{format_invoice_number, Invoice, Plan, PlanActivation, PlanTier, User};
use crate::repository::{RepoError, Store};
use chrono::{DateTime, Months, Utc};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub const PAYMENT_METHOD: &str = "razorpay";

/// Result of a successful payment verification.
#[derive(Debug, Clone)]
pub struct Activation {
    pub plan: PlanTier,
    pub expiry: DateTime<Utc>,
    pub invoice: Invoice,
    pub catalog_plan: Plan,
}

#[derive(Clone)]
pub struct BillingService {
    store: Arc<dyn Store>,
    razorpay: RazorpayClient,
}

impl BillingService {
    pub fn new(store: Arc<dyn Store>, razorpay: RazorpayClient) -> Self {
        Self { store, razorpay }
    }

    /// Inserts the default catalog when no plans exist yet.
    pub async fn seed_catalog(&self) -> Result<usize, InsightError> {
        let seeded = self
            .store
            .seed_plans(Plan::default_catalog(self.razorpay.currency()))
            .await?;
        if seeded > 0 {
            tracing::info!(count = seeded, "Seeded plan catalog");
        }
        Ok(seeded)
    }

    pub async fn list_plans(&self) -> Result<Vec<Plan>, InsightError> {
        Ok(self.store.list_active_plans().await?)
    }

    async fn active_plan(&self, plan_id: &str) -> Result<(Plan, PlanTier), InsightError> {
        let plan = self
            .store
            .find_plan(plan_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(InsightError::NotFound("Plan"))?;
        let tier = plan.tier().ok_or_else(|| {
            InsightError::Configuration(format!("plan '{}' maps to no tier", plan.name))
        })?;
        Ok((plan, tier))
    }

    /// Free is the default entitlement and never carries an expiry or a
    /// subscription, so it cannot be bought.
    fn ensure_purchasable(tier: PlanTier) -> Result<(), InsightError> {
        if tier == PlanTier::Free {
            return Err(InsightError::BadRequest(
                "The free plan cannot be purchased".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn create_order(
        &self,
        user: &User,
        plan_id: &str,
    ) -> Result<(RazorpayOrder, Plan), InsightError> {
        let (plan, tier) = self.active_plan(plan_id).await?;
        if user.plan == tier {
            return Err(InsightError::AlreadySubscribed);
        }
        Self::ensure_purchasable(tier)?;

        let receipt = format!("rcpt_{}", Uuid::new_v4().simple());
        let notes = OrderNotes {
            user_id: user.id.clone(),
            plan_id: plan.id.clone(),
        };
        let order = self
            .razorpay
            .create_order(plan.price_minor, &receipt, &notes)
            .await
            .map_err(|e| InsightError::UpstreamUnavailable(e.to_string()))?;

        tracing::info!(
            user_id = %user.id,
            plan_id = %plan.id,
            order_id = %order.id,
            "Payment order created"
        );
        Ok((order, plan))
    }

    pub fn checkout_key(&self) -> &str {
        self.razorpay.key_id()
    }

    /// Verifies the checkout callback and, on success, records the invoice
    /// and upgrades the user in one unit. Nothing is written on failure.
    pub async fn verify_payment(
        &self,
        user: &User,
        request: VerifyPaymentRequest,
    ) -> Result<Activation, InsightError> {
        request.validate()?;

        let verification = PaymentVerification {
            razorpay_order_id: &request.razorpay_order_id,
            razorpay_payment_id: &request.razorpay_payment_id,
            razorpay_signature: &request.razorpay_signature,
        };
        if !self.razorpay.verify_payment_signature(&verification)? {
            record_payment_verification("invalid_signature");
            return Err(InsightError::InvalidSignature);
        }

        let (plan, tier) = self.active_plan(&request.plan_id).await?;
        Self::ensure_purchasable(tier)?;

        let order = self
            .razorpay
            .get_order(&request.razorpay_order_id)
            .await
            .map_err(|e| InsightError::UpstreamUnavailable(e.to_string()))?;
        let expected = OrderNotes {
            user_id: user.id.clone(),
            plan_id: plan.id.clone(),
        };
        if order.notes.as_ref() != Some(&expected) || order.amount != plan.price_minor {
            record_payment_verification("order_mismatch");
            tracing::warn!(
                user_id = %user.id,
                order_id = %order.id,
                plan_id = %plan.id,
                "Verified payment does not match the requested plan"
            );
            return Err(InsightError::BadRequest(
                "Payment does not match the selected plan".to_string(),
            ));
        }

        let now = Utc::now();
        let expiry = now.checked_add_months(Months::new(1)).ok_or_else(|| {
            InsightError::Configuration(format!("cannot compute expiry from {}", now))
        })?;

        let sequence = self.store.next_invoice_sequence().await?;
        let invoice = Invoice::paid(
            format_invoice_number(now, sequence),
            user.id.clone(),
            plan.id.clone(),
            plan.name.clone(),
            plan.price_minor,
            plan.currency.clone(),
            request.razorpay_order_id.clone(),
            request.razorpay_payment_id.clone(),
            request.razorpay_signature.clone(),
            now,
            expiry,
        );
        let activation = PlanActivation {
            user_id: user.id.clone(),
            plan: tier,
            plan_expiry: expiry,
            subscription_id: request.razorpay_payment_id.clone(),
            payment_method: PAYMENT_METHOD.to_string(),
        };

        match self.store.activate_plan(invoice.clone(), activation).await {
            Ok(()) => {}
            Err(RepoError::Duplicate(_)) => {
                record_payment_verification("replayed");
                tracing::warn!(
                    user_id = %user.id,
                    payment_id = %request.razorpay_payment_id,
                    "Payment already processed"
                );
                return Err(InsightError::PaymentAlreadyProcessed);
            }
            Err(e) => return Err(e.into()),
        }

        record_payment_verification("verified");
        record_plan_activation(tier.as_str());
        tracing::info!(
            user_id = %user.id,
            plan = %tier,
            invoice_number = %invoice.invoice_number,
            "Plan activated"
        );

        Ok(Activation {
            plan: tier,
            expiry,
            invoice,
            catalog_plan: plan,
        })
    }

    /// Drops the user back to free. Past invoices are kept.
    pub async fn cancel_subscription(&self, user: &User) -> Result<(), InsightError> {
        if !self.store.cancel_subscription(&user.id).await? {
            return Err(InsightError::NotFound("Subscription"));
        }
        tracing::info!(user_id = %user.id, "Subscription cancelled");
        Ok(())
    }

    pub async fn list_invoices(
        &self,
        user_id: &str,
    ) -> Result<Vec<(Invoice, Option<Plan>)>, InsightError> {
        let invoices = self.store.list_invoices(user_id).await?;
        let mut result = Vec::with_capacity(invoices.len());
        for invoice in invoices {
            let plan = self.store.find_plan(&invoice.plan_id).await?;
            result.push((invoice, plan));
        }
        Ok(result)
    }

    pub async fn get_invoice(
        &self,
        user_id: &str,
        invoice_id: &str,
    ) -> Result<(Invoice, Option<Plan>), InsightError> {
        let invoice = self
            .store
            .find_invoice(user_id, invoice_id)
            .await?
            .ok_or(InsightError::NotFound("Invoice"))?;
        let plan = self.store.find_plan(&invoice.plan_id).await?;
        Ok((invoice, plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RazorpayConfig;
    use crate::repository::{MemoryStore, PlanRepository, UserRepository};
    use secrecy::Secret;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        billing: BillingService,
        store: Arc<MemoryStore>,
        razorpay: RazorpayClient,
        server: MockServer,
        user: User,
        pro: Plan,
    }

    async fn fixture() -> Fixture {
        let server = MockServer::start().await;
        let razorpay = RazorpayClient::new(
            reqwest::Client::new(),
            RazorpayConfig {
                key_id: "rzp_test".into(),
                key_secret: Secret::new("secret".into()),
                api_base_url: server.uri(),
                currency: "INR".into(),
            },
        );
        let store = Arc::new(MemoryStore::new());
        let billing = BillingService::new(store.clone(), razorpay.clone());
        billing.seed_catalog().await.unwrap();

        let pro = billing
            .list_plans()
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.tier() == Some(PlanTier::Pro))
            .unwrap();
        let user = User::new("A".into(), "B".into(), "a@x.io".into(), "h".into());
        store.insert_user(user.clone()).await.unwrap();

        Fixture {
            billing,
            store,
            razorpay,
            server,
            user,
            pro,
        }
    }

    async fn mount_order(f: &Fixture, order_id: &str, plan_id: &str, amount: i64) {
        Mock::given(method("GET"))
            .and(path(format!("/orders/{}", order_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": order_id,
                "amount": amount,
                "currency": "INR",
                "receipt": "rcpt",
                "status": "paid",
                "notes": { "user_id": f.user.id, "plan_id": plan_id }
            })))
            .mount(&f.server)
            .await;
    }

    fn request(f: &Fixture, order_id: &str, payment_id: &str, signature: String) -> VerifyPaymentRequest {
        VerifyPaymentRequest {
            razorpay_order_id: order_id.into(),
            razorpay_payment_id: payment_id.into(),
            razorpay_signature: signature,
            plan_id: f.pro.id.clone(),
        }
    }

    #[tokio::test]
    async fn bad_signature_changes_nothing() {
        let f = fixture().await;
        let err = f
            .billing
            .verify_payment(&f.user, request(&f, "order_1", "pay_1", "00".repeat(32)))
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::InvalidSignature));

        let user = f.store.find_user(&f.user.id).await.unwrap().unwrap();
        assert_eq!(user.plan, PlanTier::Free);
        assert!(f.billing.list_invoices(&f.user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn verified_payment_activates_once() {
        let f = fixture().await;
        mount_order(&f, "order_1", &f.pro.id, f.pro.price_minor).await;
        let signature = f.razorpay.sign_payment("order_1", "pay_1").unwrap();

        let activation = f
            .billing
            .verify_payment(&f.user, request(&f, "order_1", "pay_1", signature.clone()))
            .await
            .unwrap();
        assert_eq!(activation.plan, PlanTier::Pro);
        assert!(activation.invoice.invoice_number.starts_with("INV-"));

        let user = f.store.find_user(&f.user.id).await.unwrap().unwrap();
        assert_eq!(user.plan, PlanTier::Pro);
        assert_eq!(user.subscription_id.as_deref(), Some("pay_1"));
        assert_eq!(user.invoice_ids, vec![activation.invoice.id.clone()]);

        let err = f
            .billing
            .verify_payment(&f.user, request(&f, "order_1", "pay_1", signature))
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::PaymentAlreadyProcessed));
        assert_eq!(f.billing.list_invoices(&f.user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn order_for_another_plan_is_rejected() {
        let f = fixture().await;
        mount_order(&f, "order_2", "some-other-plan", f.pro.price_minor).await;
        let signature = f.razorpay.sign_payment("order_2", "pay_2").unwrap();

        let err = f
            .billing
            .verify_payment(&f.user, request(&f, "order_2", "pay_2", signature))
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::BadRequest(_)));
        let user = f.store.find_user(&f.user.id).await.unwrap().unwrap();
        assert_eq!(user.plan, PlanTier::Free);
    }

    #[tokio::test]
    async fn same_plan_is_rejected_even_after_expiry() {
        let f = fixture().await;
        let mut lapsed = f.user.clone();
        lapsed.plan = PlanTier::Pro;
        lapsed.plan_expiry = Some(Utc::now() - chrono::Duration::days(1));

        let err = f.billing.create_order(&lapsed, &f.pro.id).await.unwrap_err();
        assert!(matches!(err, InsightError::AlreadySubscribed));
        assert!(f.server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn free_catalog_plan_cannot_be_bought() {
        let f = fixture().await;
        let store = Arc::new(MemoryStore::new());
        let free = Plan::new("Free", 0, "INR", &[]);
        store.seed_plans(vec![free.clone()]).await.unwrap();
        store.insert_user(f.user.clone()).await.unwrap();
        let billing = BillingService::new(store.clone(), f.razorpay.clone());

        let mut pro_user = f.user.clone();
        pro_user.plan = PlanTier::Pro;
        let err = billing.create_order(&pro_user, &free.id).await.unwrap_err();
        assert!(matches!(err, InsightError::BadRequest(_)));

        mount_order(&f, "order_free", &free.id, 0).await;
        let signature = f.razorpay.sign_payment("order_free", "pay_free").unwrap();
        let mut req = request(&f, "order_free", "pay_free", signature);
        req.plan_id = free.id.clone();
        let err = billing.verify_payment(&f.user, req).await.unwrap_err();
        assert!(matches!(err, InsightError::BadRequest(_)));

        let user = store.find_user(&f.user.id).await.unwrap().unwrap();
        assert_eq!(user.plan, PlanTier::Free);
        assert!(user.plan_expiry.is_none());
        assert!(user.subscription_id.is_none());
    }

    #[tokio::test]
    async fn cancel_without_subscription_is_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.billing.cancel_subscription(&f.user).await,
            Err(InsightError::NotFound("Subscription"))
        ));
    }
}
