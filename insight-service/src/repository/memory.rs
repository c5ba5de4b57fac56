use super::{
    AnalysisOutcome, FileRepository, IdentityField, InvoiceRepository, PlanRepository,
    RepoError, RepoResult, SessionRepository, Store, UserRepository, LOGIN_HISTORY_LIMIT,
};
use crate::models::{
    AnalysisStatus, FileRecord, Invoice, LoginRecord, Plan, PlanActivation, PlanTier, Session,
    User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    users: HashMap<String, User>,
    sessions: HashMap<String, Session>,
    files: HashMap<String, FileRecord>,
    plans: HashMap<String, Plan>,
    invoices: HashMap<String, Invoice>,
    invoice_seq: i64,
}

impl State {
    fn identity_taken(&self, field: IdentityField, value: &str) -> bool {
        self.users.values().any(|u| match field {
            IdentityField::Username => u.username.as_deref() == Some(value),
            IdentityField::Email => u.email == value,
            IdentityField::Phone => u.phone.as_deref() == Some(value),
        })
    }
}

/// In-process store with the same uniqueness, compare-and-set and
/// all-or-nothing activation semantics as the MongoDB backend.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(&self, user: User) -> RepoResult<()> {
        let mut state = self.state.lock().await;
        let identities = [
            (IdentityField::Email, Some(user.email.as_str())),
            (IdentityField::Username, user.username.as_deref()),
            (IdentityField::Phone, user.phone.as_deref()),
        ];
        for (field, value) in identities {
            if let Some(value) = value {
                if state.identity_taken(field, value) {
                    return Err(RepoError::Duplicate(field.as_str().to_string()));
                }
            }
        }
        if state.users.contains_key(&user.id) {
            return Err(RepoError::Duplicate("_id".to_string()));
        }
        state.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn find_user(&self, id: &str) -> RepoResult<Option<User>> {
        Ok(self.state.lock().await.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn identity_in_use(&self, field: IdentityField, value: &str) -> RepoResult<bool> {
        Ok(self.state.lock().await.identity_taken(field, value))
    }

    async fn record_login_failure(
        &self,
        user_id: &str,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) -> RepoResult<()> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.get_mut(user_id) {
            user.failed_login_attempts += 1;
            if user.failed_login_attempts >= max_attempts {
                user.lock_until = Some(lock_until);
                user.failed_login_attempts = 0;
            }
        }
        Ok(())
    }

    async fn record_login_success(&self, user_id: &str, entry: LoginRecord) -> RepoResult<()> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.get_mut(user_id) {
            user.failed_login_attempts = 0;
            user.lock_until = None;
            user.last_login = Some(entry.at);
            user.updated_at = entry.at;
            user.login_history.push(entry);
            let overflow = user.login_history.len().saturating_sub(LOGIN_HISTORY_LIMIT);
            user.login_history.drain(..overflow);
        }
        Ok(())
    }

    async fn cancel_subscription(&self, user_id: &str) -> RepoResult<bool> {
        let mut state = self.state.lock().await;
        match state.users.get_mut(user_id) {
            Some(user) if user.subscription_id.is_some() => {
                user.plan = PlanTier::Free;
                user.plan_expiry = None;
                user.subscription_id = None;
                user.payment_method = None;
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn insert_session(&self, session: Session) -> RepoResult<()> {
        let mut state = self.state.lock().await;
        if state
            .sessions
            .values()
            .any(|s| s.token_hash == session.token_hash)
        {
            return Err(RepoError::Duplicate("token_hash".to_string()));
        }
        state.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn find_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Session>> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .values()
            .find(|s| s.token_hash == token_hash && s.expires_at > now)
            .cloned())
    }

    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> RepoResult<()> {
        if let Some(session) = self.state.lock().await.sessions.get_mut(session_id) {
            session.last_active_at = now;
        }
        Ok(())
    }

    async fn list_sessions(&self, user_id: &str, now: DateTime<Utc>) -> RepoResult<Vec<Session>> {
        let state = self.state.lock().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.expires_at > now)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        Ok(sessions)
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> RepoResult<bool> {
        let mut state = self.state.lock().await;
        let owned = state
            .sessions
            .get(session_id)
            .map(|s| s.user_id == user_id)
            .unwrap_or(false);
        if owned {
            state.sessions.remove(session_id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl FileRepository for MemoryStore {
    async fn insert_file(&self, file: FileRecord) -> RepoResult<()> {
        let mut state = self.state.lock().await;
        if state.files.contains_key(&file.id) {
            return Err(RepoError::Duplicate("_id".to_string()));
        }
        state.files.insert(file.id.clone(), file);
        Ok(())
    }

    async fn find_file(&self, file_id: &str) -> RepoResult<Option<FileRecord>> {
        Ok(self.state.lock().await.files.get(file_id).cloned())
    }

    async fn list_files(&self, owner_id: &str) -> RepoResult<Vec<FileRecord>> {
        let state = self.state.lock().await;
        let mut files: Vec<FileRecord> = state
            .files
            .values()
            .filter(|f| f.owner_id == owner_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(files)
    }

    async fn count_files_since(&self, owner_id: &str, since: DateTime<Utc>) -> RepoResult<u64> {
        let state = self.state.lock().await;
        Ok(state
            .files
            .values()
            .filter(|f| f.owner_id == owner_id && f.created_at >= since)
            .count() as u64)
    }

    async fn delete_file(&self, owner_id: &str, file_id: &str) -> RepoResult<bool> {
        let mut state = self.state.lock().await;
        let owned = state
            .files
            .get(file_id)
            .map(|f| f.owner_id == owner_id)
            .unwrap_or(false);
        if owned {
            state.files.remove(file_id);
        }
        Ok(owned)
    }

    async fn try_begin_analysis(
        &self,
        owner_id: &str,
        file_id: &str,
        run_id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> RepoResult<Option<FileRecord>> {
        let mut state = self.state.lock().await;
        let Some(file) = state.files.get_mut(file_id) else {
            return Ok(None);
        };
        if file.owner_id != owner_id || !file.can_begin_analysis(stale_before) {
            return Ok(None);
        }
        file.analysis_status = AnalysisStatus::Processing;
        file.analysis_run_id = Some(run_id.to_string());
        file.analysis_started_at = Some(now);
        file.updated_at = now;
        Ok(Some(file.clone()))
    }

    async fn finish_analysis(
        &self,
        file_id: &str,
        run_id: &str,
        outcome: AnalysisOutcome,
        now: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let mut state = self.state.lock().await;
        let Some(file) = state.files.get_mut(file_id) else {
            return Ok(false);
        };
        if file.analysis_status != AnalysisStatus::Processing
            || file.analysis_run_id.as_deref() != Some(run_id)
        {
            return Ok(false);
        }
        match outcome {
            AnalysisOutcome::Completed(results) => {
                file.analysis_status = AnalysisStatus::Completed;
                file.analysis_results = Some(results);
            }
            AnalysisOutcome::Failed => {
                file.analysis_status = AnalysisStatus::Failed;
                file.analysis_results = None;
            }
        }
        file.updated_at = now;
        Ok(true)
    }
}

#[async_trait]
impl PlanRepository for MemoryStore {
    async fn list_active_plans(&self) -> RepoResult<Vec<Plan>> {
        let state = self.state.lock().await;
        let mut plans: Vec<Plan> = state.plans.values().filter(|p| p.is_active).cloned().collect();
        plans.sort_by_key(|p| p.price_minor);
        Ok(plans)
    }

    async fn find_plan(&self, plan_id: &str) -> RepoResult<Option<Plan>> {
        Ok(self.state.lock().await.plans.get(plan_id).cloned())
    }

    async fn seed_plans(&self, plans: Vec<Plan>) -> RepoResult<usize> {
        let mut state = self.state.lock().await;
        if !state.plans.is_empty() {
            return Ok(0);
        }
        let count = plans.len();
        state
            .plans
            .extend(plans.into_iter().map(|p| (p.id.clone(), p)));
        Ok(count)
    }
}

#[async_trait]
impl InvoiceRepository for MemoryStore {
    async fn next_invoice_sequence(&self) -> RepoResult<i64> {
        let mut state = self.state.lock().await;
        state.invoice_seq += 1;
        Ok(state.invoice_seq)
    }

    async fn activate_plan(&self, invoice: Invoice, activation: PlanActivation) -> RepoResult<()> {
        let mut state = self.state.lock().await;

        if state
            .invoices
            .values()
            .any(|i| i.razorpay_payment_id == invoice.razorpay_payment_id)
        {
            return Err(RepoError::Duplicate("razorpay_payment_id".to_string()));
        }
        if state
            .invoices
            .values()
            .any(|i| i.invoice_number == invoice.invoice_number)
        {
            return Err(RepoError::Duplicate("invoice_number".to_string()));
        }

        let user = state.users.get_mut(&activation.user_id).ok_or_else(|| {
            RepoError::Other(format!(
                "user {} disappeared during plan activation",
                activation.user_id
            ))
        })?;
        user.plan = activation.plan;
        user.plan_expiry = Some(activation.plan_expiry);
        user.subscription_id = Some(activation.subscription_id);
        user.payment_method = Some(activation.payment_method);
        user.invoice_ids.push(invoice.id.clone());
        user.updated_at = Utc::now();

        state.invoices.insert(invoice.id.clone(), invoice);
        Ok(())
    }

    async fn list_invoices(&self, user_id: &str) -> RepoResult<Vec<Invoice>> {
        let state = self.state.lock().await;
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.payment_date.cmp(&a.payment_date));
        Ok(invoices)
    }

    async fn find_invoice(&self, user_id: &str, invoice_id: &str) -> RepoResult<Option<Invoice>> {
        let state = self.state.lock().await;
        Ok(state
            .invoices
            .get(invoice_id)
            .filter(|i| i.user_id == user_id)
            .cloned())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> RepoResult<()> {
        Ok(())
    }
}
