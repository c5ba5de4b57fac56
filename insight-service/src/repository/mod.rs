//! Persistence seams. `MongoStore` is the production backend; `MemoryStore`
//! keeps the same guarantees in-process for tests and local runs.

pub mod memory;
pub mod mongo;

use crate::models::{
    AnalysisResults, FileRecord, Invoice, LoginRecord, Plan, PlanActivation, Session, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Most recent login-history entries kept per user.
pub const LOGIN_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum RepoError {
    /// A unique constraint rejected the write; carries the offending key.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] mongodb::bson::ser::Error),

    #[error("{0}")]
    Other(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Unique identity fields of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Username,
    Email,
    Phone,
}

impl IdentityField {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityField::Username => "username",
            IdentityField::Email => "email",
            IdentityField::Phone => "phone",
        }
    }
}

/// How an analysis run ended.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    Completed(AnalysisResults),
    Failed,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, user: User) -> RepoResult<()>;
    async fn find_user(&self, id: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn identity_in_use(&self, field: IdentityField, value: &str) -> RepoResult<bool>;

    /// Counts a failed login; once `max_attempts` is reached the account is
    /// locked until `lock_until` and the counter resets.
    async fn record_login_failure(
        &self,
        user_id: &str,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) -> RepoResult<()>;

    /// Clears failures and lock, stamps `last_login` and appends to the
    /// bounded login history.
    async fn record_login_success(&self, user_id: &str, entry: LoginRecord) -> RepoResult<()>;

    /// Resets entitlements to the free tier. Returns `false` when the user
    /// has no active subscription.
    async fn cancel_subscription(&self, user_id: &str) -> RepoResult<bool>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert_session(&self, session: Session) -> RepoResult<()>;
    /// Live session for a token digest, if any.
    async fn find_session(&self, token_hash: &str, now: DateTime<Utc>)
        -> RepoResult<Option<Session>>;
    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> RepoResult<()>;
    async fn list_sessions(&self, user_id: &str, now: DateTime<Utc>) -> RepoResult<Vec<Session>>;
    /// Deletes a session owned by `user_id`; `false` when nothing matched.
    async fn delete_session(&self, user_id: &str, session_id: &str) -> RepoResult<bool>;
}

#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn insert_file(&self, file: FileRecord) -> RepoResult<()>;
    async fn find_file(&self, file_id: &str) -> RepoResult<Option<FileRecord>>;
    /// Owner's files, newest first.
    async fn list_files(&self, owner_id: &str) -> RepoResult<Vec<FileRecord>>;
    async fn count_files_since(&self, owner_id: &str, since: DateTime<Utc>) -> RepoResult<u64>;
    async fn delete_file(&self, owner_id: &str, file_id: &str) -> RepoResult<bool>;

    /// Atomically moves the file to `processing` under `run_id`, unless a
    /// run started at or after `stale_before` still holds it.
    async fn try_begin_analysis(
        &self,
        owner_id: &str,
        file_id: &str,
        run_id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> RepoResult<Option<FileRecord>>;

    /// Settles the run. Ignored (returns `false`) if `run_id` no longer owns
    /// the file.
    async fn finish_analysis(
        &self,
        file_id: &str,
        run_id: &str,
        outcome: AnalysisOutcome,
        now: DateTime<Utc>,
    ) -> RepoResult<bool>;
}

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn list_active_plans(&self) -> RepoResult<Vec<Plan>>;
    async fn find_plan(&self, plan_id: &str) -> RepoResult<Option<Plan>>;
    /// Inserts `plans` only when the catalog is empty. Returns how many
    /// were written.
    async fn seed_plans(&self, plans: Vec<Plan>) -> RepoResult<usize>;
}

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Next value of the monotonically increasing invoice counter.
    async fn next_invoice_sequence(&self) -> RepoResult<i64>;

    /// Writes the invoice and applies the entitlement change as one unit.
    /// A second invoice for the same gateway payment id is a `Duplicate`.
    async fn activate_plan(&self, invoice: Invoice, activation: PlanActivation) -> RepoResult<()>;

    /// Owner's invoices, most recent payment first.
    async fn list_invoices(&self, user_id: &str) -> RepoResult<Vec<Invoice>>;
    async fn find_invoice(&self, user_id: &str, invoice_id: &str) -> RepoResult<Option<Invoice>>;
}

#[async_trait]
pub trait Store:
    UserRepository + SessionRepository + FileRepository + PlanRepository + InvoiceRepository
{
    async fn health_check(&self) -> RepoResult<()>;
}
