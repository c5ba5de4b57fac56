use crate::models::PlanTier;
use crate::repository::RepoError;
use service_core::error::AppError;
use thiserror::Error;

/// Domain failures of the upload, analysis, billing and session flows.
#[derive(Debug, Error)]
pub enum InsightError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("Account locked. Try again in {minutes} minutes")]
    AccountLocked { minutes: i64 },

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Upload limit reached: the {tier} plan allows {limit} files per billing window")]
    QuotaExceeded { limit: u64, tier: PlanTier },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("You are already subscribed to this plan")]
    AlreadySubscribed,

    #[error("Payment already processed")]
    PaymentAlreadyProcessed,

    #[error("Analysis already in progress")]
    AnalysisInProgress,

    #[error("Analysis failed")]
    AnalysisFailed,

    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<RepoError> for InsightError {
    fn from(err: RepoError) -> Self {
        InsightError::Internal(anyhow::Error::new(err))
    }
}

impl From<InsightError> for AppError {
    fn from(err: InsightError) -> Self {
        let message = err.to_string();
        match err {
            InsightError::Unauthenticated | InsightError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!(message))
            }
            InsightError::Forbidden(_)
            | InsightError::QuotaExceeded { .. }
            | InsightError::AccountLocked { .. } => AppError::Forbidden(anyhow::anyhow!(message)),
            InsightError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            InsightError::AlreadySubscribed
            | InsightError::PaymentAlreadyProcessed
            | InsightError::AnalysisInProgress
            | InsightError::Conflict(_) => AppError::Conflict(anyhow::anyhow!(message)),
            InsightError::InvalidSignature | InsightError::BadRequest(_) => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            InsightError::PayloadTooLarge(msg) => AppError::PayloadTooLarge(msg),
            InsightError::Validation(errors) => AppError::ValidationError(errors),
            InsightError::AnalysisFailed => AppError::BadGateway(message),
            InsightError::UpstreamUnavailable(detail) => {
                tracing::error!(detail = %detail, "Upstream call failed");
                AppError::BadGateway("Upstream service unavailable".to_string())
            }
            InsightError::Configuration(detail) => {
                AppError::ConfigError(anyhow::anyhow!(detail))
            }
            InsightError::Internal(e) => AppError::InternalError(e),
        }
    }
}
