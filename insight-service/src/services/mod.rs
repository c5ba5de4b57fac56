pub mod analysis;
pub mod analytics;
pub mod auth;
pub mod billing;
pub mod files;
pub mod metrics;
pub mod password;
pub mod quota;
pub mod razorpay;
pub mod storage;

pub use analysis::AnalysisService;
pub use analytics::AnalyticsClient;
pub use auth::{AuthContext, AuthService, ClientMeta};
pub use billing::BillingService;
pub use files::{FileService, UploadedFile};
pub use quota::QuotaPolicy;
pub use razorpay::RazorpayClient;
pub use storage::{BlobStore, CloudinaryStorage, LocalStorage};
