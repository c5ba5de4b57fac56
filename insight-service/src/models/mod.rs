pub mod datetime;
pub mod file;
pub mod invoice;
pub mod plan;
pub mod session;
pub mod user;

pub use file::{AnalysisResults, AnalysisStatus, FileRecord};
pub use invoice::{format_invoice_number, Invoice, InvoiceItem, InvoiceStatus};
pub use plan::{Plan, PlanTier};
pub use session::Session;
pub use user::{LoginRecord, PlanActivation, User};
