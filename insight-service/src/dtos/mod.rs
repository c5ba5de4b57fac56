pub mod auth;
pub mod billing;
pub mod files;

pub use auth::{
    AvailabilityQuery, AvailabilityResponse, LoginRequest, MessageResponse, ProfileResponse,
    RegisterRequest, RegisterResponse, SessionResponse,
};
pub use billing::{
    CreateOrderRequest, CreateOrderResponse, InvoiceResponse, MyPlanResponse, PlanResponse,
    VerifyPaymentRequest, VerifyPaymentResponse,
};
pub use files::{AnalysisResponse, FileResponse};
