//! RustCampaign Handlers
//!
//! Transport-agnostic adapters: typed requests in, DTOs or `ApiError` out.

pub mod analytics;
pub mod campaign;
pub mod contact;
pub mod error;

pub use analytics::AnalyticsHandler;
pub use campaign::CampaignHandler;
pub use contact::ContactHandler;
pub use error::ApiError;
