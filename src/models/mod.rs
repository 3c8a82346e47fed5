//! RustCampaign Models

pub mod campaign;
pub mod contact;
pub mod email;
pub mod event;

pub use campaign::*;
pub use contact::*;
pub use email::*;
pub use event::*;
