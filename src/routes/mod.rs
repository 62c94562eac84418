mod admin;
mod client_context;
mod consent;
mod error;
mod gdpr;
mod health_check;
mod subscriptions;

pub use admin::*;
pub use client_context::*;
pub use consent::*;
pub use error::*;
pub use gdpr::*;
pub use health_check::*;
pub use subscriptions::*;
