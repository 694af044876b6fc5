//! Shared value types for the customer registration service.
//!
//! Everything here is request-scoped: created when a registration arrives and
//! dropped once the response is written.

pub mod cookies;
pub mod request;
pub mod types;

pub use cookies::{CookieBundle, PLACEHOLDER};
pub use request::RegistrationRequest;
pub use types::RequestId;
