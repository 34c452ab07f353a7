pub mod authorities;
pub mod policy;
pub mod verifier;

pub use authorities::extract_authorities;
pub use policy::{Access, Caller, Decision, DenyReason, RoutePolicy};
pub use verifier::TokenVerifier;
