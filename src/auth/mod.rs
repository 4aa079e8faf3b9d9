//! Authentication module.
//!
//! Credential issuance lives outside this system; the gate only validates
//! already-signed tokens and answers room admission.

mod claims;
mod gate;

pub use claims::Claims;
pub use gate::{AdmissionError, Identity, IdentityGate, ResolvedIdentity};
