//! Identity gate: credential resolution and room admission.
//!
//! The relay core never issues credentials; it consumes an
//! already-signed token and a participant check answered by the durable
//! store. A connection that fails admission is refused before any session
//! state exists.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use log::debug;
use std::time::Duration;
use thiserror::Error;

use super::claims::Claims;
use crate::store::DurableLog;

/// Why a connection was refused. The server never retries admission; the
/// client must re-authenticate and reconnect.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("connection is not authenticated")]
    Unauthenticated,

    #[error("credential is invalid")]
    CredentialInvalid,

    #[error("identity is not a participant of the room")]
    NotAParticipant,

    #[error("admission timed out")]
    Timeout,

    #[error("admission check unavailable: {0}")]
    Unavailable(String),
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Opaque id, stable across connections.
    pub id: String,
    /// Display name shown to room members.
    pub name: String,
}

/// Result of resolving a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedIdentity {
    Known(Identity),
    Anonymous,
}

/// Validates credentials and room membership before a session is admitted.
pub struct IdentityGate {
    decoding_key: DecodingKey,
    validation: Validation,
    admit_timeout: Duration,
}

impl IdentityGate {
    pub fn new(secret: &str, admit_timeout: Duration) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            admit_timeout,
        }
    }

    /// Resolve a credential to an identity. Absent, expired or malformed
    /// tokens all resolve to Anonymous.
    pub fn resolve_identity(&self, token: Option<&str>) -> ResolvedIdentity {
        let Some(token) = token else {
            return ResolvedIdentity::Anonymous;
        };

        match jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => ResolvedIdentity::Known(Identity {
                name: data.claims.display_name().to_string(),
                id: data.claims.sub,
            }),
            Err(err) => {
                debug!("rejecting credential: {err}");
                ResolvedIdentity::Anonymous
            }
        }
    }

    /// Admit a caller to a room, within the configured timeout.
    pub async fn admit(
        &self,
        log: &dyn DurableLog,
        room: &str,
        token: Option<&str>,
    ) -> Result<Identity, AdmissionError> {
        let identity = match self.resolve_identity(token) {
            ResolvedIdentity::Known(identity) => identity,
            ResolvedIdentity::Anonymous if token.is_none() => {
                return Err(AdmissionError::Unauthenticated);
            }
            ResolvedIdentity::Anonymous => return Err(AdmissionError::CredentialInvalid),
        };

        let check = tokio::time::timeout(self.admit_timeout, log.is_participant(room, &identity.id))
            .await
            .map_err(|_| AdmissionError::Timeout)?;

        match check {
            Ok(true) => Ok(identity),
            Ok(false) => Err(AdmissionError::NotAParticipant),
            Err(err) => Err(AdmissionError::Unavailable(err.to_string())),
        }
    }
}
