//! JWT claims carried by connection credentials.

use serde::{Deserialize, Serialize};

/// Claims the identity gate understands.
///
/// Only `sub` and `exp` are required; the display-name claims are
/// best-effort and fall back to the subject id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,

    /// Expiration time (as Unix timestamp).
    pub exp: i64,

    /// Issued at (as Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,

    /// User's name.
    #[serde(default)]
    pub name: Option<String>,

    /// User's preferred username.
    #[serde(default)]
    pub preferred_username: Option<String>,

    /// User's email.
    #[serde(default)]
    pub email: Option<String>,
}

impl Claims {
    /// Get the display name for the user.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.preferred_username.as_deref())
            .or(self.email.as_deref())
            .unwrap_or(&self.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> Claims {
        Claims {
            sub: "user123".to_string(),
            exp: 0,
            iat: None,
            name: Some("John Doe".to_string()),
            preferred_username: Some("johnd".to_string()),
            email: Some("user@example.com".to_string()),
        }
    }

    #[test]
    fn test_display_name_fallback_chain() {
        assert_eq!(claims().display_name(), "John Doe");

        let no_name = Claims {
            name: None,
            ..claims()
        };
        assert_eq!(no_name.display_name(), "johnd");

        let only_email = Claims {
            name: None,
            preferred_username: None,
            ..claims()
        };
        assert_eq!(only_email.display_name(), "user@example.com");

        let only_sub = Claims {
            name: None,
            preferred_username: None,
            email: None,
            ..claims()
        };
        assert_eq!(only_sub.display_name(), "user123");
    }
}
