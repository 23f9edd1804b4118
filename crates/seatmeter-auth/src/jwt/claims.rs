//! JWT claims carried by connection tokens.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use seatmeter_core::types::{Identity, UserId};

/// Claims payload of a connection token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject, the user ID.
    pub sub: Uuid,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Contact email.
    #[serde(default)]
    pub email: String,
    /// Role name; compared against `auth.admin_role`.
    #[serde(default)]
    pub role: String,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
}

impl Claims {
    /// Returns the user ID from the subject claim.
    pub fn user_id(&self) -> UserId {
        UserId::from_uuid(self.sub)
    }

    /// Convert into the identity handed to admission.
    pub fn into_identity(self, admin_role: &str) -> Identity {
        Identity {
            user_id: self.user_id(),
            is_admin: self.role == admin_role,
            name: self.name,
            email: self.email,
        }
    }
}
