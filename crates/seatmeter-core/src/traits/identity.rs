//! Identity resolver trait.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::identity::Identity;

/// Verifies a connection credential and returns who presented it.
///
/// Token issuance is outside this system; implementations only verify.
#[async_trait]
pub trait IdentityResolver: Send + Sync + 'static {
    /// Verify `credential`.
    ///
    /// Returns an `Authentication` error for a missing, malformed, expired,
    /// or otherwise invalid credential.
    async fn verify(&self, credential: &str) -> AppResult<Identity>;
}
