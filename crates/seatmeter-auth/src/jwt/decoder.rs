//! JWT token validation.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::debug;

use seatmeter_core::config::AuthConfig;
use seatmeter_core::error::AppError;
use seatmeter_core::result::AppResult;
use seatmeter_core::traits::IdentityResolver;
use seatmeter_core::types::Identity;

use super::claims::Claims;

/// Validates HS256 connection tokens.
#[derive(Clone)]
pub struct JwtDecoder {
    /// HMAC secret key for verification.
    decoding_key: DecodingKey,
    /// Validation configuration.
    validation: Validation,
    /// Role value that marks an administrator.
    admin_role: String,
}

impl std::fmt::Debug for JwtDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtDecoder")
            .field("validation", &self.validation)
            .field("admin_role", &self.admin_role)
            .finish()
    }
}

impl JwtDecoder {
    /// Creates a new decoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.leeway_seconds;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            admin_role: config.admin_role.clone(),
        }
    }

    /// Decodes and validates a token string.
    pub fn decode_claims(&self, token: &str) -> AppResult<Claims> {
        if token.trim().is_empty() {
            return Err(AppError::authentication("Missing credential"));
        }

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        AppError::authentication("Token has expired")
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidToken => {
                        AppError::authentication("Invalid token format")
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        AppError::authentication("Invalid token signature")
                    }
                    _ => AppError::authentication(format!("Token validation failed: {e}")),
                }
            })?;

        Ok(token_data.claims)
    }
}

#[async_trait]
impl IdentityResolver for JwtDecoder {
    async fn verify(&self, credential: &str) -> AppResult<Identity> {
        let claims = self.decode_claims(credential)?;
        debug!(user_id = %claims.sub, role = %claims.role, "Credential verified");
        Ok(claims.into_identity(&self.admin_role))
    }
}
