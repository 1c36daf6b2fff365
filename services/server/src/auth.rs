use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct TokenClaims {
    pub user_id: Uuid,
}

/// Verify a bearer token against the `api_tokens` table.
///
/// Tokens are stored as SHA-256 digests; issuance happens out-of-band.
/// Returns `None` for unknown, revoked, or unreadable tokens.
pub async fn validate_token(pool: &PgPool, raw_token: &str) -> Option<TokenClaims> {
    let hash = Sha256::digest(raw_token.as_bytes());
    let row = sqlx::query(
        "SELECT user_id FROM api_tokens WHERE token_hash = $1 AND revoked_at IS NULL",
    )
    .bind(hash.as_slice())
    .fetch_optional(pool)
    .await
    .ok()??;
    let user_id: Uuid = row.try_get("user_id").ok()?;
    Some(TokenClaims { user_id })
}

pub fn extract_bearer(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_handles_missing_scheme_and_valid_header() {
        assert_eq!(extract_bearer("Basic abc123"), None);
        assert_eq!(extract_bearer("token-123"), None);
        assert_eq!(extract_bearer("Bearer token-123"), Some("token-123"));
    }
}
