use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use super::types::{AccessClaims, RefreshClaims, Role, SessionIdentity, TokenKind};
use crate::{config::AuthConfig, db::entities::user, error::AppError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AppError::unauthorized("Token expired"),
            TokenError::Invalid => AppError::unauthorized("Invalid token"),
            TokenError::Encoding(message) => {
                tracing::error!(error = %message, "token encoding failed");
                AppError::internal("Token issuance failed")
            }
        }
    }
}

#[derive(Clone)]
pub struct JwtKeys {
    enc: EncodingKey,
    dec: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            enc: EncodingKey::from_secret(secret),
            dec: DecodingKey::from_secret(secret),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedRefresh {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

trait Typed {
    fn kind(&self) -> TokenKind;
}

impl Typed for AccessClaims {
    fn kind(&self) -> TokenKind {
        self.typ
    }
}

impl Typed for RefreshClaims {
    fn kind(&self) -> TokenKind {
        self.typ
    }
}

impl Typed for SessionIdentity {
    fn kind(&self) -> TokenKind {
        self.typ
    }
}

/// Signs and verifies both token kinds. Access and refresh tokens use
/// separate secrets, so one can never pass as the other.
#[derive(Clone)]
pub struct TokenIssuer {
    access: JwtKeys,
    refresh: JwtKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(cfg: &AuthConfig) -> Self {
        Self::from_secrets(
            cfg.access_secret.as_bytes(),
            cfg.refresh_secret.as_bytes(),
            cfg.access_ttl_secs,
            cfg.refresh_ttl_secs(),
        )
    }

    pub fn from_secrets(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl_secs: u64,
        refresh_ttl_secs: u64,
    ) -> Self {
        Self {
            access: JwtKeys::from_secret(access_secret),
            refresh: JwtKeys::from_secret(refresh_secret),
            access_ttl: seconds(access_ttl_secs),
            refresh_ttl: seconds(refresh_ttl_secs),
        }
    }

    pub fn issue_access_token(
        &self,
        user: &user::Model,
        device_id: &str,
    ) -> Result<String, TokenError> {
        let role = Role::try_from(user.role.as_str()).unwrap_or_else(|_| {
            tracing::warn!(user_id = %user.user_id, role = %user.role, "unknown role; issuing as user");
            Role::User
        });
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user.user_id.clone(),
            name: user.name.clone(),
            role,
            did: device_id.to_string(),
            typ: TokenKind::Access,
            iat: unix(now),
            exp: unix(now + self.access_ttl),
        };
        sign(&self.access, &claims)
    }

    pub fn issue_refresh_token(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<IssuedRefresh, TokenError> {
        let now = Utc::now();
        let expires_at = now + self.refresh_ttl;
        let jti = Uuid::new_v4().to_string();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            did: device_id.to_string(),
            jti: jti.clone(),
            typ: TokenKind::Refresh,
            iat: unix(now),
            exp: unix(expires_at),
        };
        let token = sign(&self.refresh, &claims)?;
        Ok(IssuedRefresh {
            token,
            jti,
            expires_at,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        verify(&self.access, token, TokenKind::Access, true)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        verify(&self.refresh, token, TokenKind::Refresh, true)
    }

    /// Signature-checked decode that ignores expiry. Only for cleanup paths
    /// such as logout, never for authorization.
    pub fn decode_identity(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<SessionIdentity, TokenError> {
        let keys = match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        };
        verify(keys, token, kind, false)
    }
}

/// SHA-256 hex digest. Raw refresh tokens are never stored.
pub fn hash_token(raw: &str) -> String {
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

fn unix(at: DateTime<Utc>) -> usize {
    at.timestamp().max(0) as usize
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1_000))
}

fn sign<T: Serialize>(keys: &JwtKeys, claims: &T) -> Result<String, TokenError> {
    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some("JWT".into());

    encode(&header, claims, &keys.enc).map_err(|err| TokenError::Encoding(err.to_string()))
}

fn verify<T: DeserializeOwned + Typed>(
    keys: &JwtKeys,
    token: &str,
    expected: TokenKind,
    check_expiry: bool,
) -> Result<T, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = check_expiry;
    if !check_expiry {
        validation.required_spec_claims.remove("exp");
    }

    let data = decode::<T>(token, &keys.dec, &validation).map_err(|err| match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    })?;

    if data.claims.kind() != expected {
        return Err(TokenError::Invalid);
    }
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{JwtKeys, TokenError, TokenIssuer, hash_token, sign, unix};
    use crate::auth::types::{AccessClaims, Role, TokenKind};
    use crate::db::entities::user;

    fn issuer() -> TokenIssuer {
        TokenIssuer::from_secrets(
            b"access-secret-access-secret-0001",
            b"refresh-secret-refresh-secret-01",
            900,
            30 * 24 * 60 * 60,
        )
    }

    fn member() -> user::Model {
        let now = Utc::now().fixed_offset();
        user::Model {
            user_id: "abc123".to_string(),
            name: "Kim".to_string(),
            phone: "01012345678".to_string(),
            email: None,
            password_hash: "hash".to_string(),
            role: "user".to_string(),
            approval_status: "pending".to_string(),
            enabled: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn access_token_carries_identity_claims() {
        let issuer = issuer();
        let token = issuer
            .issue_access_token(&member(), "dev-1")
            .expect("token should encode");

        let claims = issuer.verify_access(&token).expect("token should verify");
        assert_eq!(claims.sub, "abc123");
        assert_eq!(claims.name, "Kim");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.did, "dev-1");
        assert_eq!(claims.typ, TokenKind::Access);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn refresh_tokens_get_unique_jti() {
        let issuer = issuer();
        let first = issuer
            .issue_refresh_token("abc123", "dev-1")
            .expect("token should encode");
        let second = issuer
            .issue_refresh_token("abc123", "dev-1")
            .expect("token should encode");

        assert_ne!(first.jti, second.jti);
        let claims = issuer
            .verify_refresh(&first.token)
            .expect("token should verify");
        assert_eq!(claims.jti, first.jti);
        assert_eq!(claims.did, "dev-1");
    }

    #[test]
    fn tokens_do_not_cross_kinds() {
        let issuer = issuer();
        let access = issuer
            .issue_access_token(&member(), "dev-1")
            .expect("token should encode");
        let refresh = issuer
            .issue_refresh_token("abc123", "dev-1")
            .expect("token should encode");

        assert_eq!(issuer.verify_refresh(&access), Err(TokenError::Invalid));
        assert_eq!(
            issuer.verify_access(&refresh.token).map(|_| ()),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn expired_and_garbage_tokens_are_distinguished() {
        let keys = JwtKeys::from_secret(b"access-secret-access-secret-0001");
        let past = Utc::now() - Duration::minutes(5);
        let expired = sign(
            &keys,
            &AccessClaims {
                sub: "abc123".to_string(),
                name: "Kim".to_string(),
                role: Role::User,
                did: "dev-1".to_string(),
                typ: TokenKind::Access,
                iat: unix(past - Duration::minutes(15)),
                exp: unix(past),
            },
        )
        .expect("token should encode");

        let issuer = issuer();
        assert_eq!(issuer.verify_access(&expired), Err(TokenError::Expired));
        assert_eq!(issuer.verify_access("not-a-token"), Err(TokenError::Invalid));

        let identity = issuer
            .decode_identity(&expired, TokenKind::Access)
            .expect("identity should decode without expiry");
        assert_eq!(identity.sub, "abc123");
        assert_eq!(identity.did, "dev-1");
    }

    #[test]
    fn decode_identity_still_checks_signature() {
        let other = TokenIssuer::from_secrets(
            b"another-access-secret-0000000001",
            b"another-refresh-secret-000000001",
            900,
            60,
        );
        let token = other
            .issue_access_token(&member(), "dev-1")
            .expect("token should encode");

        assert_eq!(
            issuer().decode_identity(&token, TokenKind::Access),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn hash_token_is_stable_hex() {
        let digest = hash_token("refresh-token");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_token("refresh-token"));
        assert_ne!(digest, hash_token("refresh-token2"));
    }
}
