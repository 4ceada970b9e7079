use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;

use crate::{
    db::dao::{RefreshTokenDao, Rotation, SessionRecord},
    db::entities::refresh_token,
    error::AppError,
};

/// Outcome of checking a presented refresh token against the stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    Valid(refresh_token::Model),
    Missing,
    Revoked,
    Expired,
    /// The jti is known but the token bytes differ from what was issued.
    ReuseDetected { user_id: String },
}

/// Server-side record of live refresh tokens, one per (user, device).
#[derive(Clone)]
pub struct SessionRegistry {
    dao: RefreshTokenDao,
}

impl SessionRegistry {
    pub fn new(dao: RefreshTokenDao) -> Self {
        Self { dao }
    }

    pub async fn record(
        &self,
        user_id: &str,
        device_id: &str,
        device_type: Option<&str>,
        jti: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.dao
            .upsert_session(
                SessionRecord {
                    user_id: user_id.to_string(),
                    device_id: device_id.to_string(),
                    device_type: device_type.map(str::to_string),
                    jti: jti.to_string(),
                    token_hash: token_hash.to_string(),
                    expires_at: expires_at.fixed_offset(),
                },
                Utc::now().fixed_offset(),
            )
            .await?;
        Ok(())
    }

    pub async fn check(&self, jti: &str, presented_hash: &str) -> Result<SessionCheck, AppError> {
        let Some(row) = self.dao.find_by_jti(jti).await? else {
            return Ok(SessionCheck::Missing);
        };
        if row.revoked_at.is_some() {
            return Ok(SessionCheck::Revoked);
        }
        if row.expires_at <= Utc::now().fixed_offset() {
            return Ok(SessionCheck::Expired);
        }
        let matches: bool = row
            .token_hash
            .as_bytes()
            .ct_eq(presented_hash.as_bytes())
            .into();
        if !matches {
            return Ok(SessionCheck::ReuseDetected {
                user_id: row.user_id,
            });
        }
        Ok(SessionCheck::Valid(row))
    }

    /// Compare-and-swap on `old_jti`. `false` means another rotation or a
    /// revocation got there first.
    pub async fn rotate(
        &self,
        old_jti: &str,
        new_jti: &str,
        new_hash: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        Ok(self
            .dao
            .rotate(
                Rotation {
                    old_jti,
                    new_jti,
                    new_hash,
                    new_expires_at: new_expiry.fixed_offset(),
                },
                Utc::now().fixed_offset(),
            )
            .await?)
    }

    pub async fn revoke(&self, user_id: &str, device_id: &str) -> Result<(), AppError> {
        let revoked = self
            .dao
            .revoke_device(user_id, device_id, Utc::now().fixed_offset())
            .await?;
        tracing::debug!(user_id, device_id, revoked, "revoked device session");
        Ok(())
    }

    pub async fn revoke_all(&self, user_id: &str) -> Result<u64, AppError> {
        Ok(self
            .dao
            .revoke_all_for_user(user_id, Utc::now().fixed_offset())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{SessionCheck, SessionRegistry};
    use crate::{
        auth::{
            jwt::hash_token,
            types::{ApprovalStatus, Role},
        },
        db::dao::{DaoBase, RefreshTokenDao, UserDao},
        services::user_service::{UserCandidate, UserService},
        test_helpers::sqlite_db,
    };

    async fn registry_with_user() -> SessionRegistry {
        let db = sqlite_db().await;
        UserService::new(UserDao::new(&db))
            .create_user(
                UserCandidate {
                    user_id: "abc123".to_string(),
                    name: "Kim".to_string(),
                    phone: "01012345678".to_string(),
                    password: "Secret!12".to_string(),
                    email: None,
                },
                Role::User,
                ApprovalStatus::Pending,
            )
            .await
            .expect("user should be created");
        SessionRegistry::new(RefreshTokenDao::new(&db))
    }

    fn in_days(days: i64) -> chrono::DateTime<Utc> {
        Utc::now() + Duration::days(days)
    }

    #[tokio::test]
    async fn recorded_session_checks_valid() {
        let registry = registry_with_user().await;
        registry
            .record("abc123", "dev-1", Some("web"), "jti-1", &hash_token("t1"), in_days(30))
            .await
            .expect("record should succeed");

        let check = registry
            .check("jti-1", &hash_token("t1"))
            .await
            .expect("check should succeed");
        assert!(matches!(check, SessionCheck::Valid(ref row) if row.device_id == "dev-1"));
        assert_eq!(
            registry
                .check("jti-unknown", &hash_token("t1"))
                .await
                .expect("check should succeed"),
            SessionCheck::Missing
        );
    }

    #[tokio::test]
    async fn hash_mismatch_is_reuse() {
        let registry = registry_with_user().await;
        registry
            .record("abc123", "dev-1", None, "jti-1", &hash_token("t1"), in_days(30))
            .await
            .expect("record should succeed");

        let check = registry
            .check("jti-1", &hash_token("forged"))
            .await
            .expect("check should succeed");
        assert_eq!(
            check,
            SessionCheck::ReuseDetected {
                user_id: "abc123".to_string()
            }
        );
    }

    #[tokio::test]
    async fn expired_rows_are_reported() {
        let registry = registry_with_user().await;
        registry
            .record("abc123", "dev-1", None, "jti-1", &hash_token("t1"), in_days(-1))
            .await
            .expect("record should succeed");

        assert_eq!(
            registry
                .check("jti-1", &hash_token("t1"))
                .await
                .expect("check should succeed"),
            SessionCheck::Expired
        );
    }

    #[tokio::test]
    async fn rotation_invalidates_old_jti_and_only_wins_once() {
        let registry = registry_with_user().await;
        registry
            .record("abc123", "dev-1", None, "jti-1", &hash_token("t1"), in_days(30))
            .await
            .expect("record should succeed");

        let first = registry
            .rotate("jti-1", "jti-2", &hash_token("t2"), in_days(30))
            .await
            .expect("rotate should succeed");
        let replay = registry
            .rotate("jti-1", "jti-3", &hash_token("t3"), in_days(30))
            .await
            .expect("rotate should succeed");

        assert!(first);
        assert!(!replay);
        assert_eq!(
            registry
                .check("jti-1", &hash_token("t1"))
                .await
                .expect("check should succeed"),
            SessionCheck::Missing
        );
        assert!(matches!(
            registry
                .check("jti-2", &hash_token("t2"))
                .await
                .expect("check should succeed"),
            SessionCheck::Valid(_)
        ));
    }

    #[tokio::test]
    async fn revoke_is_idempotent_and_relogin_restores() {
        let registry = registry_with_user().await;
        registry
            .record("abc123", "dev-1", None, "jti-1", &hash_token("t1"), in_days(30))
            .await
            .expect("record should succeed");

        registry
            .revoke("abc123", "dev-1")
            .await
            .expect("revoke should succeed");
        registry
            .revoke("abc123", "dev-1")
            .await
            .expect("second revoke should succeed");
        assert_eq!(
            registry
                .check("jti-1", &hash_token("t1"))
                .await
                .expect("check should succeed"),
            SessionCheck::Revoked
        );

        registry
            .record("abc123", "dev-1", None, "jti-2", &hash_token("t2"), in_days(30))
            .await
            .expect("re-record should succeed");
        assert!(matches!(
            registry
                .check("jti-2", &hash_token("t2"))
                .await
                .expect("check should succeed"),
            SessionCheck::Valid(_)
        ));
    }

    #[tokio::test]
    async fn revoke_all_covers_every_device() {
        let registry = registry_with_user().await;
        for (device, jti) in [("dev-1", "jti-1"), ("dev-2", "jti-2")] {
            registry
                .record("abc123", device, None, jti, &hash_token(jti), in_days(30))
                .await
                .expect("record should succeed");
        }

        let revoked = registry
            .revoke_all("abc123")
            .await
            .expect("revoke all should succeed");
        assert_eq!(revoked, 2);
        assert_eq!(
            registry
                .check("jti-2", &hash_token("jti-2"))
                .await
                .expect("check should succeed"),
            SessionCheck::Revoked
        );
    }
}
