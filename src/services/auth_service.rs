use std::collections::HashSet;

use chrono::Utc;
use sea_orm::{DatabaseConnection, TransactionTrait};
use sha2::{Digest, Sha256};

use crate::{
    auth::{
        jwt::{TokenError, TokenIssuer, hash_token},
        password,
        types::{ApprovalStatus, Role, TokenKind, TokenPair, UserSummary},
    },
    db::dao::{ConsentDao, DaoLayerError, NewConsent, NewUser, TermsDao},
    error::AppError,
    services::{
        session_registry::{SessionCheck, SessionRegistry},
        user_service::{UserCandidate, UserService},
    },
};

const LOGIN_FAILED: &str = "Login failed";
const PUBLISHED: &str = "PUBLISHED";

#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub candidate: UserCandidate,
    pub terms_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user: UserSummary,
    pub tokens: TokenPair,
}

enum SignupFailure {
    Violation(String),
    App(AppError),
}

impl From<AppError> for SignupFailure {
    fn from(err: AppError) -> Self {
        SignupFailure::App(err)
    }
}

impl From<DaoLayerError> for SignupFailure {
    fn from(err: DaoLayerError) -> Self {
        match err {
            DaoLayerError::UniqueViolation { constraint } => SignupFailure::Violation(constraint),
            other => SignupFailure::App(other.into()),
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    db: DatabaseConnection,
    users: UserService,
    registry: SessionRegistry,
    terms: TermsDao,
    consents: ConsentDao,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(
        db: DatabaseConnection,
        users: UserService,
        registry: SessionRegistry,
        terms: TermsDao,
        consents: ConsentDao,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            db,
            users,
            registry,
            terms,
            consents,
            tokens,
        }
    }

    /// Creates a pending member and records every consent in one
    /// transaction. Returns the new login id.
    pub async fn signup_and_consent(&self, request: SignupRequest) -> Result<String, AppError> {
        let mut seen = HashSet::new();
        if let Some(dup) = request.terms_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(AppError::validation(format!(
                "termsId {dup} appears more than once"
            )));
        }

        let new_user =
            self.users
                .prepare(request.candidate, Role::User, ApprovalStatus::Pending)?;
        self.users.ensure_available(&new_user).await?;
        self.commit_signup(&new_user, &request.terms_ids).await?;
        Ok(new_user.user_id)
    }

    /// Writes a user that passed the availability check. A unique violation
    /// raised here means another signup won the race; it is reported as a
    /// conflict on the field it hit.
    async fn commit_signup(&self, new_user: &NewUser, terms_ids: &[i64]) -> Result<(), AppError> {
        match self.write_signup(new_user, terms_ids).await {
            Ok(()) => {
                tracing::info!(user_id = %new_user.user_id, consents = terms_ids.len(), "member signed up");
                Ok(())
            }
            Err(SignupFailure::Violation(constraint)) => {
                tracing::debug!(%constraint, "signup lost a uniqueness race");
                Err(self.users.resolve_violation(&constraint, new_user).await)
            }
            Err(SignupFailure::App(err)) => Err(err),
        }
    }

    async fn write_signup(&self, new_user: &NewUser, terms_ids: &[i64]) -> Result<(), SignupFailure> {
        let txn = self.db.begin().await.map_err(DaoLayerError::from_db)?;
        let user = self.users.insert_in(&txn, new_user.clone()).await?;
        let now = Utc::now().fixed_offset();

        for &terms_id in terms_ids {
            let terms = self
                .terms
                .find_by_id_in(&txn, terms_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Terms {terms_id} not found")))?;
            if terms.status != PUBLISHED {
                return Err(AppError::conflict(format!("Terms {terms_id} is not published")).into());
            }
            if terms.effective_at > now {
                return Err(
                    AppError::conflict(format!("Terms {terms_id} is not yet in effect")).into(),
                );
            }

            let snapshot = terms
                .content_html
                .or(terms.content_markdown)
                .unwrap_or_default();
            self.consents
                .insert(
                    &txn,
                    NewConsent {
                        user_id: user.user_id.clone(),
                        terms_id,
                        terms_version: terms.version,
                        content_hash: content_hash(&snapshot),
                        snapshot,
                        agreed_at: now,
                    },
                )
                .await?;
        }

        txn.commit().await.map_err(DaoLayerError::from_db)?;
        Ok(())
    }

    pub async fn login(
        &self,
        user_id: &str,
        raw_password: &str,
        device: &DeviceInfo,
    ) -> Result<LoginResult, AppError> {
        let Some(user) = self.users.find_by_user_id(user_id).await? else {
            password::dummy_verify(raw_password);
            return Err(AppError::unauthorized(LOGIN_FAILED));
        };
        let password_ok = self.users.verify_password(&user, raw_password);
        if !user.enabled || !password_ok {
            tracing::info!(user_id, enabled = user.enabled, "login rejected");
            return Err(AppError::unauthorized(LOGIN_FAILED));
        }

        let access_token = self.tokens.issue_access_token(&user, &device.device_id)?;
        let refresh = self
            .tokens
            .issue_refresh_token(&user.user_id, &device.device_id)?;
        self.registry
            .record(
                &user.user_id,
                &device.device_id,
                device.device_type.as_deref(),
                &refresh.jti,
                &hash_token(&refresh.token),
                refresh.expires_at,
            )
            .await?;
        self.users
            .set_last_login(&user.user_id, Utc::now().fixed_offset())
            .await?;

        tracing::info!(user_id = %user.user_id, device_id = %device.device_id, "login succeeded");
        Ok(LoginResult {
            user: UserSummary::from(&user),
            tokens: TokenPair {
                access_token,
                refresh_token: refresh.token,
            },
        })
    }

    /// Exchanges a live refresh token for a new pair. The presented token is
    /// dead afterwards.
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self
            .tokens
            .verify_refresh(refresh_token)
            .map_err(|err| match err {
                TokenError::Expired => AppError::unauthorized("Refresh token expired"),
                _ => AppError::unauthorized("Invalid refresh token"),
            })?;

        match self
            .registry
            .check(&claims.jti, &hash_token(refresh_token))
            .await?
        {
            SessionCheck::Valid(row) if row.user_id == claims.sub && row.device_id == claims.did => {}
            SessionCheck::ReuseDetected { user_id } => {
                let revoked = self.registry.revoke_all(&user_id).await?;
                tracing::warn!(%user_id, revoked, "refresh token reuse detected; all sessions revoked");
                return Err(AppError::unauthorized("Invalid refresh token"));
            }
            other => {
                tracing::debug!(outcome = ?other, jti = %claims.jti, "refresh rejected");
                return Err(AppError::unauthorized("Invalid refresh token"));
            }
        }

        let user = self
            .users
            .find_by_user_id(&claims.sub)
            .await?
            .filter(|user| user.enabled)
            .ok_or_else(|| AppError::unauthorized("Invalid refresh token"))?;

        let access_token = self.tokens.issue_access_token(&user, &claims.did)?;
        let refresh = self.tokens.issue_refresh_token(&user.user_id, &claims.did)?;
        let swapped = self
            .registry
            .rotate(
                &claims.jti,
                &refresh.jti,
                &hash_token(&refresh.token),
                refresh.expires_at,
            )
            .await?;
        if !swapped {
            tracing::info!(user_id = %user.user_id, jti = %claims.jti, "rotation lost a race");
            return Err(AppError::unauthorized("Refresh token already used"));
        }

        Ok(TokenPair {
            access_token,
            refresh_token: refresh.token,
        })
    }

    /// Revokes the session named by either token. Expired tokens still
    /// identify the session; forged ones do not.
    pub async fn logout(
        &self,
        refresh_token: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<(), AppError> {
        let identity = access_token
            .and_then(|token| self.tokens.decode_identity(token, TokenKind::Access).ok())
            .or_else(|| {
                refresh_token
                    .and_then(|token| self.tokens.decode_identity(token, TokenKind::Refresh).ok())
            })
            .ok_or_else(|| AppError::unauthorized("No session to log out"))?;

        self.registry.revoke(&identity.sub, &identity.did).await?;
        tracing::info!(user_id = %identity.sub, device_id = %identity.did, "logged out");
        Ok(())
    }
}

pub fn content_hash(snapshot: &str) -> String {
    format!("{:x}", Sha256::digest(snapshot.as_bytes()))
}
