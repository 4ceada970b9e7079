use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use subtle::ConstantTimeEq;

use crate::{
    auth::{credentials::normalize_email, jwt::hash_token},
    db::dao::EmailVerificationDao,
    error::AppError,
    services::mailer::{MailMessage, Mailer},
};

pub const CODE_TTL_SECS: i64 = 5 * 60;
pub const MAX_TRIES: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedCode {
    pub email: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct EmailVerificationService {
    dao: EmailVerificationDao,
    mailer: Arc<dyn Mailer>,
}

impl EmailVerificationService {
    pub fn new(dao: EmailVerificationDao, mailer: Arc<dyn Mailer>) -> Self {
        Self { dao, mailer }
    }

    /// Issues a fresh six-digit code, replacing any earlier one for the same
    /// address.
    pub async fn request_code(&self, email: &str) -> Result<RequestedCode, AppError> {
        let email = required_email(email)?;
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let now = Utc::now();

        self.dao
            .upsert_code(
                &email,
                &hash_token(&code),
                (now + Duration::seconds(CODE_TTL_SECS)).fixed_offset(),
                now.fixed_offset(),
            )
            .await?;

        let message = MailMessage {
            to: email.clone(),
            subject: "Email verification code".to_string(),
            body: format!(
                "Your verification code is {code}. It expires in {} minutes.",
                CODE_TTL_SECS / 60
            ),
        };
        if let Err(err) = self.mailer.send(message).await {
            tracing::warn!(error = %err, email = %email, "verification mail not sent");
        }

        Ok(RequestedCode {
            email,
            expires_in: CODE_TTL_SECS,
        })
    }

    pub async fn verify_code(&self, email: &str, code: &str) -> Result<(), AppError> {
        let email = required_email(email)?;
        let row = self
            .dao
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::not_found("No verification code was requested"))?;

        if row.verified_at.is_some() {
            return Ok(());
        }
        if row.try_count >= MAX_TRIES {
            return Err(too_many_attempts());
        }
        if row.expires_at <= Utc::now().fixed_offset() {
            return Err(AppError::validation("Verification code expired"));
        }
        if !self.dao.reserve_attempt(row.id, MAX_TRIES).await? {
            return Err(too_many_attempts());
        }

        let matches: bool = row
            .code_hash
            .as_bytes()
            .ct_eq(hash_token(code.trim()).as_bytes())
            .into();
        if !matches {
            let exhausted = self
                .dao
                .find_by_email(&email)
                .await?
                .is_none_or(|current| current.try_count >= MAX_TRIES);
            if exhausted {
                return Err(too_many_attempts());
            }
            return Err(AppError::validation("Verification code does not match"));
        }

        self.dao
            .mark_verified(row.id, Utc::now().fixed_offset())
            .await?;
        Ok(())
    }
}

fn too_many_attempts() -> AppError {
    AppError::too_many_requests("Too many attempts; request a new code")
}

fn required_email(email: &str) -> Result<String, AppError> {
    normalize_email(Some(email))?.ok_or_else(|| AppError::validation("email is required"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::future::join_all;

    use super::{EmailVerificationService, MAX_TRIES};
    use crate::{
        db::dao::{DaoBase, EmailVerificationDao},
        error::AppError,
        test_helpers::{RecordingMailer, sqlite_db},
    };

    fn code_from(body: &str) -> String {
        body.chars().filter(|c| c.is_ascii_digit()).take(6).collect()
    }

    #[tokio::test]
    async fn code_round_trip_verifies() {
        let db = sqlite_db().await;
        let mailer = Arc::new(RecordingMailer::default());
        let service = EmailVerificationService::new(EmailVerificationDao::new(&db), mailer.clone());

        let requested = service
            .request_code("Grace@Church.org")
            .await
            .expect("code should be issued");
        assert_eq!(requested.email, "grace@church.org");
        assert_eq!(requested.expires_in, 300);

        let sent = mailer.last().expect("mail should be sent");
        assert_eq!(sent.to, "grace@church.org");
        let code = code_from(&sent.body);
        assert_eq!(code.len(), 6);

        service
            .verify_code("grace@church.org", &code)
            .await
            .expect("code should verify");
    }

    #[tokio::test]
    async fn repeated_failures_lock_until_new_request() {
        let db = sqlite_db().await;
        let mailer = Arc::new(RecordingMailer::default());
        let service = EmailVerificationService::new(EmailVerificationDao::new(&db), mailer.clone());
        service
            .request_code("grace@church.org")
            .await
            .expect("code should be issued");
        let code = code_from(&mailer.last().expect("mail should be sent").body);
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for attempt in 1..MAX_TRIES {
            let err = service
                .verify_code("grace@church.org", wrong)
                .await
                .expect_err("wrong code should fail");
            assert!(matches!(err, AppError::Validation(_)), "attempt {attempt}");
        }
        let err = service
            .verify_code("grace@church.org", wrong)
            .await
            .expect_err("fifth failure should lock");
        assert!(matches!(err, AppError::TooManyRequests(_)));

        let err = service
            .verify_code("grace@church.org", &code)
            .await
            .expect_err("locked row rejects even the right code");
        assert!(matches!(err, AppError::TooManyRequests(_)));

        service
            .request_code("grace@church.org")
            .await
            .expect("new code should be issued");
        let fresh = code_from(&mailer.last().expect("mail should be sent").body);
        service
            .verify_code("grace@church.org", &fresh)
            .await
            .expect("new code should verify");
    }

    #[tokio::test]
    async fn concurrent_guesses_cannot_exceed_the_attempt_cap() {
        let db = sqlite_db().await;
        let mailer = Arc::new(RecordingMailer::default());
        let dao = EmailVerificationDao::new(&db);
        let service = EmailVerificationService::new(dao.clone(), mailer.clone());
        service
            .request_code("grace@church.org")
            .await
            .expect("code should be issued");
        let code = code_from(&mailer.last().expect("mail should be sent").body);
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let results =
            join_all((0..50).map(|_| service.verify_code("grace@church.org", wrong))).await;

        let mismatches = results
            .iter()
            .filter(|result| matches!(result, Err(AppError::Validation(_))))
            .count();
        let locked = results
            .iter()
            .filter(|result| matches!(result, Err(AppError::TooManyRequests(_))))
            .count();
        assert!(mismatches < MAX_TRIES as usize);
        assert_eq!(mismatches + locked, 50);

        let row = dao
            .find_by_email("grace@church.org")
            .await
            .expect("lookup should succeed")
            .expect("row should exist");
        assert_eq!(row.try_count, MAX_TRIES);

        let err = service
            .verify_code("grace@church.org", &code)
            .await
            .expect_err("exhausted row rejects the right code");
        assert!(matches!(err, AppError::TooManyRequests(_)));
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let db = sqlite_db().await;
        let service = EmailVerificationService::new(
            EmailVerificationDao::new(&db),
            Arc::new(RecordingMailer::default()),
        );

        let err = service
            .verify_code("nobody@church.org", "123456")
            .await
            .expect_err("unknown email should fail");
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
