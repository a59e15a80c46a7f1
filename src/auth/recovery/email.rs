//! E-mail recovery: dispatch a single-use code, then trade it for a new
//! password.
//!
//! Dispatches are capped per account per source address over a trailing day.
//! The code is consumed in the same transaction as the password change, so a
//! code can never reset a password twice.

use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::{info, warn, Instrument};

use super::super::hasher::credential_digest;
use super::super::salts::SaltPair;
use super::super::storage::{self, is_unique_violation, query_span};
use super::super::types::RequestMeta;
use super::super::{audit, validate};
use crate::captcha::CaptchaVerifier;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::mail::{self, MailQueue};

const RECOVERY_CODE_LENGTH: usize = 16;
const CODE_INSERT_ATTEMPTS: usize = 5;
const DISPATCH_WINDOW_MINUTES: i64 = 24 * 60;

/// Dispatch a recovery code to the account's stored e-mail address.
///
/// # Errors
/// - `Validation` for a failed captcha or an unknown username
/// - `RateLimited` when the per-day dispatch cap for this address is reached
pub async fn request(
    pool: &PgPool,
    config: &AuthConfig,
    captcha: &dyn CaptchaVerifier,
    mail_queue: &dyn MailQueue,
    meta: &RequestMeta,
    username: &str,
    captcha_response: &str,
) -> Result<(), AuthError> {
    if !captcha.verify(captcha_response) {
        return Err(AuthError::validation("Incorrect captcha code!"));
    }

    let Some(account) = lookup_account(pool, username).await? else {
        return Err(AuthError::validation("User does not exist!"));
    };

    let dispatches = dispatches_within_day(pool, account.user_id, &meta.source_ip).await?;
    if dispatches >= config.max_recovery_emails_per_day() {
        return Err(AuthError::RateLimited {
            retry_minutes: DISPATCH_WINDOW_MINUTES,
        });
    }

    let code = insert_code(pool, account.user_id, &meta.source_ip).await?;
    let message = mail::account_recovery(config, &account.username, &code, meta);
    mail_queue.enqueue(&account.email, &message.subject, &message.body, true);
    info!(user_id = account.user_id, "recovery code dispatched");
    Ok(())
}

/// Whether `code` is outstanding; the routing layer shows the new-password
/// form only when it is.
pub async fn open(pool: &PgPool, code: &str) -> Result<bool, AuthError> {
    let query = "SELECT 1 FROM recovery_email WHERE code = $1";
    let row = sqlx::query(query)
        .bind(code)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup recovery code")
        .map_err(AuthError::Persistence)?;
    Ok(row.is_some())
}

/// Consume `code` and set the new password.
///
/// # Errors
/// `NotFound` when the code is unknown or already consumed; a second submit
/// of the same code fails here rather than changing anything twice.
pub async fn complete(
    pool: &PgPool,
    salts: &SaltPair,
    meta: &RequestMeta,
    code: &str,
    new_password: &str,
) -> Result<(), AuthError> {
    validate::password_length(new_password)?;
    let digest = credential_digest(new_password, salts.salt1(), salts.salt2());

    let mut tx = pool
        .begin()
        .await
        .context("begin recovery transaction")
        .map_err(AuthError::Persistence)?;

    let query = "DELETE FROM recovery_email WHERE code = $1 RETURNING userid";
    let row = sqlx::query(query)
        .bind(code)
        .fetch_optional(&mut *tx)
        .instrument(query_span("DELETE", query))
        .await
        .context("failed to consume recovery code")
        .map_err(AuthError::Persistence)?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Err(AuthError::NotFound);
    };
    let user_id: i64 = row.get("userid");

    storage::update_password_digest(&mut *tx, user_id, &digest).await?;
    audit::append(
        &mut *tx,
        user_id,
        audit::AuditEvent::AccountRecoveredEmail,
        Some(&meta.audit_context()),
    )
    .await?;

    tx.commit()
        .await
        .context("commit recovery transaction")
        .map_err(AuthError::Persistence)?;
    info!(user_id, "password reset via recovery code");
    Ok(())
}

struct RecoveryAccount {
    user_id: i64,
    username: String,
    email: String,
}

async fn lookup_account(pool: &PgPool, username: &str) -> Result<Option<RecoveryAccount>, AuthError> {
    let query = "SELECT userid, username, email FROM users WHERE username ILIKE $1";
    let pattern = username.replace(['%', '_'], "");
    let row = sqlx::query(query)
        .bind(&pattern)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup recovery account")
        .map_err(AuthError::Persistence)?;
    Ok(row.map(|row| RecoveryAccount {
        user_id: row.get("userid"),
        username: row.get("username"),
        email: row.get("email"),
    }))
}

async fn dispatches_within_day(
    pool: &PgPool,
    user_id: i64,
    source_ip: &str,
) -> Result<i64, AuthError> {
    let query = r"
        SELECT COUNT(*) AS dispatches
        FROM recovery_email
        WHERE userid = $1 AND ip = $2 AND dispatched_at >= NOW() - INTERVAL '1 day'
    ";
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(source_ip)
        .fetch_one(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to count recovery dispatches")
        .map_err(AuthError::Persistence)?;
    Ok(row.get("dispatches"))
}

/// Insert a fresh random code, retrying on the rare collision with an
/// outstanding one. Fails closed if every attempt collides.
async fn insert_code(pool: &PgPool, user_id: i64, source_ip: &str) -> Result<String, AuthError> {
    let query = r"
        INSERT INTO recovery_email (userid, code, dispatched_at, ip)
        VALUES ($1, $2, NOW(), $3)
    ";
    for _ in 0..CODE_INSERT_ATTEMPTS {
        let code = super::super::utils::random_text(RECOVERY_CODE_LENGTH);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(&code)
            .bind(source_ip)
            .execute(pool)
            .instrument(query_span("INSERT", query))
            .await;
        match result {
            Ok(_) => return Ok(code),
            Err(err) if is_unique_violation(&err) => {
                warn!(user_id, "recovery code collision, regenerating");
            }
            Err(err) => {
                return Err(AuthError::Persistence(
                    anyhow::Error::new(err).context("failed to insert recovery code"),
                ));
            }
        }
    }
    Err(AuthError::Persistence(anyhow::anyhow!(
        "unable to generate a unique recovery code"
    )))
}
