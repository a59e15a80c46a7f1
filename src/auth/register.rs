//! Registration flow with the optional activation-key gate.
//!
//! Whether activation is required is a property of the configured default
//! group: when its login capability is off, new accounts receive an
//! activation key and an e-mail carrying both the activate and the delete
//! link. Activation moves the user into the normal group; deactivation
//! deletes the account outright. Both require an explicit confirmation step
//! and silently do nothing for unknown keys.

use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::{info, Instrument};

use super::hasher::credential_digest;
use super::salts::SaltPair;
use super::storage::{conflict_field, query_span};
use super::types::RequestMeta;
use super::utils::random_text;
use super::{audit, validate};
use crate::captcha::CaptchaVerifier;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::mail::{self, MailQueue};

const ACTIVATION_KEY_LENGTH: usize = 16;

#[derive(Clone, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub secret_question: String,
    pub secret_answer: String,
    pub captcha_response: String,
}

#[derive(Clone, Debug)]
pub struct RegisterOutcome {
    pub user_id: i64,
    /// When set, the account cannot login until its activation key is
    /// consumed; the activation e-mail has been enqueued.
    pub activation_required: bool,
}

/// Pending activation details shown on the confirm form.
#[derive(Clone, Debug)]
pub struct PendingActivation {
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActivationOutcome {
    Activated,
    Deactivated,
    /// Unknown or stale key; deliberately indistinguishable from "done".
    NothingToDo,
}

/// Register a new account under the configured default group.
///
/// # Errors
/// `Validation` in the documented field order, `Conflict` naming the
/// colliding field for username/e-mail uniqueness violations.
pub async fn register(
    pool: &PgPool,
    config: &AuthConfig,
    salts: &SaltPair,
    captcha: &dyn CaptchaVerifier,
    mail_queue: &dyn MailQueue,
    meta: &RequestMeta,
    request: RegisterRequest,
) -> Result<RegisterOutcome, AuthError> {
    if !captcha.verify(&request.captcha_response) {
        return Err(AuthError::validation("Incorrect captcha code!"));
    }
    validate::username_length(&request.username)?;
    validate::username_charset(&request.username, config)?;
    validate::password_length(&request.password)?;
    validate::email_format(&request.email)?;
    validate::secret_question_length(&request.secret_question)?;
    validate::secret_answer_length(&request.secret_answer)?;

    let activation_required = !group_allows_login(pool, config.default_group_id()).await?;
    let digest = credential_digest(&request.password, salts.salt1(), salts.salt2());

    // User row, audit entry, and activation key commit or fail together;
    // mail is enqueued only after the commit.
    let mut tx = pool
        .begin()
        .await
        .context("begin registration transaction")
        .map_err(AuthError::Persistence)?;

    let query = r"
        INSERT INTO users
            (groupid, username, password, email, secret_question, secret_answer, registered)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        RETURNING userid
    ";
    let row = sqlx::query(query)
        .bind(config.default_group_id())
        .bind(&request.username)
        .bind(&digest)
        .bind(&request.email)
        .bind(&request.secret_question)
        .bind(&request.secret_answer)
        .fetch_one(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await;

    let user_id: i64 = match row {
        Ok(row) => row.get("userid"),
        Err(err) => {
            let _ = tx.rollback().await;
            if let Some(field) = conflict_field(&err) {
                return Err(AuthError::Conflict { field });
            }
            return Err(AuthError::Persistence(
                anyhow::Error::new(err).context("failed to insert user"),
            ));
        }
    };

    audit::append(&mut *tx, user_id, audit::AuditEvent::Registered, None).await?;

    let activation_key = if activation_required {
        let key = random_text(ACTIVATION_KEY_LENGTH);
        let query = "INSERT INTO activations (userid, code) VALUES ($1, $2)";
        sqlx::query(query)
            .bind(user_id)
            .bind(&key)
            .execute(&mut *tx)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert activation key")
            .map_err(AuthError::Persistence)?;
        Some(key)
    } else {
        None
    };

    tx.commit()
        .await
        .context("commit registration transaction")
        .map_err(AuthError::Persistence)?;

    let message = match &activation_key {
        Some(key) => mail::registration_activation(config, &request.username, key, meta),
        None => mail::registration_welcome(config, &request.username, meta),
    };
    mail_queue.enqueue(&request.email, &message.subject, &message.body, true);

    info!(user_id, activation_required, "user registered");
    Ok(RegisterOutcome {
        user_id,
        activation_required,
    })
}

/// First visit of the activate/deactivate link: resolve the key for the
/// confirm form without acting on it.
///
/// Returns `Ok(None)` for unknown keys or accounts already past activation.
pub async fn activation_preview(
    pool: &PgPool,
    config: &AuthConfig,
    key: &str,
) -> Result<Option<PendingActivation>, AuthError> {
    let row = lookup_activation(pool, key).await?;
    Ok(row
        .filter(|activation| activation.group_id == config.default_group_id())
        .map(|activation| PendingActivation {
            username: activation.username,
        }))
}

/// Consume the key and promote the user to the configured normal group.
pub async fn activate(
    pool: &PgPool,
    config: &AuthConfig,
    key: &str,
    meta: &RequestMeta,
) -> Result<ActivationOutcome, AuthError> {
    let mut tx = pool
        .begin()
        .await
        .context("begin activation transaction")
        .map_err(AuthError::Persistence)?;

    let query = "DELETE FROM activations WHERE code = $1 RETURNING userid";
    let row = sqlx::query(query)
        .bind(key)
        .fetch_optional(&mut *tx)
        .instrument(query_span("DELETE", query))
        .await
        .context("failed to consume activation key")
        .map_err(AuthError::Persistence)?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(ActivationOutcome::NothingToDo);
    };
    let user_id: i64 = row.get("userid");

    // Only accounts still in the default (not-yet-activated) group qualify.
    let query = "UPDATE users SET groupid = $1 WHERE userid = $2 AND groupid = $3";
    let result = sqlx::query(query)
        .bind(config.user_group_id())
        .bind(user_id)
        .bind(config.default_group_id())
        .execute(&mut *tx)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to promote activated user")
        .map_err(AuthError::Persistence)?;

    if result.rows_affected() != 1 {
        let _ = tx.rollback().await;
        return Ok(ActivationOutcome::NothingToDo);
    }

    audit::append(
        &mut *tx,
        user_id,
        audit::AuditEvent::RegistrationActivated,
        Some(&meta.source_ip),
    )
    .await?;

    tx.commit()
        .await
        .context("commit activation transaction")
        .map_err(AuthError::Persistence)?;
    info!(user_id, "registration activated");
    Ok(ActivationOutcome::Activated)
}

/// Consume the key and delete the never-activated account entirely.
pub async fn deactivate(
    pool: &PgPool,
    config: &AuthConfig,
    key: &str,
) -> Result<ActivationOutcome, AuthError> {
    let mut tx = pool
        .begin()
        .await
        .context("begin deactivation transaction")
        .map_err(AuthError::Persistence)?;

    let query = "DELETE FROM activations WHERE code = $1 RETURNING userid";
    let row = sqlx::query(query)
        .bind(key)
        .fetch_optional(&mut *tx)
        .instrument(query_span("DELETE", query))
        .await
        .context("failed to consume activation key")
        .map_err(AuthError::Persistence)?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(ActivationOutcome::NothingToDo);
    };
    let user_id: i64 = row.get("userid");

    let query = "DELETE FROM users WHERE userid = $1 AND groupid = $2";
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(config.default_group_id())
        .execute(&mut *tx)
        .instrument(query_span("DELETE", query))
        .await
        .context("failed to delete deactivated user")
        .map_err(AuthError::Persistence)?;

    if result.rows_affected() != 1 {
        let _ = tx.rollback().await;
        return Ok(ActivationOutcome::NothingToDo);
    }

    tx.commit()
        .await
        .context("commit deactivation transaction")
        .map_err(AuthError::Persistence)?;
    info!(user_id, "registration deactivated, account deleted");
    Ok(ActivationOutcome::Deactivated)
}

struct ActivationRow {
    group_id: i64,
    username: String,
}

async fn lookup_activation(pool: &PgPool, key: &str) -> Result<Option<ActivationRow>, AuthError> {
    let query = r"
        SELECT u.groupid, u.username
        FROM activations AS a
        JOIN users AS u ON u.userid = a.userid
        WHERE a.code = $1
    ";
    let row = sqlx::query(query)
        .bind(key)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup activation key")
        .map_err(AuthError::Persistence)?;
    Ok(row.map(|row| ActivationRow {
        group_id: row.get("groupid"),
        username: row.get("username"),
    }))
}

async fn group_allows_login(pool: &PgPool, group_id: i64) -> Result<bool, AuthError> {
    let query = "SELECT access_login FROM user_groups WHERE groupid = $1";
    let row = sqlx::query(query)
        .bind(group_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to read default group capability")
        .map_err(AuthError::Persistence)?;
    Ok(row.is_some_and(|row| row.get::<bool, _>("access_login")))
}
