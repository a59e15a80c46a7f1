//! My-account updates for an authenticated user.
//!
//! Every change is gated on the current password, whatever the session says.
//! Password and e-mail are change-if-present; the secret pair is always
//! written, since submitting it blank is how an account disables
//! secret-question recovery.

use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::{info, Instrument};

use super::hasher::credential_digest;
use super::salts::SaltPair;
use super::storage::{conflict_field, query_span};
use super::types::RequestMeta;
use super::validate::{self, PASSWORD_MAX, PASSWORD_MIN};
use super::audit;
use crate::error::{AuthError, ConflictField};

/// Current account details, my-account form prefill.
#[derive(Clone, Debug)]
pub struct AccountProfile {
    pub username: String,
    pub email: String,
    pub secret_question: String,
    pub secret_answer: String,
}

pub async fn profile(pool: &PgPool, user_id: i64) -> Result<Option<AccountProfile>, AuthError> {
    let query = r"
        SELECT username, email, secret_question, secret_answer
        FROM users
        WHERE userid = $1
    ";
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to read account profile")
        .map_err(AuthError::Persistence)?;
    Ok(row.map(|row| AccountProfile {
        username: row.get("username"),
        email: row.get("email"),
        secret_question: row.get("secret_question"),
        secret_answer: row.get("secret_answer"),
    }))
}

#[derive(Clone, Debug)]
pub struct AccountUpdateRequest {
    pub current_password: String,
    /// `None` keeps the stored password.
    pub new_password: Option<String>,
    pub new_password_confirm: Option<String>,
    /// `None` keeps the stored address.
    pub email: Option<String>,
    pub secret_question: String,
    pub secret_answer: String,
}

/// Apply an account update for `user_id`.
///
/// # Errors
/// - `NotFound` when the account no longer exists
/// - `Validation` for a wrong current password or invalid replacement fields
/// - `Conflict` when the new e-mail address is already in use
pub async fn update(
    pool: &PgPool,
    salts: &SaltPair,
    meta: &RequestMeta,
    user_id: i64,
    request: AccountUpdateRequest,
) -> Result<(), AuthError> {
    let Some(stored_digest) = password_digest(pool, user_id).await? else {
        return Err(AuthError::NotFound);
    };

    let current_len = request.current_password.chars().count();
    let current_ok = (PASSWORD_MIN..=PASSWORD_MAX).contains(&current_len)
        && credential_digest(&request.current_password, salts.salt1(), salts.salt2())
            == stored_digest;
    if !current_ok {
        return Err(AuthError::validation("Incorrect current password!"));
    }

    let new_digest = match &request.new_password {
        Some(password) => {
            if request.new_password_confirm.as_deref() != Some(password.as_str()) {
                return Err(AuthError::validation(
                    "Your new password and the confirm password are different, retype your password!",
                ));
            }
            validate::password_length(password)?;
            Some(credential_digest(password, salts.salt1(), salts.salt2()))
        }
        None => None,
    };
    if let Some(email) = &request.email {
        validate::email_format(email)?;
    }
    validate::secret_question_length(&request.secret_question)?;
    validate::secret_answer_length(&request.secret_answer)?;

    let mut tx = pool
        .begin()
        .await
        .context("begin account update transaction")
        .map_err(AuthError::Persistence)?;

    let query = r"
        UPDATE users
        SET password = COALESCE($2, password),
            email = COALESCE($3, email),
            secret_question = $4,
            secret_answer = $5
        WHERE userid = $1
    ";
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(new_digest.as_deref())
        .bind(request.email.as_deref())
        .bind(&request.secret_question)
        .bind(&request.secret_answer)
        .execute(&mut *tx)
        .instrument(query_span("UPDATE", query))
        .await;

    if let Err(err) = result {
        let _ = tx.rollback().await;
        if conflict_field(&err) == Some(ConflictField::Email) {
            return Err(AuthError::Conflict {
                field: ConflictField::Email,
            });
        }
        return Err(AuthError::Persistence(
            anyhow::Error::new(err).context("failed to update account"),
        ));
    }

    audit::append(
        &mut *tx,
        user_id,
        audit::AuditEvent::MyAccountUpdated,
        Some(&meta.audit_context()),
    )
    .await?;

    tx.commit()
        .await
        .context("commit account update transaction")
        .map_err(AuthError::Persistence)?;
    info!(user_id, "account details updated");
    Ok(())
}

async fn password_digest(pool: &PgPool, user_id: i64) -> Result<Option<String>, AuthError> {
    let query = "SELECT password FROM users WHERE userid = $1";
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to read stored password digest")
        .map_err(AuthError::Persistence)?;
    Ok(row.map(|row| row.get("password")))
}
