//! Admin-panel user administration: search by username, edit any account.
//!
//! Unlike my-account self-service, the admin edit is not gated on the
//! account's password and can move the user between groups. Password is
//! change-if-present; username, e-mail, secret pair, and group are always
//! written.

use anyhow::Context;
use sqlx::PgPool;
use tracing::{info, Instrument};

use super::hasher::credential_digest;
use super::salts::SaltPair;
use super::storage::{conflict_field, lookup_user_id, query_span};
use super::validate;
use crate::config::AuthConfig;
use crate::error::AuthError;

/// Resolve the user-search form input to a user id.
///
/// # Errors
/// `Validation` with "Invalid username!" for out-of-policy input and
/// "User not found!" when no account matches.
pub async fn find_user(
    pool: &PgPool,
    config: &AuthConfig,
    username: &str,
) -> Result<i64, AuthError> {
    let policy_ok = validate::username_length(username).is_ok()
        && validate::username_charset(username, config).is_ok();
    if !policy_ok {
        return Err(AuthError::validation("Invalid username!"));
    }
    match lookup_user_id(pool, username).await? {
        Some(user_id) => Ok(user_id),
        None => Err(AuthError::validation("User not found!")),
    }
}

/// Full field set of the admin edit form.
#[derive(Clone, Debug)]
pub struct AdminUserUpdate {
    pub username: String,
    /// `None` keeps the stored password.
    pub new_password: Option<String>,
    pub email: String,
    pub secret_question: String,
    pub secret_answer: String,
    pub group_id: i64,
}

/// Apply an admin edit to `user_id`.
///
/// # Errors
/// - `NotFound` when the account no longer exists
/// - `Validation` for field bounds or an unknown destination group
/// - `Conflict` naming the colliding field when username/e-mail is taken
pub async fn update_user(
    pool: &PgPool,
    config: &AuthConfig,
    salts: &SaltPair,
    user_id: i64,
    update: AdminUserUpdate,
) -> Result<(), AuthError> {
    validate::username_length(&update.username)?;
    validate::username_charset(&update.username, config)?;
    validate::email_format(&update.email)?;
    let digest = match &update.new_password {
        Some(password) => {
            validate::password_length(password)?;
            Some(credential_digest(password, salts.salt1(), salts.salt2()))
        }
        None => None,
    };
    validate::secret_question_length(&update.secret_question)?;
    validate::secret_answer_length(&update.secret_answer)?;

    if !group_exists(pool, update.group_id).await? {
        return Err(AuthError::validation("Invalid group!"));
    }

    let query = r"
        UPDATE users
        SET username = $2,
            email = $3,
            password = COALESCE($4, password),
            secret_question = $5,
            secret_answer = $6,
            groupid = $7
        WHERE userid = $1
    ";
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(&update.username)
        .bind(&update.email)
        .bind(digest.as_deref())
        .bind(&update.secret_question)
        .bind(&update.secret_answer)
        .bind(update.group_id)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await;

    match result {
        Ok(done) if done.rows_affected() == 1 => {
            info!(user_id, group_id = update.group_id, "user edited by admin");
            Ok(())
        }
        Ok(_) => Err(AuthError::NotFound),
        Err(err) => {
            if let Some(field) = conflict_field(&err) {
                return Err(AuthError::Conflict { field });
            }
            Err(AuthError::Persistence(
                anyhow::Error::new(err).context("failed to apply admin user edit"),
            ))
        }
    }
}

async fn group_exists(pool: &PgPool, group_id: i64) -> Result<bool, AuthError> {
    let query = "SELECT 1 FROM user_groups WHERE groupid = $1";
    let row = sqlx::query(query)
        .bind(group_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to check group existence")
        .map_err(AuthError::Persistence)?;
    Ok(row.is_some())
}
