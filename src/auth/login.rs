//! Login flow.
//!
//! Rejection ordering is deliberate and must not be reordered: captcha and
//! length checks first (no store access), then the sliding-window throttle,
//! then the credential comparison. The same generic message covers a wrong
//! password and an unknown username so responses do not reveal which.

use sqlx::PgPool;
use tracing::info;

use super::hasher::credential_digest;
use super::salts::SaltPair;
use super::storage::{current_ban, lookup_login_record, lookup_user_id};
use super::types::RequestMeta;
use super::validate::{PASSWORD_MAX, PASSWORD_MIN, USERNAME_MAX, USERNAME_MIN};
use super::{audit, rate_limit};
use crate::captcha::CaptchaVerifier;
use crate::config::AuthConfig;
use crate::error::AuthError;

const INCORRECT_USER_PASSWORD: &str = "Incorrect username or password!";

#[derive(Clone, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub captcha_response: String,
}

/// Credentials verified; the routing layer establishes the session.
#[derive(Clone, Debug)]
pub struct LoginSuccess {
    pub user_id: i64,
    pub username: String,
}

/// Authenticate a user.
///
/// # Errors
/// - `Validation` for captcha failures and the generic credential rejection
/// - `RateLimited` when the source address is over the attempt window
/// - `Authorization` for activation-pending or banned accounts
pub async fn login(
    pool: &PgPool,
    config: &AuthConfig,
    salts: &SaltPair,
    captcha: &dyn CaptchaVerifier,
    meta: &RequestMeta,
    request: LoginRequest,
) -> Result<LoginSuccess, AuthError> {
    if !captcha.verify(&request.captcha_response) {
        return Err(AuthError::validation("Invalid captcha code!"));
    }
    let username_len = request.username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&username_len) {
        return Err(AuthError::validation(INCORRECT_USER_PASSWORD));
    }
    let password_len = request.password.chars().count();
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&password_len) {
        return Err(AuthError::validation(INCORRECT_USER_PASSWORD));
    }

    // The rejection check itself never records an attempt.
    let attempts = rate_limit::login_attempts_within(
        pool,
        &meta.source_ip,
        config.max_login_window_minutes(),
    )
    .await?;
    if rate_limit::exceeded(attempts, config.max_login_attempts()) {
        return Err(AuthError::RateLimited {
            retry_minutes: config.max_login_window_minutes(),
        });
    }

    let record = lookup_login_record(pool, &request.username).await?;
    let digest = credential_digest(&request.password, salts.salt1(), salts.salt2());

    let matched = record
        .as_ref()
        .filter(|record| record.digest == digest);
    let Some(record) = matched else {
        rate_limit::record_login_failure(pool, &meta.source_ip, &request.username).await?;
        // Loose lookup so a wrong password on an existing account is still
        // attributed in that account's log. Checking existence here is a
        // known, accepted response-behavior side channel kept for audit
        // completeness.
        if let Some(user_id) = lookup_user_id(pool, &request.username).await? {
            audit::append(
                pool,
                user_id,
                audit::AuditEvent::LoginIncorrect,
                Some(&meta.audit_context()),
            )
            .await?;
        }
        return Err(AuthError::validation(INCORRECT_USER_PASSWORD));
    };

    if !record.access_login {
        return Err(AuthError::authorization(
            "Your account is not allowed to login; your account is either awaiting activation or you've been banned.",
        ));
    }

    if record.active_bans > 0 {
        let message = match current_ban(pool, record.user_id).await? {
            Some(ban) => {
                let until = ban
                    .unban_date
                    .unwrap_or_else(|| "the end of time (permanent)".to_string());
                format!(
                    "Your account is currently banned until '{until}' for the reason '{}'!",
                    ban.reason
                )
            }
            None => "You are currently banned.".to_string(),
        };
        return Err(AuthError::Authorization(message));
    }

    audit::append(
        pool,
        record.user_id,
        audit::AuditEvent::LoginAuthenticated,
        Some(&meta.audit_context()),
    )
    .await?;
    info!(user_id = record.user_id, "login authenticated");

    Ok(LoginSuccess {
        user_id: record.user_id,
        username: request.username,
    })
}
