//! Secret-question recovery.
//!
//! Two steps. `begin` checks the captcha and the per-address throttle, then
//! hands back the account's secret question together with a signed ticket;
//! `answer` accepts the ticket instead of re-running the captcha, so the
//! captcha cannot be replayed across usernames. Failed answers feed the same
//! throttle that gates `begin`.

use anyhow::Context;
use sqlx::PgPool;
use tracing::info;

use super::super::hasher::credential_digest;
use super::super::salts::SaltPair;
use super::super::storage;
use super::super::types::RequestMeta;
use super::super::{audit, rate_limit, validate};
use super::ticket;
use crate::captcha::CaptchaVerifier;
use crate::config::AuthConfig;
use crate::error::AuthError;

const INCORRECT_ANSWER: &str = "Incorrect secret answer!";

/// Output of a successful `begin`: the question to display and the ticket
/// the answer form must submit back.
#[derive(Clone, Debug)]
pub struct AnswerChallenge {
    pub ticket: String,
    pub secret_question: String,
}

/// Start secret-question recovery for `username`.
///
/// # Errors
/// - `Validation` for a failed captcha or an unknown username
/// - `RateLimited` when the source address is over the attempt window
/// - `Authorization` when the account has no secret question configured
pub async fn begin(
    pool: &PgPool,
    config: &AuthConfig,
    salts: &SaltPair,
    captcha: &dyn CaptchaVerifier,
    meta: &RequestMeta,
    username: &str,
    captcha_response: &str,
) -> Result<AnswerChallenge, AuthError> {
    if !captcha.verify(captcha_response) {
        return Err(AuthError::validation("Incorrect captcha code!"));
    }
    check_throttle(pool, config, meta).await?;

    let Some(user_id) = storage::lookup_user_id(pool, username).await? else {
        return Err(AuthError::validation("User does not exist!"));
    };
    let pair = storage::secret_pair(pool, user_id)
        .await?
        .filter(storage::SecretPair::enabled);
    let Some(pair) = pair else {
        return Err(AuthError::authorization(
            "Secret question recovery for this account has been disabled!",
        ));
    };

    let ticket = ticket::issue(
        &salts.ticket_key(),
        username,
        config.recovery_ticket_ttl_seconds(),
    );
    Ok(AnswerChallenge {
        ticket,
        secret_question: pair.question,
    })
}

/// Submit the secret answer together with the replacement password.
///
/// # Errors
/// - `RateLimited` when the source address is over the attempt window
/// - `Validation` for an expired ticket, a wrong answer, or password problems
pub async fn answer(
    pool: &PgPool,
    config: &AuthConfig,
    salts: &SaltPair,
    meta: &RequestMeta,
    recovery_ticket: &str,
    secret_answer: &str,
    new_password: &str,
    new_password_confirm: &str,
) -> Result<(), AuthError> {
    // Both steps share one throttle; a flood of wrong answers locks the
    // window for new `begin` calls too.
    check_throttle(pool, config, meta).await?;

    let Some(username) = ticket::verify(&salts.ticket_key(), recovery_ticket) else {
        return Err(AuthError::validation(
            "Your recovery session has expired, please start again!",
        ));
    };

    if secret_answer.chars().count() > validate::SECRET_ANSWER_MAX {
        return Err(AuthError::validation(INCORRECT_ANSWER));
    }
    if new_password != new_password_confirm {
        return Err(AuthError::validation(
            "Your new password and the confirm password are different, retype your password!",
        ));
    }
    validate::password_length(new_password)?;

    let Some(user_id) = storage::lookup_user_id(pool, &username).await? else {
        return Err(AuthError::validation("User does not exist!"));
    };
    let pair = storage::secret_pair(pool, user_id)
        .await?
        .filter(storage::SecretPair::enabled);
    let Some(pair) = pair else {
        return Err(AuthError::authorization(
            "Secret question recovery for this account has been disabled!",
        ));
    };

    if pair.answer != secret_answer {
        rate_limit::record_sqa_failure(pool, &meta.source_ip).await?;
        audit::append(
            pool,
            user_id,
            audit::AuditEvent::AccountRecoverySqaIncorrect,
            Some(&meta.audit_context()),
        )
        .await?;
        return Err(AuthError::validation(INCORRECT_ANSWER));
    }

    let digest = credential_digest(new_password, salts.salt1(), salts.salt2());
    let mut tx = pool
        .begin()
        .await
        .context("begin secret-answer recovery transaction")
        .map_err(AuthError::Persistence)?;
    storage::update_password_digest(&mut *tx, user_id, &digest).await?;
    audit::append(
        &mut *tx,
        user_id,
        audit::AuditEvent::AccountRecoveredSqa,
        Some(&meta.audit_context()),
    )
    .await?;
    tx.commit()
        .await
        .context("commit secret-answer recovery transaction")
        .map_err(AuthError::Persistence)?;

    info!(user_id, "password reset via secret answer");
    Ok(())
}

async fn check_throttle(
    pool: &PgPool,
    config: &AuthConfig,
    meta: &RequestMeta,
) -> Result<(), AuthError> {
    let attempts = rate_limit::sqa_attempts_within(
        pool,
        &meta.source_ip,
        config.sqa_attempts_window_minutes(),
    )
    .await?;
    if rate_limit::exceeded(attempts, config.sqa_attempts_max()) {
        return Err(AuthError::RateLimited {
            retry_minutes: config.sqa_attempts_window_minutes(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::super::storage::SecretPair;

    // Query-backed paths are exercised against a live store; the gating
    // predicate is checked here.
    #[test]
    fn blank_secret_pair_disables_the_flow() {
        let pair = SecretPair {
            question: String::new(),
            answer: "something".to_string(),
        };
        assert!(!pair.enabled());
    }
}
