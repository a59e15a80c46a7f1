//! Attempt ledgers and sliding-window throttles.
//!
//! Two independent scopes share the same shape: failed logins and failed
//! secret-answer attempts, both keyed by source address. Checks count and
//! compare; recording happens only on the triggering failed action itself,
//! never on the rejection check. The throttle is best-effort: a benign
//! over/undercount under concurrent attempts from one source is acceptable.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::storage::query_span;

/// Policy decision: at or over the configured maximum is limited.
#[must_use]
pub fn exceeded(count: i64, max: i64) -> bool {
    count >= max
}

/// Failed logins from `source_ip` within the trailing window.
pub async fn login_attempts_within(
    pool: &PgPool,
    source_ip: &str,
    window_minutes: i64,
) -> Result<i64> {
    let query = r"
        SELECT COUNT(*) AS attempts
        FROM failed_logins
        WHERE ip = $1 AND attempted_at >= NOW() - ($2 * INTERVAL '1 minute')
    ";
    let row = sqlx::query(query)
        .bind(source_ip)
        .bind(window_minutes)
        .fetch_one(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to count login attempts")?;
    Ok(row.get("attempts"))
}

/// Append-only record of a failed login; rows are never updated.
pub async fn record_login_failure(
    pool: &PgPool,
    source_ip: &str,
    attempted_username: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO failed_logins (ip, attempted_username, attempted_at)
        VALUES ($1, $2, NOW())
    ";
    sqlx::query(query)
        .bind(source_ip)
        .bind(attempted_username)
        .execute(pool)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to record login failure")?;
    Ok(())
}

/// Failed secret-answer attempts from `source_ip` within the trailing window.
pub async fn sqa_attempts_within(
    pool: &PgPool,
    source_ip: &str,
    window_minutes: i64,
) -> Result<i64> {
    let query = r"
        SELECT COUNT(*) AS attempts
        FROM recovery_sqa_attempts
        WHERE ip = $1 AND attempted_at >= NOW() - ($2 * INTERVAL '1 minute')
    ";
    let row = sqlx::query(query)
        .bind(source_ip)
        .bind(window_minutes)
        .fetch_one(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to count secret-answer attempts")?;
    Ok(row.get("attempts"))
}

pub async fn record_sqa_failure(pool: &PgPool, source_ip: &str) -> Result<()> {
    let query = "INSERT INTO recovery_sqa_attempts (ip, attempted_at) VALUES ($1, NOW())";
    sqlx::query(query)
        .bind(source_ip)
        .execute(pool)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to record secret-answer attempt")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::exceeded;

    #[test]
    fn boundary_is_at_or_over_max() {
        // max - 1 failures permit one more attempt; max failures reject.
        assert!(!exceeded(0, 5));
        assert!(!exceeded(4, 5));
        assert!(exceeded(5, 5));
        assert!(exceeded(6, 5));
    }

    #[test]
    fn zero_max_always_limited() {
        assert!(exceeded(0, 0));
    }
}
