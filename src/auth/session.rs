//! Per-request session validation.
//!
//! Runs once per authenticated request, before any other authenticated-only
//! logic consumes the identity: an account that disappeared, picked up an
//! active ban, or lost its group's login capability must have its session
//! force-terminated immediately rather than at next login.

use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::storage::query_span;
use crate::error::AuthError;

/// Identity details exposed to the request context on success.
#[derive(Clone, Debug)]
pub struct SessionIdentity {
    pub user_id: i64,
    pub username: String,
    /// The group title, used by the rendering layer as a capability tag.
    pub group_tag: String,
}

#[derive(Clone, Debug)]
pub enum SessionCheck {
    Active(SessionIdentity),
    /// Clear credentials, invalidate the server-side session, and redirect
    /// to the banned-logout endpoint.
    Terminate,
}

/// Validate that the authenticated `user_id` still maps to a loginable,
/// unbanned account.
///
/// # Errors
/// Returns `AuthError::Persistence` when the store read fails; the caller
/// should fail the request rather than assume either outcome.
pub async fn validate_session(pool: &PgPool, user_id: i64) -> Result<SessionCheck, AuthError> {
    let query = r"
        SELECT u.userid, u.username,
               COALESCE(g.title, '') AS title,
               COALESCE(g.access_login, FALSE) AS access_login,
               COUNT(b.banid) AS active_bans
        FROM users AS u
        LEFT OUTER JOIN user_groups AS g ON g.groupid = u.groupid
        LEFT OUTER JOIN user_bans AS b
          ON b.userid = u.userid AND (b.unban_date IS NULL OR b.unban_date > NOW())
        WHERE u.userid = $1
        GROUP BY u.userid, u.username, g.title, g.access_login
    ";
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to validate session")?;

    let Some(row) = row else {
        return Ok(SessionCheck::Terminate);
    };

    let active_bans: i64 = row.get("active_bans");
    let access_login: bool = row.get("access_login");
    if active_bans > 0 || !access_login {
        return Ok(SessionCheck::Terminate);
    }

    Ok(SessionCheck::Active(SessionIdentity {
        user_id: row.get("userid"),
        username: row.get("username"),
        group_tag: row.get("title"),
    }))
}
