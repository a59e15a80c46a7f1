//! Shared database helpers for the auth flows.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;

use crate::error::ConflictField;

/// Span for database statements, matching the fields emitted everywhere else
/// in the platform's services.
pub(crate) fn query_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

/// Everything the login flow needs in a single read: credentials, the
/// group's login capability, and the active-ban count.
pub(crate) struct LoginRecord {
    pub(crate) user_id: i64,
    pub(crate) digest: String,
    pub(crate) access_login: bool,
    pub(crate) active_bans: i64,
}

pub(crate) async fn lookup_login_record(
    pool: &PgPool,
    username: &str,
) -> Result<Option<LoginRecord>> {
    let query = r"
        SELECT u.userid, u.password,
               COALESCE(g.access_login, FALSE) AS access_login,
               COUNT(b.banid) AS active_bans
        FROM users AS u
        LEFT OUTER JOIN user_groups AS g ON g.groupid = u.groupid
        LEFT OUTER JOIN user_bans AS b
          ON b.userid = u.userid AND (b.unban_date IS NULL OR b.unban_date > NOW())
        WHERE u.username = $1
        GROUP BY u.userid, u.password, g.access_login
    ";
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup login record")?;

    Ok(row.map(|row| LoginRecord {
        user_id: row.get("userid"),
        digest: row.get("password"),
        access_login: row.get("access_login"),
        active_bans: row.get("active_bans"),
    }))
}

/// Case-insensitive username lookup with LIKE wildcards stripped, used where
/// the platform historically matched loosely (audit attribution, recovery).
pub(crate) async fn lookup_user_id(pool: &PgPool, username: &str) -> Result<Option<i64>> {
    let query = "SELECT userid FROM users WHERE username ILIKE $1";
    let pattern = username.replace(['%', '_'], "");
    let row = sqlx::query(query)
        .bind(&pattern)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup user by username")?;
    Ok(row.map(|row| row.get("userid")))
}

/// The most recent active ban, for the login rejection message.
pub(crate) struct BanRecord {
    pub(crate) reason: String,
    pub(crate) unban_date: Option<String>,
}

pub(crate) async fn current_ban(pool: &PgPool, user_id: i64) -> Result<Option<BanRecord>> {
    let query = r"
        SELECT reason, unban_date::text AS unban_date
        FROM user_bans
        WHERE userid = $1 AND (unban_date IS NULL OR unban_date > NOW())
        ORDER BY unban_date DESC NULLS FIRST
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup current ban")?;
    Ok(row.map(|row| BanRecord {
        reason: row.get("reason"),
        unban_date: row.get("unban_date"),
    }))
}

pub(crate) async fn update_password_digest<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    user_id: i64,
    digest: &str,
) -> Result<()> {
    let query = "UPDATE users SET password = $2 WHERE userid = $1";
    sqlx::query(query)
        .bind(user_id)
        .bind(digest)
        .execute(executor)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to update password digest")?;
    Ok(())
}

pub(crate) struct SecretPair {
    pub(crate) question: String,
    pub(crate) answer: String,
}

impl SecretPair {
    /// An empty pair disables secret-question recovery for the account.
    pub(crate) fn enabled(&self) -> bool {
        !self.question.is_empty() && !self.answer.is_empty()
    }
}

pub(crate) async fn secret_pair(pool: &PgPool, user_id: i64) -> Result<Option<SecretPair>> {
    let query = "SELECT secret_question, secret_answer FROM users WHERE userid = $1";
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup secret question")?;
    Ok(row.map(|row| SecretPair {
        question: row.get("secret_question"),
        answer: row.get("secret_answer"),
    }))
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Map a unique violation to the colliding registration field via the
/// constraint name, so the user learns which field to change.
pub(crate) fn conflict_field(err: &sqlx::Error) -> Option<ConflictField> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    if !db_err.code().is_some_and(|code| code.as_ref() == "23505") {
        return None;
    }
    let constraint = db_err.constraint()?;
    if constraint.contains("username") {
        Some(ConflictField::Username)
    } else if constraint.contains("email") {
        Some(ConflictField::Email)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
        constraint: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    fn db_error(code: Option<&'static str>, constraint: Option<&'static str>) -> sqlx::Error {
        sqlx::Error::Database(Box::new(TestDbError { code, constraint }))
    }

    #[test]
    fn unique_violation_matches_sqlstate() {
        assert!(is_unique_violation(&db_error(Some("23505"), None)));
        assert!(!is_unique_violation(&db_error(Some("99999"), None)));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn conflict_field_follows_constraint_name() {
        assert_eq!(
            conflict_field(&db_error(Some("23505"), Some("users_username_key"))),
            Some(ConflictField::Username)
        );
        assert_eq!(
            conflict_field(&db_error(Some("23505"), Some("users_email_key"))),
            Some(ConflictField::Email)
        );
        assert_eq!(
            conflict_field(&db_error(Some("23505"), Some("users_pkey"))),
            None
        );
        assert_eq!(
            conflict_field(&db_error(Some("42601"), Some("users_email_key"))),
            None
        );
    }

    #[test]
    fn empty_secret_pair_is_disabled() {
        let pair = SecretPair {
            question: String::new(),
            answer: String::new(),
        };
        assert!(!pair.enabled());
        let pair = SecretPair {
            question: "favourite colour?".to_string(),
            answer: "plaid".to_string(),
        };
        assert!(pair.enabled());
    }
}
