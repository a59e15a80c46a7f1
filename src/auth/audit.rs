//! Append-only per-user event log.
//!
//! Event kinds are a closed enum stored under their historical numeric
//! codes; presentation (titles, icons) belongs to the rendering layer.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::{warn, Instrument};

use super::storage::query_span;

/// Fixed page size for the account-log view.
pub const PAGE_SIZE: i64 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditEvent {
    Registered,
    RegistrationActivated,
    LoginIncorrect,
    LoginAuthenticated,
    AccountRecoverySqaIncorrect,
    AccountRecoveredEmail,
    AccountRecoveredSqa,
    MyAccountUpdated,
    AdminPanelAccessed,
}

impl AuditEvent {
    /// Stored numeric code. The gaps are historical and must be preserved;
    /// existing log rows were written under these values.
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            Self::Registered => 0,
            Self::RegistrationActivated => 1,
            Self::LoginIncorrect => 10,
            Self::LoginAuthenticated => 11,
            Self::AccountRecoverySqaIncorrect => 21,
            Self::AccountRecoveredEmail => 30,
            Self::AccountRecoveredSqa => 31,
            Self::MyAccountUpdated => 40,
            Self::AdminPanelAccessed => 100,
        }
    }

    #[must_use]
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(Self::Registered),
            1 => Some(Self::RegistrationActivated),
            10 => Some(Self::LoginIncorrect),
            11 => Some(Self::LoginAuthenticated),
            21 => Some(Self::AccountRecoverySqaIncorrect),
            30 => Some(Self::AccountRecoveredEmail),
            31 => Some(Self::AccountRecoveredSqa),
            40 => Some(Self::MyAccountUpdated),
            100 => Some(Self::AdminPanelAccessed),
            _ => None,
        }
    }
}

/// Sort order for the paginated log view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuditSort {
    DateAsc,
    #[default]
    DateDesc,
    EventAsc,
    EventDesc,
}

impl AuditSort {
    // Fixed clauses only; never interpolate user input into ORDER BY.
    const fn order_clause(self) -> &'static str {
        match self {
            Self::DateAsc => "occurred_at ASC",
            Self::DateDesc => "occurred_at DESC",
            Self::EventAsc => "event_type ASC",
            Self::EventDesc => "event_type DESC",
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogEntry {
    pub user_id: i64,
    pub event: AuditEvent,
    pub occurred_at: String,
    pub context: Option<String>,
}

/// Append an event. Takes any executor so flows can write log entries inside
/// the same transaction as the mutation they describe.
pub async fn append<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    user_id: i64,
    event: AuditEvent,
    context: Option<&str>,
) -> Result<()> {
    let query = r"
        INSERT INTO user_log (userid, event_type, occurred_at, context)
        VALUES ($1, $2, NOW(), $3)
    ";
    sqlx::query(query)
        .bind(user_id)
        .bind(event.code())
        .bind(context)
        .execute(executor)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to append audit entry")?;
    Ok(())
}

/// One page of a user's log, `page` counted from 1.
pub async fn page(
    pool: &PgPool,
    user_id: i64,
    page: i64,
    sort: AuditSort,
) -> Result<Vec<AuditLogEntry>> {
    let page = page.max(1);
    let query = format!(
        r"
        SELECT userid, event_type, occurred_at::text AS occurred_at, context
        FROM user_log
        WHERE userid = $1
        ORDER BY {}
        LIMIT $2 OFFSET $3
    ",
        sort.order_clause()
    );
    let rows = sqlx::query(&query)
        .bind(user_id)
        .bind(PAGE_SIZE)
        .bind((page - 1) * PAGE_SIZE)
        .fetch_all(pool)
        .instrument(query_span("SELECT", &query))
        .await
        .context("failed to read audit log page")?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let code: i16 = row.get("event_type");
            let Some(event) = AuditEvent::from_code(code) else {
                warn!(code, "unknown audit event code in user_log");
                return None;
            };
            Some(AuditLogEntry {
                user_id: row.get("userid"),
                event,
                occurred_at: row.get("occurred_at"),
                context: row.get("context"),
            })
        })
        .collect())
}
