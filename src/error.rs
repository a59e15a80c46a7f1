//! Error taxonomy for the auth flows.
//!
//! Every flow resolves to a single `Result<_, AuthError>` per request. The
//! `Display` output of each variant is the user-facing message; persistence
//! failures keep their cause chained for logs while displaying a generic
//! apology with no internal detail.

use thiserror::Error;

/// Which unique field collided during an insert or update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictField {
    Username,
    Email,
}

impl ConflictField {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Username => "Username already in-use!",
            Self::Email => "E-mail already in-use!",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad input shape, length, or format. User-correctable, shown inline.
    #[error("{0}")]
    Validation(String),

    /// Too many attempts from this source address within the window.
    #[error("You've exceeded the maximum attempts, try again in {retry_minutes} minutes...")]
    RateLimited { retry_minutes: i64 },

    /// Banned or activation-required. Terminal for the session; re-submitting
    /// the same request cannot succeed.
    #[error("{0}")]
    Authorization(String),

    /// Unknown token or user. Deliberately rendered the same as "nothing to
    /// do" so recovery flows never confirm token or account existence.
    #[error("Nothing to do.")]
    NotFound,

    /// Unique-constraint violation on a registration field.
    #[error("{}", field.message())]
    Conflict { field: ConflictField },

    /// Unexpected store failure. The cause stays in the error chain for
    /// operators; end users only ever see the generic message.
    #[error("Unknown error occurred, apologies - try again!")]
    Persistence(#[source] anyhow::Error),
}

impl AuthError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Persistence(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn conflict_messages_name_the_field() {
        assert_eq!(
            ConflictField::Username.message(),
            "Username already in-use!"
        );
        assert_eq!(ConflictField::Email.message(), "E-mail already in-use!");
    }

    #[test]
    fn rate_limited_includes_wait_context() {
        let err = AuthError::RateLimited { retry_minutes: 20 };
        assert_eq!(
            err.to_string(),
            "You've exceeded the maximum attempts, try again in 20 minutes..."
        );
    }

    #[test]
    fn persistence_display_hides_internal_detail() {
        let err = AuthError::from(anyhow!("connection reset by peer"));
        assert_eq!(
            err.to_string(),
            "Unknown error occurred, apologies - try again!"
        );
        // The cause stays reachable for operator logs.
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("connection reset by peer"));
    }

    #[test]
    fn not_found_renders_as_nothing_to_do() {
        assert_eq!(AuthError::NotFound.to_string(), "Nothing to do.");
    }
}
