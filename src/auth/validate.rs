//! Input validation with the platform's field bounds.

use regex::Regex;

use crate::config::AuthConfig;
use crate::error::AuthError;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 18;
pub const PASSWORD_MIN: usize = 3;
pub const PASSWORD_MAX: usize = 40;
pub const SECRET_QUESTION_MIN: usize = 0;
pub const SECRET_QUESTION_MAX: usize = 40;
pub const SECRET_ANSWER_MIN: usize = 0;
pub const SECRET_ANSWER_MAX: usize = 40;
pub const GROUP_TITLE_MIN: usize = 1;
pub const GROUP_TITLE_MAX: usize = 25;

fn char_len(text: &str) -> usize {
    text.chars().count()
}

pub(crate) fn username_length(username: &str) -> Result<(), AuthError> {
    let length = char_len(username);
    if length < USERNAME_MIN || length > USERNAME_MAX {
        return Err(AuthError::validation(format!(
            "Username must be {USERNAME_MIN} to {USERNAME_MAX} characters in length!"
        )));
    }
    Ok(())
}

/// Charset policy: in strict mode every case-folded character must appear in
/// the configured allowed set and the error names the offending character;
/// otherwise only leading/trailing spaces are rejected.
pub(crate) fn username_charset(username: &str, config: &AuthConfig) -> Result<(), AuthError> {
    if config.username_strict() {
        let allowed = config.username_strict_chars();
        for ch in username.chars() {
            for folded in ch.to_lowercase() {
                if !allowed.contains(folded) {
                    return Err(AuthError::validation(format!(
                        "Username cannot contain the character '{folded}'!"
                    )));
                }
            }
        }
    } else if username.starts_with(' ') {
        return Err(AuthError::validation("Username cannot start with a space!"));
    } else if username.ends_with(' ') {
        return Err(AuthError::validation("Username cannot end with a space!"));
    }
    Ok(())
}

pub(crate) fn password_length(password: &str) -> Result<(), AuthError> {
    let length = char_len(password);
    if length < PASSWORD_MIN || length > PASSWORD_MAX {
        return Err(AuthError::validation(format!(
            "Password must be {PASSWORD_MIN} to {PASSWORD_MAX} characters in length!"
        )));
    }
    Ok(())
}

pub(crate) fn email_format(email: &str) -> Result<(), AuthError> {
    let valid =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email));
    if valid {
        Ok(())
    } else {
        Err(AuthError::validation("Invalid e-mail address!"))
    }
}

pub(crate) fn secret_question_length(question: &str) -> Result<(), AuthError> {
    if char_len(question) > SECRET_QUESTION_MAX {
        return Err(AuthError::validation(format!(
            "Secret question must be {SECRET_QUESTION_MIN} to {SECRET_QUESTION_MAX} characters in length!"
        )));
    }
    Ok(())
}

pub(crate) fn secret_answer_length(answer: &str) -> Result<(), AuthError> {
    if char_len(answer) > SECRET_ANSWER_MAX {
        return Err(AuthError::validation(format!(
            "Secret answer must be {SECRET_ANSWER_MIN} to {SECRET_ANSWER_MAX} characters in length!"
        )));
    }
    Ok(())
}

pub(crate) fn group_title_length(title: &str) -> Result<(), AuthError> {
    let length = char_len(title);
    if length < GROUP_TITLE_MIN || length > GROUP_TITLE_MAX {
        return Err(AuthError::validation(format!(
            "Group title must be between {GROUP_TITLE_MIN} to {GROUP_TITLE_MAX} characters in length!"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict_config() -> AuthConfig {
        AuthConfig::new("https://example.com".to_string())
    }

    #[test]
    fn username_below_minimum_rejected() {
        // "ab" is two characters, below the minimum of three.
        assert!(matches!(
            username_length("ab"),
            Err(AuthError::Validation(_))
        ));
        assert!(username_length("abc").is_ok());
        assert!(username_length(&"a".repeat(18)).is_ok());
        assert!(username_length(&"a".repeat(19)).is_err());
    }

    #[test]
    fn strict_charset_names_offending_character() {
        let config = strict_config();
        assert!(username_charset("alice._01", &config).is_ok());
        // Upper-case input passes via case folding.
        assert!(username_charset("ALICE", &config).is_ok());
        let err = username_charset("ali ce", &config).unwrap_err();
        assert_eq!(err.to_string(), "Username cannot contain the character ' '!");
        let err = username_charset("ali#ce", &config).unwrap_err();
        assert_eq!(err.to_string(), "Username cannot contain the character '#'!");
    }

    #[test]
    fn non_strict_rejects_only_edge_spaces() {
        let config = strict_config().with_username_strict(false);
        assert!(username_charset("we ird#name", &config).is_ok());
        assert!(username_charset(" alice", &config).is_err());
        assert!(username_charset("alice ", &config).is_err());
    }

    #[test]
    fn password_bounds() {
        assert!(password_length("ab").is_err());
        assert!(password_length("abc").is_ok());
        assert!(password_length(&"p".repeat(40)).is_ok());
        assert!(password_length(&"p".repeat(41)).is_err());
    }

    #[test]
    fn email_format_basic() {
        assert!(email_format("a@example.com").is_ok());
        assert!(email_format("not-an-email").is_err());
        assert!(email_format("missing-domain@").is_err());
        assert!(email_format("a b@example.com").is_err());
    }

    #[test]
    fn secret_pair_allows_empty() {
        // Empty question/answer disables secret recovery but is valid input.
        assert!(secret_question_length("").is_ok());
        assert!(secret_answer_length("").is_ok());
        assert!(secret_question_length(&"q".repeat(41)).is_err());
        assert!(secret_answer_length(&"a".repeat(41)).is_err());
    }

    #[test]
    fn group_title_bounds() {
        assert!(group_title_length("").is_err());
        assert!(group_title_length("Moderators").is_ok());
        assert!(group_title_length(&"t".repeat(26)).is_err());
    }
}
