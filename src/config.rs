//! Auth configuration.
//!
//! The host platform's settings store installs these values at setup time;
//! the routing layer reads them once per process and hands the crate an
//! immutable `AuthConfig`.

const DEFAULT_MAX_LOGIN_ATTEMPTS: i64 = 5;
const DEFAULT_MAX_LOGIN_WINDOW_MINUTES: i64 = 20;
const DEFAULT_GROUP_DEFAULT: i64 = 1;
const DEFAULT_GROUP_USER: i64 = 2;
const DEFAULT_GROUP_BANNED: i64 = 5;
const DEFAULT_SITE_NAME: &str = "Unnamed CMS";
const DEFAULT_USERNAME_STRICT_CHARS: &str = "abcdefghijklmnopqrstuvwxyz._àèòáéóñ0123456789";
const DEFAULT_MAX_RECOVERY_EMAILS_PER_DAY: i64 = 3;
const DEFAULT_SQA_ATTEMPTS_MAX: i64 = 3;
const DEFAULT_SQA_ATTEMPTS_WINDOW_MINUTES: i64 = 15;
const DEFAULT_RECOVERY_TICKET_TTL_SECONDS: u64 = 10 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    site_name: String,
    max_login_attempts: i64,
    max_login_window_minutes: i64,
    default_group_id: i64,
    user_group_id: i64,
    banned_group_id: i64,
    username_strict: bool,
    username_strict_chars: String,
    max_recovery_emails_per_day: i64,
    sqa_attempts_max: i64,
    sqa_attempts_window_minutes: i64,
    recovery_ticket_ttl_seconds: u64,
}

impl AuthConfig {
    /// New config with installed defaults. `base_url` is the externally
    /// reachable site root used when building activation and recovery links.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            site_name: DEFAULT_SITE_NAME.to_string(),
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            max_login_window_minutes: DEFAULT_MAX_LOGIN_WINDOW_MINUTES,
            default_group_id: DEFAULT_GROUP_DEFAULT,
            user_group_id: DEFAULT_GROUP_USER,
            banned_group_id: DEFAULT_GROUP_BANNED,
            username_strict: true,
            username_strict_chars: DEFAULT_USERNAME_STRICT_CHARS.to_string(),
            max_recovery_emails_per_day: DEFAULT_MAX_RECOVERY_EMAILS_PER_DAY,
            sqa_attempts_max: DEFAULT_SQA_ATTEMPTS_MAX,
            sqa_attempts_window_minutes: DEFAULT_SQA_ATTEMPTS_WINDOW_MINUTES,
            recovery_ticket_ttl_seconds: DEFAULT_RECOVERY_TICKET_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_site_name(mut self, site_name: String) -> Self {
        self.site_name = site_name;
        self
    }

    #[must_use]
    pub fn with_max_login_attempts(mut self, attempts: i64) -> Self {
        self.max_login_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_max_login_window_minutes(mut self, minutes: i64) -> Self {
        self.max_login_window_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_default_group_id(mut self, group_id: i64) -> Self {
        self.default_group_id = group_id;
        self
    }

    #[must_use]
    pub fn with_user_group_id(mut self, group_id: i64) -> Self {
        self.user_group_id = group_id;
        self
    }

    #[must_use]
    pub fn with_banned_group_id(mut self, group_id: i64) -> Self {
        self.banned_group_id = group_id;
        self
    }

    #[must_use]
    pub fn with_username_strict(mut self, strict: bool) -> Self {
        self.username_strict = strict;
        self
    }

    #[must_use]
    pub fn with_username_strict_chars(mut self, chars: String) -> Self {
        self.username_strict_chars = chars;
        self
    }

    #[must_use]
    pub fn with_max_recovery_emails_per_day(mut self, max: i64) -> Self {
        self.max_recovery_emails_per_day = max;
        self
    }

    #[must_use]
    pub fn with_sqa_attempts_max(mut self, max: i64) -> Self {
        self.sqa_attempts_max = max;
        self
    }

    #[must_use]
    pub fn with_sqa_attempts_window_minutes(mut self, minutes: i64) -> Self {
        self.sqa_attempts_window_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_recovery_ticket_ttl_seconds(mut self, seconds: u64) -> Self {
        self.recovery_ticket_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    #[must_use]
    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    #[must_use]
    pub fn max_login_attempts(&self) -> i64 {
        self.max_login_attempts
    }

    #[must_use]
    pub fn max_login_window_minutes(&self) -> i64 {
        self.max_login_window_minutes
    }

    #[must_use]
    pub fn default_group_id(&self) -> i64 {
        self.default_group_id
    }

    #[must_use]
    pub fn user_group_id(&self) -> i64 {
        self.user_group_id
    }

    #[must_use]
    pub fn banned_group_id(&self) -> i64 {
        self.banned_group_id
    }

    #[must_use]
    pub fn username_strict(&self) -> bool {
        self.username_strict
    }

    #[must_use]
    pub fn username_strict_chars(&self) -> &str {
        &self.username_strict_chars
    }

    #[must_use]
    pub fn max_recovery_emails_per_day(&self) -> i64 {
        self.max_recovery_emails_per_day
    }

    #[must_use]
    pub fn sqa_attempts_max(&self) -> i64 {
        self.sqa_attempts_max
    }

    #[must_use]
    pub fn sqa_attempts_window_minutes(&self) -> i64 {
        self.sqa_attempts_window_minutes
    }

    #[must_use]
    pub fn recovery_ticket_ttl_seconds(&self) -> u64 {
        self.recovery_ticket_ttl_seconds
    }
}
