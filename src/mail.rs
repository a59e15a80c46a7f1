//! Outbound mail seam and message builders.
//!
//! Delivery is owned by the host platform's mail queue; the flows only
//! enqueue. Enqueuing is fire-and-forget from the caller's perspective: the
//! trait returns nothing and implementations must not block the request.
//!
//! Every account-changing message carries the request metadata (source
//! address, client string, timestamp) so recipients can recognize requests
//! they never made.

use chrono::Utc;
use tracing::info;

use crate::auth::types::RequestMeta;
use crate::config::AuthConfig;

pub trait MailQueue: Send + Sync {
    fn enqueue(&self, to: &str, subject: &str, body: &str, is_html: bool);
}

/// Local dev queue that logs instead of sending real mail.
#[derive(Clone, Debug)]
pub struct LogMailQueue;

impl MailQueue for LogMailQueue {
    fn enqueue(&self, to: &str, subject: &str, body: &str, is_html: bool) {
        info!(to = %to, subject = %subject, is_html, body_len = body.len(), "mail enqueue stub");
    }
}

pub(crate) struct Message {
    pub(crate) subject: String,
    pub(crate) body: String,
}

/// Human-readable request timestamp, day first.
fn request_timestamp() -> String {
    Utc::now().format("%d/%m/%Y %H:%M:%S").to_string()
}

fn request_footer(meta: &RequestMeta) -> String {
    format!(
        "<p>Request details:<br/>IP address: {}<br/>Browser: {}<br/>Date/time: {}</p>\
         <p>If you did not make this request, you can safely ignore this e-mail.</p>",
        meta.source_ip,
        meta.user_agent,
        request_timestamp()
    )
}

/// Welcome mail for registrations that need no activation.
pub(crate) fn registration_welcome(
    config: &AuthConfig,
    username: &str,
    meta: &RequestMeta,
) -> Message {
    Message {
        subject: format!("{} - Registration", config.site_name()),
        body: format!(
            "<p>Welcome, {username}!</p>\
             <p>Your account on {site} has been created and is ready to use.</p>{footer}",
            site = config.site_name(),
            footer = request_footer(meta),
        ),
    }
}

/// Activation mail with both the activate and the delete link, so the
/// recipient of an unwanted registration can remove the account.
pub(crate) fn registration_activation(
    config: &AuthConfig,
    username: &str,
    activation_key: &str,
    meta: &RequestMeta,
) -> Message {
    let base = config.base_url();
    Message {
        subject: format!("{} - Registration", config.site_name()),
        body: format!(
            "<p>Welcome, {username}!</p>\
             <p>Before you can login, your account on {site} needs to be activated:<br/>\
             <a href=\"{base}/register/activate?key={activation_key}\">Activate my account</a></p>\
             <p>If you did not register this account, you can delete it instead:<br/>\
             <a href=\"{base}/register/deactivate?key={activation_key}\">Delete this account</a></p>{footer}",
            site = config.site_name(),
            footer = request_footer(meta),
        ),
    }
}

/// Recovery mail with the code embedded in the link.
pub(crate) fn account_recovery(
    config: &AuthConfig,
    username: &str,
    code: &str,
    meta: &RequestMeta,
) -> Message {
    let base = config.base_url();
    Message {
        subject: format!("{} - Account Recovery", config.site_name()),
        body: format!(
            "<p>Hello, {username}!</p>\
             <p>A password reset was requested for your account on {site}. \
             Open the link below to choose a new password:<br/>\
             <a href=\"{base}/recover/email/{code}\">Reset my password</a></p>{footer}",
            site = config.site_name(),
            footer = request_footer(meta),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig::new("https://cms.example/".to_string()).with_site_name("Example".to_string())
    }

    fn meta() -> RequestMeta {
        RequestMeta::new("198.51.100.7".to_string(), "TestBrowser/1.0".to_string())
    }

    #[test]
    fn activation_mail_contains_both_action_links() {
        let message = registration_activation(&config(), "alice", "k3y", &meta());
        assert_eq!(message.subject, "Example - Registration");
        assert!(message
            .body
            .contains("https://cms.example/register/activate?key=k3y"));
        assert!(message
            .body
            .contains("https://cms.example/register/deactivate?key=k3y"));
        assert!(message.body.contains("198.51.100.7"));
        assert!(message.body.contains("TestBrowser/1.0"));
    }

    #[test]
    fn recovery_mail_embeds_code_in_link() {
        let message = account_recovery(&config(), "alice", "c0de", &meta());
        assert_eq!(message.subject, "Example - Account Recovery");
        assert!(message.body.contains("https://cms.example/recover/email/c0de"));
    }

    #[test]
    fn welcome_mail_carries_request_metadata() {
        let message = registration_welcome(&config(), "bob", &meta());
        assert!(message.body.contains("bob"));
        assert!(message.body.contains("198.51.100.7"));
    }

    #[test]
    fn request_timestamp_is_day_first() {
        let stamp = request_timestamp();
        // dd/mm/yyyy HH:MM:SS
        assert_eq!(stamp.len(), 19);
        assert_eq!(&stamp[2..3], "/");
        assert_eq!(&stamp[5..6], "/");
    }

    #[test]
    fn log_mail_queue_is_fire_and_forget() {
        LogMailQueue.enqueue("a@example.com", "subject", "body", true);
    }
}
