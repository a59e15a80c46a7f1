//! # siteauth (Authentication & Account-Recovery Engine)
//!
//! `siteauth` is the authentication subsystem of a web content-management
//! platform: registration with optional activation, login with ban and
//! rate-limit enforcement, multi-channel account recovery (e-mail code and
//! secret question/answer), account self-service, per-user event auditing,
//! and group-based permission administration.
//!
//! ## Library, not a service
//!
//! The crate is invoked as library logic by the surrounding request-routing
//! layer. Each flow resolves to a single `Result` per request; no panic or
//! raw store error crosses into the rendering layer. External collaborators
//! (captcha verification, outbound mail) are trait seams so the host platform
//! can plug its own implementations.
//!
//! ## Security model
//!
//! - Credentials are stored as salted SHA-512 digests produced by
//!   [`auth::hasher::credential_digest`]. The two process-wide salts are
//!   generated once at first startup, persisted outside the database, and
//!   passed explicitly to every hashing call.
//! - Failed logins and secret-answer attempts are throttled per source
//!   address over sliding windows. The throttle is best-effort: benign races
//!   under concurrent attempts are acceptable and never block request latency.
//! - All statements are parameterized; user-supplied values never reach the
//!   store as SQL text.
//! - Recovery flows render unknown tokens as "nothing to do" rather than
//!   confirming token existence.

pub mod auth;
pub mod captcha;
pub mod config;
pub mod error;
pub mod mail;

pub use auth::audit::{AuditEvent, AuditLogEntry, AuditSort};
pub use auth::salts::SaltPair;
pub use auth::session::{SessionCheck, SessionIdentity};
pub use auth::types::RequestMeta;
pub use captcha::{CaptchaVerifier, NoopCaptcha};
pub use config::AuthConfig;
pub use error::{AuthError, ConflictField};
pub use mail::{LogMailQueue, MailQueue};
