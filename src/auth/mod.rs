//! Authentication, recovery, and account-administration flows.
//!
//! Each flow module exposes async operations that take the database pool,
//! the process configuration, and the request metadata, and resolve to a
//! single `Result` the routing layer can render. State machines follow the
//! platform's page flows:
//!
//! - login: form -> validating -> rejected / authenticated
//! - registration: form -> created -> (pending activation ->) activated / deactivated
//! - e-mail recovery: request -> dispatched -> link opened -> password changed
//! - secret-question recovery: username+captcha -> answer form -> changed
//!
//! Mutations that must not be half-applied (token consumption + password
//! change, activation + group move) run inside a single transaction;
//! correctness rests on the store's atomicity, not on in-process locking.

pub mod account;
pub mod admin;
pub mod audit;
pub mod groups;
pub mod hasher;
pub mod login;
pub mod rate_limit;
pub mod recovery;
pub mod register;
pub mod salts;
pub mod session;
pub mod types;
pub mod validate;

mod storage;
mod utils;

pub use login::{login, LoginRequest, LoginSuccess};
pub use register::{
    activate, activation_preview, deactivate, register, ActivationOutcome, PendingActivation,
    RegisterOutcome, RegisterRequest,
};
pub use session::validate_session;
