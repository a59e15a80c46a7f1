//! Account recovery: the e-mail code flow and the secret-question flow.
//!
//! Both flows end in the same place, a password change written in the same
//! transaction as its audit entry. They differ in how the requester proves
//! control of the account: a single-use code delivered to the stored e-mail
//! address, or the stored secret answer gated by a short-lived signed ticket
//! from the captcha-checked first step.

pub mod email;
pub mod sqa;

mod ticket;
