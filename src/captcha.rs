//! Captcha verification seam.
//!
//! The host platform owns captcha generation and rendering; the flows only
//! need a yes/no verdict on the submitted response.

pub trait CaptchaVerifier: Send + Sync {
    fn verify(&self, response: &str) -> bool;
}

/// Accepts every response. For tests and deployments that disable captchas.
#[derive(Clone, Debug)]
pub struct NoopCaptcha;

impl CaptchaVerifier for NoopCaptcha {
    fn verify(&self, _response: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_captcha_accepts() {
        assert!(NoopCaptcha.verify("anything"));
        assert!(NoopCaptcha.verify(""));
    }
}
