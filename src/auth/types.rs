//! Shared request types for the auth flows.

/// Per-request metadata the routing layer extracts from the transport.
///
/// The source address keys the rate-limit ledgers; address and client string
/// together form the audit context and appear in outbound mail so users can
/// recognize requests they never made.
#[derive(Clone, Debug)]
pub struct RequestMeta {
    pub source_ip: String,
    pub user_agent: String,
}

impl RequestMeta {
    #[must_use]
    pub fn new(source_ip: String, user_agent: String) -> Self {
        Self {
            source_ip,
            user_agent,
        }
    }

    /// Free-text context stored with audit entries.
    #[must_use]
    pub fn audit_context(&self) -> String {
        format!("{} - {}", self.source_ip, self.user_agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_context_joins_ip_and_agent() {
        let meta = RequestMeta::new("203.0.113.9".to_string(), "Agent/2.0".to_string());
        assert_eq!(meta.audit_context(), "203.0.113.9 - Agent/2.0");
    }
}
