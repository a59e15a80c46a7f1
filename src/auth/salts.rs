//! Process-wide hashing salts.
//!
//! Two secret strings shared read-only by every hashing call for the process
//! lifetime. They are persisted outside the database: generated at first
//! startup if the file is absent, loaded verbatim on every later startup.
//! Losing or altering them makes every stored credential digest
//! unverifiable, so the file must live with the deployment's durable state.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use super::utils::random_text;

const SALT_LENGTH: usize = 16;

#[derive(Serialize, Deserialize)]
struct SaltsFile {
    salt1: String,
    salt2: String,
}

/// The two process-scoped salts, injected explicitly into every hashing
/// operation instead of read from ambient state.
pub struct SaltPair {
    salt1: SecretString,
    salt2: SecretString,
}

impl SaltPair {
    /// Load the salts file, generating it first if it does not exist yet.
    ///
    /// Generation happens at most once, before request traffic is accepted,
    /// so concurrent readers never race with the writer.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read, parsed, or written.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read salts file {}", path.display()))?;
            let file: SaltsFile = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse salts file {}", path.display()))?;
            return Ok(Self::from_parts(file.salt1, file.salt2));
        }

        let file = SaltsFile {
            salt1: random_text(SALT_LENGTH),
            salt2: random_text(SALT_LENGTH),
        };
        let raw = serde_json::to_string_pretty(&file).context("failed to serialize salts")?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write salts file {}", path.display()))?;
        Ok(Self::from_parts(file.salt1, file.salt2))
    }

    #[must_use]
    pub fn from_parts(salt1: String, salt2: String) -> Self {
        Self {
            salt1: SecretString::from(salt1),
            salt2: SecretString::from(salt2),
        }
    }

    #[must_use]
    pub fn salt1(&self) -> &str {
        self.salt1.expose_secret()
    }

    #[must_use]
    pub fn salt2(&self) -> &str {
        self.salt2.expose_secret()
    }

    /// Signing key for short-lived recovery tickets, derived from the salt
    /// pair so it survives restarts without another secret to manage.
    pub(crate) fn ticket_key(&self) -> Vec<u8> {
        let mut hasher = Sha512::new();
        hasher.update(self.salt1().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.salt2().as_bytes());
        hasher.finalize().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_then_reloads_same_salts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("salts.json");

        let generated = SaltPair::load_or_generate(&path)?;
        assert_eq!(generated.salt1().len(), SALT_LENGTH);
        assert_eq!(generated.salt2().len(), SALT_LENGTH);
        assert!(generated.salt1().chars().all(|c| c.is_ascii_alphanumeric()));

        let reloaded = SaltPair::load_or_generate(&path)?;
        assert_eq!(generated.salt1(), reloaded.salt1());
        assert_eq!(generated.salt2(), reloaded.salt2());
        Ok(())
    }

    #[test]
    fn ticket_key_depends_on_both_salts() {
        let a = SaltPair::from_parts("one".to_string(), "two".to_string());
        let b = SaltPair::from_parts("one".to_string(), "other".to_string());
        let c = SaltPair::from_parts("one".to_string(), "two".to_string());
        assert_ne!(a.ticket_key(), b.ticket_key());
        assert_eq!(a.ticket_key(), c.ticket_key());
    }

    #[test]
    fn rejects_malformed_salts_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("salts.json");
        fs::write(&path, "not json")?;
        assert!(SaltPair::load_or_generate(&path).is_err());
        Ok(())
    }
}
