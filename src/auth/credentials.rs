//! Remembered login passwords, kept in the OS keychain.
//!
//! Only the interactive login prompt uses this; the durable session never
//! contains a password, and a keychain-less environment just means the user
//! types their password again.

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

const SERVICE_NAME: &str = "brightroot-client";

pub struct RememberedLogin;

impl RememberedLogin {
    /// Remember the password for this identifier.
    pub fn remember(identifier: &str, password: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, identifier)
            .context("Failed to open keychain entry")?;
        entry
            .set_password(password)
            .context("Failed to store password in keychain")?;
        Ok(())
    }

    /// The remembered password, if the keychain holds one.
    pub fn recall(identifier: &str) -> Option<String> {
        let entry = Entry::new(SERVICE_NAME, identifier).ok()?;
        match entry.get_password() {
            Ok(password) => Some(password),
            Err(err) => {
                debug!(error = %err, "No remembered password");
                None
            }
        }
    }

    /// Forget the remembered password. Best effort; absence is fine.
    pub fn forget(identifier: &str) {
        if let Ok(entry) = Entry::new(SERVICE_NAME, identifier) {
            let _ = entry.delete_credential();
        }
    }
}
