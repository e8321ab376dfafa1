//! Credential wrapper that keeps values out of logs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An API key, token or signing secret.
///
/// `Debug` and `Display` show only a short prefix.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps a raw credential.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw credential.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns whether the credential is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the credential with everything after its first few characters
    /// replaced by `***`.
    pub fn masked(&self) -> String {
        const VISIBLE: usize = 6;
        let prefix: String = self.0.chars().take(VISIBLE).collect();
        if self.0.chars().count() <= VISIBLE * 2 {
            return "***".to_string();
        }
        format!("{prefix}***")
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Secret").field(&self.masked()).finish()
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}
