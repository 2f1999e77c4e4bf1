//! Publisher identifiers
//!
//! A [`PublisherId`] names one logical stream. It arrives from the publisher's
//! `init` message and from the viewer's request path, so it is validated once
//! here and carried around as an already-checked value.

use serde::Serialize;

use super::error::RegistryError;

/// Maximum accepted length of a publisher identifier, in bytes
pub const MAX_PUBLISHER_ID_LEN: usize = 256;

/// Unique identifier for one logical stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PublisherId(String);

impl PublisherId {
    /// Validate and wrap a publisher identifier
    ///
    /// Rejects identifiers that are empty or whitespace-only, longer than
    /// [`MAX_PUBLISHER_ID_LEN`], or that contain `/` or control characters.
    pub fn new(id: impl Into<String>) -> Result<Self, RegistryError> {
        let id = id.into();

        if id.trim().is_empty()
            || id.len() > MAX_PUBLISHER_ID_LEN
            || id.chars().any(|c| c == '/' || c.is_control())
        {
            return Err(RegistryError::InvalidPublisherId(id));
        }

        Ok(Self(id))
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe rendering used to name storage files
    ///
    /// Anything outside `[A-Za-z0-9_-]` becomes `_`. Distinct ids may map to
    /// the same stem, so storage names also carry a generation number.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Percent-encoded form for use in a URL path segment
    pub fn url_segment(&self) -> String {
        urlencoding::encode(&self.0).into_owned()
    }
}

impl std::fmt::Display for PublisherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PublisherId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PublisherId {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for PublisherId {
    type Error = RegistryError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
