//! Error types for the repository listing seam.

use thiserror::Error;

/// Errors raised while enumerating an organization's repositories.
#[derive(Debug, Error)]
pub enum ListError {
    /// No token in the environment; detected before any request is made.
    #[error("no GitHub credential found: set the {var} environment variable")]
    MissingCredential { var: String },

    /// The API rejected the token.
    #[error("GitHub rejected the credential while listing {org} (HTTP {status})")]
    Authentication { org: String, status: u16 },

    /// Network, HTTP or payload failure while fetching a page.
    #[error("failed to fetch repositories page {page}: {message}")]
    Transport { page: u32, message: String },
}

impl ListError {
    /// Credential problems abort the run before any repository work.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ListError::MissingCredential { .. } | ListError::Authentication { .. }
        )
    }
}
