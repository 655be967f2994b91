//! Typed error types for Junction registry operations.
//!
//! Provides [`RegistryError`] — the canonical error type for everything the
//! [`ServerRegistry`] can reject: unknown servers, servers in a
//! non-connected state, upstream failures, and pending-request bookkeeping.
//!
//! [`ServerRegistry`]: https://docs.rs/junction-registry

use thiserror::Error;

/// Canonical error type for registry and dispatch operations.
///
/// All variants are `#[non_exhaustive]` to allow future additions without
/// breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The requested server is not registered.
    #[error("server not found: '{name}'{}", .suggestion.as_deref().map(|s| format!(" ({s})")).unwrap_or_default())]
    ServerNotFound {
        /// The server name that was requested.
        name: String,
        /// Optional "did you mean" hint from fuzzy matching.
        suggestion: Option<String>,
    },

    /// The server is registered but not currently connected.
    #[error("server '{name}' is not connected (status: {status})")]
    ServerUnavailable {
        /// The server that was addressed.
        name: String,
        /// Its current connection status.
        status: String,
    },

    /// An upstream MCP server returned an error.
    #[error("upstream error from '{server}': {message}")]
    Upstream {
        /// The server that returned the error.
        server: String,
        /// The error message from the upstream server.
        message: String,
    },

    /// No pending request exists with the given id.
    #[error("no pending request with id '{0}'")]
    PendingNotFound(String),

    /// The registry has been shut down.
    #[error("Registry shutting down")]
    ShuttingDown,

    /// An internal error (catch-all for unexpected failures).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RegistryError {
    /// Build a `ServerNotFound` with a fuzzy suggestion drawn from the
    /// currently registered server names.
    pub fn server_not_found(name: impl Into<String>, known: &[&str]) -> Self {
        let name = name.into();
        let suggestion = find_similar_server(&name, known);
        Self::ServerNotFound { name, suggestion }
    }

    /// Returns a static error code string for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ServerNotFound { .. } => "SERVER_NOT_FOUND",
            Self::ServerUnavailable { .. } => "SERVER_UNAVAILABLE",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::PendingNotFound(_) => "PENDING_NOT_FOUND",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Returns whether the operation that produced this error may succeed if
    /// retried.
    pub fn retryable(&self) -> bool {
        match self {
            Self::ServerUnavailable { .. } => true,
            Self::Upstream { .. } => true,
            Self::ServerNotFound { .. } => false,
            Self::PendingNotFound(_) => false,
            Self::ShuttingDown => false,
            Self::Internal(_) => false,
        }
    }
}

/// Find the closest registered server name using Levenshtein distance.
///
/// Returns a suggestion string if a server within edit distance 3 is found.
fn find_similar_server(name: &str, known: &[&str]) -> Option<String> {
    let mut best: Option<(usize, &str)> = None;
    for &candidate in known {
        let dist = strsim::levenshtein(name, candidate);
        if dist <= 3 && best.is_none_or(|(d, _)| dist < d) {
            best = Some((dist, candidate));
        }
    }
    best.map(|(_, s)| format!("did you mean '{s}'?"))
}

// Compile-time assertion: RegistryError must be Send + Sync + 'static so it
// can cross the dispatcher seam as anyhow::Error.
const _: fn() = || {
    fn assert_bounds<T: Send + Sync + 'static>() {}
    assert_bounds::<RegistryError>();
};
