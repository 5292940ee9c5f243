//! Error taxonomy for the inventory adapter
//!
//! Every failure that can reach a resource read or tool call is one of these
//! variants. Authentication failures are retried once by the HTTP middleware;
//! everything else propagates to the caller untouched.

use reqwest_middleware as rqm;

/// Result alias used throughout the library
pub type Result<T, E = InventoryError> = std::result::Result<T, E>;

/// Errors surfaced by the token manager, API client, resolver and dispatcher
#[derive(Debug, Clone, thiserror::Error)]
pub enum InventoryError {
    /// The OAuth exchange was rejected, or the upstream rejected a freshly
    /// refreshed token. Needs operator intervention.
    #[error("Authentication failed: {0}")]
    AuthFatal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A mutating tool could not resolve its target to exactly one item
    #[error("Ambiguous target '{name}': expected exactly one matching item, found {}", describe_candidates(.candidates))]
    AmbiguousTarget { name: String, candidates: Vec<String> },

    /// Non-authentication HTTP failure from the inventory API
    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Configuration error: {0}")]
    Config(String),

    /// Network failure with no HTTP status (DNS, connect, reset)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Rejected locally before any upstream call was made
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upstream payload is missing a required field or has the wrong shape
    #[error("Unexpected upstream payload: {0}")]
    Parse(String),
}

fn describe_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        "0".to_string()
    } else {
        format!("{} ({})", candidates.len(), candidates.join(", "))
    }
}

impl InventoryError {
    /// Stable snake_case tag, used in tool output and JSON-RPC error data
    pub fn kind(&self) -> &'static str {
        match self {
            InventoryError::AuthFatal(_) => "auth_fatal",
            InventoryError::NotFound(_) => "not_found",
            InventoryError::AmbiguousTarget { .. } => "ambiguous_target",
            InventoryError::Upstream { .. } => "upstream_error",
            InventoryError::Timeout => "timeout",
            InventoryError::Config(_) => "config_error",
            InventoryError::Transport(_) => "transport_error",
            InventoryError::InvalidInput(_) => "invalid_input",
            InventoryError::Parse(_) => "parse_error",
        }
    }

    /// Shorthand for a strict-parse failure
    pub fn parse(message: impl Into<String>) -> Self {
        InventoryError::Parse(message.into())
    }

    /// Shorthand for a local validation failure
    pub fn invalid(message: impl Into<String>) -> Self {
        InventoryError::InvalidInput(message.into())
    }
}

impl From<reqwest::Error> for InventoryError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            InventoryError::Timeout
        } else if let Some(status) = error.status() {
            InventoryError::Upstream {
                status: status.as_u16(),
                body: error.to_string(),
            }
        } else if error.is_decode() {
            InventoryError::Parse(error.to_string())
        } else {
            InventoryError::Transport(error.to_string())
        }
    }
}

impl From<rqm::Error> for InventoryError {
    fn from(error: rqm::Error) -> Self {
        match error {
            // Errors raised by our own middleware travel as anyhow::Error
            rqm::Error::Middleware(inner) => match inner.downcast::<InventoryError>() {
                Ok(error) => error,
                Err(other) => InventoryError::Transport(other.to_string()),
            },
            rqm::Error::Reqwest(error) => error.into(),
        }
    }
}

impl From<InventoryError> for rqm::Error {
    fn from(error: InventoryError) -> Self {
        rqm::Error::Middleware(error.into())
    }
}
