use thiserror::Error;

/// Failure talking to one media server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{server}: request to {path} timed out")]
    Timeout { server: String, path: String },

    #[error("{server}: request to {path} failed: {source}")]
    Transport {
        server: String,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{server}: {path} returned HTTP {status}")]
    Status { server: String, path: String, status: u16 },

    #[error("{server}: unexpected response from {path}: {message}")]
    Decode { server: String, path: String, message: String },

    #[error("{server}: authentication failed: {message}")]
    Auth { server: String, message: String },

    #[error("{server}: item {id} not found")]
    NotFound { server: String, id: String },

    #[error("{server}: {message}")]
    Unsupported { server: String, message: String },
}

impl ServerError {
    pub(crate) fn from_reqwest(server: &str, path: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServerError::Timeout {
                server: server.to_string(),
                path: path.to_string(),
            }
        } else if let Some(status) = err.status() {
            ServerError::Status {
                server: server.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            ServerError::Decode {
                server: server.to_string(),
                path: path.to_string(),
                message: err.to_string(),
            }
        } else {
            ServerError::Transport {
                server: server.to_string(),
                path: path.to_string(),
                source: err,
            }
        }
    }

    pub(crate) fn decode(server: &str, path: &str, message: impl Into<String>) -> Self {
        ServerError::Decode {
            server: server.to_string(),
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Worth retrying: timeouts, connection failures, throttling and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ServerError::Timeout { .. } => true,
            ServerError::Transport { source, .. } => source.is_connect() || source.is_request(),
            ServerError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
