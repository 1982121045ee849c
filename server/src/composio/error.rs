use derive_more::derive::Display;

pub type ComposioResult<T> = Result<T, ComposioError>;

#[derive(Debug, Display)]
pub enum ComposioError {
    #[display("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },
    #[display("{endpoint} returned {status}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[display("unexpected response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

impl std::error::Error for ComposioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComposioError::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}
