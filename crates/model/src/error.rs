use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The provider rejected the credential.
    Authentication,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The provider sent something we could not understand.
    InvalidResponse,
    /// The connection to the provider failed or timed out.
    Network,
    /// Any other errors.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Authentication => write!(f, "Authentication failed"),
            ErrorKind::RateLimitExceeded => write!(f, "Rate limit exceeded"),
            ErrorKind::InvalidResponse => write!(f, "Invalid response"),
            ErrorKind::Network => write!(f, "Network error"),
            ErrorKind::Other => write!(f, "Other error"),
        }
    }
}
