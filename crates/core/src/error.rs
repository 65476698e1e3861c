use std::error::Error as StdError;
use std::fmt::{self, Display};

use coach_relay_model::{ErrorKind as ProviderErrorKind, ModelProviderError};

/// The kind of error that terminated a relayed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The relay is missing something it needs, like a credential.
    Configuration,
    /// The model provider failed or returned something unusable.
    Provider,
    /// A requested tool could not be resolved or failed to run.
    ToolInvocation,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "Configuration error"),
            ErrorKind::Provider => write!(f, "Provider error"),
            ErrorKind::ToolInvocation => write!(f, "Tool invocation error"),
        }
    }
}

/// Describes why a relayed request failed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    provider_kind: Option<ProviderErrorKind>,
    message: String,
}

impl Error {
    /// Creates a new error with the `Configuration` kind.
    #[inline]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self {
            kind: ErrorKind::Configuration,
            provider_kind: None,
            message: message.into(),
        }
    }

    /// Creates a new error with the `Provider` kind, keeping the
    /// provider's own message.
    #[inline]
    pub fn provider(err: Box<dyn ModelProviderError>) -> Self {
        Self {
            kind: ErrorKind::Provider,
            provider_kind: Some(err.kind()),
            message: err.to_string(),
        }
    }

    /// Creates a new error with the `Provider` kind from a message, for
    /// responses that are well-formed on the wire but unusable.
    #[inline]
    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self {
            kind: ErrorKind::Provider,
            provider_kind: Some(ProviderErrorKind::InvalidResponse),
            message: message.into(),
        }
    }

    /// Creates a new error with the `ToolInvocation` kind.
    #[inline]
    pub fn tool_invocation<S: Into<String>>(message: S) -> Self {
        Self {
            kind: ErrorKind::ToolInvocation,
            provider_kind: None,
            message: message.into(),
        }
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the provider-reported kind, for provider errors.
    #[inline]
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        self.provider_kind
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Error {}
