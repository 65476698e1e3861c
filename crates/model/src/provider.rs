use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;
use crate::response::{ModelCompletion, ModelStream};

/// The error type for a model provider.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that represents a model provider, which is an entry for
/// sampling chat completions.
///
/// Once the provider is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it,
/// and the provider should be prepared for being dropped anytime.
pub trait ModelProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// The streaming response type for this provider.
    type Stream: ModelStream<Error = Self::Error>;

    /// Sends a request and waits for the fully materialized message.
    fn complete(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<ModelCompletion, Self::Error>> + Send + 'static;

    /// Sends a request and returns a stream of incremental events.
    ///
    /// The returned future resolves once the provider has accepted the
    /// request, so failures like a rejected credential surface here
    /// instead of in the middle of the stream.
    fn stream(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static;
}
