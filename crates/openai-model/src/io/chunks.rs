#[cfg(test)]
use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Response;
use tokio::time::timeout;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Transport(String),
    IdleTimeout,
}

/// An adapter for streaming byte chunks.
pub enum Chunks {
    Response {
        response: Response,
        idle_timeout: Option<Duration>,
    },
    #[cfg(test)]
    VecDeque(VecDeque<Bytes>),
}

impl Chunks {
    /// Wraps a response body. If `idle_timeout` is set, waiting longer
    /// than it for a single chunk fails the stream.
    pub fn from_response(
        response: Response,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Chunks::Response {
            response,
            idle_timeout,
        }
    }

    #[cfg(test)]
    pub fn from_vec_deque(vec: VecDeque<Bytes>) -> Self {
        Chunks::VecDeque(vec)
    }

    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response {
                response,
                idle_timeout,
            } => {
                let chunk = match idle_timeout {
                    Some(duration) => timeout(*duration, response.chunk())
                        .await
                        .map_err(|_| Error::IdleTimeout)?,
                    None => response.chunk().await,
                };
                chunk.map_err(|err| Error::Transport(err.to_string()))
            }
            #[cfg(test)]
            Chunks::VecDeque(vec) => {
                let chunk = vec.pop_front();
                Ok(chunk)
            }
        }
    }
}
