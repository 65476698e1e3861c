use std::fmt::{self, Debug};
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// Process-wide settings, read once at startup.
///
/// Every field can be given as a flag or as an environment variable. A
/// `.env` file in the working directory is loaded by the binary before
/// parsing.
#[derive(Clone, Parser)]
#[command(name = "coach-relay", version, about)]
pub struct Settings {
    /// Address to listen on.
    #[arg(long, env = "COACH_RELAY_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Provider API key, used when a request doesn't bring its own.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the chat-completions provider.
    #[arg(
        long,
        env = "OPENAI_BASE_URL",
        default_value = "https://api.openai.com/v1"
    )]
    pub base_url: String,

    /// Model used when a request doesn't name one.
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4.1-mini")]
    pub model: String,

    /// Default instruction message.
    #[arg(
        long,
        env = "COACH_RELAY_INSTRUCTIONS",
        default_value = "You are a supportive mental coach."
    )]
    pub instructions: String,

    /// Don't offer tools to the model.
    #[arg(long, env = "COACH_RELAY_NO_TOOLS")]
    pub no_tools: bool,

    /// Timeout of non-streaming provider requests, and idle timeout of
    /// streaming ones, in seconds.
    #[arg(
        long,
        env = "COACH_RELAY_REQUEST_TIMEOUT_SECS",
        default_value_t = 120
    )]
    pub request_timeout_secs: u64,

    /// Base URL of the market data provider.
    #[arg(
        long,
        env = "COACH_RELAY_MARKET_DATA_URL",
        default_value = "https://query1.finance.yahoo.com"
    )]
    pub market_data_url: String,
}

impl Settings {
    /// Returns the provider request timeout.
    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the process-wide API key, if a non-empty one is set.
    #[inline]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.is_empty())
    }
}

impl Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("bind", &self.bind)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("instructions", &self.instructions)
            .field("no_tools", &self.no_tools)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("market_data_url", &self.market_data_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let settings = Settings::try_parse_from([
            "coach-relay",
            "--bind",
            "127.0.0.1:9000",
            "--api-key",
            "sk-secret",
            "--model",
            "gpt-test",
            "--request-timeout-secs",
            "5",
            "--no-tools",
        ])
        .unwrap();
        assert_eq!(settings.bind, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(settings.api_key(), Some("sk-secret"));
        assert_eq!(settings.model, "gpt-test");
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        assert!(settings.no_tools);

        let debug = format!("{settings:?}");
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_empty_api_key() {
        let settings =
            Settings::try_parse_from(["coach-relay", "--api-key", ""]).unwrap();
        assert_eq!(settings.api_key(), None);
    }

    #[test]
    fn test_invalid_bind() {
        assert!(
            Settings::try_parse_from(["coach-relay", "--bind", "nowhere"])
                .is_err()
        );
    }
}
