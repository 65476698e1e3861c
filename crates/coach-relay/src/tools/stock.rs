use std::time::Duration;

use coach_relay_core::tool::{Error as ToolError, Tool, ToolResult};
use reqwest::header::USER_AGENT;
use reqwest::{Client, Url};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);
// Market data hosts tend to throttle requests without a user agent.
const CLIENT_NAME: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize, JsonSchema)]
pub struct StockDetailsParameters {
    #[schemars(description = "stock symbol to get details for")]
    ticker: String,
}

/// A tool for looking up current market data of a stock.
///
/// The payload of the market data provider is returned as is, the model
/// picks what it needs from it.
pub struct StockDetailsTool {
    client: Client,
    base_url: String,
    parameter_schema: Value,
}

impl StockDetailsTool {
    /// Creates a new stock details tool querying the chart API under
    /// `base_url`.
    #[inline]
    pub fn new<S: Into<String>>(client: Client, base_url: S) -> Self {
        let mut base_url: String = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        StockDetailsTool {
            client,
            base_url,
            parameter_schema: schema_for!(StockDetailsParameters).to_value(),
        }
    }
}

impl Tool for StockDetailsTool {
    type Input = StockDetailsParameters;

    fn name(&self) -> &str {
        "get_stock_details"
    }

    fn description(&self) -> &str {
        "gets up to date stock information for a given stock symbol"
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: StockDetailsParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let ticker = input.ticker.trim().to_owned();
        let url = check_ticker(&ticker)
            .and_then(|_| chart_url(&self.base_url, &ticker));
        async move {
            let url = url?;
            debug!("looking up market data for {ticker}: {url}");
            let resp = client
                .get(url)
                .header(USER_AGENT, CLIENT_NAME)
                .timeout(LOOKUP_TIMEOUT)
                .send()
                .await
                .map_err(|err| {
                    ToolError::execution_error().with_reason(format!(
                        "market data request failed: {err}"
                    ))
                })?;

            let status = resp.status();
            if !status.is_success() {
                return Err(ToolError::execution_error().with_reason(format!(
                    "market data provider returned {status} for {ticker}"
                )));
            }

            resp.json::<Value>().await.map_err(|err| {
                ToolError::execution_error()
                    .with_reason(format!("malformed market data: {err}"))
            })
        }
    }
}

/// Only symbols like `AAPL`, `BRK-B`, `^GSPC` or `EURUSD=X` are accepted,
/// the ticker ends up in the request path.
fn check_ticker(ticker: &str) -> Result<(), ToolError> {
    if ticker.is_empty() {
        return Err(
            ToolError::invalid_input().with_reason("`ticker` must not be empty")
        );
    }
    let is_symbol = ticker.len() <= 32
        && ticker.chars().any(|c| c.is_ascii_alphanumeric())
        && ticker.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '.' | '^' | '=' | '-')
        });
    if !is_symbol {
        return Err(ToolError::invalid_input()
            .with_reason(format!("`{ticker}` is not a stock symbol")));
    }
    Ok(())
}

fn chart_url(base_url: &str, ticker: &str) -> Result<Url, ToolError> {
    let mut url = Url::parse(base_url).map_err(|err| {
        ToolError::execution_error()
            .with_reason(format!("invalid market data url: {err}"))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            ToolError::execution_error()
                .with_reason("market data url cannot have a path")
        })?
        .pop_if_empty()
        .extend(["v8", "finance", "chart", ticker]);
    Ok(url)
}
