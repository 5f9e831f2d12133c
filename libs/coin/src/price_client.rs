use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, header::DATE};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::FetchError;
use crate::types::{Observation, Price};

const DEFAULT_BASE_API: &str = "https://min-api.cryptocompare.com";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const QUOTE_CURRENCY: &str = "USD";

/// Anything that can turn a symbol into a timestamped price.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<Observation, FetchError>;
}

#[derive(Clone)]
pub struct PriceClient {
    client: Client,
    base_api: String,
}

impl PriceClient {
    pub fn new(base_api: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("coin/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_api })
    }

    /// Create a new PriceClient from environment variables.
    /// PRICE_API_BASE_URL and PRICE_API_TIMEOUT_SECS are optional.
    pub fn from_env() -> Result<Self> {
        use std::env;

        let base_api = env::var("PRICE_API_BASE_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_API.to_string());
        let timeout = env::var("PRICE_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(base_api, Duration::from_secs(timeout))
    }
}

#[async_trait]
impl PriceSource for PriceClient {
    async fn fetch(&self, symbol: &str) -> Result<Observation, FetchError> {
        let url = format!("{}/data/pricemulti", self.base_api.trim_end_matches('/'));

        let res = self
            .client
            .get(url)
            .query(&[("fsyms", symbol), ("tsyms", QUOTE_CURRENCY)])
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let date = res
            .headers()
            .get(DATE)
            .ok_or(FetchError::MissingDateHeader)?
            .to_str()
            .map_err(|_| FetchError::InvalidDateHeader("non-ascii header value".to_string()))?;
        let observed_at = parse_observed_at(date)?;

        let body = res.text().await?;
        let price = parse_quote(&body, symbol)?;

        Ok(Observation { price, observed_at })
    }
}

/// Parse an RFC 1123 `Date` header into epoch seconds.
pub fn parse_observed_at(header: &str) -> Result<i64, FetchError> {
    DateTime::parse_from_rfc2822(header.trim())
        .map(|dt| dt.timestamp())
        .map_err(|_| FetchError::InvalidDateHeader(header.to_string()))
}

//
// Match the pricemulti JSON
// {"BTC":{"USD":42.37}} or {"Response":"Error","Message":"..."}
//
pub fn parse_quote(body: &str, symbol: &str) -> Result<Price, FetchError> {
    let quotes = match serde_json::from_str(body)? {
        PriceMultiResponse::Error { response, message } if response == "Error" => {
            return Err(FetchError::Api(
                message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        PriceMultiResponse::Error { .. } => HashMap::new(),
        PriceMultiResponse::Quotes(quotes) => quotes,
    };

    let Some(quote) = quotes
        .get(symbol)
        .and_then(|q| q.get(QUOTE_CURRENCY))
        .copied()
    else {
        return Err(FetchError::MissingQuote(symbol.to_string()));
    };

    Price::from_decimal(quote).ok_or(FetchError::InvalidPrice(quote.to_string()))
}

/// Body of `/data/pricemulti`: either the service's error envelope or
/// `{ "<symbol>": { "<currency>": <price> } }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceMultiResponse {
    Error {
        #[serde(rename = "Response")]
        response: String,
        #[serde(rename = "Message", default)]
        message: Option<String>,
    },
    Quotes(HashMap<String, HashMap<String, Decimal>>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quote_for_symbol() {
        let price = parse_quote(r#"{"BTC":{"USD":42.37}}"#, "BTC").unwrap();
        assert_eq!(price.cents(), 4237);
    }

    #[test]
    fn parses_integer_and_tiny_quotes() {
        assert_eq!(parse_quote(r#"{"ETH":{"USD":3000}}"#, "ETH").unwrap().cents(), 300000);
        assert_eq!(parse_quote(r#"{"SHIB":{"USD":0.00001234}}"#, "SHIB").unwrap().cents(), 0);
    }

    #[test]
    fn symbol_lookup_is_case_sensitive() {
        let err = parse_quote(r#"{"BTC":{"USD":1.5}}"#, "btc").unwrap_err();
        assert!(matches!(err, FetchError::MissingQuote(s) if s == "btc"));
    }

    #[test]
    fn reports_api_error_envelope() {
        let body = r#"{"Response":"Error","Message":"fsyms param is invalid","HasWarning":false}"#;
        let err = parse_quote(body, "NOPE").unwrap_err();
        assert!(matches!(err, FetchError::Api(m) if m == "fsyms param is invalid"));
    }

    #[test]
    fn reports_undecodable_body() {
        let err = parse_quote("<html>bad gateway</html>", "BTC").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn reports_non_numeric_quote() {
        let err = parse_quote(r#"{"BTC":{"USD":true}}"#, "BTC").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn reports_missing_currency() {
        let err = parse_quote(r#"{"BTC":{"EUR":39.1}}"#, "BTC").unwrap_err();
        assert!(matches!(err, FetchError::MissingQuote(s) if s == "BTC"));
    }

    #[test]
    fn quote_keeps_decimal_digits_exact() {
        assert_eq!(parse_quote(r#"{"XRP":{"USD":0.29}}"#, "XRP").unwrap().cents(), 29);
        assert_eq!(
            parse_quote(r#"{"BTC":{"USD":61234.5678}}"#, "BTC").unwrap().cents(),
            6123456
        );
    }

    #[test]
    fn transport_error_keeps_its_cause() {
        let cause = Client::new().get("http://[::1").build().unwrap_err();
        let err = FetchError::from(cause);

        assert!(matches!(err, FetchError::Transport(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn parses_rfc1123_date_header() {
        assert_eq!(
            parse_observed_at("Sun, 06 Nov 1994 08:49:37 GMT").unwrap(),
            784111777
        );
    }

    #[test]
    fn rejects_malformed_date_header() {
        let err = parse_observed_at("yesterday-ish").unwrap_err();
        assert!(matches!(err, FetchError::InvalidDateHeader(h) if h == "yesterday-ish"));
    }
}
