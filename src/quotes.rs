// src/quotes.rs
use crate::error::AppError;
use crate::models::Quote;
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{error, info, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<Quote, AppError>;
}

#[derive(Deserialize, Default)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "02. open")]
    open: Option<String>,
    #[serde(rename = "03. high")]
    high: Option<String>,
    #[serde(rename = "04. low")]
    low: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume")]
    volume: Option<String>,
    #[serde(rename = "07. latest trading day")]
    latest_trading_day: Option<String>,
    #[serde(rename = "08. previous close")]
    previous_close: Option<String>,
    #[serde(rename = "09. change")]
    change: Option<String>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

#[derive(Deserialize)]
struct AlphaVantageResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

fn field<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| AppError::QuoteUnavailable(format!("quote is missing {}", name)))
}

fn decimal_field(value: &Option<String>, name: &str) -> Result<Decimal, AppError> {
    let raw = field(value, name)?;
    Decimal::from_str(raw.trim_end_matches('%'))
        .map_err(|_| AppError::QuoteUnavailable(format!("malformed {}: {}", name, raw)))
}

fn into_quote(symbol: &str, response: AlphaVantageResponse) -> Result<Quote, AppError> {
    let raw = response.global_quote.unwrap_or_default();
    if raw.price.is_none() {
        if let Some(message) = response.note.or(response.information) {
            warn!("Quote provider throttled request for {}: {}", symbol, message);
            return Err(AppError::QuoteUnavailable("rate limit reached".to_string()));
        }
        if let Some(message) = response.error_message {
            info!("Quote provider rejected {}: {}", symbol, message);
        }
        return Err(AppError::InvalidSymbol(symbol.to_string()));
    }

    let volume = field(&raw.volume, "volume")?;
    let trading_day = field(&raw.latest_trading_day, "latest trading day")?;
    Ok(Quote {
        symbol: raw
            .symbol
            .clone()
            .unwrap_or_else(|| symbol.to_string()),
        open: decimal_field(&raw.open, "open")?,
        high: decimal_field(&raw.high, "high")?,
        low: decimal_field(&raw.low, "low")?,
        price: decimal_field(&raw.price, "price")?,
        volume: volume
            .parse()
            .map_err(|_| AppError::QuoteUnavailable(format!("malformed volume: {}", volume)))?,
        latest_trading_day: NaiveDate::parse_from_str(trading_day, "%Y-%m-%d").map_err(|_| {
            AppError::QuoteUnavailable(format!("malformed trading day: {}", trading_day))
        })?,
        previous_close: decimal_field(&raw.previous_close, "previous close")?,
        change: decimal_field(&raw.change, "change")?,
        change_percent: decimal_field(&raw.change_percent, "change percent")?,
    })
}

pub struct AlphaVantageClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantageClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl QuoteProvider for AlphaVantageClient {
    async fn quote(&self, symbol: &str) -> Result<Quote, AppError> {
        info!("Requesting stock quote for {}", symbol);
        let response = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!("Request to AlphaVantage timed out for {}", symbol);
                    AppError::QuoteUnavailable("request to quote provider timed out".to_string())
                } else {
                    error!("Request to AlphaVantage failed for {}: {}", symbol, e);
                    AppError::QuoteUnavailable("request to quote provider failed".to_string())
                }
            })?;

        if !response.status().is_success() {
            error!(
                "Failed to fetch quote for {}: HTTP {}",
                symbol,
                response.status()
            );
            return Err(AppError::QuoteUnavailable(format!(
                "quote provider returned HTTP {}",
                response.status()
            )));
        }

        let body = response.json::<AlphaVantageResponse>().await.map_err(|e| {
            error!("Failed to parse quote response for {}: {}", symbol, e);
            AppError::QuoteUnavailable("unreadable quote provider response".to_string())
        })?;
        into_quote(symbol, body)
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted provider: fixed prices per symbol, optional failing symbols.
    #[derive(Default)]
    pub struct FakeQuotes {
        prices: Mutex<HashMap<String, Decimal>>,
        unavailable: Mutex<Vec<String>>,
    }

    impl FakeQuotes {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_price(self, symbol: &str, price: Decimal) -> Self {
            self.set_price(symbol, price);
            self
        }

        pub fn set_price(&self, symbol: &str, price: Decimal) {
            self.prices.lock().unwrap().insert(symbol.to_string(), price);
        }

        pub fn fail(&self, symbol: &str) {
            self.unavailable.lock().unwrap().push(symbol.to_string());
        }
    }

    #[async_trait]
    impl QuoteProvider for FakeQuotes {
        async fn quote(&self, symbol: &str) -> Result<Quote, AppError> {
            if self.unavailable.lock().unwrap().iter().any(|s| s == symbol) {
                return Err(AppError::QuoteUnavailable("provider down".to_string()));
            }
            let price = self
                .prices
                .lock()
                .unwrap()
                .get(symbol)
                .copied()
                .ok_or_else(|| AppError::InvalidSymbol(symbol.to_string()))?;
            Ok(Quote {
                symbol: symbol.to_string(),
                open: price,
                high: price,
                low: price,
                price,
                volume: 1_000,
                latest_trading_day: NaiveDate::from_ymd_opt(2020, 10, 30).unwrap(),
                previous_close: price,
                change: Decimal::ZERO,
                change_percent: Decimal::ZERO,
            })
        }
    }
}
