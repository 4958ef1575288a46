// src/models.rs
use crate::error::AppError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub symbol: String,
    pub quantity: u64,
}

/// Balance and holding state to persist together after a trade.
/// A `quantity` of zero removes the holding row.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub user_id: Uuid,
    pub username: String,
    pub balance: Decimal,
    pub symbol: String,
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub price: Decimal,
    pub volume: u64,
    pub latest_trading_day: NaiveDate,
    pub previous_close: Decimal,
    pub change: Decimal,
    pub change_percent: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAccountRequest {
    pub username: String,
    pub password: String,
    pub balance: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub username: String,
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TradeRequest {
    pub username: String,
    pub stock: String,
    pub quantity: i64,
}

impl TradeRequest {
    pub fn quantity(&self) -> Result<u64, AppError> {
        match u64::try_from(self.quantity) {
            Ok(quantity) if quantity > 0 => Ok(quantity),
            _ => Err(AppError::validation("Quantity must be a positive integer")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub stock: String,
}

#[derive(Debug, Deserialize)]
pub struct PortfolioQuery {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct CreateAccountResponse {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TradeResponse {
    pub message: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioLine {
    pub symbol: String,
    pub quantity: u64,
    pub current_price: Decimal,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    pub username: String,
    pub portfolio: Vec<PortfolioLine>,
    pub total_portfolio_value: Decimal,
    pub balance: Decimal,
}

/// Trims and upper-cases a ticker symbol.
pub fn normalize_symbol(raw: &str) -> Result<String, AppError> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(AppError::validation("Stock symbol is required"));
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(AppError::InvalidSymbol(symbol));
    }
    Ok(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn trade_quantity_must_be_positive() {
        let request = |quantity| TradeRequest {
            username: "alice".into(),
            stock: "AAPL".into(),
            quantity,
        };
        assert_eq!(request(3).quantity(), Ok(3));
        assert!(matches!(
            request(0).quantity(),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            request(-4).quantity(),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn symbols_are_trimmed_and_uppercased() {
        assert_eq!(normalize_symbol("  aapl ").unwrap(), "AAPL");
        assert_eq!(normalize_symbol("brk.b").unwrap(), "BRK.B");
        assert!(matches!(
            normalize_symbol("   "),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            normalize_symbol("AA PL"),
            Err(AppError::InvalidSymbol(_))
        ));
    }

    #[test]
    fn trade_request_rejects_unknown_fields() {
        let body = r#"{"username":"alice","stock":"AAPL","quantity":1,"price":3}"#;
        assert!(serde_json::from_str::<TradeRequest>(body).is_err());
    }

    #[test]
    fn create_account_balance_is_optional() {
        let body = r#"{"username":"alice","password":"pw"}"#;
        let request: CreateAccountRequest = serde_json::from_str(body).unwrap();
        assert!(request.balance.is_none());

        let body = r#"{"username":"alice","password":"pw","balance":2500.5}"#;
        let request: CreateAccountRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.balance, Some(Decimal::new(25005, 1)));
    }

    #[test]
    fn money_survives_json_without_rounding() {
        let body = r#"{"username":"alice","password":"pw","balance":1234567890123.4567}"#;
        let request: CreateAccountRequest = serde_json::from_str(body).unwrap();
        assert_eq!(
            request.balance,
            Some(Decimal::from_str("1234567890123.4567").unwrap())
        );

        let response = TradeResponse {
            message: "Stock sold successfully".to_string(),
            balance: Decimal::from_str("12345678901234567.89").unwrap(),
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"message":"Stock sold successfully","balance":12345678901234567.89}"#
        );
    }
}
