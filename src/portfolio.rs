// src/portfolio.rs
use crate::db::{AccountStore, Store};
use crate::error::AppError;
use crate::models::{Portfolio, PortfolioLine};
use crate::quotes::QuoteProvider;
use futures::future::try_join_all;
use log::{error, info};
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct Valuator {
    store: Arc<dyn Store>,
    quotes: Arc<dyn QuoteProvider>,
}

impl Valuator {
    pub fn new(store: Arc<dyn Store>, quotes: Arc<dyn QuoteProvider>) -> Self {
        Self { store, quotes }
    }

    /// Values every holding at its current quote. One failed quote fails the whole valuation.
    pub async fn portfolio(&self, username: &str) -> Result<Portfolio, AppError> {
        let user = self
            .store
            .find_user(username)
            .await?
            .ok_or(AppError::UserNotFound)?;
        let holdings = self.store.list_holdings(user.id).await?;
        if holdings.is_empty() {
            return Err(AppError::EmptyPortfolio);
        }

        let lines = try_join_all(holdings.into_iter().map(|holding| async move {
            let quote = self.quotes.quote(&holding.symbol).await.map_err(|e| {
                error!("Could not price {} for {}: {}", holding.symbol, username, e);
                match e {
                    AppError::InvalidSymbol(symbol) => {
                        AppError::QuoteUnavailable(format!("no quote for held symbol {}", symbol))
                    }
                    other => other,
                }
            })?;
            let total_value = quote
                .price
                .checked_mul(Decimal::from(holding.quantity))
                .ok_or_else(|| AppError::Internal(format!("{} value overflowed", holding.symbol)))?;
            Ok::<_, AppError>(PortfolioLine {
                symbol: holding.symbol,
                quantity: holding.quantity,
                current_price: quote.price,
                total_value,
            })
        }))
        .await?;

        let total_portfolio_value = lines
            .iter()
            .try_fold(Decimal::ZERO, |sum, line| sum.checked_add(line.total_value))
            .ok_or_else(|| AppError::Internal("portfolio value overflowed".to_string()))?;

        info!(
            "Valued {} holdings for {} at {}",
            lines.len(),
            username,
            total_portfolio_value
        );
        Ok(Portfolio {
            username: user.username,
            portfolio: lines,
            total_portfolio_value,
            balance: user.balance,
        })
    }
}
