// src/trading.rs
use crate::db::{AccountStore, HoldingStore, Store};
use crate::error::AppError;
use crate::models::{Settlement, User};
use crate::quotes::QuoteProvider;
use log::{info, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Buy,
    Sell,
}

/// One mutex per user; trades for the same account run one at a time.
/// Entries nobody holds or waits on are dropped on the next acquire.
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|id, lock| *id == user_id || Arc::strong_count(lock) > 1);
            locks.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct TradeEngine {
    store: Arc<dyn Store>,
    quotes: Arc<dyn QuoteProvider>,
    locks: UserLocks,
}

impl TradeEngine {
    pub fn new(store: Arc<dyn Store>, quotes: Arc<dyn QuoteProvider>) -> Self {
        Self {
            store,
            quotes,
            locks: UserLocks::default(),
        }
    }

    /// Buys `quantity` shares at the current quote and returns the new balance.
    pub async fn buy(
        &self,
        username: &str,
        symbol: &str,
        quantity: u64,
    ) -> Result<Decimal, AppError> {
        self.execute(Side::Buy, username, symbol, quantity).await
    }

    /// Sells `quantity` shares at the current quote and returns the new balance.
    pub async fn sell(
        &self,
        username: &str,
        symbol: &str,
        quantity: u64,
    ) -> Result<Decimal, AppError> {
        self.execute(Side::Sell, username, symbol, quantity).await
    }

    async fn execute(
        &self,
        side: Side,
        username: &str,
        symbol: &str,
        quantity: u64,
    ) -> Result<Decimal, AppError> {
        if quantity == 0 {
            return Err(AppError::validation("Quantity must be a positive integer"));
        }
        let user = self.find_user(username).await?;

        // Priced before locking so a slow provider never holds up the account.
        let price = self.quotes.quote(symbol).await?.price;
        let amount = price
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| AppError::validation("Trade amount is too large"))?;

        let _guard = self.locks.acquire(user.id).await;
        let user = self.find_user(&user.username).await?;
        let held = self
            .store
            .find_holding(user.id, symbol)
            .await?
            .map(|holding| holding.quantity)
            .unwrap_or(0);

        let (balance, remaining) = match side {
            Side::Buy => {
                if amount > user.balance {
                    warn!(
                        "{} cannot afford {} {} at {} (balance {})",
                        username, quantity, symbol, price, user.balance
                    );
                    return Err(AppError::InsufficientFunds);
                }
                let remaining = held
                    .checked_add(quantity)
                    .ok_or_else(|| AppError::validation("Quantity is too large"))?;
                (user.balance - amount, remaining)
            }
            Side::Sell => {
                if held < quantity {
                    warn!(
                        "{} holds {} {} but tried to sell {}",
                        username, held, symbol, quantity
                    );
                    return Err(AppError::InsufficientHoldings);
                }
                let balance = user
                    .balance
                    .checked_add(amount)
                    .ok_or_else(|| AppError::validation("Trade amount is too large"))?;
                (balance, held - quantity)
            }
        };

        self.store
            .settle(&Settlement {
                user_id: user.id,
                username: user.username.clone(),
                balance,
                symbol: symbol.to_string(),
                quantity: remaining,
            })
            .await?;

        info!(
            "{:?} {} {} for {} at {}; balance {} -> {}",
            side, quantity, symbol, username, price, user.balance, balance
        );
        Ok(balance)
    }

    async fn find_user(&self, username: &str) -> Result<User, AppError> {
        self.store
            .find_user(username)
            .await?
            .ok_or(AppError::UserNotFound)
    }
}
