// src/memory.rs
use crate::db::{AccountStore, HoldingStore, Store};
use crate::error::AppError;
use crate::models::{Holding, Settlement, User};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    holdings: HashMap<Uuid, BTreeMap<String, u64>>,
}

/// Process-local store for single-node runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.username) {
            return Err(AppError::UsernameTaken);
        }
        tables.users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self.tables.read().await.users.get(username).cloned())
    }

    async fn update_password(&self, username: &str, password_hash: &str) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(username).ok_or(AppError::UserNotFound)?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }
}

#[async_trait]
impl HoldingStore for MemoryStore {
    async fn find_holding(&self, user_id: Uuid, symbol: &str) -> Result<Option<Holding>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .holdings
            .get(&user_id)
            .and_then(|rows| rows.get(symbol))
            .map(|&quantity| Holding {
                symbol: symbol.to_string(),
                quantity,
            }))
    }

    async fn list_holdings(&self, user_id: Uuid) -> Result<Vec<Holding>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .holdings
            .get(&user_id)
            .map(|rows| {
                rows.iter()
                    .map(|(symbol, &quantity)| Holding {
                        symbol: symbol.clone(),
                        quantity,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn settle(&self, settlement: &Settlement) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&settlement.username)
            .ok_or(AppError::UserNotFound)?;
        user.balance = settlement.balance;

        let rows = tables.holdings.entry(settlement.user_id).or_default();
        if settlement.quantity == 0 {
            rows.remove(&settlement.symbol);
            if rows.is_empty() {
                tables.holdings.remove(&settlement.user_id);
            }
        } else {
            rows.insert(settlement.symbol.clone(), settlement.quantity);
        }
        Ok(())
    }
}
