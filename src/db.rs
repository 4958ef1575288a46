// src/db.rs
use crate::error::AppError;
use crate::models::{Holding, Settlement, User};
use async_trait::async_trait;
use log::{error, info};
use rust_decimal::Decimal;
use scylla::batch::{Batch, BatchType};
use scylla::frame::response::result::{CqlValue, Row};
use scylla::{query::Query, Session, SessionBuilder};
use std::str::FromStr;
use uuid::Uuid;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Inserts a new user, failing with `UsernameTaken` if the name is in use.
    async fn create_user(&self, user: &User) -> Result<(), AppError>;

    async fn find_user(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn update_password(&self, username: &str, password_hash: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait HoldingStore: Send + Sync {
    async fn find_holding(&self, user_id: Uuid, symbol: &str) -> Result<Option<Holding>, AppError>;

    /// All holdings of a user, ordered by symbol.
    async fn list_holdings(&self, user_id: Uuid) -> Result<Vec<Holding>, AppError>;
}

#[async_trait]
pub trait Store: AccountStore + HoldingStore {
    /// Writes the new balance and the new holding quantity as one unit.
    async fn settle(&self, settlement: &Settlement) -> Result<(), AppError>;
}

pub struct ScyllaStore {
    session: Session,
}

impl ScyllaStore {
    pub async fn connect(node: &str) -> Result<Self, AppError> {
        let session = SessionBuilder::new()
            .known_node(node)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("failed to connect to {}: {}", node, e)))?;

        session.query("CREATE KEYSPACE IF NOT EXISTS paper_trader WITH REPLICATION = {'class': 'SimpleStrategy', 'replication_factor': 1}", &[]).await?;
        session.query("CREATE TABLE IF NOT EXISTS paper_trader.users (username TEXT PRIMARY KEY, user_id TEXT, password_hash TEXT, balance TEXT)", &[]).await?;
        session.query("CREATE TABLE IF NOT EXISTS paper_trader.holdings (user_id TEXT, symbol TEXT, quantity BIGINT, PRIMARY KEY (user_id, symbol)) WITH CLUSTERING ORDER BY (symbol ASC)", &[]).await?;

        info!("Successfully connected to ScyllaDB at {}.", node);
        Ok(Self { session })
    }
}

fn text_column(row: &Row, index: usize) -> Result<String, AppError> {
    row.columns
        .get(index)
        .and_then(|column| column.as_ref())
        .and_then(|value| value.as_text())
        .cloned()
        .ok_or_else(|| AppError::Database(format!("missing text column {}", index)))
}

fn bigint_column(row: &Row, index: usize) -> Result<i64, AppError> {
    row.columns
        .get(index)
        .and_then(|column| column.as_ref())
        .and_then(|value| value.as_bigint())
        .ok_or_else(|| AppError::Database(format!("missing bigint column {}", index)))
}

fn parse_uuid(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|e| AppError::Database(format!("bad user id {}: {}", raw, e)))
}

fn parse_balance(raw: &str) -> Result<Decimal, AppError> {
    Decimal::from_str(raw).map_err(|e| AppError::Database(format!("bad balance {}: {}", raw, e)))
}

fn quantity_to_db(quantity: u64) -> Result<i64, AppError> {
    i64::try_from(quantity).map_err(|_| AppError::validation("Quantity is too large"))
}

fn quantity_from_db(quantity: i64) -> Result<u64, AppError> {
    u64::try_from(quantity)
        .map_err(|_| AppError::Database(format!("negative quantity {} stored", quantity)))
}

#[async_trait]
impl AccountStore for ScyllaStore {
    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let query = Query::new(
            "INSERT INTO paper_trader.users (username, user_id, password_hash, balance) VALUES (?, ?, ?, ?) IF NOT EXISTS",
        );
        let result = self
            .session
            .query(
                query,
                (
                    user.username.as_str(),
                    user.id.to_string(),
                    user.password_hash.as_str(),
                    user.balance.to_string(),
                ),
            )
            .await?;

        let applied = result
            .rows
            .and_then(|rows| rows.into_iter().next())
            .and_then(|row| match row.columns.first() {
                Some(Some(CqlValue::Boolean(applied))) => Some(*applied),
                _ => None,
            });
        match applied {
            Some(true) => Ok(()),
            Some(false) => Err(AppError::UsernameTaken),
            None => {
                error!("Conditional insert for {} returned no [applied] column", user.username);
                Err(AppError::Database("unexpected LWT response".to_string()))
            }
        }
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, AppError> {
        let query = Query::new(
            "SELECT user_id, password_hash, balance FROM paper_trader.users WHERE username = ?",
        );
        let rows = self.session.query(query, (username,)).await?.rows;
        match rows.and_then(|rows| rows.into_iter().next()) {
            Some(row) => Ok(Some(User {
                id: parse_uuid(&text_column(&row, 0)?)?,
                username: username.to_string(),
                password_hash: text_column(&row, 1)?,
                balance: parse_balance(&text_column(&row, 2)?)?,
            })),
            None => Ok(None),
        }
    }

    async fn update_password(&self, username: &str, password_hash: &str) -> Result<(), AppError> {
        let query = Query::new("UPDATE paper_trader.users SET password_hash = ? WHERE username = ?");
        self.session.query(query, (password_hash, username)).await?;
        Ok(())
    }
}

#[async_trait]
impl HoldingStore for ScyllaStore {
    async fn find_holding(&self, user_id: Uuid, symbol: &str) -> Result<Option<Holding>, AppError> {
        let query = Query::new(
            "SELECT quantity FROM paper_trader.holdings WHERE user_id = ? AND symbol = ?",
        );
        let rows = self
            .session
            .query(query, (user_id.to_string(), symbol))
            .await?
            .rows;
        match rows.and_then(|rows| rows.into_iter().next()) {
            Some(row) => Ok(Some(Holding {
                symbol: symbol.to_string(),
                quantity: quantity_from_db(bigint_column(&row, 0)?)?,
            })),
            None => Ok(None),
        }
    }

    async fn list_holdings(&self, user_id: Uuid) -> Result<Vec<Holding>, AppError> {
        let query =
            Query::new("SELECT symbol, quantity FROM paper_trader.holdings WHERE user_id = ?");
        let rows = self
            .session
            .query(query, (user_id.to_string(),))
            .await?
            .rows
            .unwrap_or_default();

        let mut holdings = Vec::with_capacity(rows.len());
        for row in rows {
            holdings.push(Holding {
                symbol: text_column(&row, 0)?,
                quantity: quantity_from_db(bigint_column(&row, 1)?)?,
            });
        }
        info!("Fetched {} holdings for user {}", holdings.len(), user_id);
        Ok(holdings)
    }
}

#[async_trait]
impl Store for ScyllaStore {
    async fn settle(&self, settlement: &Settlement) -> Result<(), AppError> {
        let balance = settlement.balance.to_string();
        let user_id = settlement.user_id.to_string();

        let mut batch = Batch::new(BatchType::Logged);
        batch.append_statement(Query::new(
            "UPDATE paper_trader.users SET balance = ? WHERE username = ?",
        ));
        if settlement.quantity == 0 {
            batch.append_statement(Query::new(
                "DELETE FROM paper_trader.holdings WHERE user_id = ? AND symbol = ?",
            ));
            self.session
                .batch(
                    &batch,
                    (
                        (balance, settlement.username.as_str()),
                        (user_id, settlement.symbol.as_str()),
                    ),
                )
                .await?;
        } else {
            batch.append_statement(Query::new(
                "UPDATE paper_trader.holdings SET quantity = ? WHERE user_id = ? AND symbol = ?",
            ));
            self.session
                .batch(
                    &batch,
                    (
                        (balance, settlement.username.as_str()),
                        (
                            quantity_to_db(settlement.quantity)?,
                            user_id,
                            settlement.symbol.as_str(),
                        ),
                    ),
                )
                .await?;
        }
        Ok(())
    }
}
