// src/accounts.rs
use crate::auth::{PasswordHasher, TokenIssuer};
use crate::db::{AccountStore, Store};
use crate::error::AppError;
use crate::models::User;
use log::{info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub struct AccountService {
    store: Arc<dyn Store>,
    hasher: PasswordHasher,
    tokens: TokenIssuer,
    default_balance: Decimal,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn Store>,
        hasher: PasswordHasher,
        tokens: TokenIssuer,
        default_balance: Decimal,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            default_balance,
        }
    }

    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
        balance: Option<Decimal>,
    ) -> Result<Uuid, AppError> {
        if username.trim().is_empty() {
            return Err(AppError::validation("Username is required"));
        }
        if password.is_empty() {
            return Err(AppError::validation("Password is required"));
        }
        let balance = balance.unwrap_or(self.default_balance);
        if balance < Decimal::ZERO {
            return Err(AppError::validation("Balance cannot be negative"));
        }
        if self.store.find_user(username).await?.is_some() {
            return Err(AppError::UsernameTaken);
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: self.hasher.hash(password).await?,
            balance,
        };
        // The store re-checks uniqueness; a racing registration still gets UsernameTaken.
        self.store.create_user(&user).await?;
        info!("Created account {} for {}", user.id, username);
        Ok(user.id)
    }

    /// Verifies credentials and returns a signed session token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AppError> {
        let user = self.authenticate(username, password).await?;
        info!("{} logged in", username);
        self.tokens.issue(&user.id.to_string())
    }

    pub async fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user = self.authenticate(username, old_password).await?;
        if new_password.is_empty() {
            return Err(AppError::validation("New password is required"));
        }
        let hash = self.hasher.hash(new_password).await?;
        self.store.update_password(&user.username, &hash).await?;
        info!("Password changed for {}", username);
        Ok(())
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<User, AppError> {
        let user = match self.store.find_user(username).await? {
            Some(user) => user,
            None => {
                warn!("Authentication failed for unknown user {}", username);
                return Err(AppError::InvalidCredentials);
            }
        };
        if !self.hasher.verify(password, &user.password_hash).await? {
            warn!("Authentication failed for {}", username);
            return Err(AppError::InvalidCredentials);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::Duration;

    const TEST_COST: u32 = 4;

    fn service(store: Arc<MemoryStore>) -> AccountService {
        AccountService::new(
            store,
            PasswordHasher::new(TEST_COST),
            TokenIssuer::new("test_secret".to_string(), Duration::hours(1)),
            Decimal::new(100000, 0),
        )
    }

    #[tokio::test]
    async fn new_account_gets_default_balance() {
        let store = Arc::new(MemoryStore::new());
        let accounts = service(store.clone());

        let id = accounts.create_account("alice", "secret", None).await.unwrap();

        let user = store.find_user("alice").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.balance, Decimal::new(100000, 0));
        assert_ne!(user.password_hash, "secret");
    }

    #[tokio::test]
    async fn explicit_balance_is_kept() {
        let store = Arc::new(MemoryStore::new());
        let accounts = service(store.clone());
        accounts
            .create_account("alice", "secret", Some(Decimal::new(250075, 2)))
            .await
            .unwrap();
        let user = store.find_user("alice").await.unwrap().unwrap();
        assert_eq!(user.balance, Decimal::new(250075, 2));
    }

    #[tokio::test]
    async fn duplicate_username_creates_no_row() {
        let store = Arc::new(MemoryStore::new());
        let accounts = service(store.clone());
        let first = accounts.create_account("alice", "secret", None).await.unwrap();

        let err = accounts
            .create_account("alice", "other", Some(Decimal::new(5, 0)))
            .await
            .unwrap_err();

        assert_eq!(err, AppError::UsernameTaken);
        let user = store.find_user("alice").await.unwrap().unwrap();
        assert_eq!(user.id, first);
        assert_eq!(user.balance, Decimal::new(100000, 0));
    }

    #[tokio::test]
    async fn rejects_bad_registration_input() {
        let accounts = service(Arc::new(MemoryStore::new()));
        for (username, password, balance) in [
            ("", "secret", None),
            ("alice", "", None),
            ("alice", "secret", Some(Decimal::new(-1, 0))),
        ] {
            assert!(matches!(
                accounts.create_account(username, password, balance).await,
                Err(AppError::ValidationError(_))
            ));
        }
    }

    #[tokio::test]
    async fn login_checks_password() {
        let accounts = service(Arc::new(MemoryStore::new()));
        accounts.create_account("alice", "secret", None).await.unwrap();

        assert!(!accounts.login("alice", "secret").await.unwrap().is_empty());
        assert_eq!(
            accounts.login("alice", "wrong").await.unwrap_err(),
            AppError::InvalidCredentials
        );
        assert_eq!(
            accounts.login("bob", "secret").await.unwrap_err(),
            AppError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn change_password_requires_old_password() {
        let accounts = service(Arc::new(MemoryStore::new()));
        accounts.create_account("alice", "secret", None).await.unwrap();

        assert_eq!(
            accounts
                .change_password("alice", "wrong", "fresh")
                .await
                .unwrap_err(),
            AppError::InvalidCredentials
        );
        accounts
            .change_password("alice", "secret", "fresh")
            .await
            .unwrap();

        assert!(accounts.login("alice", "fresh").await.is_ok());
        assert_eq!(
            accounts.login("alice", "secret").await.unwrap_err(),
            AppError::InvalidCredentials
        );
    }
}
