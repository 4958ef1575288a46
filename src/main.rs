// src/main.rs
mod accounts;
mod api;
mod auth;
mod config;
mod db;
mod error;
mod memory;
mod models;
mod portfolio;
mod quotes;
mod trading;

use crate::accounts::AccountService;
use crate::api::AppState;
use crate::auth::{PasswordHasher, TokenIssuer};
use crate::config::{Config, StoreBackend};
use crate::db::{ScyllaStore, Store};
use crate::memory::MemoryStore;
use crate::portfolio::Valuator;
use crate::quotes::{AlphaVantageClient, QuoteProvider};
use crate::trading::TradeEngine;
use env_logger::{Builder, Env};
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = Config::from_env()?;
    info!("Starting the paper trader...");

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Scylla => Arc::new(ScyllaStore::connect(&config.scylla_node).await?),
        StoreBackend::Memory => {
            warn!("Using the in-memory store; accounts are lost on restart.");
            Arc::new(MemoryStore::new())
        }
    };

    let quotes: Arc<dyn QuoteProvider> = Arc::new(AlphaVantageClient::new(
        &config.alpha_vantage_url,
        &config.alpha_vantage_api_key,
        config.quote_timeout,
    )?);

    let state = AppState {
        accounts: Arc::new(AccountService::new(
            store.clone(),
            PasswordHasher::new(config.bcrypt_cost),
            TokenIssuer::new(config.jwt_secret.clone(), config.token_ttl),
            config.default_balance,
        )),
        trades: Arc::new(TradeEngine::new(store.clone(), quotes.clone())),
        valuator: Arc::new(Valuator::new(store, quotes.clone())),
        quotes,
    };

    let addr = SocketAddr::new(config.http_host, config.http_port);
    info!("Server running on http://{}", addr);
    warp::serve(api::app(state)).run(addr).await;
    Ok(())
}
