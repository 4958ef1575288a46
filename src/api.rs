// src/api.rs
use crate::accounts::AccountService;
use crate::error::AppError;
use crate::models::{
    normalize_symbol, ChangePasswordRequest, CreateAccountRequest, CreateAccountResponse,
    LoginRequest, LoginResponse, PortfolioQuery, QuoteQuery, TradeRequest, TradeResponse,
};
use crate::portfolio::Valuator;
use crate::quotes::QuoteProvider;
use crate::trading::TradeEngine;
use log::{error, info};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// Request body limit for the JSON endpoints.
const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub trades: Arc<TradeEngine>,
    pub valuator: Arc<Valuator>,
    pub quotes: Arc<dyn QuoteProvider>,
}

/// All routes with rejections turned into JSON error bodies.
pub fn app(state: AppState) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    routes(state)
        .recover(handle_rejection)
        .with(warp::log("paper_trader::api"))
}

pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "status": "ok" })));

    let create_account = warp::path!("auth" / "create-account")
        .and(warp::post())
        .and(with_accounts(state.accounts.clone()))
        .and(json_body())
        .and_then(create_account_handler);

    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(with_accounts(state.accounts.clone()))
        .and(json_body())
        .and_then(login_handler);

    let change_password = warp::path!("auth" / "change-password")
        .and(warp::patch())
        .and(with_accounts(state.accounts.clone()))
        .and(json_body())
        .and_then(change_password_handler);

    let quote = warp::path!("stocks" / "quote")
        .and(warp::get())
        .and(with_quotes(state.quotes.clone()))
        .and(warp::query::<QuoteQuery>())
        .and_then(quote_handler);

    let buy = warp::path!("stocks" / "buy")
        .and(warp::post())
        .and(with_trades(state.trades.clone()))
        .and(json_body())
        .and_then(buy_handler);

    let sell = warp::path!("stocks" / "sell")
        .and(warp::post())
        .and(with_trades(state.trades.clone()))
        .and(json_body())
        .and_then(sell_handler);

    let portfolio = warp::path!("stocks" / "portfolio")
        .and(warp::get())
        .and(with_valuator(state.valuator.clone()))
        .and(warp::query::<PortfolioQuery>())
        .and_then(portfolio_handler);

    health
        .or(create_account)
        .or(login)
        .or(change_password)
        .or(quote)
        .or(buy)
        .or(sell)
        .or(portfolio)
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn with_accounts(
    accounts: Arc<AccountService>,
) -> impl Filter<Extract = (Arc<AccountService>,), Error = Infallible> + Clone {
    warp::any().map(move || accounts.clone())
}

fn with_trades(
    trades: Arc<TradeEngine>,
) -> impl Filter<Extract = (Arc<TradeEngine>,), Error = Infallible> + Clone {
    warp::any().map(move || trades.clone())
}

fn with_valuator(
    valuator: Arc<Valuator>,
) -> impl Filter<Extract = (Arc<Valuator>,), Error = Infallible> + Clone {
    warp::any().map(move || valuator.clone())
}

fn with_quotes(
    quotes: Arc<dyn QuoteProvider>,
) -> impl Filter<Extract = (Arc<dyn QuoteProvider>,), Error = Infallible> + Clone {
    warp::any().map(move || quotes.clone())
}

async fn create_account_handler(
    accounts: Arc<AccountService>,
    request: CreateAccountRequest,
) -> Result<impl Reply, Rejection> {
    match accounts
        .create_account(&request.username, &request.password, request.balance)
        .await
    {
        Ok(user_id) => {
            info!("Account created for {}.", request.username);
            Ok(warp::reply::with_status(
                warp::reply::json(&CreateAccountResponse { user_id }),
                StatusCode::CREATED,
            ))
        }
        Err(e) => {
            error!("Failed to create account for {}: {}", request.username, e);
            Err(warp::reject::custom(e))
        }
    }
}

async fn login_handler(
    accounts: Arc<AccountService>,
    request: LoginRequest,
) -> Result<impl Reply, Rejection> {
    match accounts.login(&request.username, &request.password).await {
        Ok(token) => Ok(warp::reply::json(&LoginResponse {
            message: "Login successful".to_string(),
            token,
        })),
        Err(e) => {
            error!("Login failed for {}: {}", request.username, e);
            Err(warp::reject::custom(e))
        }
    }
}

async fn change_password_handler(
    accounts: Arc<AccountService>,
    request: ChangePasswordRequest,
) -> Result<impl Reply, Rejection> {
    match accounts
        .change_password(&request.username, &request.old_password, &request.new_password)
        .await
    {
        Ok(()) => Ok(warp::reply::json(
            &json!({ "message": "Password changed successfully" }),
        )),
        Err(e) => {
            error!("Failed to change password for {}: {}", request.username, e);
            Err(warp::reject::custom(e))
        }
    }
}

async fn quote_handler(
    quotes: Arc<dyn QuoteProvider>,
    query: QuoteQuery,
) -> Result<impl Reply, Rejection> {
    let symbol = normalize_symbol(&query.stock).map_err(warp::reject::custom)?;
    match quotes.quote(&symbol).await {
        Ok(quote) => {
            info!("Quote retrieved for {}.", symbol);
            Ok(warp::reply::json(&quote))
        }
        Err(e) => {
            error!("Failed to retrieve quote for {}: {}", symbol, e);
            Err(warp::reject::custom(e))
        }
    }
}

async fn buy_handler(
    trades: Arc<TradeEngine>,
    request: TradeRequest,
) -> Result<impl Reply, Rejection> {
    let (symbol, quantity) = validate_trade(&request)?;
    match trades.buy(&request.username, &symbol, quantity).await {
        Ok(balance) => Ok(warp::reply::json(&TradeResponse {
            message: format!("Bought {} shares of {}", quantity, symbol),
            balance,
        })),
        Err(e) => {
            error!("Buy of {} {} for {} failed: {}", quantity, symbol, request.username, e);
            Err(warp::reject::custom(e))
        }
    }
}

async fn sell_handler(
    trades: Arc<TradeEngine>,
    request: TradeRequest,
) -> Result<impl Reply, Rejection> {
    let (symbol, quantity) = validate_trade(&request)?;
    match trades.sell(&request.username, &symbol, quantity).await {
        Ok(balance) => Ok(warp::reply::json(&TradeResponse {
            message: format!("Sold {} shares of {}", quantity, symbol),
            balance,
        })),
        Err(e) => {
            error!("Sell of {} {} for {} failed: {}", quantity, symbol, request.username, e);
            Err(warp::reject::custom(e))
        }
    }
}

fn validate_trade(request: &TradeRequest) -> Result<(String, u64), Rejection> {
    if request.username.is_empty() {
        return Err(warp::reject::custom(AppError::validation("Username is required")));
    }
    let symbol = normalize_symbol(&request.stock).map_err(warp::reject::custom)?;
    let quantity = request.quantity().map_err(warp::reject::custom)?;
    Ok((symbol, quantity))
}

async fn portfolio_handler(
    valuator: Arc<Valuator>,
    query: PortfolioQuery,
) -> Result<impl Reply, Rejection> {
    match valuator.portfolio(&query.username).await {
        Ok(portfolio) => {
            info!("Portfolio retrieved for {}.", query.username);
            Ok(warp::reply::json(&portfolio))
        }
        Err(e) => {
            error!("Failed to retrieve portfolio for {}: {}", query.username, e);
            Err(warp::reject::custom(e))
        }
    }
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(e) = err.find::<AppError>() {
        (e.status(), e.public_message())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected a JSON body".to_string(),
        )
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length required".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "error": message })),
        status,
    ))
}
