//! A GraphQL API for logging users in and managing their accounts.
//!
//! Users live in the `users` collection of a MongoDB database. The same
//! router is served locally by the `user-auth-api` binary and inside AWS
//! Lambda by the `lambda` binary.

use std::sync::Arc;

use axum::Router;

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod graphql;
pub mod models;
pub mod routes;
pub mod services;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod util;

use crate::db::ConnectionManager;
use crate::error::ApiResult;
use crate::graphql::build_schema;
use crate::routes::AppState;
use crate::services::UserService;

/// Builds the router for this process, with configuration resolved from
/// its environment.
pub async fn build_app(explorers: bool) -> ApiResult<Router> {
    let supplier = config::supplier_from_env().await?;
    let connections = Arc::new(ConnectionManager::new(supplier));
    let state = AppState::new(build_schema(UserService::new()), connections);

    Ok(routes::router(state, explorers))
}
