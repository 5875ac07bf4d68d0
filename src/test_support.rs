//! Fixtures for driving the API without a database.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::context::{ContextProvider, RequestContext};
use crate::db::{InMemoryUserStore, UserStore};
use crate::error::{ApiError, ApiResult};
use crate::graphql::{build_schema, AuthSchema};
use crate::routes::AppState;
use crate::services::UserService;
use crate::util::FixedClock;

/// Cheap bcrypt cost so tests don't spend seconds hashing.
pub const TEST_HASH_COST: u32 = 4;

/// Hands every request the same store.
pub struct StaticContextProvider {
    users: Arc<dyn UserStore>,
    config: Arc<Config>,
}

impl StaticContextProvider {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self {
            users,
            config: Arc::new(Config {
                app_name: "user-auth-api".to_owned(),
                is_dev: true,
                ..Config::default()
            }),
        }
    }
}

#[async_trait]
impl ContextProvider for StaticContextProvider {
    async fn request_context(&self) -> ApiResult<RequestContext> {
        Ok(RequestContext::new(self.users.clone(), self.config.clone()))
    }
}

/// Fails every request as if the database were unreachable.
pub struct UnavailableContextProvider;

#[async_trait]
impl ContextProvider for UnavailableContextProvider {
    async fn request_context(&self) -> ApiResult<RequestContext> {
        Err(ApiError::ConfigNotFound("DB_CLUSTER_NAME".to_owned()))
    }
}

pub fn test_service() -> UserService {
    UserService::new().with_hash_cost(TEST_HASH_COST)
}

pub fn frozen_service(clock: FixedClock) -> UserService {
    test_service().with_clock(Arc::new(clock))
}

pub fn test_schema() -> AuthSchema {
    build_schema(test_service())
}

pub fn context_for(store: Arc<InMemoryUserStore>) -> RequestContext {
    RequestContext::new(store, Arc::new(Config::default()))
}

pub fn app_state(store: Arc<InMemoryUserStore>) -> AppState {
    AppState::new(test_schema(), Arc::new(StaticContextProvider::new(store)))
}
