//! Per-request dependencies for the resolvers.

use std::sync::Arc;

use async_graphql::Context;
use async_trait::async_trait;

use crate::config::Config;
use crate::db::UserStore;
use crate::error::{ApiError, ApiResult};

/// Everything a resolver needs to touch the database, built once per
/// request at the HTTP boundary and attached to the GraphQL request.
#[derive(Clone)]
pub struct RequestContext {
    users: Arc<dyn UserStore>,
    config: Arc<Config>,
}

impl RequestContext {
    pub fn new(users: Arc<dyn UserStore>, config: Arc<Config>) -> Self {
        Self { users, config }
    }

    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn from_ctx<'c>(ctx: &'c Context<'_>) -> ApiResult<&'c Self> {
        ctx.data_opt::<Self>()
            .ok_or(ApiError::MissingCollectionInContext)
    }
}

/// Produces the [RequestContext] for each incoming request.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn request_context(&self) -> ApiResult<RequestContext>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryUserStore;

    #[test]
    fn context_carries_the_resolved_config() {
        let config = Arc::new(Config {
            app_name: "auth-service".to_owned(),
            ..Config::default()
        });
        let context = RequestContext::new(Arc::new(InMemoryUserStore::new()), config.clone());

        assert_eq!(context.config().app_name, "auth-service");
        assert_eq!(*context.config(), *config);
    }
}
