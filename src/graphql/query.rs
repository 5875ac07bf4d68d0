use async_graphql::{Context, ErrorExtensions, Object, Result};

use crate::context::RequestContext;
use crate::models::user::{AuthParams, UserObject};
use crate::services::UserService;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Logs a user in by username or email and returns their profile
    pub async fn login(&self, ctx: &Context<'_>, params: AuthParams) -> Result<UserObject> {
        let request = RequestContext::from_ctx(ctx).map_err(|err| err.extend())?;
        let service: &UserService = ctx.data_unchecked();
        tracing::debug!(app_name = %request.config().app_name, "login requested");

        service
            .login(request.users(), &params)
            .await
            .map(UserObject::from)
            .map_err(|err| err.extend())
    }
}
