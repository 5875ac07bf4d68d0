use async_graphql::{Context, ErrorExtensions, Object, Result, ID};

use crate::context::RequestContext;
use crate::graphql::guards::HasRole;
use crate::models::user::{Action, NewUserInput, Role, UserObject};
use crate::services::UserService;

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Creates a new user
    #[graphql(guard = "HasRole::new(Role::Admin, Action::CreateUser)")]
    pub async fn create_user(&self, ctx: &Context<'_>, user: NewUserInput) -> Result<UserObject> {
        let request = RequestContext::from_ctx(ctx).map_err(|err| err.extend())?;
        let service: &UserService = ctx.data_unchecked();
        tracing::debug!(app_name = %request.config().app_name, "create user requested");

        service
            .create_user(request.users(), user)
            .await
            .map(UserObject::from)
            .map_err(|err| err.extend())
    }

    /// Deletes the user with the given ID
    #[graphql(guard = "HasRole::new(Role::Admin, Action::DeleteUser)")]
    pub async fn delete_user(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "userID")] user_id: ID,
    ) -> Result<bool> {
        let request = RequestContext::from_ctx(ctx).map_err(|err| err.extend())?;
        let service: &UserService = ctx.data_unchecked();
        tracing::debug!(
            app_name = %request.config().app_name,
            user_id = user_id.as_str(),
            "delete user requested"
        );

        service
            .delete_user(request.users(), &user_id)
            .await
            .map_err(|err| err.extend())
    }
}
