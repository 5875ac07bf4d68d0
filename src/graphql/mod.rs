use async_graphql::{EmptySubscription, Schema};

use crate::graphql::mutation::MutationRoot;
use crate::graphql::query::QueryRoot;
use crate::models::user::Action;
use crate::services::UserService;

pub mod guards;
pub mod mutation;
pub mod query;
pub mod validators;

pub type AuthSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Builds the schema with the given service as shared data.
///
/// Per-request data ([RequestContext](crate::context::RequestContext) and an
/// optional [CallerRole](guards::CallerRole)) is attached to each request.
pub fn build_schema(service: UserService) -> AuthSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .register_output_type::<Action>()
        .data(service)
        .finish()
}
