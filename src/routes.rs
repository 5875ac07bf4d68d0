//! The HTTP surface of the API.
//!
//! `/graphql` executes queries. When explorers are enabled, `/graphiql` and
//! `/apollo` serve browser IDEs pointed at it.

use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use async_graphql::{ErrorExtensions, Pos, Value};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::context::ContextProvider;
use crate::error::ErrorClass;
use crate::graphql::AuthSchema;

pub const GRAPHQL_PATH: &str = "/graphql";

const APOLLO_SANDBOX: &str = r##"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Apollo Sandbox</title>
  </head>
  <body style="margin: 0; overflow-x: hidden; overflow-y: hidden">
    <div style="width: 100%; height: 100vh" id="sandbox"></div>
    <script src="https://embeddable-sandbox.cdn.apollographql.com/_latest/embeddable-sandbox.umd.production.min.js"></script>
    <script>
      new window.EmbeddedSandbox({
        target: "#sandbox",
        initialEndpoint: window.location.origin + "/graphql",
      });
    </script>
  </body>
</html>
"##;

#[derive(Clone)]
pub struct AppState {
    pub schema: AuthSchema,
    pub contexts: Arc<dyn ContextProvider>,
}

impl AppState {
    pub fn new(schema: AuthSchema, contexts: Arc<dyn ContextProvider>) -> Self {
        Self { schema, contexts }
    }
}

pub fn router(state: AppState, explorers: bool) -> Router {
    let mut router = Router::new().route(GRAPHQL_PATH, get(graphql_handler).post(graphql_handler));
    if explorers {
        router = router
            .route("/graphiql", get(graphiql))
            .route("/apollo", get(apollo));
    }

    router
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| request_span(req))
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

/// The span for one HTTP request. `status` is filled in once the response is ready.
fn request_span<B>(req: &axum::http::Request<B>) -> tracing::Span {
    tracing::info_span!(
        "http_request",
        method = %req.method(),
        uri = %req.uri(),
        status = tracing::field::Empty
    )
}

/// The HTTP status for an executed GraphQL response, taken from its first error.
///
/// Errors the engine raises itself (parse and validation failures) carry no
/// `code` extension and count as bad requests.
pub fn status_for(response: &async_graphql::Response) -> StatusCode {
    let Some(error) = response.errors.first() else {
        return StatusCode::OK;
    };

    let class = error
        .extensions
        .as_ref()
        .and_then(|extensions| extensions.get("code"))
        .and_then(|code| match code {
            Value::String(code) => ErrorClass::from_code(code),
            _ => None,
        })
        .unwrap_or(ErrorClass::BadRequest);

    StatusCode::from_u16(class.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn graphql_handler(State(state): State<AppState>, request: GraphQLRequest) -> Response {
    let context = match state.contexts.request_context().await {
        Ok(context) => context,
        Err(err) => {
            tracing::error!(error = %err, "failed to prepare request context");
            let response = async_graphql::Response::from_errors(vec![err
                .extend()
                .into_server_error(Pos::default())]);
            return (StatusCode::INTERNAL_SERVER_ERROR, GraphQLResponse::from(response))
                .into_response();
        }
    };

    let response = state.schema.execute(request.into_inner().data(context)).await;
    let status = status_for(&response);

    (status, GraphQLResponse::from(response)).into_response()
}

async fn graphiql() -> Html<String> {
    Html(GraphiQLSource::build().endpoint(GRAPHQL_PATH).finish())
}

async fn apollo() -> Html<&'static str> {
    Html(APOLLO_SANDBOX)
}
