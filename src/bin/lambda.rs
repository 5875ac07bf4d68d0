//! Runs the API as an AWS Lambda function behind API Gateway.

use user_auth_api::build_app;
use user_auth_api::config::ServerSettings;
use user_auth_api::util::init_tracing;

#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    init_tracing(true);

    let settings = ServerSettings::from_env()?;
    let app = build_app(!settings.is_production()).await?;

    lambda_http::run(app).await
}
