use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{run, service_fn, tracing, Error, Request};
use relay_shared::config::{self, Config};
use relay_shared::fcm::FcmClient;
use relay_shared::push::{PushGateway, UnconfiguredGateway};
use relay_shared::users::DynamoUserStore;
use relay_shared::AppState;
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = Config::from_env()?;

    // Initialize clients once at startup
    let aws_config = aws_config::load_from_env().await;
    let store = Arc::new(DynamoUserStore::new(
        DynamoClient::new(&aws_config),
        config.table_name.clone(),
    ));

    // Keep serving without credentials; sends fail and /health reports it
    let gateway: Arc<dyn PushGateway> = match config::service_account_from_env() {
        Ok(key) => {
            let client = FcmClient::new(key);
            tracing::info!(
                "✅ Firebase messaging initialized for project {}",
                client.project_id()
            );
            Arc::new(client)
        }
        Err(e) => {
            tracing::error!("❌ Error initializing Firebase messaging: {}", e);
            Arc::new(UnconfiguredGateway::new(e.to_string()))
        }
    };

    if let Some(url) = &config.database_url {
        tracing::info!("Firebase database URL: {}", url);
    }
    tracing::info!(
        "Serving users from table {} (downstream timeout {:?})",
        config.table_name,
        config.downstream_timeout
    );

    let state = AppState::new(config, store, gateway);

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
