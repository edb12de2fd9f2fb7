use aws_config::BehaviorVersion;
use lambda_runtime::{run, service_fn, tracing, Error};

mod config;
mod error;
mod event_handler;
mod model;
mod store;

use config::Config;
use event_handler::function_handler;
use store::DynamoItemStore;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = Config::from_env()?;
    let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let store = DynamoItemStore::new(aws_sdk_dynamodb::Client::new(&sdk_config), config.table_name);

    run(service_fn(|event| function_handler(&store, event))).await
}
