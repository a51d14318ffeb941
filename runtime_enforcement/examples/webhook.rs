//! Runtime enforcement webhook example
//!
//! Serves the mutating and validating routes over plain HTTP. Terminate TLS in
//! front of it (or swap `warp::serve(..).run` for `.tls()`) before registering
//! it with the API server.

use std::sync::Arc;

use kube::Client;
use runtime_enforcement::admission::{mutating_route, validating_route};
use runtime_enforcement::{Config, KubeClusterReader, Pipeline, RuntimeEnforcement};
use tracing_subscriber::EnvFilter;
use warp::Filter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let client = Client::try_default().await?;

    tracing::info!(
        runtime_class = config.runtime_class_name(),
        policy = %config.missing_runtime_class_policy(),
        "starting runtime enforcement webhook"
    );

    let cluster = Arc::new(KubeClusterReader::new(client));
    let pipeline = Arc::new(
        Pipeline::builder()
            .plugin(RuntimeEnforcement::new(cluster, &config))
            .build(),
    );

    let mutate = warp::path("mutate")
        .and(warp::post())
        .and(warp::body::json())
        .and_then(mutating_route(pipeline.clone(), config.timeout()));
    let validate = warp::path("validate")
        .and(warp::post())
        .and(warp::body::json())
        .and_then(validating_route(pipeline, config.timeout()));

    warp::serve(mutate.or(validate))
        .run(([0, 0, 0, 0], 8443))
        .await;

    Ok(())
}
