use anyhow::Context;

use userlink_infra::{Config, ReplicationConsumer, WorkerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    userlink_observability::init();

    let config = Config::from_env()?;
    let services = userlink_api::app::services::build_replica_services(&config).await?;

    let consumer = ReplicationConsumer::new(
        services.replica.clone(),
        services.broker.clone(),
        config.broker.topic.clone(),
    )
    .with_connect_retry(
        config.replication.connect_retry,
        config.replication.connect_attempts,
    )
    .spawn();

    let app = userlink_api::app::build_replica_app(services.replica.clone());
    let listener = tokio::net::TcpListener::bind(config.replica_bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.replica_bind_address))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    // A fatal consumer error also stops the HTTP side so the supervisor restarts us.
    let mut consumer_state = consumer.subscribe_state();
    let consumer_closed = async move {
        let _ = consumer_state.wait_for(|s| *s == WorkerState::Closed).await;
    };
    let stop = async move {
        tokio::select! {
            _ = userlink_api::shutdown::signal() => {},
            _ = consumer_closed => tracing::error!("replication consumer exited"),
        }
    };

    axum::serve(listener, app).with_graceful_shutdown(stop).await?;

    consumer.shutdown().await?;
    tracing::info!("replica service stopped");
    Ok(())
}
