use anyhow::Context;

use userlink_infra::{Config, ReplicationProducer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    userlink_observability::init();

    let config = Config::from_env()?;
    config.auth.validate()?;

    let services = userlink_api::app::services::build_auth_services(&config).await?;
    let producer = services.broker.clone().map(|broker| {
        ReplicationProducer::new(
            services.store.clone(),
            broker,
            config.broker.topic.clone(),
            config.replication.producer_tick,
        )
        .spawn()
    });

    let app = userlink_api::app::build_auth_app(services.auth.clone());
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(userlink_api::shutdown::signal())
        .await?;

    if let Some(producer) = producer {
        producer.shutdown().await?;
    }
    tracing::info!("auth service stopped");
    Ok(())
}
