//! Fanout gateway server binary.
//!
//! Wires an in-process pipeline: outbox store, topic bus, relay and the
//! websocket gateway, all in one process. Deployments with a shared durable
//! outbox run the relay separately and point the gateway at the same bus.

use std::net::SocketAddr;
use std::sync::Arc;

use epop_events::{InMemoryOutboxStore, Relay, TopicBus};
use epop_gateway::{ConnectionRegistry, Gateway, TypingTracker};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,epop_gateway=debug,epop_events=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = InMemoryOutboxStore::new_arc();
    let bus = TopicBus::new_arc();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = Relay::new(store, bus.clone());
    let relay_task = tokio::spawn(async move { relay.run(shutdown_rx).await });

    let gateway = Arc::new(Gateway::new(
        bus,
        ConnectionRegistry::new_arc(),
        TypingTracker::default(),
    ));
    let (_, subscription) = gateway.subscribe().await;
    let consumer_task = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.run(subscription).await })
    };

    let addr = SocketAddr::from(([127, 0, 0, 1], 4000));
    tracing::info!("gateway listening on ws://{addr}/ws");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, epop_gateway::server::router(gateway)).await?;

    let _ = shutdown_tx.send(true);
    relay_task.abort();
    consumer_task.abort();
    Ok(())
}
