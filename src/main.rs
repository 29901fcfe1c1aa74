use anyhow::Context;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use restaurant_orders::config::AppConfig;
use restaurant_orders::domain::client::{Address, Client, InMemoryClientDirectory};
use restaurant_orders::domain::dish::{Dish, InMemoryDishCatalog};
use restaurant_orders::domain::order::{AdminGrant, OrderCommandHandler, OrderQueryHandler, OrderStatus};
use restaurant_orders::metrics::{self, Metrics};
use restaurant_orders::store::{MemoryOrderStore, OrderStore, PostgresOrderStore};
use restaurant_orders::utils::RetryConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, override with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,restaurant_orders=debug"))
        )
        .init();

    tracing::info!("🚀 Starting restaurant order backend");

    let config = AppConfig::from_env().context("failed to load configuration")?;

    // === 1. Order store ===
    let store: Arc<dyn OrderStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to Postgres...");
            let store = PostgresOrderStore::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to Postgres")?;
            store.ensure_schema().await.context("failed to create order tables")?;
            Arc::new(store)
        }
        None => {
            tracing::info!("No database configured, using in-memory order store");
            Arc::new(MemoryOrderStore::new())
        }
    };

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    if config.metrics_enabled {
        let registry = Arc::new(metrics.registry().clone());
        let port = config.metrics_port;
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Failed to start metrics runtime: {}", e);
                    return;
                }
            };
            rt.block_on(async {
                if let Err(e) = metrics::start_metrics_server(registry, port).await {
                    tracing::error!("Metrics server error: {}", e);
                }
            });
        });
    }

    // === 3. Collaborators ===
    let clients = InMemoryClientDirectory::new();
    let client = Client::new("Ana Ribeiro")
        .with_address(
            Address {
                street: "Rua da Consolação".to_string(),
                neighborhood: "Centro".to_string(),
                city: "São Paulo".to_string(),
                state: "SP".to_string(),
                postal_code: "01302-000".to_string(),
            },
            "930",
        )
        .with_complement("Apto 12");
    clients.upsert(client.clone()).await;

    let dishes = InMemoryDishCatalog::new();
    let feijoada = Dish::new("Feijoada", Decimal::new(5490, 2));
    let suco = Dish::new("Suco de caju", Decimal::new(990, 2));
    dishes.upsert(feijoada.clone()).await;
    dishes.upsert(suco.clone()).await;

    let commands = OrderCommandHandler::new(
        store.clone(),
        Arc::new(dishes),
        Arc::new(clients),
        metrics.clone(),
    )
    .with_retry(RetryConfig::default().with_max_attempts(config.command_max_attempts));
    let queries = OrderQueryHandler::new(store);

    // === 4. Walk one order through its lifecycle ===
    let order = commands.create_draft(client.id).await?;
    commands.add_item(order.id, feijoada.id, 2).await?;
    commands.add_item(order.id, suco.id, 3).await?;
    let order = commands.remove_item(order.id, suco.id, 1).await?;
    tracing::info!(order_id = %order.id, lines = order.items.len(), total = %order.total(), "Cart ready");

    let order = commands.finalize(order.id).await?;
    tracing::info!(
        order_id = %order.id,
        address = order.address_snapshot.as_deref().unwrap_or_default(),
        "Delivery address captured"
    );

    for _ in 0..3 {
        let order = commands.advance(order.id).await?;
        tracing::info!(order_id = %order.id, status = %order.status, "Kitchen board updated");
    }

    if let Err(e) = commands.regress(order.id).await {
        tracing::info!(order_id = %order.id, error = %e, "Dispatch gate held");
    }

    let grant = AdminGrant::new("demo", "courier confirmed delivery");
    commands.override_status(&grant, order.id, OrderStatus::Delivered).await?;

    let history = queries.list_history().await?;
    let kitchen = queries.list_kitchen_orders().await?;
    let events = queries.order_events(order.id).await?;
    tracing::info!(
        delivered = history.len(),
        in_kitchen = kitchen.len(),
        events = events.len(),
        "✅ Lifecycle demo finished"
    );

    if config.metrics_enabled {
        tracing::info!("Metrics available at http://0.0.0.0:{}/metrics, press Ctrl+C to exit", config.metrics_port);
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}
