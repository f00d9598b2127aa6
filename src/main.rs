// src/main.rs
use clap::{Parser, Subcommand};
use log::{info, warn};
use ratefeed::{
    config::load_config,
    proxy::ProxyNotification,
    rows::format_cell,
    utils::setup_logging,
    CacheProxy, FeedClient, FeedData,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "ratefeed", about = "Cache-first sync for exchange-rate and fee-table feeds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load one feed cache-first and print its rows
    Fetch { feed: String },
    /// Eagerly populate the cache for every registered feed
    Warm,
    /// Run the proxy and keep a live-rates feed refreshed
    Watch {
        #[arg(long, default_value = "exchange")]
        feed: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging().expect("Failed to initialize logging");
    let config = load_config()?;

    let store = config.build_store()?;
    let registry = Arc::new(config.build_registry());
    let proxy = CacheProxy::new(
        registry.clone(),
        store.clone(),
        &config.cache_namespace,
        config.fetch_policy(),
    );
    let client = FeedClient::new(
        registry,
        store,
        &config.cache_namespace,
        config.fetch_policy(),
    )
    .with_proxy(proxy.clone());

    match Cli::parse().command {
        Commands::Fetch { feed } => {
            let data = client.load(&feed).await?;
            info!("Feed '{}' loaded via {:?}", feed, data.source);
            print_rows(&data);
        }
        Commands::Warm => {
            proxy.warm().await;
            client.preload().await;
        }
        Commands::Watch { feed } => {
            info!("🚀 ratefeed watching '{}' (refresh every {}s)", feed, config.refresh_interval_secs);
            proxy.warm().await;
            client.preload().await;

            let mut notifications = proxy.subscribe();
            let mut ticker =
                tokio::time::interval(Duration::from_secs(config.refresh_interval_secs));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match client.load(&feed).await {
                            Ok(data) => {
                                info!("Refreshed '{}' via {:?} ({} rows)", feed, data.source, data.rows.len());
                                print_rows(&data);
                            }
                            Err(e) => warn!("Refresh for '{}' failed: {}", feed, e),
                        }
                    }
                    note = notifications.recv() => {
                        match note {
                            Ok(ProxyNotification::DataUpdated { feed: updated, timestamp }) => {
                                info!("Feed '{}' updated at {}", updated, timestamp);
                                if updated == feed {
                                    if let Ok(data) = client.load(&feed).await {
                                        print_rows(&data);
                                    }
                                }
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                warn!("Missed {} update notifications", skipped);
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutting down.");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_rows(data: &FeedData) {
    for row in &data.rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(column, cell)| format_cell(cell, column))
            .collect();
        println!("{}", line.join(" | "));
    }
}
