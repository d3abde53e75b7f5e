//! Scan for AirTurn pedals, connect to each one found and print its events as JSON
//!
//! Usage: `watch_pedals [SECONDS]` (runs until Ctrl-C when no duration is given)

use std::env;
use std::time::Duration;

use airturn_core::events::AirTurnEvent;
use airturn_core::{Central, CentralConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let duration = env::args()
        .nth(1)
        .map(|s| s.parse::<u64>().map(Duration::from_secs))
        .transpose()?;

    let central = Central::builder()
        .config(CentralConfig::default())
        .start_bluetooth()
        .await?;
    let mut events = central.subscribe();
    central.scan().await?;
    eprintln!("Scanning for AirTurn pedals...");

    let watch = async {
        while let Some(event) = events.recv().await {
            println!("{}", serde_json::to_string(&event)?);

            if let AirTurnEvent::Discovered { peripheral, .. } = &event
                && let Err(e) = central.connect(&peripheral.id).await
            {
                eprintln!("Could not connect to {}: {}", peripheral.id, e);
            }
        }
        Ok::<_, Box<dyn std::error::Error>>(())
    };

    match duration {
        Some(duration) => {
            let _ = tokio::time::timeout(duration, watch).await;
        }
        None => {
            tokio::select! {
                result = watch => result?,
                _ = tokio::signal::ctrl_c() => eprintln!("Interrupted"),
            }
        }
    }

    central.shutdown().await;
    Ok(())
}
