//! Headless waitline client.
//!
//! Joins (or recovers) a queue session and tails its events until Ctrl-C.
//! Configuration comes from environment variables:
//!
//! | Env Var               | Default                   |
//! |-----------------------|---------------------------|
//! | `WAITLINE_URL`        | `http://localhost:3000`   |
//! | `QUEUE_ID`            | `1`                       |
//! | `DISPLAY_NAME`        | `Guest`                   |
//! | `CONTACT`             | `guest@example.com`       |
//! | `PARTY_SIZE`          | `2`                       |
//! | `WAITLINE_STATE_FILE` | `.waitline-session.json`  |

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use waitline_client::{FileStore, Recovery, SessionAgent, TabEvent};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waitline_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let base_url =
        std::env::var("WAITLINE_URL").unwrap_or_else(|_| "http://localhost:3000".into());
    let queue_id: i64 = std::env::var("QUEUE_ID")
        .unwrap_or_else(|_| "1".into())
        .parse()
        .expect("QUEUE_ID must be an integer");
    let display_name = std::env::var("DISPLAY_NAME").unwrap_or_else(|_| "Guest".into());
    let contact = std::env::var("CONTACT").unwrap_or_else(|_| "guest@example.com".into());
    let party_size: u32 = std::env::var("PARTY_SIZE")
        .unwrap_or_else(|_| "2".into())
        .parse()
        .expect("PARTY_SIZE must be an integer");
    let state_file =
        std::env::var("WAITLINE_STATE_FILE").unwrap_or_else(|_| ".waitline-session.json".into());

    let agent = Arc::new(SessionAgent::new(
        base_url,
        Arc::new(FileStore::new(state_file)),
    ));

    // Recover a previous session if the persisted token still resolves;
    // otherwise join fresh.
    match agent.recover().await {
        Ok(Recovery::Recovered(snapshot)) => {
            tracing::info!(
                position = snapshot.position,
                code = %snapshot.verification_code,
                "Recovered existing session"
            );
        }
        Ok(Recovery::Restorable { deadline }) => {
            tracing::info!(?deadline, "Cancelled entry is restorable, rejoining");
            agent.restore().await.expect("restore should succeed inside grace window");
        }
        Ok(Recovery::RejoinRequired) => {
            agent
                .join(queue_id, &display_name, &contact, party_size)
                .await
                .expect("join should succeed");
        }
        Err(e) => {
            tracing::error!(error = %e, "Recovery failed");
            std::process::exit(1);
        }
    }

    // Print mirrored updates, as a sibling tab would render them.
    let mut updates = agent.mirror().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = updates.recv().await {
            match event {
                TabEvent::Snapshot(s) => {
                    tracing::info!(state = %s.state, position = s.position, "Update");
                }
                TabEvent::Removed { reason } => {
                    tracing::info!(reason = %reason, "Entry removed");
                }
                TabEvent::SessionEnded => {
                    tracing::info!("Session ended");
                }
            }
        }
    });

    let cancel = CancellationToken::new();
    let channel_agent = Arc::clone(&agent);
    let channel_cancel = cancel.clone();
    let channel = tokio::spawn(async move {
        channel_agent.run_channel(channel_cancel).await;
    });

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl-C handler");
    tracing::info!("Interrupted, closing live channel");
    cancel.cancel();
    let _ = channel.await;
}
