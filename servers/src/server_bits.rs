use anyhow::Result;
use std::sync::Arc;
use tokio::signal;

use lib_common::configs::config_app::load_config;
use lib_common::loggers::loggerlocal::setup_logging;
use lib_common::pubsub::session::{PubSubSession, SessionConfig};
use lib_common::trending::display::FileDisplaySink;
use lib_common::trending::engine::TrendingEngine;
use lib_common::trending::store::TrendingStore;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = load_config().validated()?;
    setup_logging(
        "server_bits",
        &settings.log_dir,
        &settings.log_level,
        settings.verbose,
    )?;

    log::info!(
        "Starting bits trending tracker for channel {}",
        settings.channel_id
    );

    let store = TrendingStore::new(&settings.store_path);
    let sink = FileDisplaySink::new(&settings.display_dir);
    let engine = Arc::new(TrendingEngine::new(store, sink, settings.clear_stale_ranks));

    // Reconcile the display files with whatever the store holds right now.
    engine.refresh()?;

    let session = Arc::new(PubSubSession::new(
        SessionConfig {
            ws_host: settings.ws_host.clone(),
            topic: settings.topic(),
            auth_token: settings.auth_token.clone(),
            keep_alive_interval: settings.keep_alive_interval,
        },
        engine.clone(),
    ));

    let mut runner = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.run().await }
    });

    // Manual refresh path: SIGHUP re-derives and republishes the snapshot
    // without waiting for a new cheer.
    #[cfg(unix)]
    let refresher = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            let Ok(mut hangup) = signal::unix::signal(signal::unix::SignalKind::hangup()) else {
                log::warn!("SIGHUP handler unavailable, manual refresh disabled.");
                return;
            };
            while hangup.recv().await.is_some() {
                log::info!("SIGHUP received, republishing trending snapshot.");
                if let Err(e) = engine.refresh() {
                    log::error!("Manual refresh failed: {}", e);
                }
            }
        }
    });

    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
            session.stop();
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("install SIGTERM handler");
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {
            session.stop();
        }
        res = &mut runner => {
            // The session ended on its own: connect failure or transport loss.
            #[cfg(unix)]
            refresher.abort();
            return match res {
                Ok(Ok(())) => {
                    log::info!("Session closed.");
                    Ok(())
                }
                Ok(Err(e)) => {
                    log::error!("Session failed: {}", e);
                    Err(e.into())
                }
                Err(e) => {
                    log::error!("Session task panicked: {}", e);
                    Err(e.into())
                }
            };
        }
    }

    let _ = runner.await;
    #[cfg(unix)]
    refresher.abort();

    log::info!("Shutdown complete.");
    Ok(())
}
