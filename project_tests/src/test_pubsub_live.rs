//! # PubSub Live Connection Test
//!
//! Connects to the real PubSub endpoint with the configured credentials and
//! prints every decoded cheer until Ctrl-C. Requires channel_id and
//! auth_token via config file, environment or CLI.

use std::sync::Arc;

use lib_common::configs::config_app::load_config;
use lib_common::pubsub::session::{CheerHandler, PubSubSession, SessionConfig, SessionError};

struct PrintHandler;

impl CheerHandler for PrintHandler {
    fn on_cheer(&self, chat_message: &str, bits_used: u64) -> anyhow::Result<bool> {
        println!("[EVENT] {} bits: {}", bits_used, chat_message);
        Ok(true)
    }
}

fn report(result: Result<(), SessionError>) {
    match result {
        Ok(()) => println!("[SUCCESS] Session closed cleanly."),
        Err(e) => {
            eprintln!("[ERROR] Session ended with failure:");
            eprintln!(">>> {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = load_config().validated()?;

    println!(
        "[*] Connecting to {} for topic {}...",
        settings.ws_host,
        settings.topic()
    );

    let session = Arc::new(PubSubSession::new(
        SessionConfig {
            ws_host: settings.ws_host.clone(),
            topic: settings.topic(),
            auth_token: settings.auth_token.clone(),
            keep_alive_interval: settings.keep_alive_interval,
        },
        Arc::new(PrintHandler),
    ));

    let mut runner = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.run().await }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("[*] Ctrl-C received, closing session...");
            session.stop();
        }
        res = &mut runner => {
            report(res?);
            return Ok(());
        }
    }

    report(runner.await?);
    Ok(())
}
