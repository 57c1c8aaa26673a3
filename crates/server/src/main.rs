mod bootstrap;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use cartly_core::config::{AppConfig, LoadOptions};
use cartly_core::domain::conversation::SessionId;

fn init_logging(config: &AppConfig) {
    use cartly_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    info!("cartly-server started, reading messages from stdin");

    tokio::select! {
        result = chat_loop(&app) => result?,
        _ = wait_for_shutdown() => {}
    }

    info!("cartly-server stopping");
    app.db_pool.close().await;
    Ok(())
}

/// One stdin line is one user turn; the session lives as long as the
/// process. Heavier front ends sit on the other side of the runtime API.
async fn chat_loop(app: &bootstrap::Application) -> Result<()> {
    let session = SessionId(format!("stdin-{}", std::process::id()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let reply = app.runtime.handle_message(&session, text).await?;
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
