// (C) Coralbits SL 2025
// This file is part of PDF Generator and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::config::ConfigManager;

/// Resolves on Ctrl-C or SIGTERM, whichever comes first
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, shutting down..."),
        _ = terminate => info!("SIGTERM received, shutting down..."),
    }
}

/// Re-reads the config file every time `sigkind` is received
pub fn reload_config_on_signal(
    manager: ConfigManager,
    path: String,
    sigkind: SignalKind,
) -> Result<()> {
    let mut signals = signal(sigkind)?;
    tokio::spawn(async move {
        while signals.recv().await.is_some() {
            info!("Reload signal received, reloading {}...", path);
            if !manager.reload(&path).await {
                warn!("Keeping previous configuration");
            }
        }
    });
    Ok(())
}
