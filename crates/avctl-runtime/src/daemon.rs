//! Daemon mode: open the device, serve JSON-RPC, release channels on exit.

use std::path::Path;
use std::sync::Arc;

use avctl_control::Device;
use avctl_core::DeviceProfile;

use crate::server;

/// Run the daemon until ctrl-c / SIGTERM or until the server stops.
pub async fn run_daemon(config_path: &Path, socket_path: &str) -> anyhow::Result<()> {
    let profile = DeviceProfile::load(config_path)
        .map_err(|e| anyhow::anyhow!("{}: {e}", config_path.display()))?;
    let device = Arc::new(Device::open(profile));

    let server_device = Arc::clone(&device);
    let server_socket = socket_path.to_string();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_device).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    // Wait for shutdown signal (ctrl-c or SIGTERM)
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cannot register SIGTERM handler, waiting for ctrl-c");
                    ctrl_c.await.ok();
                    tracing::info!("received ctrl-c, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {}
        _ = server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    device.shutdown();

    // Cleanup socket
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}
