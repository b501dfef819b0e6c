//! TCP accept loop.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::handlers::Registry;
use crate::state::Fabric;

/// Accepts transport connections and spawns their lifecycles.
pub struct Gateway {
    fabric: Arc<Fabric>,
    registry: Arc<Registry>,
}

impl Gateway {
    /// Gateway bound to shared state and the method registry.
    pub fn new(fabric: Arc<Fabric>, registry: Arc<Registry>) -> Self {
        Self { fabric, registry }
    }

    /// Run the accept loop until the listener fails or shutdown fires.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let local = listener.local_addr()?;
        info!(address = %local, "Gateway listening");
        let mut shutdown_rx = self.fabric.lifecycle.subscribe();

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received - closing listener");
                    return Ok(());
                }
            };

            let (stream, addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    continue;
                }
            };

            // Per-IP connection burst protection happens before any
            // per-connection state is allocated.
            if !self.fabric.rate_limiter.check_connection_rate(addr.ip()) {
                warn!(ip = %addr.ip(), "Connection rate limit exceeded - refusing");
                drop(stream);
                continue;
            }

            let fabric = self.fabric.clone();
            let registry = self.registry.clone();
            tokio::spawn(async move {
                crate::network::connection::run(fabric, registry, stream, addr).await;
            });
        }
    }
}
