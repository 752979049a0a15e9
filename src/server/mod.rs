//! Server Module
//!
//! TCP server for handling VCP protocol connections.

mod config;
mod handler;

pub use config::Config;
pub use handler::Handler;

use crate::metrics::Metrics;
use crate::protocol::VcpCodec;
use crate::storage::{ActiveExpireTask, Db};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tracing::{error, info};

/// Top-level hfedb server: owns the keyspace, the active-expire cron, and
/// accepts VCP connections, one task per connection.
pub struct Server {
    config: Config,
    db: Db,
    metrics: Arc<Metrics>,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: Config) -> Self {
        let db = Db::new(config.hash);
        Self {
            config,
            db,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Run the server
    pub async fn run(self) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.config.bind, self.config.port);
        let listener = TcpListener::bind(&addr).await?;

        info!("hfedb server listening on {}", addr);

        ActiveExpireTask::spawn(self.db.clone(), self.config.active_expire_interval, self.config.active_expire_quota);

        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    info!("New connection from {}", peer_addr);

                    let db = self.db.clone();
                    let metrics = self.metrics.clone();

                    tokio::spawn(async move {
                        let framed = Framed::new(socket, VcpCodec::new());
                        let handler = Handler::new(db, metrics);

                        if let Err(e) = handler.run(framed).await {
                            error!("Connection error from {}: {}", peer_addr, e);
                        }

                        info!("Connection closed: {}", peer_addr);
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    /// Get a reference to the keyspace (for testing)
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Get metrics reference
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}
