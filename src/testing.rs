use std::net::SocketAddr;

use anyhow::{anyhow, Result};
use axum_server::Handle;
use blob_store::BlobStorageConfig;
use tempfile::TempDir;
use tracing::subscriber;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::{config::ServerConfig, service::Service};

/// A service over temporary storage, served on an ephemeral local port.
pub struct TestService {
    pub service: Service,
    pub addr: SocketAddr,
    _temp_dir: TempDir,
}

impl TestService {
    pub async fn new() -> Result<Self> {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut ServerConfig)) -> Result<Self> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(env_filter)),
        );

        let temp_dir = tempfile::tempdir()?;
        let blob_path = temp_dir.path().join("blob_store");
        let mut cfg = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            state_store_path: temp_dir.path().join("state_store").display().to_string(),
            blob_storage: BlobStorageConfig::new(
                blob_path
                    .to_str()
                    .ok_or_else(|| anyhow!("non utf-8 temp dir"))?,
            ),
            ..Default::default()
        };
        customize(&mut cfg);
        let service = Service::new(cfg).await?;

        let handle = Handle::new();
        let server = service.clone();
        let server_handle = handle.clone();
        let addr: SocketAddr = service.config.listen_addr.parse()?;
        tokio::spawn(async move {
            let never = std::future::pending::<()>();
            if let Err(e) = server.serve(addr, server_handle, never).await {
                tracing::error!("test server failed: {:?}", e);
            }
        });
        let addr = handle
            .listening()
            .await
            .ok_or_else(|| anyhow!("test server failed to bind"))?;

        Ok(Self {
            service,
            addr,
            _temp_dir: temp_dir,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestService {
    fn drop(&mut self) {
        self.service.shutdown.cancel();
    }
}
