use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use axum_server::Handle;
use blob_store::BlobStorage;
use state_store::StateStore;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    config::ServerConfig,
    routes::{create_routes, RouteState, INDEXED_BASE_PATH, INLINE_BASE_PATH},
    storage::{IndexedStorage, InlineStorage, StorageBackend},
};

#[derive(Clone)]
pub struct Service {
    pub config: ServerConfig,
    pub shutdown: CancellationToken,
    pub state: Arc<StateStore>,
    pub blob_storage: Arc<BlobStorage>,
    pub inline_storage: Arc<StorageBackend>,
    pub indexed_storage: Arc<StorageBackend>,
}

impl Service {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let blob_storage = Arc::new(
            BlobStorage::new(&config.blob_storage).context("error initializing BlobStorage")?,
        );
        blob_storage
            .ensure_container(&config.blob_storage.container)
            .await?;
        let state = StateStore::new(config.state_store_path.parse()?)
            .await
            .context("error initializing StateStore")?;

        let inline_storage = Arc::new(StorageBackend::Inline(InlineStorage::new(
            state.clone(),
            config.list_take_limit,
        )));
        let indexed_storage = Arc::new(StorageBackend::Indexed(IndexedStorage::new(
            state.clone(),
            blob_storage.clone(),
            &config.blob_storage.container,
            config.list_take_limit,
        )));

        Ok(Self {
            config,
            shutdown: CancellationToken::new(),
            state,
            blob_storage,
            inline_storage,
            indexed_storage,
        })
    }

    pub fn routes(&self) -> Router {
        let inline = RouteState {
            storage: self.inline_storage.clone(),
            base_path: INLINE_BASE_PATH,
            shutdown: self.shutdown.clone(),
        };
        let indexed = RouteState {
            storage: self.indexed_storage.clone(),
            base_path: INDEXED_BASE_PATH,
            shutdown: self.shutdown.clone(),
        };
        create_routes(inline, indexed)
    }

    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = self.config.listen_addr.parse()?;
        let handle = Handle::new();
        self.serve(addr, handle.clone(), shutdown_signal()).await
    }

    /// Serves until `signal` resolves, then cancels in-flight storage
    /// operations and drains connections.
    pub async fn serve(
        &self,
        addr: SocketAddr,
        handle: Handle,
        signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let handle_sh = handle.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = signal => {
                    info!("graceful shutdown signal received, shutting down server gracefully");
                }
                _ = shutdown.cancelled() => {}
            }
            shutdown.cancel();
            handle_sh.shutdown();
        });

        info!("server api listening on {}", addr);
        axum_server::bind(addr)
            .handle(handle)
            .serve(self.routes().into_make_service())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
        },
        _ = terminate => {
        },
    }
    info!("signal received, shutting down server gracefully");
}
