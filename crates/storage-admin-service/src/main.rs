//! 存储管理服务
//!
//! 提供建表、迁移与存储状态查询的 REST API。

use std::sync::Arc;

use axum::middleware;
use hybrid_storage::{
    DocumentStoreAdapter, HybridStorage, MediatorOptions, PgRelationalStore, Storage,
};
use loyalty_shared::{
    config::AppConfig,
    database::Database,
    observability::{self, middleware as obs_middleware},
};
use storage_admin_service::{AppState, LiveStorageAdmin, routes};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("storage-admin-service")?;

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting storage-admin-service on {}", config.server_addr());

    let db = Database::connect(&config.database).await?;
    let document = DocumentStoreAdapter::new(&config.document);
    info!(mode = ?document.mode(), "Document store ready");

    let storage: Arc<Storage> = Arc::new(HybridStorage::new(
        Arc::new(document),
        Arc::new(PgRelationalStore::new(db.pool().clone())),
        MediatorOptions::from(&config.storage),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let admin = LiveStorageAdmin::new(
        Arc::clone(&storage),
        config.storage.migration_read_cap,
        shutdown_rx,
    );
    let state = AppState::new(Arc::new(admin));

    if config.is_production() {
        warn!("CORS 允许所有来源，生产环境应由网关限制访问");
    }
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::app(state)
        .layer(cors)
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id));

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // 通知进行中的迁移在当前记录后停止
            let _ = shutdown_tx.send(true);
        })
        .await?;

    storage.flush_backfills().await;
    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// 监听 Ctrl+C 与 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
