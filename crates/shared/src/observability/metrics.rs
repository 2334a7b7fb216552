//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标描述，出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "store_operations_total",
        "Total number of operations issued to a backing store"
    );
    metrics::describe_histogram!(
        "store_operation_duration_seconds",
        "Backing store operation duration in seconds"
    );

    metrics::describe_counter!(
        "hybrid_storage_backfill_total",
        "Opportunistic relational backfills after a document-store fallback read"
    );
    metrics::describe_counter!(
        "hybrid_storage_fallback_reads_total",
        "Reads served by the document store after a relational miss"
    );
    metrics::describe_counter!(
        "document_store_degraded_total",
        "Document store transitions into in-memory degraded mode"
    );

    metrics::describe_counter!(
        "migration_records_total",
        "Records replayed from the document store into the relational store"
    );
    metrics::describe_histogram!(
        "migration_duration_seconds",
        "Full migration run duration in seconds"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录一次存储操作
///
/// `store` 取值 relational / document，`status` 取值 ok / error
#[inline]
pub fn record_store_operation(
    store: &str,
    operation: &str,
    collection: &str,
    status: &str,
    duration_secs: f64,
) {
    metrics::counter!(
        "store_operations_total",
        "store" => store.to_string(),
        "operation" => operation.to_string(),
        "collection" => collection.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "store_operation_duration_seconds",
        "store" => store.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// 记录回填结果
#[inline]
pub fn record_backfill(collection: &str, status: &str) {
    metrics::counter!(
        "hybrid_storage_backfill_total",
        "collection" => collection.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录一次回退到文档库的读取
#[inline]
pub fn record_fallback_read(collection: &str, operation: &str) {
    metrics::counter!(
        "hybrid_storage_fallback_reads_total",
        "collection" => collection.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// 记录文档库进入降级模式
#[inline]
pub fn record_degraded_transition(reason: &str) {
    metrics::counter!(
        "document_store_degraded_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录迁移结果（按集合）
#[inline]
pub fn record_migration(collection: &str, migrated: u64, failed: u64) {
    metrics::counter!(
        "migration_records_total",
        "collection" => collection.to_string(),
        "status" => "migrated"
    )
    .increment(migrated);

    metrics::counter!(
        "migration_records_total",
        "collection" => collection.to_string(),
        "status" => "failed"
    )
    .increment(failed);
}

/// 记录整次迁移耗时
#[inline]
pub fn record_migration_run(status: &str, duration_secs: f64) {
    metrics::histogram!(
        "migration_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_http_request("GET", "/api/storage/table-counts", 200, 0.1);
        record_store_operation("relational", "upsert", "vendors", "ok", 0.02);
        record_backfill("offers", "failed");
        record_fallback_read("offers", "get");
        record_degraded_transition("get_collection");
        record_migration("vendors", 10, 1);
        record_migration_run("completed", 1.5);
    }
}
