//! 存储操作计时

use std::future::Future;
use std::time::Instant;

use loyalty_shared::observability::metrics::record_store_operation;

use crate::error::Result;
use crate::models::Collection;

/// 记录一次存储操作的耗时与结果
pub(crate) async fn observed<T, F>(
    store: &str,
    operation: &str,
    collection: Collection,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let result = fut.await;
    let status = if result.is_ok() { "ok" } else { "error" };
    record_store_operation(
        store,
        operation,
        collection.as_str(),
        status,
        start.elapsed().as_secs_f64(),
    );
    result
}
