//! 同步统计
//!
//! 回填在读路径之外执行，失败不会返回给调用方；这里的计数器让运维可以看到两个存储的收敛情况。
//! 同样的数据也会以 Prometheus 指标导出。

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 进程内同步计数器
#[derive(Debug, Default)]
pub struct SyncStats {
    backfill_succeeded: AtomicU64,
    backfill_failed: AtomicU64,
    document_fallback_reads: AtomicU64,
    relational_read_errors: AtomicU64,
}

/// 计数器快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatsSnapshot {
    pub backfill_succeeded: u64,
    pub backfill_failed: u64,
    pub document_fallback_reads: u64,
    pub relational_read_errors: u64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn backfill_succeeded(&self) {
        self.backfill_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn backfill_failed(&self) {
        self.backfill_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fallback_read(&self) {
        self.document_fallback_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn relational_read_error(&self) {
        self.relational_read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            backfill_succeeded: self.backfill_succeeded.load(Ordering::Relaxed),
            backfill_failed: self.backfill_failed.load(Ordering::Relaxed),
            document_fallback_reads: self.document_fallback_reads.load(Ordering::Relaxed),
            relational_read_errors: self.relational_read_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = SyncStats::new();
        stats.backfill_succeeded();
        stats.backfill_succeeded();
        stats.backfill_failed();
        stats.fallback_read();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.backfill_succeeded, 2);
        assert_eq!(snapshot.backfill_failed, 1);
        assert_eq!(snapshot.document_fallback_reads, 1);
        assert_eq!(snapshot.relational_read_errors, 0);
    }
}
