//! 命令执行器
//!
//! 负责执行各 CLI 子命令的具体逻辑。

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use loyalty_shared::config::AppConfig;
use loyalty_shared::database::Database;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use super::commands::Commands;
use crate::document::DocumentStoreAdapter;
use crate::migration::{MigrationDriver, MigrationReport};
use crate::models::Collection;
use crate::relational::PgRelationalStore;
use crate::traits::{DocumentStore, RelationalStore};

/// 命令执行器
pub struct CommandRunner {
    config: AppConfig,
    json: bool,
}

impl CommandRunner {
    pub fn new(config: AppConfig, json: bool) -> Self {
        Self { config, json }
    }

    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::InitSchema => self.run_init_schema().await,
            Commands::Migrate => self.run_migrate(false).await,
            Commands::InitAndMigrate => self.run_migrate(true).await,
            Commands::DropTables { yes } => self.run_drop_tables(yes).await,
            Commands::TableCounts => self.run_table_counts().await,
            Commands::Inspect { collection, limit } => self.run_inspect(&collection, limit).await,
        }
    }

    fn relational(&self) -> Result<PgRelationalStore> {
        let database = Database::connect_lazy(&self.config.database).context("创建数据库连接池失败")?;
        Ok(PgRelationalStore::new(database.pool().clone()))
    }

    fn document(&self) -> DocumentStoreAdapter {
        DocumentStoreAdapter::new(&self.config.document)
    }

    async fn run_init_schema(&self) -> Result<()> {
        let relational = self.relational()?;
        relational.ensure_schema().await.context("建表失败")?;
        println!("All tables initialized");
        Ok(())
    }

    async fn run_migrate(&self, init_schema: bool) -> Result<()> {
        let document = Arc::new(self.document());
        let relational = Arc::new(self.relational()?);
        let driver = MigrationDriver::new(
            Arc::clone(&document),
            relational,
            self.config.storage.migration_read_cap,
        );

        info!(mode = ?document.mode(), init_schema, "开始迁移，按 Ctrl+C 可中止");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let signal = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("收到中断信号，当前记录写完后停止迁移");
                let _ = shutdown_tx.send(true);
            }
        });

        let result = if init_schema {
            driver.init_and_migrate(shutdown_rx).await
        } else {
            driver.migrate_all(shutdown_rx).await
        };
        signal.abort();

        let report = result.context("迁移失败")?;
        self.print_report(&report)?;
        Ok(())
    }

    async fn run_drop_tables(&self, confirmed: bool) -> Result<()> {
        if !confirmed {
            bail!("drop-tables 会删除全部关系表数据，请加 --yes 确认");
        }
        let relational = self.relational()?;
        relational.drop_schema().await.context("删除表失败")?;
        println!("All tables dropped");
        Ok(())
    }

    async fn run_table_counts(&self) -> Result<()> {
        let relational = self.relational()?;
        let counts = relational.table_counts().await.context("统计行数失败")?;

        if self.json {
            return self.print_json(&counts);
        }
        println!("\n{:<24} {:>10}", "table", "rows");
        println!("{}", "-".repeat(35));
        for (collection, count) in &counts {
            println!("{:<24} {:>10}", collection.as_str(), count);
        }
        println!("{}", "-".repeat(35));
        Ok(())
    }

    async fn run_inspect(&self, collection: &str, limit: usize) -> Result<()> {
        let collection: Collection = match collection.parse() {
            Ok(c) => c,
            Err(_) => {
                let known: Vec<_> = Collection::ALL.iter().map(|c| c.as_str()).collect();
                bail!("未知集合 {collection}，可用集合: {}", known.join(", "));
            }
        };

        let document = self.document();
        let docs = document
            .get_collection(collection, limit)
            .await
            .context("读取文档库失败")?;

        if self.json {
            return self.print_json(&docs);
        }
        println!("\n{} ({} docs, mode: {:?})", collection, docs.len(), document.mode());
        println!("{}", "-".repeat(60));
        for doc in &docs {
            println!("{}", serde_json::to_string(doc)?);
        }
        println!("{}", "-".repeat(60));
        Ok(())
    }

    fn print_report(&self, report: &MigrationReport) -> Result<()> {
        if self.json {
            return self.print_json(report);
        }
        println!("\n迁移结果:");
        println!("{}", "-".repeat(50));
        for (collection, summary) in &report.per_collection {
            let note = summary.read_error.as_deref().unwrap_or("");
            println!(
                "{:<24} read {:>6}  migrated {:>6}  skipped {:>4}  failed {:>4} {}",
                collection.as_str(),
                summary.read,
                summary.migrated,
                summary.skipped,
                summary.failed,
                note
            );
        }
        println!("{}", "-".repeat(50));
        println!("迁移记录: {}", report.migrated);
        println!("跳过记录: {}", report.skipped);
        println!("失败记录: {}", report.failures.len());
        println!("执行耗时: {} ms", report.elapsed_ms);
        if report.cancelled {
            println!("迁移被中止，可重新执行以继续（写入幂等）");
        }
        for failure in &report.failures {
            println!("  {}/{}: {}", failure.collection, failure.id, failure.error);
        }
        Ok(())
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}
