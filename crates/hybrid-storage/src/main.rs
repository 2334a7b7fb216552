//! 混合存储运维 CLI
//!
//! 建表、迁移、删表、行数统计与文档库查看。

use clap::Parser;
use hybrid_storage::cli::{Cli, CommandRunner};
use loyalty_shared::config::AppConfig;
use loyalty_shared::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load("hybrid-storage")?;

    // 单次任务不启动指标导出端口；RUST_LOG 优先于命令行参数
    let mut obs_config = config
        .observability
        .clone()
        .with_service_name("hybrid-storage")
        .without_metrics();
    obs_config.log_level = cli.log_level.clone();
    let _guard = observability::init(&obs_config).await?;

    let runner = CommandRunner::new(config, cli.json);
    runner.run(cli.command).await
}
