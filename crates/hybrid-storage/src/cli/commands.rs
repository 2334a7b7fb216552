//! CLI 命令定义
//!
//! 使用 clap derive 宏定义命令行接口结构。

use clap::{Parser, Subcommand};

/// 混合存储运维工具
#[derive(Parser, Debug)]
#[command(name = "hybrid-storage")]
#[command(version, about = "会员平台混合存储运维工具")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// 以 JSON 输出结果
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// 子命令枚举
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 创建全部关系表（可重复执行）
    InitSchema,

    /// 把文档库全部集合迁移到关系库
    ///
    /// Ctrl+C 会在当前记录写完后停止，并输出已完成部分的报告。
    Migrate,

    /// 建表后迁移
    InitAndMigrate,

    /// 删除全部关系表
    DropTables {
        /// 确认删除
        #[arg(long)]
        yes: bool,
    },

    /// 输出各关系表行数
    TableCounts,

    /// 查看文档库中某个集合的内容
    Inspect {
        /// 集合名，如 vendors、qr_tokens
        collection: String,

        /// 最多输出条数
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

// ============================================================================
// 单元测试
// ============================================================================
