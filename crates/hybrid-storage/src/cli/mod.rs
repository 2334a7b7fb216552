//! CLI 模块
//!
//! - `init-schema` - 创建全部关系表
//! - `migrate` - 文档库 → 关系库迁移（Ctrl+C 中止）
//! - `init-and-migrate` - 建表后迁移
//! - `drop-tables` - 删除全部关系表
//! - `table-counts` - 各表行数
//! - `inspect` - 查看文档库集合内容
//!
//! # 使用示例
//!
//! ```bash
//! hybrid-storage init-and-migrate
//! hybrid-storage table-counts --json
//! hybrid-storage inspect qr_tokens -n 5
//! hybrid-storage drop-tables --yes
//! ```

pub mod commands;
pub mod runner;

pub use commands::{Cli, Commands};
pub use runner::CommandRunner;
