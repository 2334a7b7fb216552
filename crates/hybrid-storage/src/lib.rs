//! 混合存储
//!
//! 会员积分平台（商户二维码入驻、优惠、顾客订阅、OTP 核销、群发消息）的存储核心。
//! 每个实体同时保存在文档库（主存储）和关系库（二级存储）中，由中介层保持两侧一致。
//!
//! ## 核心功能
//!
//! - **双写**：新增、覆盖写入、部分更新、删除并发写入两个存储
//! - **读穿透**：关系库优先，未命中回退文档库并回填关系库
//! - **降级**：文档库不可用时切换到实例自有的内存存储
//! - **迁移**：把文档库的全部集合批量导入关系库
//!
//! ## 模块结构
//!
//! - `models`: 集合、记录与查询条件
//! - `error`: 错误类型定义
//! - `traits`: 两个存储的抽象接口
//! - `relational`: PostgreSQL 适配器
//! - `document`: Redis / 内存文档库适配器
//! - `mediator`: 混合存储中介层
//! - `migration`: 迁移驱动
//! - `stats`: 同步统计
//! - `cli`: 运维命令行

pub mod cli;
pub mod document;
pub mod error;
pub mod mediator;
pub mod migration;
pub mod models;
pub mod relational;
pub mod stats;
pub mod traits;

mod observe;

pub use document::{DocumentStoreAdapter, Mode};
pub use error::{Result, StorageError};
pub use mediator::{HybridStorage, MediatorOptions};
pub use migration::{CollectionReport, MigrationDriver, MigrationFailure, MigrationReport};
pub use models::{Collection, FieldFilter, QueryOperator, Record, derive_id};
pub use relational::PgRelationalStore;
pub use stats::{SyncStats, SyncStatsSnapshot};
pub use traits::{DocumentStore, RelationalStore};

/// 生产环境使用的具体组合
pub type Storage = HybridStorage<DocumentStoreAdapter, PgRelationalStore>;
