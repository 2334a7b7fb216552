//! 存储管理服务
//!
//! 混合存储的 HTTP 运维入口：建表、迁移、迁移状态、表行数与文档库状态。
//!
//! ## 模块结构
//!
//! - `dto`: 响应数据结构
//! - `error`: 错误类型定义
//! - `handlers`: HTTP 请求处理器
//! - `routes`: 路由配置
//! - `service`: 运维操作接口与生产实现
//! - `state`: 应用状态

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod service;
pub mod state;

pub use dto::ApiResponse;
pub use error::{AdminError, Result};
pub use service::{LiveStorageAdmin, StorageAdmin};
pub use state::AppState;
