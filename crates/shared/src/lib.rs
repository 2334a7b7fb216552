//! 共享库
//!
//! 包含存储服务共用的配置、错误处理、数据库连接池、Redis 连接以及可观测性基础设施代码。

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
pub mod redis_client;
