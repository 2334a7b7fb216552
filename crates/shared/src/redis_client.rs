//! Redis 连接管理模块
//!
//! 文档库的持久化后端。整个进程只维护一条多路复用连接，首次使用时建立，之后克隆复用。

use crate::error::{Result, SharedError};
use redis::Client;
use redis::aio::MultiplexedConnection;
use tokio::sync::OnceCell;
use tracing::{info, instrument};

/// Redis 连接器
pub struct RedisConnector {
    client: Client,
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisConnector {
    /// 创建 Redis 客户端（不立即连接）
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        info!("Redis client created");
        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    /// 从可选地址创建，未配置时返回 `RedisNotConfigured`
    pub fn from_optional_url(url: Option<&str>) -> Result<Self> {
        match url {
            Some(url) if !url.trim().is_empty() => Self::new(url),
            _ => Err(SharedError::RedisNotConfigured),
        }
    }

    /// 获取共享连接
    ///
    /// 连接失败时不缓存错误，下次调用会重新尝试建立连接。
    #[instrument(skip(self))]
    pub async fn connection(&self) -> Result<MultiplexedConnection> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                let conn = self.client.get_multiplexed_async_connection().await?;
                info!("Redis connection established");
                Ok::<_, SharedError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}
