//! 应用状态定义

use std::sync::Arc;

use crate::service::StorageAdmin;

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub admin: Arc<dyn StorageAdmin>,
}

impl AppState {
    pub fn new(admin: Arc<dyn StorageAdmin>) -> Self {
        Self { admin }
    }
}
