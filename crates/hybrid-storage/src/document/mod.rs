//! 文档库适配器（主存储）
//!
//! - `store`: Redis 持久化 / 内存降级两种模式的 [`DocumentStore`](crate::traits::DocumentStore) 实现
//! - `memory`: 实例自有的内存存储

mod memory;
mod store;

pub use memory::MemoryStore;
pub use store::{DocumentStoreAdapter, Mode};
