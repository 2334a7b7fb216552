//! 集合定义
//!
//! 两个存储共享同一套固定的集合名称。新增集合只需增加枚举变体并登记关系表结构，
//! 文档库一侧无需任何声明。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// 集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Vendors,
    Customers,
    QrTokens,
    Products,
    Offers,
    Redemptions,
    Broadcasts,
    BroadcastQueue,
    WebhookEvents,
    CustomerOptins,
    VendorOfferActions,
    VendorImages,
}

impl Collection {
    /// 全部集合
    pub const ALL: [Collection; 12] = [
        Collection::Vendors,
        Collection::Customers,
        Collection::QrTokens,
        Collection::Products,
        Collection::Offers,
        Collection::Redemptions,
        Collection::Broadcasts,
        Collection::BroadcastQueue,
        Collection::WebhookEvents,
        Collection::CustomerOptins,
        Collection::VendorOfferActions,
        Collection::VendorImages,
    ];

    /// 迁移顺序：先迁移被引用较多的二维码与商户，图片放在最后
    pub const MIGRATION_ORDER: [Collection; 12] = [
        Collection::QrTokens,
        Collection::Vendors,
        Collection::Offers,
        Collection::VendorOfferActions,
        Collection::Customers,
        Collection::Redemptions,
        Collection::Broadcasts,
        Collection::BroadcastQueue,
        Collection::WebhookEvents,
        Collection::CustomerOptins,
        Collection::Products,
        Collection::VendorImages,
    ];

    /// 集合名（同时也是关系表名）
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vendors => "vendors",
            Self::Customers => "customers",
            Self::QrTokens => "qr_tokens",
            Self::Products => "products",
            Self::Offers => "offers",
            Self::Redemptions => "redemptions",
            Self::Broadcasts => "broadcasts",
            Self::BroadcastQueue => "broadcast_queue",
            Self::WebhookEvents => "webhook_events",
            Self::CustomerOptins => "customer_optins",
            Self::VendorOfferActions => "vendor_offer_actions",
            Self::VendorImages => "vendor_images",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| StorageError::UnknownCollection(s.to_string()))
    }
}
