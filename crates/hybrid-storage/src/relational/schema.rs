//! 关系表结构
//!
//! 每个集合对应一张表：`id TEXT PRIMARY KEY`、若干热点类型列、以及兜底的 `metadata JSONB`。
//! 不属于类型列的字段都进入 `metadata`，因此新增字段不需要改表。
//!
//! 标识符一律加双引号，`order`、`vendorId` 这类关键字或驼峰列名可以直接使用。

use crate::models::Collection;

/// 元数据列名
pub const METADATA_COLUMN: &str = "metadata";

/// 列类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Boolean,
    BigInt,
    Double,
    Json,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Boolean => "BOOLEAN",
            Self::BigInt => "BIGINT",
            Self::Double => "DOUBLE PRECISION",
            Self::Json => "JSONB",
        }
    }
}

/// 列定义
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    /// 原样拼入 DDL 的默认值表达式
    pub default: Option<&'static str>,
}

const fn text(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        ty: ColumnType::Text,
        default: None,
    }
}

const fn text_default(name: &'static str, default: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        ty: ColumnType::Text,
        default: Some(default),
    }
}

const fn boolean(name: &'static str, default: Option<&'static str>) -> ColumnDef {
    ColumnDef {
        name,
        ty: ColumnType::Boolean,
        default,
    }
}

const fn bigint(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        ty: ColumnType::BigInt,
        default: None,
    }
}

const fn double(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        ty: ColumnType::Double,
        default: None,
    }
}

const fn json(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        ty: ColumnType::Json,
        default: None,
    }
}

/// 表结构
#[derive(Debug)]
pub struct TableSchema {
    pub collection: Collection,
    /// 除 `id` 与 `metadata` 之外的类型列
    pub columns: &'static [ColumnDef],
    pub indexes: &'static [&'static [&'static str]],
    pub unique: &'static [&'static [&'static str]],
}

impl TableSchema {
    pub fn table(&self) -> &'static str {
        self.collection.as_str()
    }

    /// 按字段名查找类型列
    pub fn column(&self, field: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == field)
    }

    /// 建表与建索引语句（均可重复执行）
    pub fn ddl(&self) -> Vec<String> {
        let table = self.table();
        let mut defs = vec![format!("{} TEXT PRIMARY KEY", quote_ident("id"))];
        for column in self.columns {
            let mut def = format!("{} {}", quote_ident(column.name), column.ty.sql());
            if let Some(default) = column.default {
                def.push_str(" DEFAULT ");
                def.push_str(default);
            }
            defs.push(def);
        }
        defs.push(format!("{} JSONB", quote_ident(METADATA_COLUMN)));
        for columns in self.unique {
            defs.push(format!(
                "CONSTRAINT {} UNIQUE ({})",
                quote_ident(&constraint_name("uq", table, columns)),
                quote_list(columns)
            ));
        }

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(table),
            defs.join(",\n    ")
        )];
        for columns in self.indexes {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&constraint_name("idx", table, columns)),
                quote_ident(table),
                quote_list(columns)
            ));
        }
        statements
    }

    pub fn drop_ddl(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_ident(self.table()))
    }
}

/// 标识符加双引号，内部的双引号转义
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

// 索引名在 schema 内全局唯一，带上表名
fn constraint_name(prefix: &str, table: &str, columns: &[&str]) -> String {
    format!("{prefix}_{table}_{}", columns.join("_")).to_lowercase()
}

static QR_TOKENS: TableSchema = TableSchema {
    collection: Collection::QrTokens,
    columns: &[
        text("token"),
        text("layout"),
        text("created_at"),
        text("claimed_at"),
        text("vendor_id"),
        text("vendor_slug"),
        text_default("status", "'unclaimed'"),
        text("registration_url"),
        text("updated_at"),
        text("qr_image"),
        boolean("admin_verified", Some("FALSE")),
        text("verified_at"),
    ],
    indexes: &[&["status"], &["vendor_id"]],
    unique: &[&["token"]],
};

static VENDORS: TableSchema = TableSchema {
    collection: Collection::Vendors,
    columns: &[
        text("created_at"),
        text("name"),
        text("address"),
        text("email"),
        text("phone"),
        text("qr_code_url"),
        text("password"),
        text("slug"),
        boolean("verified", Some("FALSE")),
        text_default("status", "'active'"),
        text("city"),
        text("qr_token"),
        text("qr_layout"),
        text("profile_image"),
    ],
    indexes: &[&["email"], &["slug"]],
    unique: &[],
};

static CUSTOMERS: TableSchema = TableSchema {
    collection: Collection::Customers,
    columns: &[
        text("created_at"),
        text("vendorId"),
        text("updated_at"),
        text("name"),
        text("phone_number"),
        text_default("status", "'active'"),
    ],
    indexes: &[&["vendorId"], &["phone_number"]],
    unique: &[&["vendorId", "phone_number"]],
};

static REDEMPTIONS: TableSchema = TableSchema {
    collection: Collection::Redemptions,
    columns: &[
        text("otpGeneratedAt"),
        text("offerTitle"),
        text("offerId"),
        text_default("status", "'pending'"),
        text("offerExpiresAt"),
        text("updatedAt"),
        text("otpExpiresAt"),
        text("createdAt"),
        text("sessionId"),
        text("customerName"),
        bigint("discountPercent"),
        text("otp"),
        text("phoneNumber"),
        text("vendorId"),
        text("offerDescription"),
    ],
    indexes: &[&["phoneNumber"], &["vendorId"], &["sessionId"], &["otp"]],
    unique: &[],
};

static PRODUCTS: TableSchema = TableSchema {
    collection: Collection::Products,
    columns: &[
        text("updatedAt"),
        text("name"),
        double("price"),
        text("vendorId"),
        bigint("order"),
        text("createdAt"),
        boolean("isActive", None),
        text("icon"),
        text("description"),
        text("category"),
        text("image_url"),
        text_default("status", "'active'"),
    ],
    indexes: &[&["vendorId"]],
    unique: &[],
};

static OFFERS: TableSchema = TableSchema {
    collection: Collection::Offers,
    columns: &[
        text("title"),
        text("description"),
        text_default("status", "'draft'"),
        text("created_at"),
        text("updated_at"),
    ],
    indexes: &[&["status"]],
    unique: &[],
};

static VENDOR_OFFER_ACTIONS: TableSchema = TableSchema {
    collection: Collection::VendorOfferActions,
    columns: &[
        text("vendor_id"),
        text("offer_id"),
        text("action_type"),
        text_default("status", "'pending'"),
        text("created_at"),
        text("updated_at"),
    ],
    indexes: &[&["vendor_id"], &["offer_id"]],
    unique: &[],
};

static BROADCASTS: TableSchema = TableSchema {
    collection: Collection::Broadcasts,
    columns: &[
        text("title"),
        text("message"),
        text_default("status", "'draft'"),
        text("created_at"),
        text("updated_at"),
    ],
    indexes: &[&["status"]],
    unique: &[],
};

static BROADCAST_QUEUE: TableSchema = TableSchema {
    collection: Collection::BroadcastQueue,
    columns: &[
        text("broadcast_id"),
        text("vendor_id"),
        text_default("status", "'pending'"),
        text("created_at"),
        text("updated_at"),
    ],
    indexes: &[&["status"]],
    unique: &[],
};

static WEBHOOK_EVENTS: TableSchema = TableSchema {
    collection: Collection::WebhookEvents,
    columns: &[
        text("event_type"),
        json("payload"),
        text_default("status", "'pending'"),
        text("created_at"),
    ],
    indexes: &[&["event_type"]],
    unique: &[],
};

static CUSTOMER_OPTINS: TableSchema = TableSchema {
    collection: Collection::CustomerOptins,
    columns: &[
        text("phone_number"),
        text("vendor_id"),
        text_default("status", "'active'"),
        text("created_at"),
        text("updated_at"),
    ],
    indexes: &[&["phone_number"]],
    unique: &[],
};

static VENDOR_IMAGES: TableSchema = TableSchema {
    collection: Collection::VendorImages,
    columns: &[
        text("fileName"),
        text("imageData"),
        text("uploadedAt"),
        text("folder"),
        bigint("size"),
        text("vendor_id"),
        text_default("status", "'active'"),
        text("created_at"),
    ],
    indexes: &[&["vendor_id"]],
    unique: &[],
};

/// 获取集合对应的表结构
pub fn schema_for(collection: Collection) -> &'static TableSchema {
    match collection {
        Collection::QrTokens => &QR_TOKENS,
        Collection::Vendors => &VENDORS,
        Collection::Customers => &CUSTOMERS,
        Collection::Redemptions => &REDEMPTIONS,
        Collection::Products => &PRODUCTS,
        Collection::Offers => &OFFERS,
        Collection::VendorOfferActions => &VENDOR_OFFER_ACTIONS,
        Collection::Broadcasts => &BROADCASTS,
        Collection::BroadcastQueue => &BROADCAST_QUEUE,
        Collection::WebhookEvents => &WEBHOOK_EVENTS,
        Collection::CustomerOptins => &CUSTOMER_OPTINS,
        Collection::VendorImages => &VENDOR_IMAGES,
    }
}
