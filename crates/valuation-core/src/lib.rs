//! # Valuation Core
//!
//! 庫存估值帳本的核心資料模型與類型定義

pub mod batch;
pub mod book;
pub mod config;
pub mod movement;
pub mod order;
pub mod request;
pub mod sale;
pub mod snapshot;
pub mod variant;

// Re-export 主要類型
pub use batch::{Batch, BatchId};
pub use book::VariantBook;
pub use config::{CostRounding, ValuationConfig};
pub use movement::{AdjustmentReason, Movement, MovementKind};
pub use order::{OrderContext, OrderLine, PurchaseOrderRecord};
pub use request::{ConsumptionPurpose, ConsumptionRequest, SaleLineRequest};
pub use sale::{SaleLine, SaleTransaction};
pub use snapshot::LedgerSnapshot;
pub use variant::VariantSummary;

/// 估值帳本錯誤類型
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValuationError {
    #[error("庫存不足: 物料 {variant_id} 需要 {requested}, 可用 {available}")]
    InsufficientStock {
        variant_id: String,
        requested: i64,
        available: i64,
    },

    #[error("無效的數量: {0}")]
    InvalidQuantity(i64),

    #[error("無效的成本參數: {0}")]
    InvalidCost(String),

    #[error("找不到: {0}")]
    NotFound(String),

    #[error("帳本狀態不一致: {0}")]
    InconsistentState(String),

    #[error("並行衝突: {0}")]
    Conflict(String),
}

impl ValuationError {
    /// 是否為呼叫端輸入驗證錯誤（應直接回報給使用者）
    ///
    /// 其餘錯誤（找不到、狀態不一致、衝突）屬於營運事故。
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InsufficientStock { .. } | Self::InvalidQuantity(_) | Self::InvalidCost(_)
        )
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::InconsistentState(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ValuationError>;
