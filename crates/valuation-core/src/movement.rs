//! 庫存異動紀錄

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::BatchId;

/// 調整原因
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjustmentReason {
    /// 瑕疵
    Defect,
    /// 損壞
    Damage,
    /// 遺失
    Loss,
    /// 其他
    Other(String),
}

impl std::fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdjustmentReason::Defect => write!(f, "defect"),
            AdjustmentReason::Damage => write!(f, "damage"),
            AdjustmentReason::Loss => write!(f, "loss"),
            AdjustmentReason::Other(text) => write!(f, "other:{}", text),
        }
    }
}

/// 異動類型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementKind {
    /// 銷貨（可沖銷）
    Sale { invoice_ref: String, line_id: Uuid },
    /// 非銷貨減損
    Adjustment { reason: AdjustmentReason },
}

/// 異動紀錄
///
/// 每個（批次, 消耗交易）組合一筆。數量為帶號值，出庫為負。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// 異動ID
    pub id: Uuid,

    /// 批次ID
    pub batch_id: BatchId,

    /// 物料ID
    pub variant_id: String,

    /// 帶號數量
    pub quantity: i64,

    /// 套用的單位成本
    pub unit_cost: Decimal,

    /// 異動類型
    pub kind: MovementKind,

    /// 紀錄時間
    pub recorded_at: DateTime<Utc>,
}

impl Movement {
    /// 創建出庫異動（數量以正數傳入，內部存為負數）
    pub fn outbound(
        batch_id: BatchId,
        variant_id: String,
        taken: i64,
        unit_cost: Decimal,
        kind: MovementKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            variant_id,
            quantity: -taken,
            unit_cost,
            kind,
            recorded_at: Utc::now(),
        }
    }

    /// 是否為銷貨異動
    pub fn is_sale(&self) -> bool {
        matches!(self.kind, MovementKind::Sale { .. })
    }

    /// 是否屬於指定銷貨明細
    pub fn belongs_to_line(&self, line: Uuid) -> bool {
        matches!(&self.kind, MovementKind::Sale { line_id, .. } if *line_id == line)
    }
}
