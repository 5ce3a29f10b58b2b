//! 物料彙總（衍生快取）

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 物料層級彙總
///
/// 只能由彙總重算產生，呼叫端不可直接修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSummary {
    /// 物料ID
    pub variant_id: String,

    /// 總數量 = Σ 批次剩餘數量
    pub total_quantity: i64,

    /// 加權平均成本 = 總價值 / 總數量（無庫存時為零）
    pub average_cost: Decimal,

    /// 總價值 = Σ(剩餘數量 × 單位成本)
    pub total_value: Decimal,

    /// 批次數（含已耗盡）
    pub batch_count: usize,
}

impl VariantSummary {
    /// 空彙總
    pub fn empty(variant_id: String) -> Self {
        Self {
            variant_id,
            total_quantity: 0,
            average_cost: Decimal::ZERO,
            total_value: Decimal::ZERO,
            batch_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        let summary = VariantSummary::empty("SKU-001".to_string());

        assert_eq!(summary.total_quantity, 0);
        assert_eq!(summary.average_cost, Decimal::ZERO);
        assert_eq!(summary.total_value, Decimal::ZERO);
    }
}
