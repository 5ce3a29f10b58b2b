//! 進貨批次模型

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, ValuationError};

pub type BatchId = Uuid;

/// 進貨批次
///
/// 每次進貨建立一筆，永不刪除。剩餘數量歸零後僅作為歷史紀錄保留。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// 批次ID
    pub id: BatchId,

    /// 物料ID（SKU）
    pub variant_id: String,

    /// 來源採購單
    pub order_id: Option<String>,

    /// 原始數量（建立後不可變）
    pub original_quantity: i64,

    /// 剩餘數量
    pub remaining_quantity: i64,

    /// 到岸單位成本
    pub unit_cost: Decimal,

    /// 原幣單價
    pub source_unit_price: Decimal,

    /// 匯率
    pub exchange_rate: Decimal,

    /// 每單位運費分攤
    pub freight_per_unit: Decimal,

    /// 每單位付款差額分攤
    pub gap_per_unit: Decimal,

    /// 減損倍率：單位成本 = 到岸成本 × 倍率（減損把價值攤到剩餘單位時上升）
    #[serde(default = "unit_factor")]
    pub value_factor: Decimal,

    /// 到貨序號（FIFO 排序依據）
    pub arrival_sequence: u64,

    /// 到貨時間（僅供參考，不參與排序）
    pub received_at: DateTime<Utc>,
}

impl Batch {
    /// 創建新的批次
    pub fn new(
        variant_id: String,
        quantity: i64,
        unit_cost: Decimal,
        arrival_sequence: u64,
    ) -> Result<Self> {
        if quantity <= 0 {
            return Err(ValuationError::InvalidQuantity(quantity));
        }
        if unit_cost < Decimal::ZERO {
            return Err(ValuationError::InvalidCost(format!(
                "單位成本不可為負: {}",
                unit_cost
            )));
        }
        if Decimal::from(quantity).checked_mul(unit_cost).is_none() {
            return Err(ValuationError::InvalidCost(format!(
                "批次價值溢位: {} × {}",
                quantity, unit_cost
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            variant_id,
            order_id: None,
            original_quantity: quantity,
            remaining_quantity: quantity,
            unit_cost,
            source_unit_price: unit_cost,
            exchange_rate: Decimal::ONE,
            freight_per_unit: Decimal::ZERO,
            gap_per_unit: Decimal::ZERO,
            value_factor: Decimal::ONE,
            arrival_sequence,
            received_at: Utc::now(),
        })
    }

    /// 建構器模式：設置來源採購單
    pub fn with_order_id(mut self, order_id: String) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// 建構器模式：設置原幣成本基礎
    pub fn with_source_price(mut self, source_unit_price: Decimal, exchange_rate: Decimal) -> Self {
        self.source_unit_price = source_unit_price;
        self.exchange_rate = exchange_rate;
        self
    }

    /// 建構器模式：設置分攤項目
    pub fn with_allocations(mut self, freight_per_unit: Decimal, gap_per_unit: Decimal) -> Self {
        self.freight_per_unit = freight_per_unit;
        self.gap_per_unit = gap_per_unit;
        self
    }

    /// 是否已耗盡
    pub fn is_exhausted(&self) -> bool {
        self.remaining_quantity == 0
    }

    /// 指定數量以本批次單位成本計的金額
    pub fn value_of(&self, quantity: i64) -> Result<Decimal> {
        Decimal::from(quantity)
            .checked_mul(self.unit_cost)
            .ok_or_else(|| {
                ValuationError::InvalidCost(format!(
                    "批次 {} 金額溢位: {} × {}",
                    self.id, quantity, self.unit_cost
                ))
            })
    }

    /// 剩餘價值（剩餘數量 × 單位成本）
    pub fn remaining_value(&self) -> Result<Decimal> {
        self.value_of(self.remaining_quantity)
    }

    /// 扣減剩餘數量
    pub fn take(&mut self, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return Err(ValuationError::InvalidQuantity(quantity));
        }
        if quantity > self.remaining_quantity {
            return Err(ValuationError::inconsistent(format!(
                "批次 {} 扣減 {} 超過剩餘 {}",
                self.id, quantity, self.remaining_quantity
            )));
        }
        self.remaining_quantity -= quantity;
        Ok(())
    }

    /// 回補剩餘數量（沖銷用）
    pub fn restore(&mut self, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return Err(ValuationError::InvalidQuantity(quantity));
        }
        let restored = self.remaining_quantity.checked_add(quantity);
        if restored.map_or(true, |r| r > self.original_quantity) {
            return Err(ValuationError::inconsistent(format!(
                "批次 {} 回補 {} 後超過原始數量 {}",
                self.id, quantity, self.original_quantity
            )));
        }
        self.remaining_quantity += quantity;
        Ok(())
    }

    /// 檢查數量不變式：0 <= 剩餘 <= 原始
    pub fn check_quantities(&self) -> Result<()> {
        if self.remaining_quantity < 0 || self.remaining_quantity > self.original_quantity {
            return Err(ValuationError::inconsistent(format!(
                "批次 {} 剩餘數量 {} 超出範圍 0..={}",
                self.id, self.remaining_quantity, self.original_quantity
            )));
        }
        Ok(())
    }
}

fn unit_factor() -> Decimal {
    Decimal::ONE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_create_batch() {
        let batch = Batch::new("SKU-001".to_string(), 5, dec!(10), 1).unwrap();

        assert_eq!(batch.variant_id, "SKU-001");
        assert_eq!(batch.original_quantity, 5);
        assert_eq!(batch.remaining_quantity, 5);
        assert_eq!(batch.remaining_value().unwrap(), dec!(50));
        assert_eq!(batch.value_factor, Decimal::ONE);
        assert_eq!(batch.order_id, None);
    }

    #[test]
    fn test_reject_invalid_batch() {
        assert_eq!(
            Batch::new("SKU-001".to_string(), 0, dec!(10), 1),
            Err(ValuationError::InvalidQuantity(0))
        );
        assert!(matches!(
            Batch::new("SKU-001".to_string(), 3, dec!(-1), 1),
            Err(ValuationError::InvalidCost(_))
        ));
        // 數量 × 單位成本超出 Decimal 範圍
        assert!(matches!(
            Batch::new("SKU-001".to_string(), 1_000_000_000_000_000_000, dec!(1000000000000), 1),
            Err(ValuationError::InvalidCost(_))
        ));
    }

    #[test]
    fn test_take_and_restore() {
        let mut batch = Batch::new("SKU-002".to_string(), 5, dec!(12), 1).unwrap();

        batch.take(3).unwrap();
        assert_eq!(batch.remaining_quantity, 2);
        assert!(!batch.is_exhausted());

        // 超量扣減屬於狀態不一致
        assert!(matches!(batch.take(3), Err(ValuationError::InconsistentState(_))));
        assert_eq!(batch.remaining_quantity, 2);

        batch.restore(3).unwrap();
        assert_eq!(batch.remaining_quantity, 5);

        // 回補不可超過原始數量
        assert!(matches!(batch.restore(1), Err(ValuationError::InconsistentState(_))));
        assert!(matches!(
            batch.restore(i64::MAX),
            Err(ValuationError::InconsistentState(_))
        ));
    }

    #[test]
    fn test_check_quantities() {
        let mut batch = Batch::new("SKU-003".to_string(), 4, dec!(1), 1).unwrap();
        assert!(batch.check_quantities().is_ok());

        batch.remaining_quantity = -1;
        assert!(batch.check_quantities().is_err());
    }

    #[test]
    fn test_value_overflow_is_error() {
        let mut batch = Batch::new("SKU-005".to_string(), 2, dec!(1), 1).unwrap();
        batch.unit_cost = Decimal::MAX;
        assert!(matches!(batch.remaining_value(), Err(ValuationError::InvalidCost(_))));
    }

    #[test]
    fn test_batch_builder() {
        let batch = Batch::new("SKU-004".to_string(), 10, dec!(31.5), 7)
            .unwrap()
            .with_order_id("PO-1".to_string())
            .with_source_price(dec!(1), dec!(30))
            .with_allocations(dec!(1), dec!(0.5));

        assert_eq!(batch.order_id.as_deref(), Some("PO-1"));
        assert_eq!(batch.exchange_rate, dec!(30));
        assert_eq!(batch.freight_per_unit, dec!(1));
        assert_eq!(batch.gap_per_unit, dec!(0.5));
        assert_eq!(batch.arrival_sequence, 7);
    }
}
