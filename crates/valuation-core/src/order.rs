//! 採購單模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BatchId, Result, ValuationError};

/// 採購單明細（用於計算名目總額）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// 數量
    pub quantity: i64,
    /// 原幣單價
    pub source_unit_price: Decimal,
}

impl OrderLine {
    pub fn new(quantity: i64, source_unit_price: Decimal) -> Self {
        Self {
            quantity,
            source_unit_price,
        }
    }
}

/// 批次所屬採購單的成本背景
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderContext {
    /// 採購單ID
    pub order_id: String,

    /// 匯率（原幣 → 本幣）
    pub exchange_rate: Decimal,

    /// 採購單總數量（所有批次）
    pub total_quantity: i64,

    /// 採購單總運費（本幣）
    pub freight_fee: Decimal,

    /// 名目總額：Σ(單價 × 匯率 × 數量)
    pub nominal_total: Option<Decimal>,

    /// 實付總額
    pub paid_total: Option<Decimal>,
}

impl OrderContext {
    /// 創建新的採購單背景（無運費、無付款差額）
    pub fn new(order_id: String, exchange_rate: Decimal, total_quantity: i64) -> Self {
        Self {
            order_id,
            exchange_rate,
            total_quantity,
            freight_fee: Decimal::ZERO,
            nominal_total: None,
            paid_total: None,
        }
    }

    /// 由採購明細建立，總數量與名目總額自動推導
    pub fn from_lines(
        order_id: String,
        exchange_rate: Decimal,
        lines: &[OrderLine],
    ) -> Result<Self> {
        let mut total_quantity = 0i64;
        let mut nominal_total = Decimal::ZERO;
        for line in lines {
            total_quantity = total_quantity
                .checked_add(line.quantity)
                .ok_or(ValuationError::InvalidQuantity(line.quantity))?;
            nominal_total = line
                .source_unit_price
                .checked_mul(exchange_rate)
                .and_then(|v| v.checked_mul(Decimal::from(line.quantity)))
                .and_then(|v| nominal_total.checked_add(v))
                .ok_or_else(|| {
                    ValuationError::InvalidCost(format!("採購單 {} 名目總額溢位", order_id))
                })?;
        }

        Ok(Self {
            nominal_total: Some(nominal_total),
            ..Self::new(order_id, exchange_rate, total_quantity)
        })
    }

    /// 建構器模式：設置總運費
    pub fn with_freight_fee(mut self, freight_fee: Decimal) -> Self {
        self.freight_fee = freight_fee;
        self
    }

    /// 建構器模式：設置實付總額
    pub fn with_paid_total(mut self, paid_total: Decimal) -> Self {
        self.paid_total = Some(paid_total);
        self
    }

    /// 建構器模式：設置名目總額
    pub fn with_nominal_total(mut self, nominal_total: Decimal) -> Self {
        self.nominal_total = Some(nominal_total);
        self
    }

    /// 付款差額（實付 - 名目），資料不足時為零
    pub fn payment_gap(&self) -> Result<Decimal> {
        match (self.paid_total, self.nominal_total) {
            (Some(paid), Some(nominal)) => paid.checked_sub(nominal).ok_or_else(|| {
                ValuationError::InvalidCost(format!("採購單 {} 付款差額溢位", self.order_id))
            }),
            _ => Ok(Decimal::ZERO),
        }
    }
}

/// 採購單登記紀錄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderRecord {
    /// 採購單ID
    pub order_id: String,

    /// 所屬批次（物料ID, 批次ID），依建立順序
    pub batches: Vec<(String, BatchId)>,

    /// 結算運費
    pub freight_fee: Decimal,

    /// 結算實付總額
    pub paid_total: Option<Decimal>,

    /// 是否已結算物流
    pub finalized: bool,
}

impl PurchaseOrderRecord {
    /// 創建新的採購單登記
    pub fn new(order_id: String) -> Self {
        Self {
            order_id,
            batches: Vec::new(),
            freight_fee: Decimal::ZERO,
            paid_total: None,
            finalized: false,
        }
    }

    /// 登記批次
    pub fn add_batch(&mut self, variant_id: String, batch_id: BatchId) {
        self.batches.push((variant_id, batch_id));
    }

    /// 涉及的物料（排序、去重）
    pub fn variant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.batches.iter().map(|(v, _)| v.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_context_from_lines() {
        let context = OrderContext::from_lines(
            "PO-001".to_string(),
            dec!(4.5),
            &[OrderLine::new(10, dec!(2)), OrderLine::new(30, dec!(1))],
        )
        .unwrap();

        assert_eq!(context.total_quantity, 40);
        // 10 × 2 × 4.5 + 30 × 1 × 4.5 = 90 + 135
        assert_eq!(context.nominal_total, Some(dec!(225)));
        assert_eq!(context.payment_gap().unwrap(), Decimal::ZERO);

        let paid = context.with_paid_total(dec!(245));
        assert_eq!(paid.payment_gap().unwrap(), dec!(20));
    }

    #[test]
    fn test_context_from_lines_overflow() {
        let quantity = OrderContext::from_lines(
            "PO-004".to_string(),
            dec!(1),
            &[OrderLine::new(i64::MAX, dec!(0)), OrderLine::new(1, dec!(0))],
        );
        assert!(matches!(quantity, Err(ValuationError::InvalidQuantity(_))));

        let nominal = OrderContext::from_lines(
            "PO-005".to_string(),
            Decimal::MAX,
            &[OrderLine::new(2, dec!(1))],
        );
        assert!(matches!(nominal, Err(ValuationError::InvalidCost(_))));
    }

    #[test]
    fn test_gap_requires_both_totals() {
        let context = OrderContext::new("PO-002".to_string(), dec!(1), 5).with_paid_total(dec!(80));
        assert_eq!(context.payment_gap().unwrap(), Decimal::ZERO);

        let context = context.with_nominal_total(dec!(75));
        assert_eq!(context.payment_gap().unwrap(), dec!(5));
    }

    #[test]
    fn test_order_record_variants() {
        let mut record = PurchaseOrderRecord::new("PO-003".to_string());
        record.add_batch("SKU-B".to_string(), Uuid::new_v4());
        record.add_batch("SKU-A".to_string(), Uuid::new_v4());
        record.add_batch("SKU-B".to_string(), Uuid::new_v4());

        assert_eq!(record.variant_ids(), vec!["SKU-A".to_string(), "SKU-B".to_string()]);
        assert!(!record.finalized);
    }
}
