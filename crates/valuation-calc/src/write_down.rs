//! 價值保留減損
//!
//! 非銷貨減損（瑕疵、損壞、遺失）走同樣的 FIFO 順序，但批次價值不隨數量沖銷，
//! 而是重新分配到剩餘單位上：數量減少、單位成本上升、批次總價值不變。
//!
//! 批次被整批扣完時，剩餘價值無處分配，隨批次一併沖銷（已知邊界情況，不視為錯誤）。
//!
//! 重分配的倍率累計在批次的 `value_factor`，物流結算重新計價時沿用，
//! 減損保留下來的價值不會因結算而消失。

use rust_decimal::Decimal;
use valuation_core::{
    AdjustmentReason, Movement, MovementKind, Result, ValuationConfig, ValuationError,
    VariantBook,
};

use crate::fifo::{Allocation, FifoCalculator};

/// 減損計算器
pub struct WriteDownCalculator;

impl WriteDownCalculator {
    /// 執行減損
    pub fn write_down(
        book: &mut VariantBook,
        quantity: i64,
        reason: AdjustmentReason,
        config: &ValuationConfig,
    ) -> Result<Vec<Movement>> {
        let allocations = FifoCalculator::allocate(book, quantity)?;
        let mut movements = Vec::with_capacity(allocations.len());

        for Allocation { index, taken } in allocations {
            let batch = &mut book.batches_mut()[index];
            let old_value = batch.remaining_value()?;
            let old_unit_cost = batch.unit_cost;
            let old_quantity = batch.remaining_quantity;

            batch.take(taken)?;

            if !batch.is_exhausted() {
                let remaining = Decimal::from(batch.remaining_quantity);
                batch.unit_cost = config.round_cost(old_value / remaining);
                batch.value_factor = batch
                    .value_factor
                    .checked_mul(Decimal::from(old_quantity) / remaining)
                    .ok_or_else(|| {
                        ValuationError::InvalidCost(format!("批次 {} 減損倍率溢位", batch.id))
                    })?;
                tracing::debug!(
                    "減損: 批次 {} 扣 {}，單位成本 {} → {}，剩餘 {}",
                    batch.id,
                    taken,
                    old_unit_cost,
                    batch.unit_cost,
                    batch.remaining_quantity
                );
            } else {
                tracing::warn!(
                    "減損: 批次 {} (物料 {}) 整批扣完，價值 {} 隨之沖銷",
                    batch.id,
                    batch.variant_id,
                    old_value
                );
            }

            movements.push(Movement::outbound(
                batch.id,
                batch.variant_id.clone(),
                taken,
                old_unit_cost,
                MovementKind::Adjustment {
                    reason: reason.clone(),
                },
            ));
        }

        book.append_movements(movements.iter().cloned());

        Ok(movements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AggregateCalculator;
    use rust_decimal_macros::dec;
    use valuation_core::{Batch, ValuationError};

    fn book(batches: &[(i64, Decimal)]) -> VariantBook {
        let mut book = VariantBook::new("SKU-X".to_string());
        for (i, &(quantity, cost)) in batches.iter().enumerate() {
            book.push_batch(Batch::new("SKU-X".to_string(), quantity, cost, i as u64 + 1).unwrap())
                .unwrap();
        }
        book
    }

    #[test]
    fn test_value_redistributed_to_remaining_units() {
        // B1(4 @10) 減損 1 → 剩 3，單位成本 40/3，總價值 40
        let mut book = book(&[(4, dec!(10))]);
        let config = ValuationConfig::default();

        let movements =
            WriteDownCalculator::write_down(&mut book, 1, AdjustmentReason::Defect, &config)
                .unwrap();

        let batch = &book.batches()[0];
        assert_eq!(batch.remaining_quantity, 3);
        assert_eq!(batch.unit_cost, dec!(40) / dec!(3));
        let value = batch.remaining_value().unwrap();
        assert!((value - dec!(40)).abs() < dec!(0.000000001));
        assert_eq!(batch.value_factor, dec!(4) / dec!(3));

        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].quantity, -1);
        // 異動記錄重分配前的成本
        assert_eq!(movements[0].unit_cost, dec!(10));
        assert_eq!(
            movements[0].kind,
            MovementKind::Adjustment {
                reason: AdjustmentReason::Defect
            }
        );
    }

    #[test]
    fn test_average_cost_rises_value_preserved() {
        let mut book = book(&[(4, dec!(10)), (6, dec!(15))]);
        let before = AggregateCalculator::recompute(&book).unwrap();

        // 扣 2：全部來自 B1，B1 剩 2 @20
        WriteDownCalculator::write_down(
            &mut book,
            2,
            AdjustmentReason::Damage,
            &ValuationConfig::default(),
        )
        .unwrap();
        let after = AggregateCalculator::recompute(&book).unwrap();

        assert_eq!(book.batches()[0].unit_cost, dec!(20));
        assert_eq!(book.batches()[0].value_factor, dec!(2));
        assert_eq!(after.total_quantity, 8);
        assert_eq!(after.total_value, before.total_value);
        assert!(after.average_cost > before.average_cost);
    }

    #[test]
    fn test_exhausted_batch_writes_off_value() {
        // B1(2 @10), B2(3 @12)，減損 3：B1 整批扣完，B2 剩 2 @18
        let mut book = book(&[(2, dec!(10)), (3, dec!(12))]);
        let movements = WriteDownCalculator::write_down(
            &mut book,
            3,
            AdjustmentReason::Loss,
            &ValuationConfig::default(),
        )
        .unwrap();

        assert_eq!(movements.len(), 2);
        assert_eq!(book.batches()[0].remaining_quantity, 0);
        // 耗盡批次的單位成本與倍率保持不變
        assert_eq!(book.batches()[0].unit_cost, dec!(10));
        assert_eq!(book.batches()[0].value_factor, Decimal::ONE);
        assert_eq!(book.batches()[1].unit_cost, dec!(18));

        // B1 的 20 隨之沖銷，只剩 B2 的 36
        let summary = AggregateCalculator::recompute(&book).unwrap();
        assert_eq!(summary.total_value, dec!(36));
        assert_eq!(summary.average_cost, dec!(18));
    }

    #[test]
    fn test_rounded_redistribution() {
        let mut book = book(&[(4, dec!(10))]);
        let config = ValuationConfig::new().with_cost_scale(4);

        WriteDownCalculator::write_down(&mut book, 1, AdjustmentReason::Defect, &config).unwrap();
        assert_eq!(book.batches()[0].unit_cost, dec!(13.3333));
    }

    #[test]
    fn test_insufficient_stock() {
        let mut book = book(&[(1, dec!(10))]);
        let result = WriteDownCalculator::write_down(
            &mut book,
            2,
            AdjustmentReason::Loss,
            &ValuationConfig::default(),
        );
        assert!(matches!(result, Err(ValuationError::InsufficientStock { .. })));
        assert_eq!(book.batches()[0].remaining_quantity, 1);
    }
}
