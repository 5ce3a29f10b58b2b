//! 帳本稽核
//!
//! 唯讀檢查：重算每個物料的彙總並與快取比對，並核對批次與異動紀錄守恆：
//! 剩餘數量 = 原始數量 + Σ 該批次異動數量。

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use uuid::Uuid;
use valuation_core::{MovementKind, VariantBook, VariantSummary};

use crate::{AggregateCalculator, IntegrityIssue};

/// 稽核器
pub struct IntegrityAuditor;

impl IntegrityAuditor {
    /// 平行稽核多本帳冊（每本帳冊各自上鎖）
    pub fn audit_books(
        books: &[(Arc<Mutex<VariantBook>>, Option<VariantSummary>)],
        known_sale_lines: &HashSet<Uuid>,
    ) -> Vec<IntegrityIssue> {
        let mut issues: Vec<IntegrityIssue> = books
            .par_iter()
            .flat_map_iter(|(handle, cached)| match handle.lock() {
                Ok(book) => Self::audit_book(&book, cached.as_ref(), known_sale_lines),
                Err(poisoned) => vec![IntegrityIssue::error(
                    poisoned.get_ref().variant_id.clone(),
                    "帳冊鎖已損毀".to_string(),
                )],
            })
            .collect();

        issues.sort_by(|a, b| a.variant_id.cmp(&b.variant_id));
        issues
    }

    /// 稽核單一帳冊
    pub fn audit_book(
        book: &VariantBook,
        cached: Option<&VariantSummary>,
        known_sale_lines: &HashSet<Uuid>,
    ) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();
        let variant_id = &book.variant_id;

        for batch in book.batches() {
            if let Err(err) = batch.check_quantities() {
                issues.push(IntegrityIssue::error(variant_id.clone(), err.to_string()));
            }

            let expected = book
                .movements_for_batch(batch.id)
                .try_fold(batch.original_quantity, |acc, m| acc.checked_add(m.quantity));
            match expected {
                Some(expected) if expected == batch.remaining_quantity => {}
                Some(expected) => issues.push(IntegrityIssue::error(
                    variant_id.clone(),
                    format!(
                        "批次 {} 原始 {} 加計異動應剩 {}，實際剩餘 {}",
                        batch.id,
                        batch.original_quantity,
                        expected,
                        batch.remaining_quantity
                    ),
                )),
                None => issues.push(IntegrityIssue::error(
                    variant_id.clone(),
                    format!("批次 {} 異動數量合計溢位", batch.id),
                )),
            }
        }

        for movement in book.movements() {
            if book.batch(movement.batch_id).is_none() {
                issues.push(IntegrityIssue::error(
                    variant_id.clone(),
                    format!("異動 {} 指向不存在的批次 {}", movement.id, movement.batch_id),
                ));
            }
            if let MovementKind::Sale { invoice_ref, line_id } = &movement.kind {
                if !known_sale_lines.contains(line_id) {
                    issues.push(IntegrityIssue::warning(
                        variant_id.clone(),
                        format!(
                            "異動 {} 的銷貨明細 {} (發票 {}) 不在銷貨登記中",
                            movement.id, line_id, invoice_ref
                        ),
                    ));
                }
            }
        }

        match AggregateCalculator::recompute(book) {
            Ok(recomputed) => match cached {
                Some(summary) if *summary == recomputed => {}
                Some(summary) => issues.push(IntegrityIssue::error(
                    variant_id.clone(),
                    format!(
                        "快取彙總 ({}, {}) 與重算 ({}, {}) 不符",
                        summary.total_quantity,
                        summary.average_cost,
                        recomputed.total_quantity,
                        recomputed.average_cost
                    ),
                )),
                None => issues.push(IntegrityIssue::warning(
                    variant_id.clone(),
                    "物料缺少快取彙總".to_string(),
                )),
            },
            Err(err) => issues.push(IntegrityIssue::error(variant_id.clone(), err.to_string())),
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FifoCalculator, IssueSeverity};
    use rust_decimal_macros::dec;
    use valuation_core::Batch;

    fn healthy_book() -> (VariantBook, Uuid) {
        let mut book = VariantBook::new("SKU-X".to_string());
        book.push_batch(Batch::new("SKU-X".to_string(), 5, dec!(10), 1).unwrap())
            .unwrap();
        let line_id = Uuid::new_v4();
        FifoCalculator::consume(
            &mut book,
            2,
            MovementKind::Sale {
                invoice_ref: "INV-1".to_string(),
                line_id,
            },
        )
        .unwrap();
        (book, line_id)
    }

    #[test]
    fn test_healthy_book_has_no_issues() {
        let (book, line_id) = healthy_book();
        let summary = AggregateCalculator::recompute(&book).unwrap();
        let known: HashSet<Uuid> = [line_id].into_iter().collect();

        assert!(IntegrityAuditor::audit_book(&book, Some(&summary), &known).is_empty());
    }

    #[test]
    fn test_detects_stale_summary_and_orphan_sale() {
        let (book, _) = healthy_book();
        let stale = VariantSummary::empty("SKU-X".to_string());

        let issues = IntegrityAuditor::audit_book(&book, Some(&stale), &HashSet::new());
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| i.severity == IssueSeverity::Warning));
        assert!(issues.iter().any(|i| i.severity == IssueSeverity::Error));
    }

    #[test]
    fn test_detects_movement_drift() {
        let (mut book, line_id) = healthy_book();
        book.batches_mut()[0].remaining_quantity = 4;
        let summary = AggregateCalculator::recompute(&book).unwrap();
        let known: HashSet<Uuid> = [line_id].into_iter().collect();

        let issues = IntegrityAuditor::audit_book(&book, Some(&summary), &known);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("實際剩餘"));
    }

    #[test]
    fn test_audit_books_in_parallel() {
        let (book, line_id) = healthy_book();
        let summary = AggregateCalculator::recompute(&book).unwrap();
        let known: HashSet<Uuid> = [line_id].into_iter().collect();

        let books = vec![
            (Arc::new(Mutex::new(book.clone())), Some(summary)),
            (Arc::new(Mutex::new(book)), None),
        ];
        let issues = IntegrityAuditor::audit_books(&books, &known);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, IssueSeverity::Warning);
    }
}
