//! 物料帳冊（批次存放區）
//!
//! 每個物料一本帳冊，獨佔其批次與異動紀錄，也是鎖定的最小單位。

use serde::{Deserialize, Serialize};

use crate::{Batch, BatchId, Movement, Result, ValuationError};

/// 物料帳冊
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantBook {
    /// 物料ID
    pub variant_id: String,

    /// 批次（依插入順序）
    batches: Vec<Batch>,

    /// 異動紀錄（只增不改，沖銷時刪除）
    movements: Vec<Movement>,
}

impl VariantBook {
    /// 創建空帳冊
    pub fn new(variant_id: String) -> Self {
        Self {
            variant_id,
            batches: Vec::new(),
            movements: Vec::new(),
        }
    }

    /// 所有批次（插入順序）
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// 可變批次切片，搭配 `fifo_indices` 使用
    pub fn batches_mut(&mut self) -> &mut [Batch] {
        &mut self.batches
    }

    /// FIFO 順序的批次索引
    ///
    /// 依到貨序號遞增；序號相同時穩定排序保留插入順序。
    pub fn fifo_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.batches.len()).collect();
        indices.sort_by_key(|&i| self.batches[i].arrival_sequence);
        indices
    }

    /// FIFO 順序的批次
    pub fn fifo_batches(&self) -> Vec<&Batch> {
        self.fifo_indices()
            .into_iter()
            .map(|i| &self.batches[i])
            .collect()
    }

    /// 查詢批次
    pub fn batch(&self, batch_id: BatchId) -> Option<&Batch> {
        self.batches.iter().find(|b| b.id == batch_id)
    }

    /// 查詢可變批次
    pub fn batch_mut(&mut self, batch_id: BatchId) -> Option<&mut Batch> {
        self.batches.iter_mut().find(|b| b.id == batch_id)
    }

    /// 加入批次
    pub fn push_batch(&mut self, batch: Batch) -> Result<()> {
        if batch.variant_id != self.variant_id {
            return Err(ValuationError::inconsistent(format!(
                "批次 {} 屬於物料 {}，不可加入帳冊 {}",
                batch.id, batch.variant_id, self.variant_id
            )));
        }
        if self.batch(batch.id).is_some() {
            return Err(ValuationError::inconsistent(format!(
                "批次 {} 已存在",
                batch.id
            )));
        }
        self.batches.push(batch);
        Ok(())
    }

    /// 可用數量 = Σ 剩餘數量
    pub fn available_quantity(&self) -> Result<i64> {
        self.batches
            .iter()
            .try_fold(0i64, |acc, b| acc.checked_add(b.remaining_quantity))
            .ok_or_else(|| {
                ValuationError::inconsistent(format!("物料 {} 可用數量溢位", self.variant_id))
            })
    }

    /// 檢查帳冊結構：批次歸屬、批次ID唯一、數量範圍、異動指向既有批次
    ///
    /// 從外部資料重建帳冊（例如快照還原）時使用。
    pub fn check_integrity(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for batch in &self.batches {
            if batch.variant_id != self.variant_id {
                return Err(ValuationError::inconsistent(format!(
                    "批次 {} 屬於物料 {}，不可加入帳冊 {}",
                    batch.id, batch.variant_id, self.variant_id
                )));
            }
            if !seen.insert(batch.id) {
                return Err(ValuationError::inconsistent(format!(
                    "批次 {} 已存在",
                    batch.id
                )));
            }
            batch.check_quantities()?;
        }
        for movement in &self.movements {
            if movement.variant_id != self.variant_id || !seen.contains(&movement.batch_id) {
                return Err(ValuationError::inconsistent(format!(
                    "異動 {} 指向不存在的批次 {}",
                    movement.id, movement.batch_id
                )));
            }
        }
        self.available_quantity().map(|_| ())
    }

    /// 所有異動紀錄
    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    /// 追加異動紀錄
    pub fn append_movements(&mut self, movements: impl IntoIterator<Item = Movement>) {
        self.movements.extend(movements);
    }

    /// 移除並回傳符合條件的異動紀錄
    pub fn take_movements<F>(&mut self, mut predicate: F) -> Vec<Movement>
    where
        F: FnMut(&Movement) -> bool,
    {
        let (taken, kept): (Vec<Movement>, Vec<Movement>) =
            std::mem::take(&mut self.movements)
                .into_iter()
                .partition(|m| predicate(m));
        self.movements = kept;
        taken
    }

    /// 指定批次的異動紀錄
    pub fn movements_for_batch(&self, batch_id: BatchId) -> impl Iterator<Item = &Movement> {
        self.movements.iter().filter(move |m| m.batch_id == batch_id)
    }
}
