//! 估值帳本配置

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// 帳本參數配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationConfig {
    /// 單位成本小數位數
    /// - None: 保留 Decimal 全部精度（預設）
    /// - Some(n): 推導出的單位成本（運費分攤、差額分攤、減值重分配）四捨五入到 n 位
    pub cost_scale: Option<u32>,

    /// 捨入策略
    pub rounding: CostRounding,

    /// 樂觀重試上限
    ///
    /// 沖銷與物流結算需先從登記表讀出涉及的物料，再鎖定物料；
    /// 若期間登記內容變動則重試，超過此次數回傳衝突錯誤。
    pub max_lock_retries: u32,
}

impl ValuationConfig {
    /// 創建預設配置
    pub fn new() -> Self {
        Self {
            cost_scale: None,
            rounding: CostRounding::MidpointNearestEven,
            max_lock_retries: 8,
        }
    }

    /// 建構器模式：設置單位成本小數位數
    pub fn with_cost_scale(mut self, scale: u32) -> Self {
        self.cost_scale = Some(scale);
        self
    }

    /// 建構器模式：設置捨入策略
    pub fn with_rounding(mut self, rounding: CostRounding) -> Self {
        self.rounding = rounding;
        self
    }

    /// 建構器模式：設置樂觀重試上限
    pub fn with_max_lock_retries(mut self, retries: u32) -> Self {
        self.max_lock_retries = retries;
        self
    }

    /// 依配置捨入推導出的單位成本
    pub fn round_cost(&self, value: Decimal) -> Decimal {
        match self.cost_scale {
            Some(scale) => value.round_dp_with_strategy(scale, self.rounding.strategy()),
            None => value,
        }
    }
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 捨入策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostRounding {
    /// 銀行家捨入（四捨六入五成雙）
    MidpointNearestEven,
    /// 四捨五入
    MidpointAwayFromZero,
    /// 無條件捨去
    ToZero,
}

impl CostRounding {
    fn strategy(self) -> RoundingStrategy {
        match self {
            CostRounding::MidpointNearestEven => RoundingStrategy::MidpointNearestEven,
            CostRounding::MidpointAwayFromZero => RoundingStrategy::MidpointAwayFromZero,
            CostRounding::ToZero => RoundingStrategy::ToZero,
        }
    }
}
