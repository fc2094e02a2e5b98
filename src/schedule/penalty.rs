use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::LateFeePolicy;
use crate::decimal::Money;

/// engine for late fees on overdue installments
#[derive(Debug, Clone, Copy)]
pub struct LateFeeEngine {
    pub policy: LateFeePolicy,
}

/// late fee calculation result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LateFeeCalculation {
    pub late_fee: Money,
    pub uncapped_fee: Money,
    pub cap: Money,
    pub days_charged: u32,
    pub capped: bool,
}

impl LateFeeEngine {
    pub fn new(policy: LateFeePolicy) -> Self {
        Self { policy }
    }

    /// simple daily fee on the installment total, capped
    ///
    /// depends only on the installment amount and the days overdue, never
    /// on a previously stored fee.
    pub fn calculate(&self, installment_total: Money, days_overdue: u32) -> LateFeeCalculation {
        let base = installment_total.as_decimal();
        let uncapped = base * self.policy.daily_rate.as_decimal() * Decimal::from(days_overdue);
        let cap = base * self.policy.cap_rate.as_decimal();

        LateFeeCalculation {
            late_fee: Money::from_decimal(uncapped.min(cap)),
            uncapped_fee: Money::from_decimal(uncapped),
            cap: Money::from_decimal(cap),
            days_charged: days_overdue,
            capped: uncapped > cap,
        }
    }

    /// first day on which the cap is reached
    pub fn days_to_cap(&self) -> Option<u32> {
        let daily = self.policy.daily_rate.as_decimal();
        if daily <= Decimal::ZERO {
            return None;
        }
        (self.policy.cap_rate.as_decimal() / daily).ceil().to_u32()
    }
}

impl Default for LateFeeEngine {
    fn default() -> Self {
        Self::new(LateFeePolicy::standard())
    }
}
