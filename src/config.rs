use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::Rate;
use crate::errors::{LendingError, Result};

/// lending configuration shared by the ledger, tracker and jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LendingConfig {
    pub late_fee: LateFeePolicy,
    pub reminders: ReminderPolicy,
    pub schedule: ScheduleConfig,
    /// automatic default detection; `None` leaves defaulting to administrators
    #[serde(default)]
    pub default_policy: Option<DefaultPolicy>,
}

/// late fee accrued on an overdue installment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LateFeePolicy {
    /// simple (non-compounding) rate charged per day overdue
    pub daily_rate: Rate,
    /// ceiling as a fraction of the installment total
    pub cap_rate: Rate,
}

/// payment reminder job settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPolicy {
    /// remind borrowers this many days before an installment falls due
    pub lead_days: u32,
}

/// repayment schedule generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// months between disbursement and the first due date
    pub first_due_offset_months: u32,
}

/// rule for flagging a loan defaulted from overdue installments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPolicy {
    pub min_overdue_installments: u32,
    pub min_days_overdue: u32,
}

impl LateFeePolicy {
    /// 2% per day overdue, capped at 10% of the installment
    pub fn standard() -> Self {
        Self {
            daily_rate: Rate::from_decimal(dec!(0.02)),
            cap_rate: Rate::from_decimal(dec!(0.10)),
        }
    }
}

impl Default for LateFeePolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl LendingConfig {
    /// configuration matching production behaviour
    pub fn standard() -> Self {
        Self {
            late_fee: LateFeePolicy::standard(),
            reminders: ReminderPolicy { lead_days: 3 },
            schedule: ScheduleConfig {
                first_due_offset_months: 1,
            },
            default_policy: None,
        }
    }

    /// enable automatic default detection
    pub fn with_default_policy(mut self, policy: DefaultPolicy) -> Self {
        self.default_policy = Some(policy);
        self
    }

    /// load from a json document and validate it
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: LendingConfig =
            serde_json::from_str(raw).map_err(|e| LendingError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let LateFeePolicy { daily_rate, cap_rate } = self.late_fee;
        if daily_rate < Rate::ZERO || daily_rate > Rate::ONE {
            return Err(LendingError::InvalidConfiguration {
                message: format!("late fee daily rate {} must be between 0% and 100%", daily_rate),
            });
        }
        if cap_rate < Rate::ZERO || cap_rate > Rate::ONE {
            return Err(LendingError::InvalidConfiguration {
                message: format!("late fee cap {} must be between 0% and 100%", cap_rate),
            });
        }
        if self.schedule.first_due_offset_months == 0 {
            return Err(LendingError::InvalidConfiguration {
                message: "first due date must fall at least one month after disbursement".to_string(),
            });
        }
        if let Some(policy) = self.default_policy {
            if policy.min_overdue_installments == 0 {
                return Err(LendingError::InvalidConfiguration {
                    message: "default policy needs at least one overdue installment".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self::standard()
    }
}
