pub mod penalty;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::LateFeePolicy;
use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::payments::Installment;

pub use penalty::{LateFeeCalculation, LateFeeEngine};

/// overdue state assigned to one installment by a sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverdueUpdate {
    pub installment_number: u32,
    pub due_date: NaiveDate,
    pub days_overdue: u32,
    pub late_fee: Money,
    /// false when the installment was already flagged by an earlier sweep
    pub newly_overdue: bool,
}

/// result of sweeping one loan's installments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleSweep {
    pub updates: Vec<OverdueUpdate>,
    pub failures: Vec<(u32, LendingError)>,
}

impl ScheduleSweep {
    pub fn newly_overdue(&self) -> usize {
        self.updates.iter().filter(|u| u.newly_overdue).count()
    }
}

/// keeps installments consistent with payments and the calendar
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleTracker {
    engine: LateFeeEngine,
}

impl ScheduleTracker {
    pub fn new(policy: LateFeePolicy) -> Self {
        Self {
            engine: LateFeeEngine::new(policy),
        }
    }

    /// overdue state of an installment as of a date, if it is overdue
    ///
    /// a pure function of the installment's due date, amount and `as_of`.
    pub fn assess(&self, installment: &Installment, as_of: NaiveDate) -> Result<Option<(u32, Money)>> {
        if installment.is_paid || installment.due_date >= as_of {
            return Ok(None);
        }
        if installment.total_amount <= Money::ZERO {
            return Err(LendingError::CalculationError {
                message: format!(
                    "installment {} of {} has non-positive amount {}",
                    installment.installment_number, installment.loan_id, installment.total_amount
                ),
            });
        }
        let days = (as_of - installment.due_date).num_days();
        let days_overdue = u32::try_from(days).map_err(|_| LendingError::CalculationError {
            message: format!(
                "installment {} of {} is {} days overdue",
                installment.installment_number, installment.loan_id, days
            ),
        })?;
        let fee = self.engine.calculate(installment.total_amount, days_overdue);
        Ok(Some((days_overdue, fee.late_fee)))
    }

    /// write the assessed overdue state onto an installment
    pub fn refresh(&self, installment: &mut Installment, as_of: NaiveDate) -> Result<Option<OverdueUpdate>> {
        let Some((days_overdue, late_fee)) = self.assess(installment, as_of)? else {
            return Ok(None);
        };

        let newly_overdue = !installment.is_overdue;
        installment.is_overdue = true;
        installment.days_overdue = days_overdue;
        installment.late_fee = late_fee;

        Ok(Some(OverdueUpdate {
            installment_number: installment.installment_number,
            due_date: installment.due_date,
            days_overdue,
            late_fee,
            newly_overdue,
        }))
    }

    /// refresh every unpaid installment due before `as_of`
    ///
    /// a failing installment is logged and skipped; the rest still update.
    pub fn sweep(&self, installments: &mut [Installment], as_of: NaiveDate) -> ScheduleSweep {
        let mut result = ScheduleSweep::default();
        for installment in installments.iter_mut() {
            match self.refresh(installment, as_of) {
                Ok(Some(update)) => result.updates.push(update),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        loan_id = %installment.loan_id,
                        installment = installment.installment_number,
                        error = %e,
                        "skipping installment during overdue sweep"
                    );
                    result.failures.push((installment.installment_number, e));
                }
            }
        }
        result
    }

    /// mark installments covered by cumulative repayments as paid
    ///
    /// installment `k` is settled once `total_paid` reaches the sum of
    /// installments `1..=k`; the payment crossing that line is recorded on it.
    pub fn settle(
        &self,
        installments: &mut [Installment],
        total_paid: Money,
        payment_id: &str,
        at: DateTime<Utc>,
    ) -> Vec<u32> {
        let mut settled = Vec::new();
        let mut cumulative = Money::ZERO;

        for installment in installments.iter_mut() {
            cumulative += installment.total_amount;
            if cumulative > total_paid {
                break;
            }
            if !installment.is_paid {
                installment.is_paid = true;
                installment.paid_at = Some(at);
                installment.payment_id = Some(payment_id.to_string());
                settled.push(installment.installment_number);
            }
        }
        settled
    }
}

/// earliest unpaid installment
pub fn next_due(installments: &[Installment]) -> Option<&Installment> {
    installments
        .iter()
        .filter(|i| !i.is_paid)
        .min_by_key(|i| (i.due_date, i.installment_number))
}

/// unpaid installments falling due on a given date
pub fn unpaid_due_on(installments: &[Installment], date: NaiveDate) -> impl Iterator<Item = &Installment> {
    installments.iter().filter(move |i| !i.is_paid && i.due_date == date)
}

/// unpaid installments currently flagged overdue
pub fn overdue(installments: &[Installment]) -> impl Iterator<Item = &Installment> {
    installments.iter().filter(|i| i.is_overdue && !i.is_paid)
}

/// late fees accrued on unpaid installments
pub fn accrued_late_fees(installments: &[Installment]) -> Money {
    overdue(installments).map(|i| i.late_fee).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::payments::{compute_loan_terms, generate_schedule};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule(tenure: u32) -> Vec<Installment> {
        let terms = compute_loan_terms(Money::from_major(12_000), Rate::from_percentage(dec!(12)), tenure).unwrap();
        generate_schedule("LNTRACK001", &terms, date(2024, 2, 1)).unwrap()
    }

    fn flat_installment(total: Money, due: NaiveDate) -> Installment {
        let mut rows = schedule(1);
        let mut row = rows.remove(0);
        row.total_amount = total;
        row.due_date = due;
        row
    }

    #[test]
    fn test_not_overdue_on_due_date() {
        let tracker = ScheduleTracker::default();
        let mut rows = schedule(3);
        let result = tracker.sweep(&mut rows, date(2024, 2, 1));
        assert!(result.updates.is_empty());
        assert!(rows.iter().all(|r| !r.is_overdue));
    }

    #[test]
    fn test_sweep_flags_and_counts_new() {
        let tracker = ScheduleTracker::default();
        let mut rows = schedule(3);

        let result = tracker.sweep(&mut rows, date(2024, 3, 5));
        assert_eq!(result.newly_overdue(), 2);
        assert_eq!(rows[0].days_overdue, 33);
        assert_eq!(rows[1].days_overdue, 4);
        assert!(!rows[2].is_overdue);
    }

    #[test]
    fn test_sweep_idempotent_for_same_date() {
        let tracker = ScheduleTracker::default();
        let mut rows = schedule(3);

        tracker.sweep(&mut rows, date(2024, 3, 3));
        let first = rows.clone();
        let again = tracker.sweep(&mut rows, date(2024, 3, 3));

        assert_eq!(rows, first);
        assert_eq!(again.newly_overdue(), 0);
        assert_eq!(again.updates.len(), 2);
    }

    #[test]
    fn test_days_recomputed_from_due_date() {
        let tracker = ScheduleTracker::default();
        let mut rows = vec![flat_installment(Money::from_major(1_000), date(2024, 5, 1))];

        tracker.sweep(&mut rows, date(2024, 5, 2));
        assert_eq!(rows[0].days_overdue, 1);
        assert_eq!(rows[0].late_fee, Money::from_major(20));

        tracker.sweep(&mut rows, date(2024, 5, 6));
        assert_eq!(rows[0].days_overdue, 5);
        assert_eq!(rows[0].late_fee, Money::from_major(100));

        tracker.sweep(&mut rows, date(2024, 5, 11));
        assert_eq!(rows[0].days_overdue, 10);
        assert_eq!(rows[0].late_fee, Money::from_major(100));
    }

    #[test]
    fn test_paid_installments_are_skipped() {
        let tracker = ScheduleTracker::default();
        let mut rows = schedule(2);
        rows[0].is_paid = true;

        let result = tracker.sweep(&mut rows, date(2024, 6, 1));
        assert_eq!(result.updates.len(), 1);
        assert_eq!(result.updates[0].installment_number, 2);
        assert!(!rows[0].is_overdue);
    }

    #[test]
    fn test_bad_installment_skipped_rest_still_updated() {
        let tracker = ScheduleTracker::default();
        let mut rows = schedule(3);
        rows[0].total_amount = Money::ZERO;

        let result = tracker.sweep(&mut rows, date(2024, 4, 10));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].0, 1);
        assert!(matches!(result.failures[0].1, LendingError::CalculationError { .. }));
        assert!(!rows[0].is_overdue);

        assert_eq!(result.updates.len(), 2);
        assert_eq!(rows[1].days_overdue, 40);
        assert_eq!(rows[2].days_overdue, 9);
    }

    #[test]
    fn test_settle_cumulative() {
        let tracker = ScheduleTracker::default();
        let mut rows = schedule(3); // 12,360 total, 4,120 each
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();

        let settled = tracker.settle(&mut rows, Money::from_major(4_000), "PYAAAA0001", at);
        assert!(settled.is_empty());

        let settled = tracker.settle(&mut rows, Money::from_major(8_240), "PYAAAA0002", at);
        assert_eq!(settled, vec![1, 2]);
        assert_eq!(rows[1].payment_id.as_deref(), Some("PYAAAA0002"));

        let settled = tracker.settle(&mut rows, Money::from_major(8_300), "PYAAAA0003", at);
        assert!(settled.is_empty());
        assert_eq!(next_due(&rows).map(|r| r.installment_number), Some(3));

        let settled = tracker.settle(&mut rows, Money::from_major(20_000), "PYAAAA0004", at);
        assert_eq!(settled, vec![3]);
        assert!(next_due(&rows).is_none());
    }

    #[test]
    fn test_accrued_late_fees_and_due_on() {
        let tracker = ScheduleTracker::default();
        let mut rows = schedule(3);
        tracker.sweep(&mut rows, date(2024, 2, 2));

        assert_eq!(accrued_late_fees(&rows), Money::from_minor(8_240));
        assert_eq!(unpaid_due_on(&rows, date(2024, 3, 1)).count(), 1);
        assert_eq!(overdue(&rows).count(), 1);
    }
}
