use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};
use crate::types::{LoanId, PaymentId};

/// flat-rate terms computed for a loan at disbursement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: Money,
    pub annual_rate: Rate,
    pub tenure_months: u32,
    pub interest: Money,
    pub total: Money,
    /// installment due for periods 1..N-1
    pub installment: Money,
    /// installment due for period N, absorbing the rounding remainder
    pub final_installment: Money,
}

/// one scheduled repayment unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub loan_id: LoanId,
    pub installment_number: u32,
    pub due_date: NaiveDate,
    pub principal_portion: Money,
    pub interest_portion: Money,
    pub total_amount: Money,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    /// payment that pushed cumulative repayments past this installment
    pub payment_id: Option<PaymentId>,
    pub is_overdue: bool,
    pub days_overdue: u32,
    pub late_fee: Money,
}

/// compute interest, total payable and the monthly installment
///
/// interest is flat: `principal * rate * tenure / 12`, rounded half-up.
/// the installment is the total split evenly and floored, the final one
/// carries the remainder.
pub fn compute_loan_terms(principal: Money, annual_rate: Rate, tenure_months: u32) -> Result<LoanTerms> {
    if !principal.is_positive() {
        return Err(LendingError::InvalidLoanTerms {
            message: format!("principal must be positive, got {}", principal),
        });
    }
    if annual_rate < Rate::ZERO || annual_rate > Rate::ONE {
        return Err(LendingError::InvalidLoanTerms {
            message: format!("annual rate must be between 0% and 100%, got {}", annual_rate),
        });
    }
    if tenure_months == 0 {
        return Err(LendingError::InvalidLoanTerms {
            message: "tenure must be at least one month".to_string(),
        });
    }

    let interest = Money::from_decimal(
        principal.as_decimal() * annual_rate.as_decimal() * Decimal::from(tenure_months) / Decimal::from(12),
    );
    let total = principal + interest;
    let (installment, final_installment) = total.split_floor(tenure_months)?;

    Ok(LoanTerms {
        principal,
        annual_rate,
        tenure_months,
        interest,
        total,
        installment,
        final_installment,
    })
}

/// build the ordered installment list for a loan
///
/// installments fall due monthly from `first_due_date`, each anchored on
/// the first date so month-end clamping never drifts. interest portions are
/// proportional to the loan's interest share and floored; principal takes
/// the rest, and the final row absorbs both remainders.
pub fn generate_schedule(loan_id: &str, terms: &LoanTerms, first_due_date: NaiveDate) -> Result<Vec<Installment>> {
    let n = terms.tenure_months;
    let mut installments = Vec::with_capacity(n as usize);
    let mut interest_allocated = Money::ZERO;

    for number in 1..=n {
        let due_date = add_months(first_due_date, number - 1)?;
        let is_last = number == n;

        let total_amount = if is_last { terms.final_installment } else { terms.installment };
        let interest_portion = if is_last {
            terms.interest - interest_allocated
        } else {
            Money::from_decimal_floor(
                total_amount.as_decimal() * terms.interest.as_decimal() / terms.total.as_decimal(),
            )
        };
        let principal_portion = total_amount - interest_portion;

        if interest_portion.is_negative() || principal_portion.is_negative() {
            return Err(LendingError::CalculationError {
                message: format!("installment {} of {} splits into a negative portion", number, loan_id),
            });
        }
        interest_allocated += interest_portion;

        installments.push(Installment {
            loan_id: loan_id.to_string(),
            installment_number: number,
            due_date,
            principal_portion,
            interest_portion,
            total_amount,
            is_paid: false,
            paid_at: None,
            payment_id: None,
            is_overdue: false,
            days_overdue: 0,
            late_fee: Money::ZERO,
        });
    }

    verify_schedule(loan_id, &installments, terms.total)?;
    Ok(installments)
}

/// check that installments add up to the loan total
pub fn verify_schedule(loan_id: &str, installments: &[Installment], expected: Money) -> Result<()> {
    let scheduled: Money = installments.iter().map(|i| i.total_amount).sum();
    if scheduled != expected {
        return Err(LendingError::ScheduleInconsistency {
            loan_id: loan_id.to_string(),
            scheduled,
            expected,
        });
    }
    Ok(())
}

/// add calendar months, clamping to the last day of shorter months
pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or(LendingError::CalculationError {
            message: format!("{} + {} months is out of range", date, months),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_single_month_terms() {
        let terms = compute_loan_terms(Money::from_major(10_000), Rate::from_percentage(dec!(15)), 1).unwrap();

        assert_eq!(terms.interest, Money::from_major(125));
        assert_eq!(terms.total, Money::from_major(10_125));
        assert_eq!(terms.installment, Money::from_major(10_125));
        assert_eq!(terms.final_installment, Money::from_major(10_125));
    }

    #[test]
    fn test_multi_month_terms() {
        // 20,000 at 15% for 6 months: 1,500 interest
        let terms = compute_loan_terms(Money::from_major(20_000), Rate::from_percentage(dec!(15)), 6).unwrap();
        assert_eq!(terms.interest, Money::from_major(1_500));
        assert_eq!(terms.total, Money::from_major(21_500));
        assert_eq!(terms.installment, Money::from_minor(358_333));
        assert_eq!(terms.final_installment, Money::from_minor(358_335));
    }

    #[test]
    fn test_invalid_terms() {
        let rate = Rate::from_percentage(dec!(10));
        assert!(matches!(
            compute_loan_terms(Money::ZERO, rate, 6),
            Err(LendingError::InvalidLoanTerms { .. })
        ));
        assert!(compute_loan_terms(Money::from_major(100), rate, 0).is_err());
        assert!(compute_loan_terms(Money::from_major(100), Rate::from_percentage(dec!(100.5)), 6).is_err());
        assert!(compute_loan_terms(Money::from_major(100), Rate::from_percentage(dec!(-1)), 6).is_err());
        assert!(compute_loan_terms(Money::from_major(100), Rate::from_percentage(dec!(100)), 6).is_ok());
    }

    #[test]
    fn test_schedule_sums_exactly() {
        let cases = [
            (Money::from_major(10_000), dec!(15), 1u32),
            (Money::from_major(20_000), dec!(15), 6),
            (Money::from_minor(1_000_001), dec!(17.5), 7),
            (Money::from_major(50_000), dec!(0), 12),
            (Money::from_minor(3_333_333), dec!(99.99), 11),
            (Money::from_major(15_000), dec!(100), 3),
        ];

        for (principal, rate, tenure) in cases {
            let terms = compute_loan_terms(principal, Rate::from_percentage(rate), tenure).unwrap();
            let schedule = generate_schedule("LNTEST0001", &terms, date(2024, 2, 1)).unwrap();

            assert_eq!(schedule.len(), tenure as usize);
            let total: Money = schedule.iter().map(|i| i.total_amount).sum();
            let principal_sum: Money = schedule.iter().map(|i| i.principal_portion).sum();
            let interest_sum: Money = schedule.iter().map(|i| i.interest_portion).sum();
            assert_eq!(total, terms.total, "total leak for {} @ {} x {}", principal, rate, tenure);
            assert_eq!(principal_sum, principal);
            assert_eq!(interest_sum, terms.interest);

            for (idx, row) in schedule.iter().enumerate() {
                assert_eq!(row.installment_number, idx as u32 + 1);
                assert_eq!(row.principal_portion + row.interest_portion, row.total_amount);
            }
        }
    }

    #[test]
    fn test_due_dates_anchor_on_first_date() {
        let terms = compute_loan_terms(Money::from_major(12_000), Rate::from_percentage(dec!(12)), 4).unwrap();
        let schedule = generate_schedule("LNTEST0002", &terms, date(2024, 1, 31)).unwrap();

        let due: Vec<NaiveDate> = schedule.iter().map(|i| i.due_date).collect();
        assert_eq!(due, vec![date(2024, 1, 31), date(2024, 2, 29), date(2024, 3, 31), date(2024, 4, 30)]);
    }

    #[test]
    fn test_verify_schedule_detects_divergence() {
        let terms = compute_loan_terms(Money::from_major(12_000), Rate::from_percentage(dec!(12)), 3).unwrap();
        let mut schedule = generate_schedule("LNTEST0003", &terms, date(2024, 1, 15)).unwrap();
        schedule[1].total_amount += Money::KOBO;

        assert!(matches!(
            verify_schedule("LNTEST0003", &schedule, terms.total),
            Err(LendingError::ScheduleInconsistency { .. })
        ));
    }
}
