use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};
use crate::payments::LoanTerms;
use crate::types::{ApplicationId, LoanId, LoanStatus, UserId};

/// running financial state of a disbursed loan
///
/// `outstanding_balance` is always `total_amount - total_paid` clamped at
/// zero, and `total_paid` only grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    // identification
    pub loan_id: LoanId,
    pub application_id: ApplicationId,
    pub borrower_id: UserId,

    // terms
    pub principal: Money,
    pub annual_rate: Rate,
    pub tenure_months: u32,
    pub interest_amount: Money,
    pub total_amount: Money,
    pub monthly_installment: Money,

    // dates
    pub disbursed_at: DateTime<Utc>,
    pub maturity_date: NaiveDate,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_status_change: DateTime<Utc>,

    // ledger
    pub total_paid: Money,
    pub outstanding_balance: Money,
    pub status: LoanStatus,

    // auto-deduction
    pub mandate_id: Option<String>,
    pub auto_deduction_active: bool,
}

impl Loan {
    pub fn new(
        loan_id: LoanId,
        application_id: ApplicationId,
        borrower_id: UserId,
        terms: &LoanTerms,
        disbursed_at: DateTime<Utc>,
        maturity_date: NaiveDate,
    ) -> Self {
        Self {
            loan_id,
            application_id,
            borrower_id,
            principal: terms.principal,
            annual_rate: terms.annual_rate,
            tenure_months: terms.tenure_months,
            interest_amount: terms.interest,
            total_amount: terms.total,
            monthly_installment: terms.installment,
            disbursed_at,
            maturity_date,
            completed_at: None,
            last_status_change: disbursed_at,
            total_paid: Money::ZERO,
            outstanding_balance: terms.total,
            status: LoanStatus::Active,
            mandate_id: None,
            auto_deduction_active: false,
        }
    }

    /// move along one legal edge, returning the previous status
    pub fn transition(&mut self, next: LoanStatus, timestamp: DateTime<Utc>) -> Result<LoanStatus> {
        if !self.status.can_transition_to(next) {
            return Err(LendingError::InvalidLoanTransition {
                from: self.status,
                to: next,
            });
        }
        let old = self.status;
        self.status = next;
        self.last_status_change = timestamp;
        Ok(old)
    }

    /// recompute the balance from the totals
    pub fn recompute_balance(&mut self) {
        self.outstanding_balance = self.total_amount.saturating_sub(self.total_paid);
    }

    pub fn is_fully_paid(&self) -> bool {
        self.total_paid >= self.total_amount
    }

    /// amount paid beyond what was owed
    pub fn excess_paid(&self) -> Money {
        self.total_paid.saturating_sub(self.total_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::compute_loan_terms;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn loan() -> Loan {
        let terms = compute_loan_terms(Money::from_major(10_000), Rate::from_percentage(dec!(15)), 1).unwrap();
        let disbursed = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Loan::new(
            "LNTEST0001".to_string(),
            "ALTEST0001".to_string(),
            Uuid::new_v4(),
            &terms,
            disbursed,
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        )
    }

    #[test]
    fn test_new_loan_is_active_and_owes_total() {
        let loan = loan();
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.outstanding_balance, Money::from_major(10_125));
        assert_eq!(loan.total_paid, Money::ZERO);
        assert!(loan.loan_id.starts_with("LN"));
    }

    #[test]
    fn test_balance_clamps_at_zero() {
        let mut loan = loan();
        loan.total_paid = Money::from_major(11_000);
        loan.recompute_balance();
        assert_eq!(loan.outstanding_balance, Money::ZERO);
        assert_eq!(loan.excess_paid(), Money::from_major(875));
    }

    #[test]
    fn test_transition_rules() {
        let mut loan = loan();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        assert!(matches!(
            loan.transition(LoanStatus::WrittenOff, now),
            Err(LendingError::InvalidLoanTransition { from: LoanStatus::Active, to: LoanStatus::WrittenOff })
        ));
        assert_eq!(loan.status, LoanStatus::Active);

        assert_eq!(loan.transition(LoanStatus::Defaulted, now).unwrap(), LoanStatus::Active);
        assert_eq!(loan.transition(LoanStatus::WrittenOff, now).unwrap(), LoanStatus::Defaulted);
        assert_eq!(loan.last_status_change, now);
    }
}
