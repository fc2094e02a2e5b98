use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::events::{Event, EventStore};
use crate::payments::{Installment, Payment};
use crate::schedule::ScheduleTracker;
use crate::state::Loan;
use crate::types::{LoanStatus, PaymentStatus};

/// what applying one payment did to a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerOutcome {
    pub total_paid: Money,
    pub outstanding_balance: Money,
    pub status: LoanStatus,
    pub installments_settled: Vec<u32>,
    /// amount received beyond the loan total by this payment
    pub excess: Money,
    /// true when this payment closed the loan
    pub closed: bool,
    /// true when the payment had already been counted
    pub already_applied: bool,
}

/// count a successful payment against a loan
///
/// the payment is marked applied so a retry with the same payment is a
/// no-op. installments covered by cumulative repayments are settled and the
/// loan closes once the total is reached. callers hold the loan's lock for
/// the whole call and discard every change on error.
pub fn apply_payment(
    loan: &mut Loan,
    installments: &mut [Installment],
    payment: &mut Payment,
    tracker: &ScheduleTracker,
    now: DateTime<Utc>,
    events: &mut EventStore,
) -> Result<LedgerOutcome> {
    if payment.loan_id != loan.loan_id {
        return Err(LendingError::PaymentNotApplicable {
            reason: format!("payment {} belongs to loan {}, not {}", payment.payment_id, payment.loan_id, loan.loan_id),
        });
    }

    if payment.is_applied() {
        debug!(payment_id = %payment.payment_id, loan_id = %loan.loan_id, "payment already applied");
        return Ok(LedgerOutcome {
            total_paid: loan.total_paid,
            outstanding_balance: loan.outstanding_balance,
            status: loan.status,
            installments_settled: Vec::new(),
            excess: Money::ZERO,
            closed: false,
            already_applied: true,
        });
    }

    if payment.status != PaymentStatus::Successful {
        return Err(LendingError::PaymentNotApplicable {
            reason: format!("payment {} is {:?}, only successful payments count", payment.payment_id, payment.status),
        });
    }
    if !loan.status.accepts_payments() {
        return Err(LendingError::PaymentNotApplicable {
            reason: format!("loan {} is {:?} and no longer accepts payments", loan.loan_id, loan.status),
        });
    }

    let excess_before = loan.excess_paid();
    loan.total_paid += payment.amount;
    loan.recompute_balance();
    let excess = loan.excess_paid() - excess_before;

    let installments_settled = tracker.settle(installments, loan.total_paid, &payment.payment_id, now);
    payment.applied_at = Some(now);

    events.emit(Event::PaymentApplied {
        loan_id: loan.loan_id.clone(),
        payment_id: payment.payment_id.clone(),
        amount: payment.amount,
        total_paid: loan.total_paid,
        outstanding_balance: loan.outstanding_balance,
        installments_settled: installments_settled.clone(),
        timestamp: now,
    });

    if excess.is_positive() {
        info!(loan_id = %loan.loan_id, payment_id = %payment.payment_id, %excess, "overpayment received");
        events.emit(Event::OverpaymentReceived {
            loan_id: loan.loan_id.clone(),
            payment_id: payment.payment_id.clone(),
            excess,
            timestamp: now,
        });
    }

    let closed = check_and_close(loan, now, events)?;

    Ok(LedgerOutcome {
        total_paid: loan.total_paid,
        outstanding_balance: loan.outstanding_balance,
        status: loan.status,
        installments_settled,
        excess,
        closed,
        already_applied: false,
    })
}

/// close a fully repaid loan
///
/// returns true only on the call that performs the transition; later calls
/// leave the loan untouched and emit nothing.
pub fn check_and_close(loan: &mut Loan, now: DateTime<Utc>, events: &mut EventStore) -> Result<bool> {
    if loan.status == LoanStatus::Completed || !loan.is_fully_paid() {
        return Ok(false);
    }

    let old_status = loan.transition(LoanStatus::Completed, now)?;
    loan.outstanding_balance = Money::ZERO;
    loan.completed_at = Some(now);

    info!(loan_id = %loan.loan_id, total_paid = %loan.total_paid, from = ?old_status, "loan repaid in full");

    if old_status != LoanStatus::Active {
        events.emit(Event::LoanStatusChanged {
            loan_id: loan.loan_id.clone(),
            old_status,
            new_status: LoanStatus::Completed,
            reason: "recovered in full".to_string(),
            timestamp: now,
        });
    }
    events.emit(Event::LoanCompleted {
        loan_id: loan.loan_id.clone(),
        total_paid: loan.total_paid,
        timestamp: now,
    });
    Ok(true)
}
