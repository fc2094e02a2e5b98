use thiserror::Error;
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::{ApplicationStatus, LoanStatus, PaymentStatus};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LendingError {
    #[error("invalid loan terms: {message}")]
    InvalidLoanTerms {
        message: String,
    },

    #[error("illegal application transition: {from:?} -> {to:?}")]
    InvalidApplicationTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("illegal loan transition: {from:?} -> {to:?}")]
    InvalidLoanTransition {
        from: LoanStatus,
        to: LoanStatus,
    },

    #[error("payment not applicable: {reason}")]
    PaymentNotApplicable {
        reason: String,
    },

    #[error("schedule inconsistency on {loan_id}: installments sum to {scheduled}, loan total is {expected}")]
    ScheduleInconsistency {
        loan_id: String,
        scheduled: Money,
        expected: Money,
    },

    #[error("invalid amount: {value}")]
    InvalidAmount {
        value: String,
    },

    #[error("invalid payment amount: {amount}")]
    InvalidPaymentAmount {
        amount: Money,
    },

    #[error("amount {amount} outside product bounds {min} - {max}")]
    AmountOutOfBounds {
        amount: Money,
        min: Money,
        max: Money,
    },

    #[error("tenure of {months} months outside allowed range 1 - {max}")]
    TenureOutOfRange {
        months: u32,
        max: u32,
    },

    #[error("invalid interest rate: {rate}")]
    InvalidInterestRate {
        rate: Rate,
    },

    #[error("loan product not found: {id}")]
    ProductNotFound {
        id: Uuid,
    },

    #[error("loan product is not accepting applications: {id}")]
    ProductInactive {
        id: Uuid,
    },

    #[error("user not found: {id}")]
    UserNotFound {
        id: Uuid,
    },

    #[error("application not found: {id}")]
    ApplicationNotFound {
        id: String,
    },

    #[error("loan not found: {id}")]
    LoanNotFound {
        id: String,
    },

    #[error("payment not found: {id}")]
    PaymentNotFound {
        id: String,
    },

    #[error("payment {id} already final with status {status:?}")]
    PaymentAlreadyFinal {
        id: String,
        status: PaymentStatus,
    },

    #[error("duplicate record: {id}")]
    DuplicateRecord {
        id: String,
    },

    #[error("disbursement already in progress for application {id}")]
    DisbursementInProgress {
        id: String,
    },

    #[error("gateway rejected {operation}: {message}")]
    GatewayRejected {
        operation: String,
        message: String,
    },

    #[error("notification failed: {message}")]
    NotificationFailed {
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("calculation error: {message}")]
    CalculationError {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, LendingError>;
