pub mod amortization;
pub mod ledger;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::types::{new_reference, LoanId, PaymentId, PaymentMethod, PaymentStatus, PAYMENT_PREFIX};

pub use amortization::{compute_loan_terms, generate_schedule, verify_schedule, Installment, LoanTerms};
pub use ledger::{apply_payment, check_and_close, LedgerOutcome};

/// payment request coming from the http layer or a gateway callback
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub loan_id: LoanId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub payment_date: DateTime<Utc>,
    pub gateway_reference: Option<String>,
    pub reference: String,
    pub notes: String,
}

impl PaymentRequest {
    pub fn new(loan_id: impl Into<LoanId>, amount: Money, method: PaymentMethod, payment_date: DateTime<Utc>) -> Self {
        Self {
            loan_id: loan_id.into(),
            amount,
            method,
            payment_date,
            gateway_reference: None,
            reference: String::new(),
            notes: String::new(),
        }
    }

    pub fn with_gateway_reference(mut self, rrr: impl Into<String>) -> Self {
        self.gateway_reference = Some(rrr.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_positive() {
            return Err(LendingError::InvalidPaymentAmount { amount: self.amount });
        }
        Ok(())
    }
}

/// a recorded money movement against a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: PaymentId,
    pub loan_id: LoanId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub payment_date: DateTime<Utc>,
    /// due date of the installment this payment was meant to settle
    pub due_date: Option<NaiveDate>,
    pub gateway_reference: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub reference: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    /// set once the ledger has counted this payment
    pub applied_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// build a pending payment from a request
    pub fn pending(request: PaymentRequest, due_date: Option<NaiveDate>, now: DateTime<Utc>) -> Result<Self> {
        request.validate()?;
        Ok(Self {
            payment_id: new_reference(PAYMENT_PREFIX),
            loan_id: request.loan_id,
            amount: request.amount,
            method: request.method,
            status: PaymentStatus::Pending,
            payment_date: request.payment_date,
            due_date,
            gateway_reference: request.gateway_reference,
            gateway_transaction_id: None,
            gateway_response: None,
            reference: request.reference,
            notes: request.notes,
            created_at: now,
            applied_at: None,
        })
    }

    /// move a pending payment to a final status
    pub fn finalize(&mut self, status: PaymentStatus) -> Result<()> {
        if self.status.is_final() {
            return Err(LendingError::PaymentAlreadyFinal {
                id: self.payment_id.clone(),
                status: self.status,
            });
        }
        self.status = status;
        Ok(())
    }

    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}
