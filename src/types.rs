use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// unique identifier for a borrower profile
pub type UserId = Uuid;

/// unique identifier for a loan product
pub type ProductId = Uuid;

/// human-readable application reference, e.g. `AL1F3C9A0B`
pub type ApplicationId = String;

/// human-readable loan reference, e.g. `LN7E21D4C8`
pub type LoanId = String;

/// human-readable payment reference, e.g. `PY0A9B8C7D`
pub type PaymentId = String;

pub const APPLICATION_PREFIX: &str = "AL";
pub const LOAN_PREFIX: &str = "LN";
pub const PAYMENT_PREFIX: &str = "PY";
pub const MANDATE_PREFIX: &str = "MND";

/// generate a prefixed reference from a fresh v4 uuid
pub fn new_reference(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, raw[..8].to_uppercase())
}

/// loan product category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanType {
    Emergency,
    Education,
    Business,
    Personal,
}

/// application lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    /// submitted, waiting for a reviewer
    Pending,
    /// picked up by a reviewer
    UnderReview,
    /// approved, funds not yet released
    Approved,
    Rejected,
    /// funds released; the loan lifecycle takes over
    Disbursed,
    Cancelled,
}

impl ApplicationStatus {
    /// legal edges of the application state machine
    pub fn can_transition_to(self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (Pending, UnderReview)
                | (UnderReview, Approved)
                | (UnderReview, Rejected)
                | (Approved, Disbursed)
                | (Pending, Cancelled)
                | (UnderReview, Cancelled)
                | (Approved, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Rejected | ApplicationStatus::Disbursed | ApplicationStatus::Cancelled
        )
    }
}

/// loan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// disbursed and repaying
    Active,
    /// paid in full; older records spell this `closed`
    #[serde(alias = "closed")]
    Completed,
    Defaulted,
    WrittenOff,
}

impl LoanStatus {
    /// legal edges of the loan state machine
    ///
    /// `Defaulted -> Completed` covers a defaulted loan that is later
    /// recovered in full through the ledger.
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Active, Completed) | (Active, Defaulted) | (Defaulted, WrittenOff) | (Defaulted, Completed)
        )
    }

    /// whether the ledger still accepts payments
    pub fn accepts_payments(self) -> bool {
        matches!(self, LoanStatus::Active | LoanStatus::Defaulted)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoanStatus::Completed | LoanStatus::WrittenOff)
    }
}

/// how a repayment reached us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// salary auto-deduction through the gateway mandate
    RemitaAuto,
    /// borrower-initiated gateway payment
    RemitaManual,
    BankTransfer,
    Cash,
}

impl PaymentMethod {
    /// gateway payments settle only once the gateway confirms them
    pub fn requires_gateway_confirmation(self) -> bool {
        matches!(self, PaymentMethod::RemitaAuto | PaymentMethod::RemitaManual)
    }
}

/// payment settlement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Successful,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// reviewer decision on an application under review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// gateway audit record category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemitaTransactionType {
    SalaryVerification,
    MandateSetup,
    PaymentCollection,
    MandateCancellation,
    Disbursement,
}
