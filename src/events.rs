use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    ApplicationId, ApplicationStatus, LoanId, LoanStatus, PaymentId, PaymentMethod, PaymentStatus,
};

/// domain events emitted when a lending transaction commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // application events
    ApplicationSubmitted {
        application_id: ApplicationId,
        requested_amount: Money,
        tenure_months: u32,
        timestamp: DateTime<Utc>,
    },
    ApplicationStatusChanged {
        application_id: ApplicationId,
        old_status: ApplicationStatus,
        new_status: ApplicationStatus,
        actor: Option<String>,
        timestamp: DateTime<Utc>,
    },

    // loan lifecycle events
    LoanDisbursed {
        loan_id: LoanId,
        application_id: ApplicationId,
        principal: Money,
        total_amount: Money,
        maturity_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    LoanCompleted {
        loan_id: LoanId,
        total_paid: Money,
        timestamp: DateTime<Utc>,
    },
    LoanStatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentRecorded {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        method: PaymentMethod,
        status: PaymentStatus,
        timestamp: DateTime<Utc>,
    },
    PaymentApplied {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        total_paid: Money,
        outstanding_balance: Money,
        installments_settled: Vec<u32>,
        timestamp: DateTime<Utc>,
    },
    PaymentFailed {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        timestamp: DateTime<Utc>,
    },
    OverpaymentReceived {
        loan_id: LoanId,
        payment_id: PaymentId,
        excess: Money,
        timestamp: DateTime<Utc>,
    },

    // schedule events
    InstallmentOverdue {
        loan_id: LoanId,
        installment_number: u32,
        due_date: NaiveDate,
        days_overdue: u32,
        late_fee: Money,
    },
    PaymentReminderSent {
        loan_id: LoanId,
        installment_number: u32,
        amount: Money,
        due_date: NaiveDate,
    },

    // gateway events
    MandateActivated {
        loan_id: LoanId,
        mandate_id: String,
        timestamp: DateTime<Utc>,
    },
    MandateCancelled {
        loan_id: LoanId,
        mandate_id: String,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}
