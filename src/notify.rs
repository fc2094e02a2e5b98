use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::decimal::Money;
use crate::errors::Result;
use crate::types::{LoanId, UserId};

/// reminder that an installment is about to fall due
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReminder {
    pub borrower_id: UserId,
    pub loan_id: LoanId,
    pub installment_number: u32,
    pub amount: Money,
    pub due_date: NaiveDate,
}

impl PaymentReminder {
    pub fn message(&self) -> String {
        format!(
            "Installment {} of loan {} ({}) is due on {}",
            self.installment_number, self.loan_id, self.amount, self.due_date
        )
    }
}

/// delivery channel for borrower notifications (email, sms, push)
pub trait Notifier: Send + Sync {
    fn send_reminder(&self, reminder: &PaymentReminder) -> Result<()>;
}

/// notifier that only writes reminders to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_reminder(&self, reminder: &PaymentReminder) -> Result<()> {
        info!(
            borrower_id = %reminder.borrower_id,
            loan_id = %reminder.loan_id,
            installment = reminder.installment_number,
            amount = %reminder.amount,
            due_date = %reminder.due_date,
            "payment reminder"
        );
        Ok(())
    }
}
