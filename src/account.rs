use std::collections::BTreeMap;

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use tracing::{debug, info, warn};

use crate::application::LoanApplication;
use crate::config::{DefaultPolicy, LendingConfig};
use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::events::{Event, EventStore};
use crate::payments::amortization::add_months;
use crate::payments::{
    apply_payment, check_and_close, compute_loan_terms, generate_schedule, verify_schedule, Installment,
    LedgerOutcome, Payment, PaymentRequest,
};
use crate::schedule::{self, OverdueUpdate, ScheduleTracker};
use crate::state::Loan;
use crate::types::{new_reference, ApplicationStatus, LoanId, LoanStatus, PaymentId, PaymentStatus, LOAN_PREFIX};

/// a disbursed loan together with everything it owns
///
/// installments and payments are owned by id; nothing points back at the
/// account. events collect here until the surrounding transaction commits.
#[derive(Debug, Clone)]
pub struct LoanAccount {
    pub loan: Loan,
    pub installments: Vec<Installment>,
    pub payments: BTreeMap<PaymentId, Payment>,
    pub events: EventStore,
}

/// a recorded payment and, when it settled, what the ledger did with it
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub outcome: Option<LedgerOutcome>,
}

/// overdue sweep result for one account
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountSweep {
    pub updates: Vec<OverdueUpdate>,
    pub newly_overdue: usize,
    pub failures: Vec<(u32, LendingError)>,
    pub defaulted: bool,
}

impl LoanAccount {
    /// disburse an approved application into a new loan
    ///
    /// the first installment falls due the configured number of months after
    /// disbursement. the application is only marked disbursed once terms and
    /// schedule have been built.
    pub fn open(
        application: &mut LoanApplication,
        config: &LendingConfig,
        time_provider: &SafeTimeProvider,
    ) -> Result<Self> {
        Self::open_as(application, new_reference(LOAN_PREFIX), config, time_provider)
    }

    /// open under a loan id reserved before the funds were released
    pub fn open_as(
        application: &mut LoanApplication,
        loan_id: LoanId,
        config: &LendingConfig,
        time_provider: &SafeTimeProvider,
    ) -> Result<Self> {
        if application.status != ApplicationStatus::Approved {
            return Err(LendingError::InvalidApplicationTransition {
                from: application.status,
                to: ApplicationStatus::Disbursed,
            });
        }

        let now = time_provider.now();
        let terms = compute_loan_terms(application.principal(), application.terms.annual_rate, application.tenure_months)?;

        let first_due = add_months(now.date_naive(), config.schedule.first_due_offset_months)?;
        let maturity = add_months(first_due, terms.tenure_months - 1)?;

        let loan = Loan::new(loan_id, application.application_id.clone(), application.applicant_id, &terms, now, maturity);
        let installments = generate_schedule(&loan.loan_id, &terms, first_due)?;

        let old_status = application.mark_disbursed(now)?;

        let mut events = EventStore::new();
        events.emit(Event::ApplicationStatusChanged {
            application_id: application.application_id.clone(),
            old_status,
            new_status: ApplicationStatus::Disbursed,
            actor: None,
            timestamp: now,
        });
        events.emit(Event::LoanDisbursed {
            loan_id: loan.loan_id.clone(),
            application_id: application.application_id.clone(),
            principal: loan.principal,
            total_amount: loan.total_amount,
            maturity_date: maturity,
            timestamp: now,
        });

        info!(
            loan_id = %loan.loan_id,
            application_id = %application.application_id,
            principal = %loan.principal,
            total = %loan.total_amount,
            installments = installments.len(),
            "loan disbursed"
        );

        Ok(Self {
            loan,
            installments,
            payments: BTreeMap::new(),
            events,
        })
    }

    pub fn id(&self) -> &LoanId {
        &self.loan.loan_id
    }

    /// record a payment against the loan
    ///
    /// cash and bank transfers settle immediately and go through the ledger;
    /// gateway payments stay pending until [`LoanAccount::confirm_payment`].
    pub fn record_payment(
        &mut self,
        request: PaymentRequest,
        tracker: &ScheduleTracker,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentReceipt> {
        if request.loan_id != self.loan.loan_id {
            return Err(LendingError::PaymentNotApplicable {
                reason: format!("payment request targets loan {}, not {}", request.loan_id, self.loan.loan_id),
            });
        }
        if let Some(reference) = request.gateway_reference.as_deref() {
            if let Some(existing) = self.payment_by_gateway_reference(reference) {
                if existing.amount != request.amount {
                    return Err(LendingError::PaymentNotApplicable {
                        reason: format!(
                            "gateway reference {} already recorded on {} for {}",
                            reference, existing.payment_id, existing.amount
                        ),
                    });
                }
                debug!(loan_id = %self.loan.loan_id, payment_id = %existing.payment_id, reference, "gateway reference already recorded");
                return Ok(PaymentReceipt {
                    payment: existing.clone(),
                    outcome: None,
                });
            }
        }
        if !self.loan.status.accepts_payments() {
            return Err(LendingError::PaymentNotApplicable {
                reason: format!("loan {} is {:?} and no longer accepts payments", self.loan.loan_id, self.loan.status),
            });
        }

        let now = time_provider.now();
        let due_date = self.next_due().map(|i| i.due_date);
        let settles_now = !request.method.requires_gateway_confirmation();
        let payment = Payment::pending(request, due_date, now)?;
        let payment_id = payment.payment_id.clone();

        if self.payments.contains_key(&payment_id) {
            return Err(LendingError::DuplicateRecord { id: payment_id });
        }

        self.events.emit(Event::PaymentRecorded {
            loan_id: self.loan.loan_id.clone(),
            payment_id: payment_id.clone(),
            amount: payment.amount,
            method: payment.method,
            status: payment.status,
            timestamp: now,
        });
        self.payments.insert(payment_id.clone(), payment);

        if settles_now {
            self.confirm_payment(&payment_id, PaymentStatus::Successful, None, tracker, time_provider)
        } else {
            Ok(PaymentReceipt {
                payment: self.payment(&payment_id)?.clone(),
                outcome: None,
            })
        }
    }

    /// settle a pending payment with its final status
    ///
    /// a successful payment is applied to the ledger; failed or refunded
    /// payments are only recorded.
    pub fn confirm_payment(
        &mut self,
        payment_id: &str,
        status: PaymentStatus,
        gateway_transaction_id: Option<String>,
        tracker: &ScheduleTracker,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentReceipt> {
        if !status.is_final() {
            return Err(LendingError::PaymentNotApplicable {
                reason: format!("payment {} can only be confirmed with a final status", payment_id),
            });
        }
        let now = time_provider.now();
        // money confirmed after the loan closed is owed back to the borrower
        let status = if status == PaymentStatus::Successful && !self.loan.status.accepts_payments() {
            warn!(
                loan_id = %self.loan.loan_id,
                payment_id,
                loan_status = ?self.loan.status,
                "payment confirmed after loan closed, marking refunded"
            );
            PaymentStatus::Refunded
        } else {
            status
        };
        let payment = self
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| LendingError::PaymentNotFound { id: payment_id.to_string() })?;

        payment.finalize(status)?;
        if gateway_transaction_id.is_some() {
            payment.gateway_transaction_id = gateway_transaction_id;
        }

        let outcome = match status {
            PaymentStatus::Successful => Some(apply_payment(
                &mut self.loan,
                &mut self.installments,
                payment,
                tracker,
                now,
                &mut self.events,
            )?),
            PaymentStatus::Failed => {
                warn!(loan_id = %self.loan.loan_id, payment_id, amount = %payment.amount, "payment failed");
                self.events.emit(Event::PaymentFailed {
                    loan_id: self.loan.loan_id.clone(),
                    payment_id: payment.payment_id.clone(),
                    amount: payment.amount,
                    timestamp: now,
                });
                None
            }
            PaymentStatus::Refunded | PaymentStatus::Pending => None,
        };

        Ok(PaymentReceipt {
            payment: payment.clone(),
            outcome,
        })
    }

    /// payment recorded under a gateway reference (rrr)
    pub fn payment_by_gateway_reference(&self, reference: &str) -> Option<&Payment> {
        self.payments
            .values()
            .find(|p| p.gateway_reference.as_deref() == Some(reference))
    }

    /// re-run the close check, e.g. after a retried transaction
    pub fn check_and_close(&mut self, time_provider: &SafeTimeProvider) -> Result<bool> {
        check_and_close(&mut self.loan, time_provider.now(), &mut self.events)
    }

    /// administratively flag the loan defaulted
    pub fn mark_defaulted(&mut self, reason: &str, actor: &str, time_provider: &SafeTimeProvider) -> Result<LoanStatus> {
        self.change_status(LoanStatus::Defaulted, reason, actor, time_provider)
    }

    /// administratively write off a defaulted loan
    pub fn write_off(&mut self, reason: &str, actor: &str, time_provider: &SafeTimeProvider) -> Result<LoanStatus> {
        self.change_status(LoanStatus::WrittenOff, reason, actor, time_provider)
    }

    fn change_status(
        &mut self,
        next: LoanStatus,
        reason: &str,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<LoanStatus> {
        let now = time_provider.now();
        let old_status = self.loan.transition(next, now)?;

        info!(loan_id = %self.loan.loan_id, from = ?old_status, to = ?next, actor, reason, "loan status changed");
        self.events.emit(Event::LoanStatusChanged {
            loan_id: self.loan.loan_id.clone(),
            old_status,
            new_status: next,
            reason: format!("{} (by {})", reason, actor),
            timestamp: now,
        });
        Ok(old_status)
    }

    /// refresh overdue state of every unpaid installment as of a date
    ///
    /// ledger totals are never touched. with a default policy configured an
    /// active loan meeting it is moved to defaulted.
    pub fn sweep_overdue(
        &mut self,
        tracker: &ScheduleTracker,
        as_of: NaiveDate,
        default_policy: Option<DefaultPolicy>,
        time_provider: &SafeTimeProvider,
    ) -> AccountSweep {
        if !self.loan.status.accepts_payments() {
            return AccountSweep::default();
        }

        let result = tracker.sweep(&mut self.installments, as_of);
        for update in result.updates.iter().filter(|u| u.newly_overdue) {
            self.events.emit(Event::InstallmentOverdue {
                loan_id: self.loan.loan_id.clone(),
                installment_number: update.installment_number,
                due_date: update.due_date,
                days_overdue: update.days_overdue,
                late_fee: update.late_fee,
            });
        }

        let mut sweep = AccountSweep {
            newly_overdue: result.newly_overdue(),
            updates: result.updates,
            failures: result.failures,
            defaulted: false,
        };

        if let Some(policy) = default_policy {
            if self.loan.status == LoanStatus::Active && self.meets_default_policy(&policy) {
                let reason = format!(
                    "{} or more installments overdue by at least {} days",
                    policy.min_overdue_installments, policy.min_days_overdue
                );
                match self.change_status(LoanStatus::Defaulted, &reason, "overdue-sweep", time_provider) {
                    Ok(_) => sweep.defaulted = true,
                    Err(e) => warn!(loan_id = %self.loan.loan_id, error = %e, "automatic default failed"),
                }
            }
        }

        sweep
    }

    fn meets_default_policy(&self, policy: &DefaultPolicy) -> bool {
        let qualifying = schedule::overdue(&self.installments)
            .filter(|i| i.days_overdue >= policy.min_days_overdue)
            .count();
        qualifying >= policy.min_overdue_installments as usize
    }

    /// link an auto-deduction mandate to the loan
    pub fn activate_mandate(&mut self, mandate_id: impl Into<String>, time_provider: &SafeTimeProvider) -> Result<()> {
        if self.loan.status.is_terminal() {
            return Err(LendingError::PaymentNotApplicable {
                reason: format!("loan {} is {:?}, mandates cannot be set up", self.loan.loan_id, self.loan.status),
            });
        }
        let mandate_id = mandate_id.into();
        self.loan.mandate_id = Some(mandate_id.clone());
        self.loan.auto_deduction_active = true;

        self.events.emit(Event::MandateActivated {
            loan_id: self.loan.loan_id.clone(),
            mandate_id,
            timestamp: time_provider.now(),
        });
        Ok(())
    }

    /// stop auto-deduction, returning the cancelled mandate
    pub fn deactivate_mandate(&mut self, time_provider: &SafeTimeProvider) -> Result<String> {
        let mandate_id = self
            .loan
            .mandate_id
            .clone()
            .filter(|_| self.loan.auto_deduction_active)
            .ok_or_else(|| LendingError::PaymentNotApplicable {
                reason: format!("loan {} has no active mandate", self.loan.loan_id),
            })?;
        self.loan.auto_deduction_active = false;

        self.events.emit(Event::MandateCancelled {
            loan_id: self.loan.loan_id.clone(),
            mandate_id: mandate_id.clone(),
            timestamp: time_provider.now(),
        });
        Ok(mandate_id)
    }

    pub fn payment(&self, payment_id: &str) -> Result<&Payment> {
        self.payments
            .get(payment_id)
            .ok_or_else(|| LendingError::PaymentNotFound { id: payment_id.to_string() })
    }

    /// payments counted by the ledger, oldest first
    pub fn successful_payments(&self) -> impl Iterator<Item = &Payment> {
        let mut paid: Vec<&Payment> = self.payments.values().filter(|p| p.status == PaymentStatus::Successful).collect();
        paid.sort_by_key(|p| (p.payment_date, p.created_at));
        paid.into_iter()
    }

    pub fn next_due(&self) -> Option<&Installment> {
        schedule::next_due(&self.installments)
    }

    pub fn accrued_late_fees(&self) -> Money {
        schedule::accrued_late_fees(&self.installments)
    }

    /// re-check that the schedule still adds up to the loan total
    pub fn verify(&self) -> Result<()> {
        verify_schedule(&self.loan.loan_id, &self.installments, self.loan.total_amount)
    }
}
