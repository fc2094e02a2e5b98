use chrono::{Duration, NaiveDate};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::account::LoanAccount;
use crate::cache::{put_typed, Cache, CacheKey};
use crate::config::LendingConfig;
use crate::events::{Event, EventStore};
use crate::notify::{Notifier, PaymentReminder};
use crate::reports::DailyReport;
use crate::schedule::{self, ScheduleTracker};
use crate::store::LoanStore;
use crate::types::LoanId;

/// a loan or installment the sweep could not update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub loan_id: LoanId,
    pub installment_number: Option<u32>,
    pub error: String,
}

/// outcome of one overdue sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub as_of: NaiveDate,
    pub loans_scanned: usize,
    /// installments flagged overdue for the first time
    pub newly_overdue: usize,
    /// overdue installments whose days and fee were recomputed
    pub installments_updated: usize,
    pub defaulted: Vec<LoanId>,
    pub failures: Vec<SweepFailure>,
}

/// flag overdue installments across every open loan as of a date
///
/// installment state is recomputed from the due date, so running the sweep
/// again for the same date changes nothing. ledger totals are untouched.
pub fn run_overdue_sweep<S: LoanStore>(
    store: &S,
    tracker: &ScheduleTracker,
    config: &LendingConfig,
    cache: &dyn Cache,
    as_of: NaiveDate,
    time_provider: &SafeTimeProvider,
    events: &mut EventStore,
) -> SweepReport {
    let mut report = SweepReport {
        as_of,
        loans_scanned: 0,
        newly_overdue: 0,
        installments_updated: 0,
        defaulted: Vec::new(),
        failures: Vec::new(),
    };

    for loan_id in store.loan_ids() {
        let result = store.update_account(&loan_id, |account| {
            let sweep = account.sweep_overdue(tracker, as_of, config.default_policy, time_provider);
            Ok((sweep, account.events.take_events(), account.loan.borrower_id))
        });

        match result {
            Ok((sweep, loan_events, borrower_id)) => {
                report.loans_scanned += 1;
                report.newly_overdue += sweep.newly_overdue;
                report.installments_updated += sweep.updates.len();
                if sweep.defaulted {
                    report.defaulted.push(loan_id.clone());
                }
                for (number, error) in sweep.failures {
                    report.failures.push(SweepFailure {
                        loan_id: loan_id.clone(),
                        installment_number: Some(number),
                        error: error.to_string(),
                    });
                }
                if !sweep.updates.is_empty() {
                    cache.invalidate_all(&[
                        CacheKey::Loan(loan_id.clone()),
                        CacheKey::RepaymentSchedule(loan_id.clone()),
                        CacheKey::UserLoanSummary(borrower_id),
                    ]);
                }
                events.extend(loan_events);
            }
            Err(e) => {
                warn!(loan_id = %loan_id, error = %e, "skipping loan during overdue sweep");
                report.failures.push(SweepFailure {
                    loan_id,
                    installment_number: None,
                    error: e.to_string(),
                });
            }
        }
    }

    cache.invalidate(&CacheKey::DashboardOverview);
    info!(
        %as_of,
        loans = report.loans_scanned,
        newly_overdue = report.newly_overdue,
        failures = report.failures.len(),
        "overdue sweep finished"
    );
    report
}

/// remind borrowers of installments falling due `lead_days` after `as_of`
///
/// returns the number of reminders delivered.
pub fn send_payment_reminders<S: LoanStore>(
    store: &S,
    notifier: &dyn Notifier,
    config: &LendingConfig,
    as_of: NaiveDate,
    events: &mut EventStore,
) -> usize {
    let due_on = as_of + Duration::days(i64::from(config.reminders.lead_days));
    let mut sent = 0;

    for loan_id in store.loan_ids() {
        let account = match store.account(&loan_id) {
            Ok(account) => account,
            Err(e) => {
                warn!(loan_id = %loan_id, error = %e, "skipping loan during reminder run");
                continue;
            }
        };
        if !account.loan.status.accepts_payments() {
            continue;
        }

        for installment in schedule::unpaid_due_on(&account.installments, due_on) {
            let reminder = PaymentReminder {
                borrower_id: account.loan.borrower_id,
                loan_id: loan_id.clone(),
                installment_number: installment.installment_number,
                amount: installment.total_amount,
                due_date: installment.due_date,
            };
            match notifier.send_reminder(&reminder) {
                Ok(()) => {
                    sent += 1;
                    events.emit(Event::PaymentReminderSent {
                        loan_id: loan_id.clone(),
                        installment_number: reminder.installment_number,
                        amount: reminder.amount,
                        due_date: reminder.due_date,
                    });
                }
                Err(e) => warn!(
                    loan_id = %loan_id,
                    installment = reminder.installment_number,
                    error = %e,
                    "payment reminder not delivered"
                ),
            }
        }
    }

    info!(%as_of, %due_on, sent, "payment reminders sent");
    sent
}

/// build the daily activity report and cache it under `daily_report`
pub fn generate_daily_report<S: LoanStore>(
    store: &S,
    cache: &dyn Cache,
    time_provider: &SafeTimeProvider,
) -> DailyReport {
    let accounts: Vec<LoanAccount> = store
        .loan_ids()
        .iter()
        .filter_map(|id| store.account(id).ok())
        .collect();
    let report = DailyReport::compute(time_provider.now(), &store.applications(), &accounts);

    put_typed(cache, CacheKey::DailyReport, &report);
    info!(
        date = %report.date,
        applications = report.loan_applications.total_last_30_days,
        payments = report.payments.total_last_30_days,
        "daily report generated"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::LoanApplication;
    use crate::cache::InMemoryCache;
    use crate::decimal::Money;
    use crate::errors::{LendingError, Result};
    use crate::product::LoanProduct;
    use crate::store::InMemoryStore;
    use crate::types::{LoanStatus, LoanType, ReviewDecision};
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()))
    }

    fn open_loan(store: &InMemoryStore, time: &SafeTimeProvider) -> LoanId {
        let product = LoanProduct::new(
            "Corper Emergency",
            LoanType::Emergency,
            Money::from_major(5_000),
            Money::from_major(50_000),
            dec!(15),
            12,
            dec!(1),
        )
        .unwrap();
        let mut app =
            LoanApplication::submit(Uuid::new_v4(), &product, Money::from_major(20_000), 6, "rent", time.now()).unwrap();
        app.start_review(time.now()).unwrap();
        app.review(ReviewDecision::Approve, None, "officer", "", time.now()).unwrap();
        let account = LoanAccount::open(&mut app, &LendingConfig::standard(), time).unwrap();
        let id = account.loan.loan_id.clone();
        store.insert_account(account).unwrap();
        id
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn send_reminder(&self, _reminder: &PaymentReminder) -> Result<()> {
            Err(LendingError::NotificationFailed {
                message: "smtp unavailable".to_string(),
            })
        }
    }

    /// store whose row for one loan disappears between listing and locking
    struct VanishingLoanStore {
        inner: InMemoryStore,
        missing: LoanId,
    }

    impl LoanStore for VanishingLoanStore {
        fn insert_user(&self, profile: crate::profile::UserProfile) -> Result<()> {
            self.inner.insert_user(profile)
        }
        fn user(&self, id: crate::types::UserId) -> Result<crate::profile::UserProfile> {
            self.inner.user(id)
        }
        fn update_user<R>(
            &self,
            id: crate::types::UserId,
            f: impl FnOnce(&mut crate::profile::UserProfile) -> Result<R>,
        ) -> Result<R> {
            self.inner.update_user(id, f)
        }
        fn users(&self) -> Vec<crate::profile::UserProfile> {
            self.inner.users()
        }
        fn insert_product(&self, product: LoanProduct) -> Result<()> {
            self.inner.insert_product(product)
        }
        fn product(&self, id: crate::types::ProductId) -> Result<LoanProduct> {
            self.inner.product(id)
        }
        fn update_product<R>(
            &self,
            id: crate::types::ProductId,
            f: impl FnOnce(&mut LoanProduct) -> Result<R>,
        ) -> Result<R> {
            self.inner.update_product(id, f)
        }
        fn products(&self) -> Vec<LoanProduct> {
            self.inner.products()
        }
        fn insert_application(&self, application: LoanApplication) -> Result<()> {
            self.inner.insert_application(application)
        }
        fn application(&self, id: &str) -> Result<LoanApplication> {
            self.inner.application(id)
        }
        fn update_application<R>(&self, id: &str, f: impl FnOnce(&mut LoanApplication) -> Result<R>) -> Result<R> {
            self.inner.update_application(id, f)
        }
        fn applications(&self) -> Vec<LoanApplication> {
            self.inner.applications()
        }
        fn insert_account(&self, account: LoanAccount) -> Result<()> {
            self.inner.insert_account(account)
        }
        fn account(&self, loan_id: &str) -> Result<LoanAccount> {
            self.inner.account(loan_id)
        }
        fn update_account<R>(&self, loan_id: &str, f: impl FnOnce(&mut LoanAccount) -> Result<R>) -> Result<R> {
            if loan_id == self.missing {
                return Err(LendingError::LoanNotFound { id: loan_id.to_string() });
            }
            self.inner.update_account(loan_id, f)
        }
        fn loan_ids(&self) -> Vec<LoanId> {
            self.inner.loan_ids()
        }
        fn loan_for_application(&self, application_id: &str) -> Option<LoanId> {
            self.inner.loan_for_application(application_id)
        }
        fn loan_for_payment(&self, payment_id: &str) -> Option<LoanId> {
            self.inner.loan_for_payment(payment_id)
        }
        fn record_transaction(&self, transaction: crate::gateway::RemitaTransaction) {
            self.inner.record_transaction(transaction)
        }
        fn transactions_for_user(&self, user_id: crate::types::UserId) -> Vec<crate::gateway::RemitaTransaction> {
            self.inner.transactions_for_user(user_id)
        }
    }

    #[test]
    fn test_sweep_continues_past_failing_loan() {
        let inner = InMemoryStore::new();
        let time = time();
        let first = open_loan(&inner, &time);
        let missing = open_loan(&inner, &time);
        let third = open_loan(&inner, &time);
        let store = VanishingLoanStore {
            inner,
            missing: missing.clone(),
        };

        let cache = InMemoryCache::new();
        let mut events = EventStore::new();
        let as_of = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let report = run_overdue_sweep(&store, &ScheduleTracker::default(), &LendingConfig::standard(), &cache, as_of, &time, &mut events);

        assert_eq!(report.loans_scanned, 2);
        assert_eq!(report.newly_overdue, 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].loan_id, missing);
        assert_eq!(report.failures[0].installment_number, None);
        assert!(report.failures[0].error.contains(&missing));

        for loan_id in [&first, &third] {
            let account = store.account(loan_id).unwrap();
            assert_eq!(account.installments.iter().filter(|i| i.is_overdue).count(), 2);
        }
        assert!(store.account(&missing).unwrap().installments.iter().all(|i| !i.is_overdue));
    }

    #[test]
    fn test_sweep_records_installment_failures() {
        let store = InMemoryStore::new();
        let time = time();
        let loan_id = open_loan(&store, &time);
        store
            .update_account(&loan_id, |account| {
                account.installments[0].total_amount = Money::ZERO;
                Ok(())
            })
            .unwrap();

        let cache = InMemoryCache::new();
        let mut events = EventStore::new();
        let as_of = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let report = run_overdue_sweep(&store, &ScheduleTracker::default(), &LendingConfig::standard(), &cache, as_of, &time, &mut events);

        assert_eq!(report.loans_scanned, 1);
        assert_eq!(report.newly_overdue, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].installment_number, Some(1));

        let account = store.account(&loan_id).unwrap();
        assert!(!account.installments[0].is_overdue);
        assert!(account.installments[1].is_overdue);
    }

    #[test]
    fn test_sweep_skips_closed_loans() {
        let store = InMemoryStore::new();
        let time = time();
        let open = open_loan(&store, &time);
        let written_off = open_loan(&store, &time);
        store
            .update_account(&written_off, |account| {
                account.mark_defaulted("absconded", "admin", &time)?;
                account.write_off("absconded", "admin", &time)
            })
            .unwrap();

        let cache = InMemoryCache::new();
        let mut events = EventStore::new();
        let as_of = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let report = run_overdue_sweep(&store, &ScheduleTracker::default(), &LendingConfig::standard(), &cache, as_of, &time, &mut events);

        assert_eq!(report.loans_scanned, 2);
        // installments due 02-15 and 03-15
        assert_eq!(report.newly_overdue, 2);
        assert!(report.failures.is_empty());
        assert!(report.defaulted.is_empty());
        assert_eq!(store.account(&open).unwrap().loan.status, LoanStatus::Active);
        assert!(store.account(&written_off).unwrap().installments.iter().all(|i| !i.is_overdue));

        let flagged = events
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, Event::InstallmentOverdue { .. }))
            .count();
        assert_eq!(flagged, 2);
    }

    #[test]
    fn test_failed_reminders_not_counted() {
        let store = InMemoryStore::new();
        let time = time();
        open_loan(&store, &time);

        let mut events = EventStore::new();
        let as_of = NaiveDate::from_ymd_opt(2024, 2, 12).unwrap();
        let sent = send_payment_reminders(&store, &FailingNotifier, &LendingConfig::standard(), as_of, &mut events);
        assert_eq!(sent, 0);
        assert!(events.events().is_empty());
    }
}
