use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::account::LoanAccount;
use crate::application::LoanApplication;
use crate::decimal::{Money, Rate};
use crate::payments::Installment;
use crate::types::{ApplicationStatus, LoanId, LoanStatus, PaymentStatus, UserId};

/// what a borrower or officer sees for one loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanSummary {
    pub loan_id: LoanId,
    pub principal: Money,
    pub annual_rate: Rate,
    pub total_amount: Money,
    pub total_paid: Money,
    pub outstanding_balance: Money,
    pub status: LoanStatus,
    pub next_due_installment: Option<Installment>,
    pub overdue_installments: u32,
    pub accrued_late_fees: Money,
    pub maturity_date: NaiveDate,
    pub auto_deduction_active: bool,
}

impl LoanSummary {
    pub fn from_account(account: &LoanAccount) -> Self {
        let loan = &account.loan;
        LoanSummary {
            loan_id: loan.loan_id.clone(),
            principal: loan.principal,
            annual_rate: loan.annual_rate,
            total_amount: loan.total_amount,
            total_paid: loan.total_paid,
            outstanding_balance: loan.outstanding_balance,
            status: loan.status,
            next_due_installment: account.next_due().cloned(),
            overdue_installments: crate::schedule::overdue(&account.installments).count() as u32,
            accrued_late_fees: account.accrued_late_fees(),
            maturity_date: loan.maturity_date,
            auto_deduction_active: loan.auto_deduction_active,
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// portfolio-wide figures for the admin dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_applications: u64,
    pub total_active_loans: u64,
    pub total_loan_amount: Money,
    pub total_collections: Money,
    pub pending_applications: u64,
    pub overdue_payments: u64,
    /// percent of loans defaulted, to two places
    pub default_rate: Decimal,
}

impl DashboardStats {
    pub fn compute(total_users: usize, applications: &[LoanApplication], accounts: &[LoanAccount]) -> Self {
        let total_loans = accounts.len() as u64;
        let defaulted = accounts.iter().filter(|a| a.loan.status == LoanStatus::Defaulted).count() as u64;
        let default_rate = if total_loans == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(defaulted) * Decimal::ONE_HUNDRED / Decimal::from(total_loans))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        };

        DashboardStats {
            total_users: total_users as u64,
            total_applications: applications.len() as u64,
            total_active_loans: accounts.iter().filter(|a| a.loan.status == LoanStatus::Active).count() as u64,
            total_loan_amount: accounts.iter().map(|a| a.loan.principal).sum(),
            total_collections: accounts
                .iter()
                .flat_map(|a| a.successful_payments())
                .map(|p| p.amount)
                .sum(),
            pending_applications: applications
                .iter()
                .filter(|a| a.status == ApplicationStatus::Pending)
                .count() as u64,
            overdue_payments: accounts
                .iter()
                .map(|a| crate::schedule::overdue(&a.installments).count() as u64)
                .sum(),
            default_rate,
        }
    }
}

/// one borrower's own figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDashboard {
    pub user_id: UserId,
    pub total_applications: u64,
    pub pending_applications: u64,
    pub approved_applications: u64,
    pub active_loans: u64,
    pub total_borrowed: Money,
    pub total_paid: Money,
    /// outstanding on active loans only
    pub outstanding_balance: Money,
    pub next_payment_due: Option<Installment>,
}

impl UserDashboard {
    pub fn compute(user_id: UserId, applications: &[LoanApplication], accounts: &[LoanAccount]) -> Self {
        let own_apps: Vec<&LoanApplication> = applications.iter().filter(|a| a.applicant_id == user_id).collect();
        let own_loans: Vec<&LoanAccount> = accounts.iter().filter(|a| a.loan.borrower_id == user_id).collect();
        let active = || own_loans.iter().filter(|a| a.loan.status == LoanStatus::Active);

        let next_payment_due = own_loans
            .iter()
            .filter_map(|a| a.next_due())
            .min_by_key(|i| i.due_date)
            .cloned();

        UserDashboard {
            user_id,
            total_applications: own_apps.len() as u64,
            pending_applications: own_apps.iter().filter(|a| a.status == ApplicationStatus::Pending).count() as u64,
            approved_applications: own_apps.iter().filter(|a| a.status == ApplicationStatus::Approved).count() as u64,
            active_loans: active().count() as u64,
            total_borrowed: own_loans.iter().map(|a| a.loan.principal).sum(),
            total_paid: own_loans
                .iter()
                .flat_map(|a| a.successful_payments())
                .map(|p| p.amount)
                .sum(),
            outstanding_balance: active().map(|a| a.loan.outstanding_balance).sum(),
            next_payment_due,
        }
    }
}

/// application figures for the daily report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationActivity {
    pub total_last_30_days: u64,
    pub today: u64,
    pub approved: u64,
    pub total_approved_amount: Money,
}

/// payment figures for the daily report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentActivity {
    pub total_last_30_days: u64,
    pub total_collected: Money,
    pub today: u64,
}

/// last-30-days activity snapshot written by the daily job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub loan_applications: ApplicationActivity,
    pub payments: PaymentActivity,
    pub generated_at: DateTime<Utc>,
}

impl DailyReport {
    pub fn compute(now: DateTime<Utc>, applications: &[LoanApplication], accounts: &[LoanAccount]) -> Self {
        let today = now.date_naive();
        let window_start = today - Duration::days(30);
        let in_window = |at: DateTime<Utc>| at.date_naive() >= window_start;

        let recent_apps: Vec<&LoanApplication> = applications.iter().filter(|a| in_window(a.applied_at)).collect();
        let approved: Vec<&&LoanApplication> = recent_apps.iter().filter(|a| a.approved_at.is_some()).collect();

        let recent_payments: Vec<_> = accounts
            .iter()
            .flat_map(|a| a.payments.values())
            .filter(|p| in_window(p.created_at))
            .collect();

        DailyReport {
            date: today,
            loan_applications: ApplicationActivity {
                total_last_30_days: recent_apps.len() as u64,
                today: recent_apps.iter().filter(|a| a.applied_at.date_naive() == today).count() as u64,
                approved: approved.len() as u64,
                total_approved_amount: approved.iter().map(|a| a.principal()).sum(),
            },
            payments: PaymentActivity {
                total_last_30_days: recent_payments.len() as u64,
                total_collected: recent_payments
                    .iter()
                    .filter(|p| p.status == PaymentStatus::Successful)
                    .map(|p| p.amount)
                    .sum(),
                today: recent_payments.iter().filter(|p| p.created_at.date_naive() == today).count() as u64,
            },
            generated_at: now,
        }
    }
}

fn average(total: Money, count: u64) -> Money {
    if count == 0 {
        return Money::ZERO;
    }
    Money::from_decimal(total.as_decimal() / Decimal::from(count))
}

/// payment outcomes across every loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAnalytics {
    pub total_payments: u64,
    pub successful_payments: u64,
    pub failed_payments: u64,
    pub pending_payments: u64,
    /// sum of successful payments
    pub total_amount_processed: Money,
    /// mean of successful payments
    pub average_payment_amount: Money,
}

impl PaymentAnalytics {
    pub fn compute(accounts: &[LoanAccount]) -> Self {
        let payments: Vec<_> = accounts.iter().flat_map(|a| a.payments.values()).collect();
        let count = |status: PaymentStatus| payments.iter().filter(|p| p.status == status).count() as u64;

        let successful_payments = count(PaymentStatus::Successful);
        let total_amount_processed: Money = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Successful)
            .map(|p| p.amount)
            .sum();

        PaymentAnalytics {
            total_payments: payments.len() as u64,
            successful_payments,
            failed_payments: count(PaymentStatus::Failed),
            pending_payments: count(PaymentStatus::Pending),
            total_amount_processed,
            average_payment_amount: average(total_amount_processed, successful_payments),
        }
    }
}

/// application counts by status and requested volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStats {
    pub total_applications: u64,
    pub pending_applications: u64,
    pub approved_applications: u64,
    pub rejected_applications: u64,
    pub disbursed_applications: u64,
    pub total_requested_amount: Money,
    pub average_requested_amount: Money,
}

impl ApplicationStats {
    pub fn compute(applications: &[LoanApplication]) -> Self {
        let count = |status: ApplicationStatus| applications.iter().filter(|a| a.status == status).count() as u64;
        let total_requested_amount: Money = applications.iter().map(|a| a.requested_amount).sum();

        ApplicationStats {
            total_applications: applications.len() as u64,
            pending_applications: count(ApplicationStatus::Pending),
            approved_applications: count(ApplicationStatus::Approved),
            rejected_applications: count(ApplicationStatus::Rejected),
            disbursed_applications: count(ApplicationStatus::Disbursed),
            total_requested_amount,
            average_requested_amount: average(total_requested_amount, applications.len() as u64),
        }
    }
}

/// one calendar month of activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyStats {
    /// `YYYY-MM`
    pub month: String,
    pub applications: u64,
    /// principal released during the month
    pub disbursements: Money,
    /// successful payments dated in the month
    pub collections: Money,
}

/// month-by-month activity from the month a year back up to today
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTrends {
    pub months: Vec<MonthlyStats>,
}

impl MonthlyTrends {
    pub fn compute(today: NaiveDate, applications: &[LoanApplication], accounts: &[LoanAccount]) -> Self {
        let year_back = today - Duration::days(365);
        let mut month_start = year_back.with_day(1).unwrap_or(year_back);
        let mut months = Vec::new();

        while month_start <= today {
            let Some(next) = month_start.checked_add_months(Months::new(1)) else {
                break;
            };
            let in_month = |at: DateTime<Utc>| {
                let day = at.date_naive();
                day >= month_start && day < next
            };

            months.push(MonthlyStats {
                month: month_start.format("%Y-%m").to_string(),
                applications: applications.iter().filter(|a| in_month(a.applied_at)).count() as u64,
                disbursements: accounts
                    .iter()
                    .filter(|a| in_month(a.loan.disbursed_at))
                    .map(|a| a.loan.principal)
                    .sum(),
                collections: accounts
                    .iter()
                    .flat_map(|a| a.successful_payments())
                    .filter(|p| in_month(p.payment_date))
                    .map(|p| p.amount)
                    .sum(),
            });
            month_start = next;
        }

        MonthlyTrends { months }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LendingConfig;
    use crate::payments::PaymentRequest;
    use crate::product::LoanProduct;
    use crate::schedule::ScheduleTracker;
    use crate::types::{LoanType, PaymentMethod, ReviewDecision};
    use chrono::TimeZone;
    use hourglass_rs::{SafeTimeProvider, TimeSource};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn product() -> LoanProduct {
        LoanProduct::new(
            "Corper Business",
            LoanType::Business,
            Money::from_major(10_000),
            Money::from_major(50_000),
            dec!(15),
            12,
            dec!(2),
        )
        .unwrap()
    }

    fn disbursed(borrower: UserId, amount: Money, time: &SafeTimeProvider) -> (LoanApplication, LoanAccount) {
        let mut app = LoanApplication::submit(borrower, &product(), amount, 6, "stock", time.now()).unwrap();
        app.start_review(time.now()).unwrap();
        app.review(ReviewDecision::Approve, None, "officer", "", time.now()).unwrap();
        let account = LoanAccount::open(&mut app, &LendingConfig::standard(), time).unwrap();
        (app, account)
    }

    #[test]
    fn test_loan_summary() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()));
        let (_, mut account) = disbursed(Uuid::new_v4(), Money::from_major(20_000), &time);
        let request = PaymentRequest::new(account.id().clone(), Money::from_major(5_000), PaymentMethod::Cash, time.now());
        account.record_payment(request, &ScheduleTracker::default(), &time).unwrap();

        let summary = LoanSummary::from_account(&account);
        assert_eq!(summary.total_paid, Money::from_major(5_000));
        assert_eq!(summary.outstanding_balance, Money::from_major(16_500));
        assert_eq!(summary.status, LoanStatus::Active);
        assert_eq!(summary.next_due_installment.map(|i| i.installment_number), Some(2));
        assert!(summary.to_json_pretty().unwrap().contains("\"outstanding_balance\""));
    }

    #[test]
    fn test_dashboard_default_rate() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()));
        let mut apps = Vec::new();
        let mut accounts = Vec::new();
        for _ in 0..3 {
            let (app, account) = disbursed(Uuid::new_v4(), Money::from_major(10_000), &time);
            apps.push(app);
            accounts.push(account);
        }
        accounts[0].mark_defaulted("silent", "admin", &time).unwrap();

        let stats = DashboardStats::compute(3, &apps, &accounts);
        assert_eq!(stats.total_active_loans, 2);
        assert_eq!(stats.total_loan_amount, Money::from_major(30_000));
        assert_eq!(stats.default_rate, dec!(33.33));
        assert_eq!(DashboardStats::compute(0, &[], &[]).default_rate, Decimal::ZERO);
    }

    #[test]
    fn test_user_dashboard_scopes_to_borrower() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()));
        let borrower = Uuid::new_v4();
        let (app_a, account_a) = disbursed(borrower, Money::from_major(10_000), &time);
        let (app_b, account_b) = disbursed(Uuid::new_v4(), Money::from_major(40_000), &time);

        let view = UserDashboard::compute(borrower, &[app_a, app_b], &[account_a.clone(), account_b]);
        assert_eq!(view.total_applications, 1);
        assert_eq!(view.active_loans, 1);
        assert_eq!(view.total_borrowed, Money::from_major(10_000));
        assert_eq!(view.outstanding_balance, account_a.loan.total_amount);
        assert_eq!(view.next_payment_due.map(|i| i.installment_number), Some(1));
    }

    #[test]
    fn test_daily_report_window() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()));
        let control = time.test_control().unwrap();
        let (old_app, _) = disbursed(Uuid::new_v4(), Money::from_major(10_000), &time);

        control.advance(Duration::days(40));
        let (new_app, mut account) = disbursed(Uuid::new_v4(), Money::from_major(12_000), &time);
        let request = PaymentRequest::new(account.id().clone(), Money::from_major(1_000), PaymentMethod::Cash, time.now());
        account.record_payment(request, &ScheduleTracker::default(), &time).unwrap();

        let report = DailyReport::compute(time.now(), &[old_app, new_app], &[account]);
        assert_eq!(report.loan_applications.total_last_30_days, 1);
        assert_eq!(report.loan_applications.today, 1);
        assert_eq!(report.loan_applications.total_approved_amount, Money::from_major(12_000));
        assert_eq!(report.payments.total_collected, Money::from_major(1_000));
        assert_eq!(report.payments.today, 1);
    }

    #[test]
    fn test_payment_analytics_counts_by_status() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()));
        let tracker = ScheduleTracker::default();
        let (_, mut account) = disbursed(Uuid::new_v4(), Money::from_major(20_000), &time);
        let loan_id = account.id().clone();

        for amount in [Money::from_major(1_000), Money::from_major(2_001)] {
            let request = PaymentRequest::new(loan_id.clone(), amount, PaymentMethod::Cash, time.now());
            account.record_payment(request, &tracker, &time).unwrap();
        }
        let pending = PaymentRequest::new(loan_id.clone(), Money::from_major(500), PaymentMethod::RemitaManual, time.now());
        account.record_payment(pending, &tracker, &time).unwrap();
        let failed = PaymentRequest::new(loan_id, Money::from_major(700), PaymentMethod::RemitaAuto, time.now());
        let failed = account.record_payment(failed, &tracker, &time).unwrap();
        account
            .confirm_payment(&failed.payment.payment_id, PaymentStatus::Failed, None, &tracker, &time)
            .unwrap();

        let analytics = PaymentAnalytics::compute(&[account]);
        assert_eq!(analytics.total_payments, 4);
        assert_eq!(analytics.successful_payments, 2);
        assert_eq!(analytics.failed_payments, 1);
        assert_eq!(analytics.pending_payments, 1);
        assert_eq!(analytics.total_amount_processed, Money::from_major(3_001));
        assert_eq!(analytics.average_payment_amount, Money::from_minor(150_050));

        let empty = PaymentAnalytics::compute(&[]);
        assert_eq!(empty.average_payment_amount, Money::ZERO);
    }

    #[test]
    fn test_application_stats() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()));
        let pending = LoanApplication::submit(Uuid::new_v4(), &product(), Money::from_major(10_000), 6, "rent", time.now()).unwrap();
        let mut rejected =
            LoanApplication::submit(Uuid::new_v4(), &product(), Money::from_major(20_000), 6, "rent", time.now()).unwrap();
        rejected.start_review(time.now()).unwrap();
        rejected
            .review(ReviewDecision::Reject, None, "officer", "no allowance record", time.now())
            .unwrap();
        let (disbursed_app, _) = disbursed(Uuid::new_v4(), Money::from_major(15_001), &time);

        let stats = ApplicationStats::compute(&[pending, rejected, disbursed_app]);
        assert_eq!(stats.total_applications, 3);
        assert_eq!(stats.pending_applications, 1);
        assert_eq!(stats.approved_applications, 0);
        assert_eq!(stats.rejected_applications, 1);
        assert_eq!(stats.disbursed_applications, 1);
        assert_eq!(stats.total_requested_amount, Money::from_major(45_001));
        assert_eq!(stats.average_requested_amount, Money::from_minor(1_500_033));
    }

    #[test]
    fn test_monthly_trends_cover_trailing_year() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()));
        let control = time.test_control().unwrap();
        let (jan_app, jan_loan) = disbursed(Uuid::new_v4(), Money::from_major(10_000), &time);

        control.advance(Duration::days(40));
        let (feb_app, mut feb_loan) = disbursed(Uuid::new_v4(), Money::from_major(12_000), &time);
        let request = PaymentRequest::new(feb_loan.id().clone(), Money::from_major(1_000), PaymentMethod::Cash, time.now());
        feb_loan.record_payment(request, &ScheduleTracker::default(), &time).unwrap();

        let trends = MonthlyTrends::compute(time.now().date_naive(), &[jan_app, feb_app], &[jan_loan, feb_loan]);
        assert_eq!(trends.months.len(), 13);
        assert_eq!(trends.months[0].month, "2023-02");
        assert_eq!(trends.months[0].applications, 0);

        let jan = &trends.months[11];
        assert_eq!(jan.month, "2024-01");
        assert_eq!(jan.applications, 1);
        assert_eq!(jan.disbursements, Money::from_major(10_000));
        assert_eq!(jan.collections, Money::ZERO);

        let feb = &trends.months[12];
        assert_eq!(feb.month, "2024-02");
        assert_eq!(feb.applications, 1);
        assert_eq!(feb.disbursements, Money::from_major(12_000));
        assert_eq!(feb.collections, Money::from_major(1_000));
    }
}
