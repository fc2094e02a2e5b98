/// overdue sweep - late fees, reminders and automatic default
use microloan_ledger::{
    DefaultPolicy, InMemoryStore, LendingConfig, LendingService, LoanProduct, LoanType, Money, ReviewDecision,
    SafeTimeProvider, TimeSource, UserProfile,
};
use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== overdue sweep ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let config = LendingConfig::standard().with_default_policy(DefaultPolicy {
        min_overdue_installments: 2,
        min_days_overdue: 14,
    });
    let service = LendingService::new(InMemoryStore::new(), config)?;

    let borrower = service.register_user(
        UserProfile::new("Chidi Eze", "chidi@example.com", "EN/24A/0777", time.now()).as_service_member(),
    )?;
    let product = service.create_product(LoanProduct::new(
        "Corper Emergency",
        LoanType::Emergency,
        Money::from_major(5_000),
        Money::from_major(50_000),
        dec!(15),
        12,
        dec!(1),
    )?)?;
    let app = service.create_application(borrower.id, product.id, Money::from_major(20_000), 6, "medical", &time)?;
    service.start_review(&app.application_id, &time)?;
    service.review_application(&app.application_id, ReviewDecision::Approve, None, "officer-3", "", &time)?;
    let loan = service.disburse_loan(&app.application_id, &time)?;

    // reminders go out three days before the first due date
    controller.advance(Duration::days(28));
    let sent = service.run_reminder_job(time.now().date_naive());
    println!("{}: {} reminder(s) sent", time.now().date_naive(), sent);

    // nothing is paid; sweep weekly
    for _ in 0..10 {
        controller.advance(Duration::days(7));
        let report = service.run_overdue_sweep(time.now().date_naive(), &time);
        let summary = service.get_loan_summary(&loan.loan_id)?;
        println!(
            "{}: newly overdue {}, overdue {}, late fees {}, status {:?}",
            report.as_of, report.newly_overdue, summary.overdue_installments, summary.accrued_late_fees, summary.status,
        );
    }

    // sweeping the same day again changes nothing
    let again = service.run_overdue_sweep(time.now().date_naive(), &time);
    println!("\nre-run newly overdue: {}", again.newly_overdue);

    let stats = service.dashboard_stats();
    println!("default rate: {}%", stats.default_rate);

    Ok(())
}
