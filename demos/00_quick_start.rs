/// quick start - minimal example to get started
use microloan_ledger::{
    LendingService, LoanProduct, LoanType, Money, PaymentMethod, ReviewDecision, SafeTimeProvider, TimeSource,
    UserProfile,
};
use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    ));
    let service = LendingService::in_memory();

    // a corps member and a product
    let borrower = service.register_user(
        UserProfile::new("Ada Obi", "ada@example.com", "LA/24A/1234", time.now()).as_service_member(),
    )?;
    let product = service.create_product(LoanProduct::new(
        "Corper Business",
        LoanType::Business,
        Money::from_major(10_000),
        Money::from_major(50_000),
        dec!(15),
        12,
        dec!(2),
    )?)?;

    // apply, review, disburse
    let app = service.create_application(
        borrower.id, product.id, Money::from_major(10_000), 1, "market stall", &time,
    )?;
    service.start_review(&app.application_id, &time)?;
    service.review_application(&app.application_id, ReviewDecision::Approve, None, "officer-1", "ok", &time)?;
    let loan = service.disburse_loan(&app.application_id, &time)?;

    // repay in full
    service.record_payment(&loan.loan_id, loan.total_amount, PaymentMethod::BankTransfer, time.now(), None, &time)?;

    // print current state
    println!("{}", service.get_loan_summary(&loan.loan_id)?.to_json_pretty()?);

    // portfolio views
    let analytics = service.payment_analytics();
    println!(
        "payments: {} processed, {} total, {} average",
        analytics.successful_payments, analytics.total_amount_processed, analytics.average_payment_amount
    );
    for month in service.monthly_trends(&time).months.iter().filter(|m| m.applications > 0) {
        println!("{}: {} applications, {} disbursed, {} collected", month.month, month.applications, month.disbursements, month.collections);
    }

    Ok(())
}
