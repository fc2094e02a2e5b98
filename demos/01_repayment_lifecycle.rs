/// repayment lifecycle - installments, gateway confirmation and overpayment
use microloan_ledger::{
    GatewayStatus, LendingService, LoanProduct, LoanType, MockRemitaGateway, Money, PaymentMethod, PaymentStatus,
    ReviewDecision, SafeTimeProvider, TimeSource, UserProfile,
};
use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== repayment lifecycle ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let gateway = Arc::new(MockRemitaGateway::new());
    gateway.set_payment_status("RRR-0002", GatewayStatus::Pending);
    let service = LendingService::in_memory().with_gateway(gateway);

    let borrower = service.register_user(
        UserProfile::new("Bola Ade", "bola@example.com", "OY/24B/0042", time.now()).as_service_member(),
    )?;
    let product = service.create_product(LoanProduct::new(
        "Corper Education",
        LoanType::Education,
        Money::from_major(5_000),
        Money::from_major(50_000),
        dec!(30),
        12,
        dec!(1),
    )?)?;

    let app = service.create_application(borrower.id, product.id, Money::from_major(10_000), 6, "certification", &time)?;
    service.start_review(&app.application_id, &time)?;
    service.review_application(&app.application_id, ReviewDecision::Approve, None, "officer-2", "", &time)?;
    let loan = service.disburse_loan(&app.application_id, &time)?;
    println!("loan {} total {} in {} installments", loan.loan_id, loan.total_amount, loan.tenure_months);

    for installment in service.get_schedule(&loan.loan_id)? {
        println!("  #{} due {} amount {}", installment.installment_number, installment.due_date, installment.total_amount);
    }

    // first installment by salary deduction
    controller.advance(Duration::days(31));
    let first = service.record_payment(
        &loan.loan_id, loan.monthly_installment, PaymentMethod::RemitaAuto, time.now(), Some("RRR-0001"), &time,
    )?;
    println!("\nauto deduction: {:?}", first.payment.status);

    // manual gateway payment that settles later
    controller.advance(Duration::days(29));
    let pending = service.record_payment(
        &loan.loan_id, loan.monthly_installment, PaymentMethod::RemitaManual, time.now(), Some("RRR-0002"), &time,
    )?;
    println!("manual payment: {:?}", pending.payment.status);
    service.confirm_payment(&pending.payment.payment_id, PaymentStatus::Successful, None, &time)?;
    println!("manual payment confirmed");

    // clear the rest with a little extra
    let remaining = service.get_loan(&loan.loan_id)?.outstanding_balance;
    let receipt = service.record_payment(
        &loan.loan_id, remaining + Money::from_major(50), PaymentMethod::BankTransfer, time.now(), None, &time,
    )?;
    if let Some(outcome) = receipt.outcome {
        println!("\nexcess paid: {}", outcome.excess);
        println!("closed: {}", outcome.closed);
    }

    for event in service.take_events() {
        println!("event: {:?}", event);
    }

    Ok(())
}
