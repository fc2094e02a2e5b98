use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use hourglass_rs::SafeTimeProvider;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::account::{LoanAccount, PaymentReceipt};
use crate::application::LoanApplication;
use crate::cache::{get_typed, put_typed, Cache, CacheKey, NoCache};
use crate::config::LendingConfig;
use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::events::{Event, EventStore};
use crate::gateway::{GatewayResponse, GatewayStatus, MockRemitaGateway, PaymentGateway, RemitaTransaction};
use crate::jobs::{self, SweepReport};
use crate::notify::{LogNotifier, Notifier};
use crate::payments::{Installment, PaymentRequest};
use crate::product::LoanProduct;
use crate::profile::UserProfile;
use crate::reports::{
    ApplicationStats, DailyReport, DashboardStats, LoanSummary, MonthlyTrends, PaymentAnalytics, UserDashboard,
};
use crate::schedule::ScheduleTracker;
use crate::state::Loan;
use crate::store::{InMemoryStore, LoanStore};
use crate::types::{
    new_reference, ApplicationId, ApplicationStatus, LoanStatus, PaymentMethod, PaymentStatus, ProductId,
    RemitaTransactionType, ReviewDecision, UserId, LOAN_PREFIX,
};

/// the operations the http layer and scheduler call into
///
/// every mutating operation is one store transaction. events and cache
/// evictions happen only after the transaction commits.
pub struct LendingService<S: LoanStore = InMemoryStore> {
    store: S,
    config: LendingConfig,
    tracker: ScheduleTracker,
    cache: Arc<dyn Cache>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    events: Mutex<EventStore>,
    disbursing: Mutex<HashSet<ApplicationId>>,
}

/// holds an application out of other disbursements and cancellation
struct DisbursementClaim<'a> {
    in_flight: &'a Mutex<HashSet<ApplicationId>>,
    application_id: ApplicationId,
}

impl Drop for DisbursementClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.application_id);
    }
}

impl LendingService<InMemoryStore> {
    /// in-memory service with the standard configuration
    pub fn in_memory() -> Self {
        Self {
            store: InMemoryStore::new(),
            config: LendingConfig::standard(),
            tracker: ScheduleTracker::default(),
            cache: Arc::new(NoCache),
            gateway: Arc::new(MockRemitaGateway::new()),
            notifier: Arc::new(LogNotifier),
            events: Mutex::new(EventStore::new()),
            disbursing: Mutex::new(HashSet::new()),
        }
    }
}

impl<S: LoanStore> LendingService<S> {
    pub fn new(store: S, config: LendingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            tracker: ScheduleTracker::new(config.late_fee),
            config,
            cache: Arc::new(NoCache),
            gateway: Arc::new(MockRemitaGateway::new()),
            notifier: Arc::new(LogNotifier),
            events: Mutex::new(EventStore::new()),
            disbursing: Mutex::new(HashSet::new()),
        })
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LendingConfig {
        &self.config
    }

    /// drain events committed so far
    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().take_events()
    }

    fn publish(&self, events: impl IntoIterator<Item = Event>) {
        self.events.lock().extend(events);
    }

    fn invalidate_loan(&self, loan: &Loan) {
        self.cache.invalidate_all(&[
            CacheKey::Loan(loan.loan_id.clone()),
            CacheKey::RepaymentSchedule(loan.loan_id.clone()),
            CacheKey::UserLoanSummary(loan.borrower_id),
            CacheKey::DashboardOverview,
            CacheKey::PaymentAnalytics,
        ]);
    }

    fn invalidate_application(&self, application: &LoanApplication) {
        self.cache.invalidate_all(&[
            CacheKey::Application(application.application_id.clone()),
            CacheKey::UserLoanSummary(application.applicant_id),
            CacheKey::DashboardOverview,
            CacheKey::ApplicationStats,
        ]);
    }

    fn audit(
        &self,
        user_id: UserId,
        loan_id: Option<&str>,
        transaction_type: RemitaTransactionType,
        amount: Option<Money>,
        response: &GatewayResponse,
        initiated_at: DateTime<Utc>,
        time_provider: &SafeTimeProvider,
    ) {
        self.store.record_transaction(RemitaTransaction::record(
            user_id,
            loan_id.map(str::to_string),
            transaction_type,
            amount,
            response,
            initiated_at,
            time_provider.now(),
        ));
    }

    // users and products

    pub fn register_user(&self, profile: UserProfile) -> Result<UserProfile> {
        self.store.insert_user(profile.clone())?;
        self.cache.invalidate(&CacheKey::DashboardOverview);
        info!(user_id = %profile.id, service_member = profile.service_member, "user registered");
        Ok(profile)
    }

    pub fn user(&self, user_id: UserId) -> Result<UserProfile> {
        self.store.user(user_id)
    }

    pub fn create_product(&self, product: LoanProduct) -> Result<LoanProduct> {
        product.validate()?;
        self.store.insert_product(product.clone())?;
        info!(product_id = %product.id, name = %product.name, "loan product created");
        Ok(product)
    }

    /// hide a product from new applications; existing loans are unaffected
    pub fn deactivate_product(&self, product_id: ProductId) -> Result<LoanProduct> {
        let product = self.store.update_product(product_id, |product| {
            product.is_active = false;
            Ok(product.clone())
        })?;
        info!(product_id = %product_id, "loan product deactivated");
        Ok(product)
    }

    pub fn list_active_products(&self) -> Vec<LoanProduct> {
        let mut products: Vec<LoanProduct> = self.store.products().into_iter().filter(|p| p.is_active).collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        products
    }

    // applications

    /// validate a borrower request and persist it as pending
    ///
    /// nothing is stored when the request falls outside the product's
    /// amount or tenure bounds.
    pub fn create_application(
        &self,
        applicant_id: UserId,
        product_id: ProductId,
        requested_amount: Money,
        tenure_months: u32,
        purpose: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<LoanApplication> {
        self.store.user(applicant_id)?;
        let product = self.store.product(product_id)?;
        if !product.is_active {
            return Err(LendingError::ProductInactive { id: product_id });
        }

        let application = LoanApplication::submit(
            applicant_id,
            &product,
            requested_amount,
            tenure_months,
            purpose,
            time_provider.now(),
        )?;
        self.store.insert_application(application.clone())?;

        info!(
            application_id = %application.application_id,
            applicant_id = %applicant_id,
            amount = %requested_amount,
            tenure_months,
            "application submitted"
        );
        self.publish([Event::ApplicationSubmitted {
            application_id: application.application_id.clone(),
            requested_amount,
            tenure_months,
            timestamp: application.applied_at,
        }]);
        self.invalidate_application(&application);
        Ok(application)
    }

    pub fn get_application(&self, application_id: &str) -> Result<LoanApplication> {
        if let Some(cached) = get_typed(self.cache.as_ref(), &CacheKey::Application(application_id.to_string())) {
            return Ok(cached);
        }
        let application = self.store.application(application_id)?;
        put_typed(self.cache.as_ref(), CacheKey::Application(application_id.to_string()), &application);
        Ok(application)
    }

    fn transition_application(
        &self,
        application_id: &str,
        actor: Option<&str>,
        time_provider: &SafeTimeProvider,
        f: impl FnOnce(&mut LoanApplication, DateTime<Utc>) -> Result<ApplicationStatus>,
    ) -> Result<LoanApplication> {
        let now = time_provider.now();
        let (old_status, application) = self.store.update_application(application_id, |application| {
            let old = f(application, now)?;
            Ok((old, application.clone()))
        })?;

        info!(
            application_id,
            from = ?old_status,
            to = ?application.status,
            actor = actor.unwrap_or("system"),
            "application status changed"
        );
        self.publish([Event::ApplicationStatusChanged {
            application_id: application.application_id.clone(),
            old_status,
            new_status: application.status,
            actor: actor.map(str::to_string),
            timestamp: now,
        }]);
        self.invalidate_application(&application);
        Ok(application)
    }

    /// pending -> under_review
    pub fn start_review(&self, application_id: &str, time_provider: &SafeTimeProvider) -> Result<LoanApplication> {
        self.transition_application(application_id, None, time_provider, |app, now| app.start_review(now))
    }

    pub fn review_application(
        &self,
        application_id: &str,
        decision: ReviewDecision,
        approved_amount: Option<Money>,
        reviewer_id: &str,
        comments: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<LoanApplication> {
        self.transition_application(application_id, Some(reviewer_id), time_provider, |app, now| {
            app.review(decision, approved_amount, reviewer_id, comments, now)
        })
    }

    /// refused while a disbursement for the application is in flight
    pub fn cancel_application(
        &self,
        application_id: &str,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<LoanApplication> {
        self.transition_application(application_id, Some(actor), time_provider, |app, _| {
            if self.disbursing.lock().contains(application_id) {
                return Err(LendingError::DisbursementInProgress {
                    id: application_id.to_string(),
                });
            }
            app.cancel()
        })
    }

    fn claim_disbursement(&self, application_id: &str) -> Result<DisbursementClaim<'_>> {
        let mut in_flight = self.disbursing.lock();
        if !in_flight.insert(application_id.to_string()) {
            return Err(LendingError::DisbursementInProgress {
                id: application_id.to_string(),
            });
        }
        Ok(DisbursementClaim {
            in_flight: &self.disbursing,
            application_id: application_id.to_string(),
        })
    }

    // loans

    /// release funds for an approved application and create its loan
    ///
    /// the application is claimed for the duration of the gateway call, which
    /// runs outside the row lock. every attempt is audited; a rejection
    /// leaves the application approved for a retry.
    pub fn disburse_loan(&self, application_id: &str, time_provider: &SafeTimeProvider) -> Result<Loan> {
        let _claim = self.claim_disbursement(application_id)?;
        let application = self.store.application(application_id)?;
        if application.status != ApplicationStatus::Approved {
            return Err(LendingError::InvalidApplicationTransition {
                from: application.status,
                to: ApplicationStatus::Disbursed,
            });
        }
        let profile = self.store.user(application.applicant_id)?;
        let loan_id = new_reference(LOAN_PREFIX);
        let principal = application.principal();
        let initiated_at = time_provider.now();

        let released = self.gateway.disburse(&profile, &loan_id, principal);
        let response = match &released {
            Ok(response) => response.clone(),
            Err(e) => GatewayResponse::from_error("", e),
        };
        let succeeded = response.status != GatewayStatus::Failed;
        self.audit(
            profile.id,
            succeeded.then_some(loan_id.as_str()),
            RemitaTransactionType::Disbursement,
            Some(principal),
            &response,
            initiated_at,
            time_provider,
        );
        if let Err(e) = released {
            warn!(application_id, error = %e, "disbursement call failed");
            return Err(e);
        }
        if !succeeded {
            warn!(application_id, payload = %response.payload, "disbursement rejected");
            return Err(LendingError::GatewayRejected {
                operation: "disburse".to_string(),
                message: response.payload.to_string(),
            });
        }

        let committed = self.store.update_application(application_id, |application| {
            let mut account = LoanAccount::open_as(application, loan_id.clone(), &self.config, time_provider)?;
            let events = account.events.take_events();
            let loan = account.loan.clone();
            self.store.insert_account(account)?;
            Ok((loan, events))
        });
        let (loan, events) = match committed {
            Ok(committed) => committed,
            Err(e) => {
                error!(
                    application_id,
                    loan_id = %loan_id,
                    reference = %response.reference,
                    error = %e,
                    "funds released but loan not recorded"
                );
                return Err(e);
            }
        };

        self.publish(events);
        self.invalidate_application(&application);
        self.invalidate_loan(&loan);
        Ok(loan)
    }

    pub fn get_loan(&self, loan_id: &str) -> Result<Loan> {
        Ok(self.store.account(loan_id)?.loan)
    }

    pub fn get_loan_summary(&self, loan_id: &str) -> Result<LoanSummary> {
        let key = CacheKey::Loan(loan_id.to_string());
        if let Some(cached) = get_typed(self.cache.as_ref(), &key) {
            return Ok(cached);
        }
        let summary = LoanSummary::from_account(&self.store.account(loan_id)?);
        put_typed(self.cache.as_ref(), key, &summary);
        Ok(summary)
    }

    pub fn get_schedule(&self, loan_id: &str) -> Result<Vec<Installment>> {
        let key = CacheKey::RepaymentSchedule(loan_id.to_string());
        if let Some(cached) = get_typed(self.cache.as_ref(), &key) {
            return Ok(cached);
        }
        let installments = self.store.account(loan_id)?.installments;
        put_typed(self.cache.as_ref(), key, &installments);
        Ok(installments)
    }

    /// record money received against a loan
    ///
    /// cash and bank transfers are applied at once. gateway payments are
    /// recorded pending and checked with the gateway when a reference is
    /// given; they are applied only once the gateway reports success.
    /// a reference already on the loan returns its existing payment, and a
    /// gateway error leaves the payment pending for a later retry.
    pub fn record_payment(
        &self,
        loan_id: &str,
        amount: Money,
        method: PaymentMethod,
        payment_date: DateTime<Utc>,
        gateway_reference: Option<&str>,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentReceipt> {
        let mut request = PaymentRequest::new(loan_id, amount, method, payment_date);
        if let Some(reference) = gateway_reference {
            request = request.with_gateway_reference(reference);
        }

        let (receipt, loan, events) = self.store.update_account(loan_id, |account| {
            let receipt = account.record_payment(request, &self.tracker, time_provider)?;
            Ok((receipt, account.loan.clone(), account.events.take_events()))
        })?;
        self.publish(events);
        self.invalidate_loan(&loan);

        info!(
            loan_id,
            payment_id = %receipt.payment.payment_id,
            %amount,
            status = ?receipt.payment.status,
            "payment recorded"
        );

        match (&receipt.payment.status, gateway_reference) {
            (PaymentStatus::Pending, Some(reference)) => {
                self.poll_gateway(&loan, &receipt.payment.payment_id, reference, amount, time_provider)
            }
            _ => Ok(receipt),
        }
    }

    fn poll_gateway(
        &self,
        loan: &Loan,
        payment_id: &str,
        reference: &str,
        amount: Money,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentReceipt> {
        let initiated_at = time_provider.now();
        let verified = self.gateway.verify_payment(reference, amount);
        let response = match &verified {
            Ok(response) => response.clone(),
            Err(e) => GatewayResponse::from_error(reference, e),
        };
        self.audit(
            loan.borrower_id,
            Some(&loan.loan_id),
            RemitaTransactionType::PaymentCollection,
            Some(amount),
            &response,
            initiated_at,
            time_provider,
        );
        if let Err(e) = verified {
            warn!(loan_id = %loan.loan_id, payment_id, reference, error = %e, "gateway verification failed, payment left pending");
            return self.pending_receipt(&loan.loan_id, payment_id);
        }

        match response.status {
            GatewayStatus::Pending => self.pending_receipt(&loan.loan_id, payment_id),
            status => self.confirm_payment(
                payment_id,
                status.as_payment_status(),
                Some(response.reference.clone()),
                time_provider,
            ),
        }
    }

    fn pending_receipt(&self, loan_id: &str, payment_id: &str) -> Result<PaymentReceipt> {
        let account = self.store.account(loan_id)?;
        let payment = account.payment(payment_id)?.clone();
        Ok(PaymentReceipt { payment, outcome: None })
    }

    /// finalize a pending payment and apply it when successful
    pub fn confirm_payment(
        &self,
        payment_id: &str,
        status: PaymentStatus,
        gateway_transaction_id: Option<String>,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentReceipt> {
        let loan_id = self
            .store
            .loan_for_payment(payment_id)
            .ok_or_else(|| LendingError::PaymentNotFound { id: payment_id.to_string() })?;

        let (receipt, loan, events) = self.store.update_account(&loan_id, |account| {
            let receipt =
                account.confirm_payment(payment_id, status, gateway_transaction_id, &self.tracker, time_provider)?;
            Ok((receipt, account.loan.clone(), account.events.take_events()))
        })?;
        self.publish(events);
        self.invalidate_loan(&loan);
        Ok(receipt)
    }

    pub fn mark_defaulted(
        &self,
        loan_id: &str,
        reason: &str,
        actor: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Loan> {
        self.change_loan_status(loan_id, |account| account.mark_defaulted(reason, actor, time_provider))
    }

    pub fn write_off(&self, loan_id: &str, reason: &str, actor: &str, time_provider: &SafeTimeProvider) -> Result<Loan> {
        self.change_loan_status(loan_id, |account| account.write_off(reason, actor, time_provider))
    }

    fn change_loan_status(
        &self,
        loan_id: &str,
        f: impl FnOnce(&mut LoanAccount) -> Result<LoanStatus>,
    ) -> Result<Loan> {
        let (loan, events) = self.store.update_account(loan_id, |account| {
            f(account)?;
            Ok((account.loan.clone(), account.events.take_events()))
        })?;
        self.publish(events);
        self.invalidate_loan(&loan);
        Ok(loan)
    }

    // gateway

    /// confirm a borrower's salary account with the gateway
    pub fn verify_salary(&self, user_id: UserId, time_provider: &SafeTimeProvider) -> Result<UserProfile> {
        let profile = self.store.user(user_id)?;
        let initiated_at = time_provider.now();
        let response = self.gateway.verify_salary(&profile)?;
        self.audit(
            user_id,
            None,
            RemitaTransactionType::SalaryVerification,
            Some(profile.monthly_allowance),
            &response,
            initiated_at,
            time_provider,
        );
        if response.status != GatewayStatus::Successful {
            return Err(LendingError::GatewayRejected {
                operation: "verify_salary".to_string(),
                message: response.payload.to_string(),
            });
        }

        let now = time_provider.now();
        self.store.update_user(user_id, |profile| {
            profile.record_salary_verification(now);
            Ok(profile.clone())
        })
    }

    /// set up salary auto-deduction for a loan, returning the mandate id
    pub fn setup_mandate(&self, loan_id: &str, time_provider: &SafeTimeProvider) -> Result<String> {
        let account = self.store.account(loan_id)?;
        let profile = self.store.user(account.loan.borrower_id)?;
        let initiated_at = time_provider.now();

        let (mandate_id, response, loan, events) = self.store.update_account(loan_id, |account| {
            let response = self
                .gateway
                .setup_mandate(&profile, loan_id, account.loan.monthly_installment)?;
            if response.status != GatewayStatus::Successful {
                return Err(LendingError::GatewayRejected {
                    operation: "setup_mandate".to_string(),
                    message: response.payload.to_string(),
                });
            }
            account.activate_mandate(response.reference.clone(), time_provider)?;
            Ok((response.reference.clone(), response, account.loan.clone(), account.events.take_events()))
        })?;

        self.store.update_user(profile.id, |profile| {
            profile.mandate_id = Some(mandate_id.clone());
            Ok(())
        })?;
        self.audit(
            profile.id,
            Some(loan_id),
            RemitaTransactionType::MandateSetup,
            Some(loan.monthly_installment),
            &response,
            initiated_at,
            time_provider,
        );
        self.publish(events);
        self.invalidate_loan(&loan);
        info!(loan_id, mandate_id = %mandate_id, "mandate activated");
        Ok(mandate_id)
    }

    /// stop salary auto-deduction for a loan
    pub fn cancel_mandate(&self, loan_id: &str, time_provider: &SafeTimeProvider) -> Result<String> {
        let initiated_at = time_provider.now();
        let (mandate_id, response, loan, events) = self.store.update_account(loan_id, |account| {
            let mandate_id = account.deactivate_mandate(time_provider)?;
            let response = self.gateway.cancel_mandate(&mandate_id)?;
            Ok((mandate_id, response, account.loan.clone(), account.events.take_events()))
        })?;

        self.audit(
            loan.borrower_id,
            Some(loan_id),
            RemitaTransactionType::MandateCancellation,
            None,
            &response,
            initiated_at,
            time_provider,
        );
        self.publish(events);
        self.invalidate_loan(&loan);
        info!(loan_id, mandate_id = %mandate_id, "mandate cancelled");
        Ok(mandate_id)
    }

    pub fn transactions_for_user(&self, user_id: UserId) -> Vec<RemitaTransaction> {
        self.store.transactions_for_user(user_id)
    }

    // jobs

    /// flag overdue installments as of a date; safe to re-run
    pub fn run_overdue_sweep(&self, as_of: NaiveDate, time_provider: &SafeTimeProvider) -> SweepReport {
        let mut events = EventStore::new();
        let report = jobs::run_overdue_sweep(
            &self.store,
            &self.tracker,
            &self.config,
            self.cache.as_ref(),
            as_of,
            time_provider,
            &mut events,
        );
        self.publish(events.take_events());
        report
    }

    /// send reminders for installments due `lead_days` after `as_of`
    pub fn run_reminder_job(&self, as_of: NaiveDate) -> usize {
        let mut events = EventStore::new();
        let sent = jobs::send_payment_reminders(&self.store, self.notifier.as_ref(), &self.config, as_of, &mut events);
        self.publish(events.take_events());
        sent
    }

    pub fn generate_daily_report(&self, time_provider: &SafeTimeProvider) -> DailyReport {
        jobs::generate_daily_report(&self.store, self.cache.as_ref(), time_provider)
    }

    // dashboards

    fn all_accounts(&self) -> Vec<LoanAccount> {
        self.store
            .loan_ids()
            .iter()
            .filter_map(|id| match self.store.account(id) {
                Ok(account) => Some(account),
                Err(e) => {
                    warn!(loan_id = %id, error = %e, "loan missing from listing");
                    None
                }
            })
            .collect()
    }

    pub fn dashboard_stats(&self) -> DashboardStats {
        if let Some(cached) = get_typed(self.cache.as_ref(), &CacheKey::DashboardOverview) {
            return cached;
        }
        let stats = DashboardStats::compute(self.store.users().len(), &self.store.applications(), &self.all_accounts());
        put_typed(self.cache.as_ref(), CacheKey::DashboardOverview, &stats);
        stats
    }

    pub fn user_dashboard(&self, user_id: UserId) -> Result<UserDashboard> {
        let key = CacheKey::UserLoanSummary(user_id);
        if let Some(cached) = get_typed(self.cache.as_ref(), &key) {
            return Ok(cached);
        }
        self.store.user(user_id)?;
        let dashboard = UserDashboard::compute(user_id, &self.store.applications(), &self.all_accounts());
        put_typed(self.cache.as_ref(), key, &dashboard);
        Ok(dashboard)
    }

    pub fn payment_analytics(&self) -> PaymentAnalytics {
        if let Some(cached) = get_typed(self.cache.as_ref(), &CacheKey::PaymentAnalytics) {
            return cached;
        }
        let analytics = PaymentAnalytics::compute(&self.all_accounts());
        put_typed(self.cache.as_ref(), CacheKey::PaymentAnalytics, &analytics);
        analytics
    }

    pub fn application_stats(&self) -> ApplicationStats {
        if let Some(cached) = get_typed(self.cache.as_ref(), &CacheKey::ApplicationStats) {
            return cached;
        }
        let stats = ApplicationStats::compute(&self.store.applications());
        put_typed(self.cache.as_ref(), CacheKey::ApplicationStats, &stats);
        stats
    }

    /// per-month applications, disbursements and collections over the last year
    pub fn monthly_trends(&self, time_provider: &SafeTimeProvider) -> MonthlyTrends {
        MonthlyTrends::compute(time_provider.now().date_naive(), &self.store.applications(), &self.all_accounts())
    }
}
