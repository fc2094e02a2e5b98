pub mod account;
pub mod application;
pub mod cache;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod jobs;
pub mod notify;
pub mod payments;
pub mod product;
pub mod profile;
pub mod reports;
pub mod schedule;
pub mod service;
pub mod state;
pub mod store;
pub mod types;

// re-export key types
pub use account::{AccountSweep, LoanAccount, PaymentReceipt};
pub use application::LoanApplication;
pub use cache::{Cache, CacheKey, InMemoryCache, NoCache};
pub use config::{DefaultPolicy, LateFeePolicy, LendingConfig, ReminderPolicy, ScheduleConfig};
pub use decimal::{Money, Rate};
pub use errors::{LendingError, Result};
pub use events::{Event, EventStore};
pub use gateway::{GatewayResponse, GatewayStatus, MockRemitaGateway, PaymentGateway, RemitaTransaction};
pub use jobs::{SweepFailure, SweepReport};
pub use notify::{LogNotifier, Notifier, PaymentReminder};
pub use payments::{
    apply_payment, compute_loan_terms, generate_schedule, Installment, LedgerOutcome, LoanTerms, Payment,
    PaymentRequest,
};
pub use product::{LoanProduct, ProductTerms};
pub use profile::UserProfile;
pub use reports::{
    ApplicationStats, DailyReport, DashboardStats, LoanSummary, MonthlyStats, MonthlyTrends, PaymentAnalytics,
    UserDashboard,
};
pub use schedule::{LateFeeCalculation, LateFeeEngine, OverdueUpdate, ScheduleTracker};
pub use service::LendingService;
pub use state::Loan;
pub use store::{InMemoryStore, LoanStore};
pub use types::{
    ApplicationId, ApplicationStatus, LoanId, LoanStatus, LoanType, PaymentId, PaymentMethod, PaymentStatus,
    ProductId, RemitaTransactionType, ReviewDecision, UserId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
