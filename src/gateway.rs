use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::profile::UserProfile;
use crate::types::{LoanId, PaymentStatus, RemitaTransactionType, UserId, MANDATE_PREFIX};

/// outcome reported by the payment gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Successful,
    Failed,
    Pending,
}

impl GatewayStatus {
    pub fn as_payment_status(self) -> PaymentStatus {
        match self {
            GatewayStatus::Successful => PaymentStatus::Successful,
            GatewayStatus::Failed => PaymentStatus::Failed,
            GatewayStatus::Pending => PaymentStatus::Pending,
        }
    }
}

/// gateway reply to a single call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub status: GatewayStatus,
    /// gateway reference (rrr); the mandate id for mandate setup
    pub reference: String,
    pub payload: serde_json::Value,
}

impl GatewayResponse {
    /// failed response recorded when the call itself errored
    pub fn from_error(reference: &str, error: &LendingError) -> Self {
        Self {
            status: GatewayStatus::Failed,
            reference: reference.to_string(),
            payload: json!({ "error": error.to_string() }),
        }
    }
}

/// audit record of one gateway call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemitaTransaction {
    pub id: Uuid,
    pub user_id: UserId,
    pub loan_id: Option<LoanId>,
    pub transaction_type: RemitaTransactionType,
    pub rrr: String,
    pub amount: Option<Money>,
    pub status: GatewayStatus,
    pub response: serde_json::Value,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RemitaTransaction {
    pub fn record(
        user_id: UserId,
        loan_id: Option<LoanId>,
        transaction_type: RemitaTransactionType,
        amount: Option<Money>,
        response: &GatewayResponse,
        initiated_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            loan_id,
            transaction_type,
            rrr: response.reference.clone(),
            amount,
            status: response.status,
            response: response.payload.clone(),
            initiated_at,
            completed_at: (response.status != GatewayStatus::Pending).then_some(completed_at),
        }
    }
}

/// external payment gateway: verifier, mandate manager and disburser
pub trait PaymentGateway: Send + Sync {
    fn verify_salary(&self, profile: &UserProfile) -> Result<GatewayResponse>;

    fn setup_mandate(&self, profile: &UserProfile, loan_id: &str, amount: Money) -> Result<GatewayResponse>;

    fn cancel_mandate(&self, mandate_id: &str) -> Result<GatewayResponse>;

    /// current status of a payment the gateway is collecting
    fn verify_payment(&self, reference: &str, amount: Money) -> Result<GatewayResponse>;

    fn disburse(&self, profile: &UserProfile, loan_id: &str, amount: Money) -> Result<GatewayResponse>;
}

#[derive(Debug, Default)]
struct MockState {
    payment_status: HashMap<String, GatewayStatus>,
    rejecting: bool,
    calls: usize,
}

/// stand-in gateway that approves everything unless told otherwise
#[derive(Debug, Default)]
pub struct MockRemitaGateway {
    state: Mutex<MockState>,
}

impl MockRemitaGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// script the status `verify_payment` reports for a reference
    pub fn set_payment_status(&self, reference: impl Into<String>, status: GatewayStatus) {
        self.state.lock().payment_status.insert(reference.into(), status);
    }

    /// make every subsequent call fail with `GatewayRejected`
    pub fn set_rejecting(&self, rejecting: bool) {
        self.state.lock().rejecting = rejecting;
    }

    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }

    fn begin(&self, operation: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls += 1;
        debug!(operation, "mock gateway call");
        if state.rejecting {
            return Err(LendingError::GatewayRejected {
                operation: operation.to_string(),
                message: "gateway unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn rrr() -> String {
        let raw = Uuid::new_v4().simple().to_string();
        format!("RRR{}", raw[..12].to_uppercase())
    }
}

impl PaymentGateway for MockRemitaGateway {
    fn verify_salary(&self, profile: &UserProfile) -> Result<GatewayResponse> {
        self.begin("verify_salary")?;
        Ok(GatewayResponse {
            status: GatewayStatus::Successful,
            reference: Self::rrr(),
            payload: json!({
                "status": "success",
                "salary_verified": true,
                "monthly_salary": profile.monthly_allowance,
                "employer": "NYSC",
            }),
        })
    }

    fn setup_mandate(&self, _profile: &UserProfile, loan_id: &str, amount: Money) -> Result<GatewayResponse> {
        self.begin("setup_mandate")?;
        let mandate_id = format!("{}{}", MANDATE_PREFIX, loan_id);
        Ok(GatewayResponse {
            status: GatewayStatus::Successful,
            reference: mandate_id.clone(),
            payload: json!({
                "status": "success",
                "mandate_id": mandate_id,
                "amount": amount,
                "message": "Mandate setup successful",
            }),
        })
    }

    fn cancel_mandate(&self, mandate_id: &str) -> Result<GatewayResponse> {
        self.begin("cancel_mandate")?;
        Ok(GatewayResponse {
            status: GatewayStatus::Successful,
            reference: mandate_id.to_string(),
            payload: json!({ "status": "success", "mandate_id": mandate_id }),
        })
    }

    fn verify_payment(&self, reference: &str, amount: Money) -> Result<GatewayResponse> {
        self.begin("verify_payment")?;
        let status = self
            .state
            .lock()
            .payment_status
            .get(reference)
            .copied()
            .unwrap_or(GatewayStatus::Successful);
        Ok(GatewayResponse {
            status,
            reference: reference.to_string(),
            payload: json!({ "rrr": reference, "amount": amount, "status": status }),
        })
    }

    fn disburse(&self, profile: &UserProfile, loan_id: &str, amount: Money) -> Result<GatewayResponse> {
        self.begin("disburse")?;
        Ok(GatewayResponse {
            status: GatewayStatus::Successful,
            reference: Self::rrr(),
            payload: json!({
                "status": "success",
                "loan_id": loan_id,
                "amount": amount,
                "beneficiary": profile.full_name,
            }),
        })
    }
}
