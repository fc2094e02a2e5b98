use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::UserId;

/// borrower profile for a national-service member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub service_state_code: String,
    pub phone_number: String,
    pub bank_details: String,
    pub monthly_allowance: Money,
    /// confirmed enrolment in the national-service programme
    #[serde(default)]
    pub service_member: bool,
    pub salary_account_verified: bool,
    pub last_salary_verification: Option<DateTime<Utc>>,
    pub mandate_id: Option<String>,
    pub payer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(
        full_name: impl Into<String>,
        email: impl Into<String>,
        service_state_code: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.into(),
            email: email.into(),
            service_state_code: service_state_code.into(),
            phone_number: String::new(),
            bank_details: String::new(),
            monthly_allowance: Self::default_allowance(),
            service_member: false,
            salary_account_verified: false,
            last_salary_verification: None,
            mandate_id: None,
            payer_id: None,
            created_at,
        }
    }

    /// federal monthly allowance paid to corps members
    pub fn default_allowance() -> Money {
        Money::from_decimal(dec!(33000.00))
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = phone.into();
        self
    }

    pub fn with_bank_details(mut self, details: impl Into<String>) -> Self {
        self.bank_details = details.into();
        self
    }

    pub fn with_allowance(mut self, allowance: Money) -> Self {
        self.monthly_allowance = allowance;
        self
    }

    pub fn as_service_member(mut self) -> Self {
        self.service_member = true;
        self
    }

    pub fn record_salary_verification(&mut self, at: DateTime<Utc>) {
        self.salary_account_verified = true;
        self.last_salary_verification = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_profile_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let profile = UserProfile::new("Ada Obi", "ada@example.com", "LA/24A/1234", now);

        assert_eq!(profile.monthly_allowance, Money::from_major(33_000));
        assert!(!profile.service_member);
        assert!(!profile.salary_account_verified);
        assert!(profile.mandate_id.is_none());
    }

    #[test]
    fn test_missing_service_flag_defaults_to_false() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let profile = UserProfile::new("Ada Obi", "ada@example.com", "LA/24A/1234", now).as_service_member();
        let mut json = serde_json::to_value(&profile).unwrap();
        json.as_object_mut().unwrap().remove("service_member");

        let restored: UserProfile = serde_json::from_value(json).unwrap();
        assert!(!restored.service_member);
    }
}
