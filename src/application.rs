use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::product::{LoanProduct, ProductTerms};
use crate::types::{
    new_reference, ApplicationId, ApplicationStatus, ReviewDecision, UserId, APPLICATION_PREFIX,
};

/// a borrower's request for a loan
///
/// rates, fees and amount bounds are snapshotted from the product at
/// submission, so later product edits never reach an existing application.
/// status only moves through [`LoanApplication::transition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub application_id: ApplicationId,
    pub applicant_id: UserId,
    pub terms: ProductTerms,
    pub requested_amount: Money,
    pub approved_amount: Option<Money>,
    pub tenure_months: u32,
    pub processing_fee: Money,
    pub status: ApplicationStatus,
    pub purpose: String,
    pub applied_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub review_comments: String,
}

impl LoanApplication {
    /// validate a request against the product and build a pending application
    pub fn submit(
        applicant_id: UserId,
        product: &LoanProduct,
        requested_amount: Money,
        tenure_months: u32,
        purpose: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        product.check_request(requested_amount, tenure_months)?;
        let terms = product.terms();

        Ok(Self {
            application_id: new_reference(APPLICATION_PREFIX),
            applicant_id,
            terms,
            requested_amount,
            approved_amount: None,
            tenure_months,
            processing_fee: terms.processing_fee(requested_amount),
            status: ApplicationStatus::Pending,
            purpose: purpose.into(),
            applied_at: now,
            reviewed_at: None,
            approved_at: None,
            disbursed_at: None,
            reviewed_by: None,
            review_comments: String::new(),
        })
    }

    /// move along one legal edge, returning the previous status
    pub fn transition(&mut self, next: ApplicationStatus) -> Result<ApplicationStatus> {
        if !self.status.can_transition_to(next) {
            return Err(LendingError::InvalidApplicationTransition {
                from: self.status,
                to: next,
            });
        }
        let old = self.status;
        self.status = next;
        Ok(old)
    }

    /// pending -> under_review
    pub fn start_review(&mut self, now: DateTime<Utc>) -> Result<ApplicationStatus> {
        let old = self.transition(ApplicationStatus::UnderReview)?;
        self.reviewed_at = Some(now);
        Ok(old)
    }

    /// record a reviewer decision on an application under review
    ///
    /// an approved amount defaults to the requested amount and must sit
    /// inside the bounds snapshotted at submission.
    pub fn review(
        &mut self,
        decision: ReviewDecision,
        approved_amount: Option<Money>,
        reviewer: impl Into<String>,
        comments: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<ApplicationStatus> {
        let next = match decision {
            ReviewDecision::Approve => ApplicationStatus::Approved,
            ReviewDecision::Reject => ApplicationStatus::Rejected,
        };
        if !self.status.can_transition_to(next) {
            return Err(LendingError::InvalidApplicationTransition {
                from: self.status,
                to: next,
            });
        }

        if decision == ReviewDecision::Approve {
            let amount = approved_amount.unwrap_or(self.requested_amount);
            self.terms.check_amount(amount)?;
            self.approved_amount = Some(amount);
            self.approved_at = Some(now);
        }

        let old = self.transition(next)?;
        self.reviewed_at = Some(now);
        self.reviewed_by = Some(reviewer.into());
        self.review_comments = comments.into();
        Ok(old)
    }

    /// withdraw an application that has not been disbursed
    pub fn cancel(&mut self) -> Result<ApplicationStatus> {
        self.transition(ApplicationStatus::Cancelled)
    }

    /// approved -> disbursed
    pub fn mark_disbursed(&mut self, now: DateTime<Utc>) -> Result<ApplicationStatus> {
        let old = self.transition(ApplicationStatus::Disbursed)?;
        self.disbursed_at = Some(now);
        Ok(old)
    }

    /// amount that will be lent
    pub fn principal(&self) -> Money {
        self.approved_amount.unwrap_or(self.requested_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LoanType;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn product() -> LoanProduct {
        LoanProduct::new(
            "Business Starter",
            LoanType::Business,
            Money::from_major(10_000),
            Money::from_major(50_000),
            dec!(15),
            12,
            dec!(2.5),
        )
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap()
    }

    fn pending() -> LoanApplication {
        LoanApplication::submit(Uuid::new_v4(), &product(), Money::from_major(20_000), 6, "inventory", now()).unwrap()
    }

    #[test]
    fn test_submit_snapshots_terms() {
        let mut product = product();
        let app = LoanApplication::submit(Uuid::new_v4(), &product, Money::from_major(20_000), 6, "inventory", now()).unwrap();

        assert_eq!(app.status, ApplicationStatus::Pending);
        assert_eq!(app.processing_fee, Money::from_major(500));
        assert!(app.application_id.starts_with("AL"));

        // later product edits do not leak into the snapshot
        product.annual_rate = crate::decimal::Rate::from_percentage(dec!(30));
        assert_eq!(app.terms.annual_rate.as_percentage(), dec!(15));
    }

    #[test]
    fn test_submit_rejects_out_of_bounds() {
        let result = LoanApplication::submit(Uuid::new_v4(), &product(), Money::from_major(5_000), 6, "rent", now());
        assert!(matches!(result, Err(LendingError::AmountOutOfBounds { .. })));
    }

    #[test]
    fn test_full_approval_path() {
        let mut app = pending();
        app.start_review(now()).unwrap();
        app.review(ReviewDecision::Approve, Some(Money::from_major(15_000)), "officer-1", "ok", now()).unwrap();

        assert_eq!(app.status, ApplicationStatus::Approved);
        assert_eq!(app.principal(), Money::from_major(15_000));
        assert_eq!(app.reviewed_by.as_deref(), Some("officer-1"));

        app.mark_disbursed(now()).unwrap();
        assert_eq!(app.status, ApplicationStatus::Disbursed);
        assert!(app.cancel().is_err());
    }

    #[test]
    fn test_approval_defaults_to_requested_amount() {
        let mut app = pending();
        app.start_review(now()).unwrap();
        app.review(ReviewDecision::Approve, None, "officer-1", "", now()).unwrap();
        assert_eq!(app.approved_amount, Some(Money::from_major(20_000)));
    }

    #[test]
    fn test_approved_amount_outside_snapshot_bounds() {
        let mut app = pending();
        app.start_review(now()).unwrap();
        let before = app.clone();

        let result = app.review(ReviewDecision::Approve, Some(Money::from_major(60_000)), "officer-1", "", now());
        assert!(matches!(result, Err(LendingError::AmountOutOfBounds { .. })));
        assert_eq!(app, before);
    }

    #[test]
    fn test_illegal_transitions_do_not_mutate() {
        let mut app = pending();
        let before = app.clone();

        let result = app.review(ReviewDecision::Approve, None, "officer-1", "", now());
        assert!(matches!(
            result,
            Err(LendingError::InvalidApplicationTransition {
                from: ApplicationStatus::Pending,
                to: ApplicationStatus::Approved,
            })
        ));
        assert!(app.mark_disbursed(now()).is_err());
        assert_eq!(app, before);
    }

    #[test]
    fn test_rejection_is_terminal() {
        let mut app = pending();
        app.start_review(now()).unwrap();
        app.review(ReviewDecision::Reject, None, "officer-2", "insufficient documents", now()).unwrap();

        assert_eq!(app.status, ApplicationStatus::Rejected);
        assert!(app.approved_amount.is_none());
        assert!(app.cancel().is_err());
    }

    #[test]
    fn test_cancel_from_pre_disbursed_states() {
        let mut app = pending();
        assert_eq!(app.cancel().unwrap(), ApplicationStatus::Pending);

        let mut app = pending();
        app.start_review(now()).unwrap();
        app.review(ReviewDecision::Approve, None, "officer-1", "", now()).unwrap();
        assert_eq!(app.cancel().unwrap(), ApplicationStatus::Approved);
        assert_eq!(app.status, ApplicationStatus::Cancelled);
    }
}
