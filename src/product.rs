use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};
use crate::types::{LoanType, ProductId};

/// catalog entry borrowers apply against
///
/// products are never edited by borrower actions; deactivating one only
/// hides it from new applications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanProduct {
    pub id: ProductId,
    pub name: String,
    pub loan_type: LoanType,
    pub min_amount: Money,
    pub max_amount: Money,
    pub annual_rate: Rate,
    pub max_tenure_months: u32,
    pub processing_fee_rate: Rate,
    pub is_active: bool,
}

/// product terms frozen onto an application when it is submitted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProductTerms {
    pub product_id: ProductId,
    pub min_amount: Money,
    pub max_amount: Money,
    pub annual_rate: Rate,
    pub processing_fee_rate: Rate,
    pub max_tenure_months: u32,
}

impl LoanProduct {
    /// create an active product; rates are given in percent (15 for 15%)
    pub fn new(
        name: impl Into<String>,
        loan_type: LoanType,
        min_amount: Money,
        max_amount: Money,
        annual_rate_percent: Decimal,
        max_tenure_months: u32,
        processing_fee_percent: Decimal,
    ) -> Result<Self> {
        let product = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            loan_type,
            min_amount,
            max_amount,
            annual_rate: Rate::from_percentage(annual_rate_percent),
            max_tenure_months,
            processing_fee_rate: Rate::from_percentage(processing_fee_percent),
            is_active: true,
        };
        product.validate()?;
        Ok(product)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min_amount.is_positive() || self.min_amount > self.max_amount {
            return Err(LendingError::InvalidConfiguration {
                message: format!(
                    "product bounds {} - {} must be positive and ordered",
                    self.min_amount, self.max_amount
                ),
            });
        }
        if self.annual_rate < Rate::ZERO || self.annual_rate > Rate::ONE {
            return Err(LendingError::InvalidInterestRate {
                rate: self.annual_rate,
            });
        }
        if self.processing_fee_rate < Rate::ZERO || self.processing_fee_rate > Rate::ONE {
            return Err(LendingError::InvalidConfiguration {
                message: format!("processing fee {} must be between 0% and 100%", self.processing_fee_rate),
            });
        }
        if self.max_tenure_months == 0 {
            return Err(LendingError::InvalidConfiguration {
                message: "max tenure must be at least one month".to_string(),
            });
        }
        Ok(())
    }

    /// check a borrower request against this product
    pub fn check_request(&self, amount: Money, tenure_months: u32) -> Result<()> {
        if !self.is_active {
            return Err(LendingError::ProductInactive { id: self.id });
        }
        self.terms().check_amount(amount)?;
        if tenure_months == 0 || tenure_months > self.max_tenure_months {
            return Err(LendingError::TenureOutOfRange {
                months: tenure_months,
                max: self.max_tenure_months,
            });
        }
        Ok(())
    }

    /// snapshot of the terms an application is bound to
    pub fn terms(&self) -> ProductTerms {
        ProductTerms {
            product_id: self.id,
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            annual_rate: self.annual_rate,
            processing_fee_rate: self.processing_fee_rate,
            max_tenure_months: self.max_tenure_months,
        }
    }
}

impl ProductTerms {
    pub fn check_amount(&self, amount: Money) -> Result<()> {
        if amount < self.min_amount || amount > self.max_amount {
            return Err(LendingError::AmountOutOfBounds {
                amount,
                min: self.min_amount,
                max: self.max_amount,
            });
        }
        Ok(())
    }

    /// processing fee charged on an amount, rounded half-up
    pub fn processing_fee(&self, amount: Money) -> Money {
        amount.apply_rate(self.processing_fee_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn personal_product() -> LoanProduct {
        LoanProduct::new(
            "Personal Loan",
            LoanType::Personal,
            Money::from_major(10_000),
            Money::from_major(50_000),
            dec!(15),
            12,
            dec!(2.5),
        )
        .unwrap()
    }

    #[test]
    fn test_request_within_bounds() {
        let product = personal_product();
        assert!(product.check_request(Money::from_major(20_000), 6).is_ok());
        assert!(product.check_request(Money::from_major(10_000), 1).is_ok());
        assert!(product.check_request(Money::from_major(50_000), 12).is_ok());
    }

    #[test]
    fn test_request_out_of_bounds() {
        let product = personal_product();
        assert!(matches!(
            product.check_request(Money::from_major(5_000), 6),
            Err(LendingError::AmountOutOfBounds { .. })
        ));
        assert!(matches!(
            product.check_request(Money::from_major(20_000), 13),
            Err(LendingError::TenureOutOfRange { months: 13, max: 12 })
        ));
        assert!(product.check_request(Money::from_major(20_000), 0).is_err());
    }

    #[test]
    fn test_inactive_product_rejects_requests() {
        let mut product = personal_product();
        product.is_active = false;
        assert!(matches!(
            product.check_request(Money::from_major(20_000), 6),
            Err(LendingError::ProductInactive { .. })
        ));
    }

    #[test]
    fn test_invalid_products() {
        assert!(LoanProduct::new("bad", LoanType::Business, Money::from_major(5), Money::from_major(1), dec!(10), 6, dec!(1)).is_err());
        assert!(LoanProduct::new("bad", LoanType::Business, Money::from_major(1), Money::from_major(5), dec!(101), 6, dec!(1)).is_err());
        assert!(LoanProduct::new("bad", LoanType::Business, Money::from_major(1), Money::from_major(5), dec!(10), 0, dec!(1)).is_err());
    }

    #[test]
    fn test_processing_fee() {
        let terms = personal_product().terms();
        assert_eq!(terms.processing_fee(Money::from_major(20_000)), Money::from_major(500));
        assert_eq!(terms.processing_fee(Money::from_minor(1_000_001)), Money::from_major(250));
    }
}
