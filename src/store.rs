use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::account::LoanAccount;
use crate::application::LoanApplication;
use crate::errors::{LendingError, Result};
use crate::gateway::RemitaTransaction;
use crate::product::LoanProduct;
use crate::profile::UserProfile;
use crate::types::{ApplicationId, LoanId, PaymentId, ProductId, UserId};

/// transactional persistence for the lending records
///
/// every `update_*` call is one transaction: the closure works on a private
/// copy of the row, which is committed only when the closure returns `Ok`.
/// the row stays locked for the whole call, so updates to one loan are
/// serialized while different loans proceed independently.
pub trait LoanStore: Send + Sync {
    fn insert_user(&self, profile: UserProfile) -> Result<()>;
    fn user(&self, id: UserId) -> Result<UserProfile>;
    fn update_user<R>(&self, id: UserId, f: impl FnOnce(&mut UserProfile) -> Result<R>) -> Result<R>;
    fn users(&self) -> Vec<UserProfile>;

    fn insert_product(&self, product: LoanProduct) -> Result<()>;
    fn product(&self, id: ProductId) -> Result<LoanProduct>;
    fn update_product<R>(&self, id: ProductId, f: impl FnOnce(&mut LoanProduct) -> Result<R>) -> Result<R>;
    fn products(&self) -> Vec<LoanProduct>;

    fn insert_application(&self, application: LoanApplication) -> Result<()>;
    fn application(&self, id: &str) -> Result<LoanApplication>;
    fn update_application<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut LoanApplication) -> Result<R>,
    ) -> Result<R>;
    fn applications(&self) -> Vec<LoanApplication>;

    /// insert a freshly disbursed account; one account per application
    fn insert_account(&self, account: LoanAccount) -> Result<()>;
    fn account(&self, loan_id: &str) -> Result<LoanAccount>;
    fn update_account<R>(&self, loan_id: &str, f: impl FnOnce(&mut LoanAccount) -> Result<R>) -> Result<R>;
    fn loan_ids(&self) -> Vec<LoanId>;
    fn loan_for_application(&self, application_id: &str) -> Option<LoanId>;
    fn loan_for_payment(&self, payment_id: &str) -> Option<LoanId>;

    fn record_transaction(&self, transaction: RemitaTransaction);
    fn transactions_for_user(&self, user_id: UserId) -> Vec<RemitaTransaction>;
}

type Row<T> = Arc<Mutex<T>>;

/// store keeping every record in process memory
///
/// each application and loan sits behind its own lock; the maps holding
/// them are only locked long enough to find the row.
#[derive(Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<UserId, Row<UserProfile>>>,
    products: RwLock<HashMap<ProductId, Row<LoanProduct>>>,
    applications: RwLock<HashMap<ApplicationId, Row<LoanApplication>>>,
    accounts: RwLock<HashMap<LoanId, Row<LoanAccount>>>,
    loan_by_application: RwLock<HashMap<ApplicationId, LoanId>>,
    loan_by_payment: RwLock<HashMap<PaymentId, LoanId>>,
    transactions: RwLock<Vec<RemitaTransaction>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// run `f` on a copy of the locked row and write it back on success
fn transact<T: Clone, R>(row: &Row<T>, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
    let mut guard = row.lock();
    let mut working = guard.clone();
    let result = f(&mut working)?;
    *guard = working;
    Ok(result)
}

fn find<K, T>(map: &RwLock<HashMap<K, Row<T>>>, key: &K) -> Option<Row<T>>
where
    K: std::hash::Hash + Eq,
{
    map.read().get(key).cloned()
}

fn insert_new<K, T>(map: &RwLock<HashMap<K, Row<T>>>, key: K, value: T) -> Result<()>
where
    K: std::hash::Hash + Eq + ToString,
{
    let mut rows = map.write();
    if rows.contains_key(&key) {
        return Err(LendingError::DuplicateRecord { id: key.to_string() });
    }
    rows.insert(key, Arc::new(Mutex::new(value)));
    Ok(())
}

fn snapshot<K, T: Clone>(map: &RwLock<HashMap<K, Row<T>>>) -> Vec<T> {
    let rows: Vec<Row<T>> = map.read().values().cloned().collect();
    rows.iter().map(|row| row.lock().clone()).collect()
}

impl LoanStore for InMemoryStore {
    fn insert_user(&self, profile: UserProfile) -> Result<()> {
        insert_new(&self.users, profile.id, profile)
    }

    fn user(&self, id: UserId) -> Result<UserProfile> {
        let row = find(&self.users, &id).ok_or(LendingError::UserNotFound { id })?;
        let profile = row.lock().clone();
        Ok(profile)
    }

    fn update_user<R>(&self, id: UserId, f: impl FnOnce(&mut UserProfile) -> Result<R>) -> Result<R> {
        let row = find(&self.users, &id).ok_or(LendingError::UserNotFound { id })?;
        transact(&row, f)
    }

    fn users(&self) -> Vec<UserProfile> {
        snapshot(&self.users)
    }

    fn insert_product(&self, product: LoanProduct) -> Result<()> {
        insert_new(&self.products, product.id, product)
    }

    fn product(&self, id: ProductId) -> Result<LoanProduct> {
        let row = find(&self.products, &id).ok_or(LendingError::ProductNotFound { id })?;
        let product = row.lock().clone();
        Ok(product)
    }

    fn update_product<R>(&self, id: ProductId, f: impl FnOnce(&mut LoanProduct) -> Result<R>) -> Result<R> {
        let row = find(&self.products, &id).ok_or(LendingError::ProductNotFound { id })?;
        transact(&row, f)
    }

    fn products(&self) -> Vec<LoanProduct> {
        snapshot(&self.products)
    }

    fn insert_application(&self, application: LoanApplication) -> Result<()> {
        insert_new(&self.applications, application.application_id.clone(), application)
    }

    fn application(&self, id: &str) -> Result<LoanApplication> {
        let row = find(&self.applications, &id.to_string())
            .ok_or_else(|| LendingError::ApplicationNotFound { id: id.to_string() })?;
        let application = row.lock().clone();
        Ok(application)
    }

    fn update_application<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut LoanApplication) -> Result<R>,
    ) -> Result<R> {
        let row = find(&self.applications, &id.to_string())
            .ok_or_else(|| LendingError::ApplicationNotFound { id: id.to_string() })?;
        transact(&row, f)
    }

    fn applications(&self) -> Vec<LoanApplication> {
        snapshot(&self.applications)
    }

    fn insert_account(&self, account: LoanAccount) -> Result<()> {
        let loan_id = account.loan.loan_id.clone();
        let application_id = account.loan.application_id.clone();
        let payment_ids: Vec<PaymentId> = account.payments.keys().cloned().collect();

        {
            let mut by_application = self.loan_by_application.write();
            if let Some(existing) = by_application.get(&application_id) {
                return Err(LendingError::DuplicateRecord {
                    id: format!("{} already disbursed as {}", application_id, existing),
                });
            }
            insert_new(&self.accounts, loan_id.clone(), account)?;
            by_application.insert(application_id, loan_id.clone());
        }

        let mut by_payment = self.loan_by_payment.write();
        for payment_id in payment_ids {
            by_payment.insert(payment_id, loan_id.clone());
        }
        Ok(())
    }

    fn account(&self, loan_id: &str) -> Result<LoanAccount> {
        let row = find(&self.accounts, &loan_id.to_string())
            .ok_or_else(|| LendingError::LoanNotFound { id: loan_id.to_string() })?;
        let account = row.lock().clone();
        Ok(account)
    }

    fn update_account<R>(&self, loan_id: &str, f: impl FnOnce(&mut LoanAccount) -> Result<R>) -> Result<R> {
        let row = find(&self.accounts, &loan_id.to_string())
            .ok_or_else(|| LendingError::LoanNotFound { id: loan_id.to_string() })?;

        let mut guard = row.lock();
        let mut working = guard.clone();
        let result = match f(&mut working) {
            Ok(result) => result,
            Err(e) => {
                warn!(loan_id, error = %e, "loan transaction rolled back");
                return Err(e);
            }
        };

        let added: Vec<PaymentId> = working
            .payments
            .keys()
            .filter(|id| !guard.payments.contains_key(*id))
            .cloned()
            .collect();
        *guard = working;

        let mut by_payment = self.loan_by_payment.write();
        for payment_id in added {
            by_payment.insert(payment_id, loan_id.to_string());
        }
        Ok(result)
    }

    fn loan_ids(&self) -> Vec<LoanId> {
        let mut ids: Vec<LoanId> = self.accounts.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn loan_for_application(&self, application_id: &str) -> Option<LoanId> {
        self.loan_by_application.read().get(application_id).cloned()
    }

    fn loan_for_payment(&self, payment_id: &str) -> Option<LoanId> {
        self.loan_by_payment.read().get(payment_id).cloned()
    }

    fn record_transaction(&self, transaction: RemitaTransaction) {
        self.transactions.write().push(transaction);
    }

    fn transactions_for_user(&self, user_id: UserId) -> Vec<RemitaTransaction> {
        self.transactions
            .read()
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("users", &self.users.read().len())
            .field("applications", &self.applications.read().len())
            .field("loans", &self.accounts.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LendingConfig;
    use crate::decimal::Money;
    use crate::types::{ApplicationStatus, LoanType, ReviewDecision};
    use chrono::{TimeZone, Utc};
    use hourglass_rs::{SafeTimeProvider, TimeSource};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()))
    }

    fn approved_application(time: &SafeTimeProvider) -> LoanApplication {
        let product = LoanProduct::new(
            "Corper Emergency",
            LoanType::Emergency,
            Money::from_major(5_000),
            Money::from_major(50_000),
            dec!(15),
            12,
            dec!(1),
        )
        .unwrap();
        let mut app =
            LoanApplication::submit(Uuid::new_v4(), &product, Money::from_major(10_000), 2, "rent", time.now()).unwrap();
        app.start_review(time.now()).unwrap();
        app.review(ReviewDecision::Approve, None, "officer", "", time.now()).unwrap();
        app
    }

    #[test]
    fn test_failed_update_rolls_back() {
        let store = InMemoryStore::new();
        let time = time();
        let app = approved_application(&time);
        let id = app.application_id.clone();
        store.insert_application(app).unwrap();

        let result: Result<()> = store.update_application(&id, |app| {
            app.review_comments = "half written".to_string();
            app.cancel()?;
            app.cancel()?;
            Ok(())
        });
        assert!(result.is_err());

        let stored = store.application(&id).unwrap();
        assert_eq!(stored.status, ApplicationStatus::Approved);
        assert_eq!(stored.review_comments, "");
    }

    #[test]
    fn test_duplicate_records_rejected() {
        let store = InMemoryStore::new();
        let profile = UserProfile::new("Ada Obi", "ada@example.com", "LA/24A/1234", time().now());
        store.insert_user(profile.clone()).unwrap();
        assert!(matches!(store.insert_user(profile), Err(LendingError::DuplicateRecord { .. })));
    }

    #[test]
    fn test_one_account_per_application() {
        let store = InMemoryStore::new();
        let time = time();
        let mut app = approved_application(&time);
        let account = LoanAccount::open(&mut app, &LendingConfig::standard(), &time).unwrap();
        let mut second = account.clone();
        second.loan.loan_id = "LNSECOND01".to_string();

        store.insert_account(account.clone()).unwrap();
        assert!(matches!(store.insert_account(second), Err(LendingError::DuplicateRecord { .. })));
        assert_eq!(store.loan_for_application(&app.application_id), Some(account.loan.loan_id.clone()));
        assert_eq!(store.loan_ids(), vec![account.loan.loan_id]);
    }

    #[test]
    fn test_missing_rows() {
        let store = InMemoryStore::new();
        assert!(matches!(store.account("LNMISSING1"), Err(LendingError::LoanNotFound { .. })));
        assert!(matches!(store.application("ALMISSING1"), Err(LendingError::ApplicationNotFound { .. })));
        assert!(matches!(store.user(Uuid::nil()), Err(LendingError::UserNotFound { .. })));
    }
}
