//! Account configuration storage.
//!
//! Switchboard does not own durable storage. It reads the accounts marked
//! active at start-up and flips an account to `disconnected` when its
//! session is removed for good; everything else about account records
//! belongs to whoever implements [`AccountStore`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use switchboard_protocol::AccountId;

/// Errors reported by an [`AccountStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("account {0} is not in the store")]
    UnknownAccount(AccountId),

    #[error("account store unavailable: {0}")]
    Unavailable(String),
}

/// Persisted connection status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Disconnected,
}

/// One account configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_id: AccountId,
    pub name: String,
    pub status: AccountStatus,
}

impl AccountRecord {
    pub fn active(account_id: AccountId, name: impl Into<String>) -> Self {
        Self {
            account_id,
            name: name.into(),
            status: AccountStatus::Active,
        }
    }
}

/// Where account records live.
///
/// Implementors can simply write `async fn`.
pub trait AccountStore: Send + Sync + 'static {
    /// Every account whose status is `Active`.
    fn load_active(
        &self,
    ) -> impl Future<Output = Result<Vec<AccountRecord>, StoreError>> + Send;

    /// Sets the account's status to `Disconnected`.
    fn mark_disconnected(
        &self,
        account: AccountId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// In-process [`AccountStore`], seeded from configuration.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    records: Mutex<HashMap<AccountId, AccountRecord>>,
}

impl MemoryAccountStore {
    pub fn new(records: impl IntoIterator<Item = AccountRecord>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().map(|r| (r.account_id, r)).collect()),
        }
    }

    pub fn insert(&self, record: AccountRecord) {
        self.lock().insert(record.account_id, record);
    }

    pub fn status(&self, account: AccountId) -> Option<AccountStatus> {
        self.lock().get(&account).map(|r| r.status)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AccountId, AccountRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AccountStore for MemoryAccountStore {
    async fn load_active(&self) -> Result<Vec<AccountRecord>, StoreError> {
        let mut active: Vec<AccountRecord> = self
            .lock()
            .values()
            .filter(|r| r.status == AccountStatus::Active)
            .cloned()
            .collect();
        active.sort_by_key(|r| r.account_id);
        Ok(active)
    }

    async fn mark_disconnected(&self, account: AccountId) -> Result<(), StoreError> {
        let mut records = self.lock();
        let record = records
            .get_mut(&account)
            .ok_or(StoreError::UnknownAccount(account))?;
        record.status = AccountStatus::Disconnected;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryAccountStore {
        MemoryAccountStore::new([
            AccountRecord::active(AccountId(2), "pharmacy"),
            AccountRecord::active(AccountId(1), "bakery"),
            AccountRecord {
                account_id: AccountId(3),
                name: "closed".into(),
                status: AccountStatus::Disconnected,
            },
        ])
    }

    #[tokio::test]
    async fn test_load_active_skips_disconnected_and_sorts() {
        let active = store().load_active().await.unwrap();

        let ids: Vec<u64> = active.iter().map(|r| r.account_id.0).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_mark_disconnected_updates_status() {
        let store = store();

        store.mark_disconnected(AccountId(1)).await.unwrap();

        assert_eq!(store.status(AccountId(1)), Some(AccountStatus::Disconnected));
        assert_eq!(store.load_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_disconnected_unknown_account_errors() {
        let result = store().mark_disconnected(AccountId(99)).await;
        assert!(matches!(result, Err(StoreError::UnknownAccount(_))));
    }

    #[test]
    fn test_record_deserializes_status_snake_case() {
        let record: AccountRecord = serde_json::from_str(
            r#"{"account_id": 5, "name": "florist", "status": "active"}"#,
        )
        .unwrap();
        assert_eq!(record, AccountRecord::active(AccountId(5), "florist"));
    }
}
