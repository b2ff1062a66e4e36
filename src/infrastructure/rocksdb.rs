use crate::domain::account::{Account, AccountId, Balance};
use crate::domain::ports::{AccountStore, Commit, TransactionScope};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column family for account records.
pub const CF_ACCOUNTS: &str = "accounts";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAccount {
    account: Account,
    version: u64,
}

/// A persistent account store backed by RocksDB.
///
/// Accounts are stored as version-stamped JSON values in the `accounts`
/// column family. Scopes follow the same optimistic protocol as the
/// in-memory adapter; commits are serialized through `commit_lock` and
/// applied with a `WriteBatch`, so the on-disk update is atomic.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbAccountStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDbAccountStore {
    /// Opens or creates a RocksDB instance at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_accounts = ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_accounts])
            .map_err(LedgerError::store_unavailable)?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }
}

fn read_stored(db: &DB, id: &AccountId) -> Result<Option<StoredAccount>> {
    let cf = db
        .cf_handle(CF_ACCOUNTS)
        .ok_or_else(missing_cf_error)?;
    let bytes = db
        .get_cf(&cf, id.as_str().as_bytes())
        .map_err(LedgerError::store_unavailable)?;
    match bytes {
        Some(bytes) => {
            let stored =
                serde_json::from_slice(&bytes).map_err(LedgerError::store_unavailable)?;
            Ok(Some(stored))
        }
        None => Ok(None),
    }
}

fn missing_cf_error() -> LedgerError {
    LedgerError::store_unavailable(std::io::Error::other("accounts column family not found"))
}

#[async_trait]
impl AccountStore for RocksDbAccountStore {
    async fn begin(&self) -> Result<Box<dyn TransactionScope>> {
        Ok(Box::new(RocksDbScope {
            db: self.db.clone(),
            commit_lock: self.commit_lock.clone(),
            working: HashMap::new(),
            dirty: HashSet::new(),
        }))
    }

    async fn get(&self, id: &AccountId) -> Result<Option<Account>> {
        Ok(read_stored(&self.db, id)?.map(|stored| stored.account))
    }

    async fn create_account(&self, id: AccountId, initial: Balance) -> Result<()> {
        let _guard = self.commit_lock.lock().await;

        if read_stored(&self.db, &id)?.is_some() {
            return Err(LedgerError::AccountExists(id));
        }

        let cf = self
            .db
            .cf_handle(CF_ACCOUNTS)
            .ok_or_else(missing_cf_error)?;
        let stored = StoredAccount {
            account: Account::new(id.clone(), initial),
            version: 0,
        };
        let value = serde_json::to_vec(&stored).map_err(LedgerError::store_unavailable)?;
        self.db
            .put_cf(&cf, id.as_str().as_bytes(), value)
            .map_err(LedgerError::store_unavailable)?;

        Ok(())
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        let cf = self
            .db
            .cf_handle(CF_ACCOUNTS)
            .ok_or_else(missing_cf_error)?;

        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(LedgerError::store_unavailable)?;
            let stored: StoredAccount =
                serde_json::from_slice(&value).map_err(LedgerError::store_unavailable)?;
            accounts.push(stored.account);
        }

        Ok(accounts)
    }
}

/// A scope over the RocksDB store; buffers reads and deltas in memory and
/// validates read versions against the database at commit.
struct RocksDbScope {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
    working: HashMap<AccountId, StoredAccount>,
    dirty: HashSet<AccountId>,
}

impl RocksDbScope {
    fn load(&mut self, id: &AccountId) -> Result<bool> {
        if self.working.contains_key(id) {
            return Ok(true);
        }
        match read_stored(&self.db, id)? {
            Some(stored) => {
                self.working.insert(id.clone(), stored);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl TransactionScope for RocksDbScope {
    async fn get(&mut self, id: &AccountId) -> Result<Option<Account>> {
        if !self.load(id)? {
            return Ok(None);
        }
        Ok(self.working.get(id).map(|stored| stored.account.clone()))
    }

    async fn apply_delta(&mut self, id: &AccountId, delta: Decimal) -> Result<Balance> {
        if !self.load(id)? {
            return Err(LedgerError::AccountNotFound(id.clone()));
        }
        let entry = self
            .working
            .get_mut(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.clone()))?;
        let balance = entry.account.apply_delta(delta);
        self.dirty.insert(id.clone());
        Ok(balance)
    }

    async fn commit(self: Box<Self>) -> Result<Commit> {
        let this = *self;
        let _guard = this.commit_lock.lock().await;

        for (id, seen) in &this.working {
            match read_stored(&this.db, id)? {
                Some(current) if current.version == seen.version => {}
                _ => return Ok(Commit::Conflict),
            }
        }

        let cf = this
            .db
            .cf_handle(CF_ACCOUNTS)
            .ok_or_else(missing_cf_error)?;
        let mut batch = WriteBatch::default();
        for id in &this.dirty {
            let seen = &this.working[id];
            let stored = StoredAccount {
                account: seen.account.clone(),
                version: seen.version + 1,
            };
            let value = serde_json::to_vec(&stored).map_err(LedgerError::store_unavailable)?;
            batch.put_cf(&cf, id.as_str().as_bytes(), value);
        }
        this.db
            .write(batch)
            .map_err(LedgerError::store_unavailable)?;

        Ok(Commit::Applied)
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_creates_column_family() {
        let dir = tempdir().unwrap();
        let store = RocksDbAccountStore::open(dir.path()).expect("failed to open RocksDB");
        assert!(store.db.cf_handle(CF_ACCOUNTS).is_some());
    }

    #[tokio::test]
    async fn test_create_get_and_list() {
        let dir = tempdir().unwrap();
        let store = RocksDbAccountStore::open(dir.path()).unwrap();

        store
            .create_account("alice".into(), Balance::new(dec!(100.0)))
            .await
            .unwrap();

        let account = store.get(&"alice".into()).await.unwrap().unwrap();
        assert_eq!(account.balance, Balance::new(dec!(100.0)));
        assert!(store.get(&"bob".into()).await.unwrap().is_none());

        let all = store.all_accounts().await.unwrap();
        assert_eq!(all.len(), 1);

        let result = store
            .create_account("alice".into(), Balance::new(dec!(1.0)))
            .await;
        assert!(matches!(result, Err(LedgerError::AccountExists(_))));
    }

    #[tokio::test]
    async fn test_scope_commit_and_conflict() {
        let dir = tempdir().unwrap();
        let store = RocksDbAccountStore::open(dir.path()).unwrap();
        store
            .create_account("alice".into(), Balance::new(dec!(100.0)))
            .await
            .unwrap();

        let mut winner = store.begin().await.unwrap();
        let mut loser = store.begin().await.unwrap();

        winner
            .apply_delta(&"alice".into(), dec!(-10.0))
            .await
            .unwrap();
        loser
            .apply_delta(&"alice".into(), dec!(-20.0))
            .await
            .unwrap();

        assert_eq!(winner.commit().await.unwrap(), Commit::Applied);
        assert_eq!(loser.commit().await.unwrap(), Commit::Conflict);

        let account = store.get(&"alice".into()).await.unwrap().unwrap();
        assert_eq!(account.balance, Balance::new(dec!(90.0)));
    }

    #[tokio::test]
    async fn test_abort_discards_writes() {
        let dir = tempdir().unwrap();
        let store = RocksDbAccountStore::open(dir.path()).unwrap();
        store
            .create_account("alice".into(), Balance::new(dec!(100.0)))
            .await
            .unwrap();

        let mut scope = store.begin().await.unwrap();
        scope
            .apply_delta(&"alice".into(), dec!(-40.0))
            .await
            .unwrap();
        scope.abort().await.unwrap();

        let account = store.get(&"alice".into()).await.unwrap().unwrap();
        assert_eq!(account.balance, Balance::new(dec!(100.0)));
    }
}
