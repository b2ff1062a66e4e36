use crate::domain::account::{Account, AccountId, Balance};
use crate::domain::ports::{AccountStore, Commit, TransactionScope};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Versioned {
    account: Account,
    version: u64,
}

type Shared = Arc<RwLock<HashMap<AccountId, Versioned>>>;

/// A thread-safe in-memory account store with optimistic concurrency.
///
/// Every account carries a version counter. A scope snapshots the version of
/// each account it reads; commit re-validates those versions under the write
/// lock and bumps them when applying, so the first committer wins and any
/// overlapping scope observes `Commit::Conflict`.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Shared,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn begin(&self) -> Result<Box<dyn TransactionScope>> {
        Ok(Box::new(InMemoryScope {
            accounts: self.accounts.clone(),
            working: HashMap::new(),
            dirty: HashSet::new(),
        }))
    }

    async fn get(&self, id: &AccountId) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(id).map(|v| v.account.clone()))
    }

    async fn create_account(&self, id: AccountId, initial: Balance) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&id) {
            return Err(LedgerError::AccountExists(id));
        }
        accounts.insert(
            id.clone(),
            Versioned {
                account: Account::new(id, initial),
                version: 0,
            },
        );
        Ok(())
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().map(|v| v.account.clone()).collect())
    }
}

/// A scope over the in-memory store.
///
/// Reads copy the account and its version into a working set; deltas mutate
/// only the working copy, so later reads in the same scope observe them
/// (read-your-own-write) while other scopes see nothing until commit.
struct InMemoryScope {
    accounts: Shared,
    working: HashMap<AccountId, Versioned>,
    dirty: HashSet<AccountId>,
}

impl InMemoryScope {
    async fn load(&mut self, id: &AccountId) -> Result<bool> {
        if self.working.contains_key(id) {
            return Ok(true);
        }
        let accounts = self.accounts.read().await;
        match accounts.get(id) {
            Some(v) => {
                self.working.insert(id.clone(), v.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl TransactionScope for InMemoryScope {
    async fn get(&mut self, id: &AccountId) -> Result<Option<Account>> {
        if !self.load(id).await? {
            return Ok(None);
        }
        Ok(self.working.get(id).map(|v| v.account.clone()))
    }

    async fn apply_delta(&mut self, id: &AccountId, delta: Decimal) -> Result<Balance> {
        if !self.load(id).await? {
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
        let mut accounts = this.accounts.write().await;

        // Validate the whole read set, not just the dirty part: a stale
        // sufficiency check must fail the commit too.
        for (id, seen) in &this.working {
            match accounts.get(id) {
                Some(current) if current.version == seen.version => {}
                _ => return Ok(Commit::Conflict),
            }
        }

        for id in &this.dirty {
            let seen = &this.working[id];
            accounts.insert(
                id.clone(),
                Versioned {
                    account: seen.account.clone(),
                    version: seen.version + 1,
                },
            );
        }

        Ok(Commit::Applied)
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        // Writes are buffered in the working set, so dropping it is the
        // whole rollback.
        Ok(())
    }
}
