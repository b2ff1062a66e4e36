use crate::domain::account::{AccountId, Amount, Balance};
use crate::domain::operation::{Direction, MutationIntent, TransferIntent};
use crate::domain::ports::{AccountStoreRef, Commit, TransactionScope};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry behavior for commit conflicts.
///
/// Only `Conflict` is retried; caller errors fail immediately. Commits that
/// exceed `commit_timeout` surface as `StoreUnavailable`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub commit_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(25),
            commit_timeout: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// The main entry point for ledger operations.
///
/// `LedgerEngine` orchestrates single- and two-account mutations against an
/// injected [`AccountStore`](crate::domain::ports::AccountStore). Every
/// mutation runs inside one transaction scope and either commits whole or
/// leaves no trace.
pub struct LedgerEngine {
    store: AccountStoreRef,
    retry: RetryPolicy,
}

impl LedgerEngine {
    pub fn new(store: AccountStoreRef) -> Self {
        Self::with_retry_policy(store, RetryPolicy::default())
    }

    pub fn with_retry_policy(store: AccountStoreRef, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Current balance of `id`.
    pub async fn balance(&self, id: &AccountId) -> Result<Balance> {
        self.store
            .get(id)
            .await?
            .map(|account| account.balance)
            .ok_or_else(|| LedgerError::AccountNotFound(id.clone()))
    }

    /// Provisions a new account with an explicit initial balance.
    ///
    /// Called once per registered identity; the initial balance must be
    /// strictly positive.
    pub async fn open_account(&self, id: AccountId, initial: Decimal) -> Result<()> {
        let initial = Amount::new(initial)?;
        debug!(account = %id, initial = %initial.value(), "opening account");
        self.store.create_account(id, initial.into()).await
    }

    /// Moves `amount` from `source` to `dest` atomically.
    ///
    /// Sufficiency is checked before the debit; debit and credit belong to
    /// one commit, so partial application is never observable. Returns no
    /// balances: both post-images belong to the committed snapshot, not to
    /// the values read before commit.
    pub async fn transfer(
        &self,
        source: &AccountId,
        dest: &AccountId,
        amount: Decimal,
    ) -> Result<()> {
        let intent = TransferIntent::new(source.clone(), dest.clone(), amount)?;
        self.with_retry(|| self.transfer_once(&intent)).await
    }

    /// Credits `amount` to `account` and returns the post-image balance.
    pub async fn deposit(&self, account: &AccountId, amount: Decimal) -> Result<Balance> {
        let intent = MutationIntent::new(account.clone(), amount, Direction::Credit)?;
        self.with_retry(|| self.mutate_once(&intent)).await
    }

    /// Debits `amount` from `account` and returns the post-image balance.
    pub async fn withdraw(&self, account: &AccountId, amount: Decimal) -> Result<Balance> {
        let intent = MutationIntent::new(account.clone(), amount, Direction::Debit)?;
        self.with_retry(|| self.mutate_once(&intent)).await
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    warn!(attempt, "commit conflict, retrying operation");
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn transfer_once(&self, intent: &TransferIntent) -> Result<()> {
        let mut scope = self.store.begin().await?;
        match Self::transfer_in_scope(&mut *scope, intent).await {
            Ok(()) => self.commit_scope(scope).await,
            Err(e) => {
                Self::abort_scope(scope).await;
                Err(e)
            }
        }
    }

    async fn transfer_in_scope(
        scope: &mut dyn TransactionScope,
        intent: &TransferIntent,
    ) -> Result<()> {
        let source = scope
            .get(&intent.source)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(intent.source.clone()))?;

        if source.balance.value() < intent.amount.value() {
            return Err(LedgerError::InsufficientBalance(intent.source.clone()));
        }

        scope
            .get(&intent.dest)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(intent.dest.clone()))?;

        scope
            .apply_delta(&intent.source, -intent.amount.value())
            .await?;
        scope
            .apply_delta(&intent.dest, intent.amount.value())
            .await?;

        Ok(())
    }

    async fn mutate_once(&self, intent: &MutationIntent) -> Result<Balance> {
        let mut scope = self.store.begin().await?;
        match Self::mutate_in_scope(&mut *scope, intent).await {
            Ok(balance) => {
                self.commit_scope(scope).await?;
                Ok(balance)
            }
            Err(e) => {
                Self::abort_scope(scope).await;
                Err(e)
            }
        }
    }

    async fn mutate_in_scope(
        scope: &mut dyn TransactionScope,
        intent: &MutationIntent,
    ) -> Result<Balance> {
        let account = scope
            .get(&intent.account)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(intent.account.clone()))?;

        if intent.direction == Direction::Debit
            && account.balance.value() < intent.amount.value()
        {
            return Err(LedgerError::InsufficientBalance(intent.account.clone()));
        }

        scope.apply_delta(&intent.account, intent.delta()).await
    }

    async fn commit_scope(&self, scope: Box<dyn TransactionScope>) -> Result<()> {
        match tokio::time::timeout(self.retry.commit_timeout, scope.commit()).await {
            Ok(Ok(Commit::Applied)) => Ok(()),
            Ok(Ok(Commit::Conflict)) => Err(LedgerError::Conflict),
            Ok(Err(e)) => Err(e),
            Err(elapsed) => Err(LedgerError::store_unavailable(elapsed)),
        }
    }

    async fn abort_scope(scope: Box<dyn TransactionScope>) {
        if let Err(e) = scope.abort().await {
            warn!(error = %e, "failed to abort transaction scope");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Account;
    use crate::domain::ports::AccountStore;
    use crate::infrastructure::in_memory::InMemoryAccountStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Store whose scopes always reach commit but never succeed there, for
    /// exercising the engine's failure policy.
    #[derive(Clone, Copy)]
    enum CommitBehavior {
        Stall(Duration),
        AlwaysConflict,
    }

    struct StubStore {
        behavior: CommitBehavior,
        commits: Arc<AtomicU32>,
    }

    impl StubStore {
        fn new(behavior: CommitBehavior) -> Self {
            Self {
                behavior,
                commits: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl AccountStore for StubStore {
        async fn begin(&self) -> Result<Box<dyn TransactionScope>> {
            Ok(Box::new(StubScope {
                behavior: self.behavior,
                commits: self.commits.clone(),
            }))
        }

        async fn get(&self, id: &AccountId) -> Result<Option<Account>> {
            Ok(Some(Account::new(id.clone(), Balance::new(dec!(100.0)))))
        }

        async fn create_account(&self, _id: AccountId, _initial: Balance) -> Result<()> {
            Ok(())
        }

        async fn all_accounts(&self) -> Result<Vec<Account>> {
            Ok(Vec::new())
        }
    }

    struct StubScope {
        behavior: CommitBehavior,
        commits: Arc<AtomicU32>,
    }

    #[async_trait]
    impl TransactionScope for StubScope {
        async fn get(&mut self, id: &AccountId) -> Result<Option<Account>> {
            Ok(Some(Account::new(id.clone(), Balance::new(dec!(100.0)))))
        }

        async fn apply_delta(&mut self, _id: &AccountId, delta: Decimal) -> Result<Balance> {
            Ok(Balance::new(dec!(100.0) + delta))
        }

        async fn commit(self: Box<Self>) -> Result<Commit> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                CommitBehavior::Stall(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(Commit::Applied)
                }
                CommitBehavior::AlwaysConflict => Ok(Commit::Conflict),
            }
        }

        async fn abort(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    async fn engine_with_accounts(accounts: &[(&str, Decimal)]) -> LedgerEngine {
        let store = Arc::new(InMemoryAccountStore::new());
        for (id, balance) in accounts {
            store
                .create_account(AccountId::from(*id), Balance::new(*balance))
                .await
                .unwrap();
        }
        LedgerEngine::new(store)
    }

    #[tokio::test]
    async fn test_transfer_moves_funds() {
        let engine = engine_with_accounts(&[("alice", dec!(100.0)), ("bob", dec!(50.0))]).await;

        engine
            .transfer(&"alice".into(), &"bob".into(), dec!(30.0))
            .await
            .unwrap();

        assert_eq!(
            engine.balance(&"alice".into()).await.unwrap(),
            Balance::new(dec!(70.0))
        );
        assert_eq!(
            engine.balance(&"bob".into()).await.unwrap(),
            Balance::new(dec!(80.0))
        );
    }

    #[tokio::test]
    async fn test_transfer_insufficient_balance_is_noop() {
        let engine = engine_with_accounts(&[("alice", dec!(10.0)), ("bob", dec!(50.0))]).await;

        let result = engine
            .transfer(&"alice".into(), &"bob".into(), dec!(11.0))
            .await;
        assert!(matches!(result, Err(LedgerError::InsufficientBalance(_))));

        assert_eq!(
            engine.balance(&"alice".into()).await.unwrap(),
            Balance::new(dec!(10.0))
        );
        assert_eq!(
            engine.balance(&"bob".into()).await.unwrap(),
            Balance::new(dec!(50.0))
        );
    }

    #[tokio::test]
    async fn test_transfer_to_missing_account_is_noop() {
        let engine = engine_with_accounts(&[("alice", dec!(100.0))]).await;

        let result = engine
            .transfer(&"alice".into(), &"ghost".into(), dec!(10.0))
            .await;
        match result {
            Err(LedgerError::AccountNotFound(id)) => assert_eq!(id, AccountId::from("ghost")),
            other => panic!("expected AccountNotFound, got {other:?}"),
        }

        assert_eq!(
            engine.balance(&"alice".into()).await.unwrap(),
            Balance::new(dec!(100.0))
        );
    }

    #[tokio::test]
    async fn test_transfer_from_missing_source() {
        let engine = engine_with_accounts(&[("bob", dec!(50.0))]).await;

        let result = engine
            .transfer(&"ghost".into(), &"bob".into(), dec!(10.0))
            .await;
        match result {
            Err(LedgerError::AccountNotFound(id)) => assert_eq!(id, AccountId::from("ghost")),
            other => panic!("expected AccountNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transfer_rejects_self_transfer() {
        let engine = engine_with_accounts(&[("alice", dec!(100.0))]).await;

        let result = engine
            .transfer(&"alice".into(), &"alice".into(), dec!(10.0))
            .await;
        assert!(matches!(result, Err(LedgerError::SelfTransfer(_))));

        assert_eq!(
            engine.balance(&"alice".into()).await.unwrap(),
            Balance::new(dec!(100.0))
        );
    }

    #[tokio::test]
    async fn test_deposit_returns_post_image() {
        let engine = engine_with_accounts(&[("alice", dec!(100.0))]).await;

        let balance = engine.deposit(&"alice".into(), dec!(25.5)).await.unwrap();
        assert_eq!(balance, Balance::new(dec!(125.5)));
    }

    #[tokio::test]
    async fn test_deposit_rejects_negative_amount() {
        let engine = engine_with_accounts(&[("alice", dec!(100.0))]).await;

        let result = engine.deposit(&"alice".into(), dec!(-5.0)).await;
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));

        assert_eq!(
            engine.balance(&"alice".into()).await.unwrap(),
            Balance::new(dec!(100.0))
        );
    }

    #[tokio::test]
    async fn test_withdraw_insufficient_balance() {
        let engine = engine_with_accounts(&[("alice", dec!(10.0))]).await;

        let result = engine.withdraw(&"alice".into(), dec!(20.0)).await;
        assert!(matches!(result, Err(LedgerError::InsufficientBalance(_))));

        assert_eq!(
            engine.balance(&"alice".into()).await.unwrap(),
            Balance::new(dec!(10.0))
        );
    }

    #[tokio::test]
    async fn test_deposit_withdraw_round_trip() {
        let engine = engine_with_accounts(&[("alice", dec!(42.0))]).await;

        engine.deposit(&"alice".into(), dec!(13.37)).await.unwrap();
        let balance = engine.withdraw(&"alice".into(), dec!(13.37)).await.unwrap();
        assert_eq!(balance, Balance::new(dec!(42.0)));
    }

    #[tokio::test]
    async fn test_open_account_rejects_non_positive_initial_balance() {
        let engine = engine_with_accounts(&[]).await;

        let result = engine.open_account("alice".into(), dec!(0.0)).await;
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
    }

    #[tokio::test]
    async fn test_open_account_twice_fails() {
        let engine = engine_with_accounts(&[]).await;

        engine.open_account("alice".into(), dec!(10.0)).await.unwrap();
        let result = engine.open_account("alice".into(), dec!(10.0)).await;
        assert!(matches!(result, Err(LedgerError::AccountExists(_))));
    }

    #[tokio::test]
    async fn test_slow_commit_surfaces_store_unavailable() {
        let store = Arc::new(StubStore::new(CommitBehavior::Stall(Duration::from_millis(
            200,
        ))));
        let retry = RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            commit_timeout: Duration::from_millis(5),
        };
        let engine = LedgerEngine::with_retry_policy(store.clone(), retry);

        let result = engine.deposit(&"alice".into(), dec!(1.0)).await;
        assert!(matches!(result, Err(LedgerError::StoreUnavailable(_))));

        // Not a conflict, so the engine must not retry the commit.
        assert_eq!(store.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_conflict_retries_are_bounded() {
        let store = Arc::new(StubStore::new(CommitBehavior::AlwaysConflict));
        let retry = RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            commit_timeout: Duration::from_secs(1),
        };
        let engine = LedgerEngine::with_retry_policy(store.clone(), retry);

        let result = engine
            .transfer(&"alice".into(), &"bob".into(), dec!(1.0))
            .await;
        assert!(matches!(result, Err(LedgerError::Conflict)));
        assert_eq!(store.commits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_balance_of_missing_account() {
        let engine = engine_with_accounts(&[]).await;

        let result = engine.balance(&"ghost".into()).await;
        assert!(matches!(result, Err(LedgerError::AccountNotFound(_))));
    }
}
