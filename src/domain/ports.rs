use super::account::{Account, AccountId, Balance};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Outcome of committing a transaction scope.
///
/// A conflict with a concurrently committed scope is an expected outcome of
/// optimistic concurrency, so it is a value here rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// All buffered writes were applied atomically.
    Applied,
    /// A concurrently committed scope touched an overlapping account; none
    /// of the buffered writes were applied.
    Conflict,
}

/// Durable mapping from account identifier to balance.
///
/// A pure storage primitive: no business validation lives behind this port.
/// All mutation goes through a [`TransactionScope`] obtained from `begin`,
/// so effects become durable only on commit.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Opens a transaction scope over this store.
    async fn begin(&self) -> Result<Box<dyn TransactionScope>>;

    /// Snapshot read outside any scope.
    async fn get(&self, id: &AccountId) -> Result<Option<Account>>;

    /// Creates an account with a provisioned initial balance. Called exactly
    /// once per identity by the registration collaborator; a second call for
    /// the same id fails with `AccountExists`.
    async fn create_account(&self, id: AccountId, initial: Balance) -> Result<()>;

    /// All accounts, in unspecified order.
    async fn all_accounts(&self) -> Result<Vec<Account>>;
}

/// A transaction boundary: reads and writes made through a scope are
/// provisional until `commit`.
///
/// `commit` and `abort` consume the scope, so the `Open -> {Committed,
/// Aborted}` state machine is enforced by ownership. Dropping a scope
/// without committing discards its writes, same as `abort`.
///
/// Read-your-own-write holds within a scope: a `get` after an
/// `apply_delta` observes the buffered delta.
#[async_trait]
pub trait TransactionScope: Send {
    /// Reads an account under this scope.
    async fn get(&mut self, id: &AccountId) -> Result<Option<Account>>;

    /// Adds `delta` (credit positive, debit negative) to the account's
    /// balance and returns the post-image as visible inside the scope.
    async fn apply_delta(&mut self, id: &AccountId, delta: Decimal) -> Result<Balance>;

    /// Atomically applies all buffered writes, or reports a conflict and
    /// applies none of them.
    async fn commit(self: Box<Self>) -> Result<Commit>;

    /// Discards all buffered writes. Always safe, including on a read-only
    /// scope.
    async fn abort(self: Box<Self>) -> Result<()>;
}

pub type AccountStoreRef = std::sync::Arc<dyn AccountStore>;
