use crate::domain::account::{AccountId, Amount};
use crate::error::LedgerError;
use rust_decimal::Decimal;

/// Direction of a single-account mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
}

/// A validated two-account transfer. Ephemeral, never persisted.
///
/// Construction enforces a strictly positive amount and distinct source and
/// destination accounts, so an intent in hand is always well-formed.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferIntent {
    pub source: AccountId,
    pub dest: AccountId,
    pub amount: Amount,
}

impl TransferIntent {
    pub fn new(source: AccountId, dest: AccountId, amount: Decimal) -> Result<Self, LedgerError> {
        let amount = Amount::new(amount)?;
        if source == dest {
            return Err(LedgerError::SelfTransfer(source));
        }
        Ok(Self {
            source,
            dest,
            amount,
        })
    }
}

/// A validated single-account mutation. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationIntent {
    pub account: AccountId,
    pub amount: Amount,
    pub direction: Direction,
}

impl MutationIntent {
    pub fn new(
        account: AccountId,
        amount: Decimal,
        direction: Direction,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            account,
            amount: Amount::new(amount)?,
            direction,
        })
    }

    /// The signed delta this mutation applies to the stored balance.
    pub fn delta(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.amount.value(),
            Direction::Debit => -self.amount.value(),
        }
    }
}
