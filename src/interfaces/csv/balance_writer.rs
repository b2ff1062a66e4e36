use crate::domain::account::{Account, AccountId, Balance};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct BalanceRow<'a> {
    account: &'a AccountId,
    balance: Balance,
}

/// Writes final account balances as CSV, sorted by account id so output is
/// deterministic regardless of store iteration order.
pub struct BalanceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BalanceWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts(&mut self, mut accounts: Vec<Account>) -> Result<(), csv::Error> {
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        for account in &accounts {
            self.writer.serialize(BalanceRow {
                account: &account.id,
                balance: account.balance,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writer_sorted_output() {
        let accounts = vec![
            Account::new("bob".into(), Balance::new(dec!(80.0))),
            Account::new("alice".into(), Balance::new(dec!(70.0))),
        ];

        let mut buffer = Vec::new();
        {
            let mut writer = BalanceWriter::new(&mut buffer);
            writer.write_accounts(accounts).unwrap();
        }

        let output = String::from_utf8(buffer).unwrap();
        assert_eq!(output, "account,balance\nalice,70.0\nbob,80.0\n");
    }

    #[test]
    fn test_writer_empty() {
        let mut buffer = Vec::new();
        {
            let mut writer = BalanceWriter::new(&mut buffer);
            writer.write_accounts(Vec::new()).unwrap();
        }
        assert!(String::from_utf8(buffer).unwrap().is_empty());
    }
}
