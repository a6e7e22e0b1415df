//! Currency custody boundary.
//!
//! Tasks never hold currency themselves; they own an account on a token
//! port and move value through it. The port is an external collaborator:
//! [`InMemoryToken`] is the reference implementation for wiring and
//! tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use conclave_types::{AccountId, Amount};

/// Errors from currency transfers.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("insufficient funds in {account}: requested {requested}, available {available}")]
    InsufficientFunds {
        account: AccountId,
        requested: Amount,
        available: Amount,
    },
}

/// Fungible-token custody port.
pub trait TokenPort {
    /// Current balance of an account. Unknown accounts hold zero.
    fn balance(&self, account: &AccountId) -> Amount;

    /// Move `amount` from one account to another. A zero-amount
    /// transfer is a no-op.
    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError>;
}

/// In-memory token ledger.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InMemoryToken {
    balances: HashMap<AccountId, Amount>,
}

impl InMemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an account out of thin air. Test and bootstrap helper.
    pub fn mint(&mut self, account: &AccountId, amount: Amount) {
        *self.balances.entry(account.clone()).or_insert(0) += amount;
    }
}

impl TokenPort for InMemoryToken {
    fn balance(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.balance(from);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                account: from.clone(),
                requested: amount,
                available,
            });
        }
        if let Some(balance) = self.balances.get_mut(from) {
            *balance = available - amount;
        }
        *self.balances.entry(to.clone()).or_insert(0) += amount;
        info!(%from, %to, amount, "transfer settled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_and_transfer() {
        let mut token = InMemoryToken::new();
        let a = AccountId::new("a");
        let b = AccountId::new("b");

        token.mint(&a, 1000);
        token.transfer(&a, &b, 400).unwrap();
        assert_eq!(token.balance(&a), 600);
        assert_eq!(token.balance(&b), 400);
    }

    #[test]
    fn overdraft_rejected_without_effect() {
        let mut token = InMemoryToken::new();
        let a = AccountId::new("a");
        let b = AccountId::new("b");
        token.mint(&a, 100);

        let err = token.transfer(&a, &b, 101).unwrap_err();
        assert!(matches!(err, TransferError::InsufficientFunds { .. }));
        assert_eq!(token.balance(&a), 100);
        assert_eq!(token.balance(&b), 0);
    }

    #[test]
    fn zero_transfer_is_noop() {
        let mut token = InMemoryToken::new();
        let a = AccountId::new("a");
        token.transfer(&a, &AccountId::new("b"), 0).unwrap();
        assert_eq!(token.balance(&a), 0);
    }

    #[test]
    fn unknown_account_is_empty() {
        let token = InMemoryToken::new();
        assert_eq!(token.balance(&AccountId::new("nobody")), 0);
    }
}
