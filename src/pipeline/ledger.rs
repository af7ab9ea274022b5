use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{GenerationError, Result};

/// Credit balance consulted before any provider work is paid for.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Atomically take `cost` credits or fail with `InsufficientCredits`.
    async fn check_and_decrement(&self, user_id: &str, cost: u32) -> Result<()>;

    async fn refund(&self, user_id: &str, amount: u32) -> Result<()>;

    async fn balance(&self, user_id: &str) -> Result<u32>;
}

#[derive(Default)]
pub struct InMemoryLedger {
    balances: Mutex<HashMap<String, u32>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, user_id: impl Into<String>, credits: u32) -> Self {
        if let Ok(mut balances) = self.balances.lock() {
            balances.insert(user_id.into(), credits);
        }
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, u32>>> {
        self.balances
            .lock()
            .map_err(|_| GenerationError::Persistence("credit ledger lock poisoned".into()))
    }
}

#[async_trait]
impl CreditLedger for InMemoryLedger {
    async fn check_and_decrement(&self, user_id: &str, cost: u32) -> Result<()> {
        let mut balances = self.lock()?;
        let available = balances.get(user_id).copied().unwrap_or(0);
        if available < cost {
            return Err(GenerationError::InsufficientCredits {
                required: cost,
                available,
            });
        }
        balances.insert(user_id.to_string(), available - cost);
        Ok(())
    }

    async fn refund(&self, user_id: &str, amount: u32) -> Result<()> {
        let mut balances = self.lock()?;
        let balance = balances.entry(user_id.to_string()).or_insert(0);
        *balance = balance.saturating_add(amount);
        Ok(())
    }

    async fn balance(&self, user_id: &str) -> Result<u32> {
        Ok(self.lock()?.get(user_id).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decrement_and_refund() {
        let ledger = InMemoryLedger::new().with_balance("alice", 5);

        ledger.check_and_decrement("alice", 3).await.unwrap();
        assert_eq!(ledger.balance("alice").await.unwrap(), 2);

        let err = ledger.check_and_decrement("alice", 3).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::InsufficientCredits {
                required: 3,
                available: 2
            }
        ));
        assert_eq!(ledger.balance("alice").await.unwrap(), 2);

        ledger.refund("alice", 3).await.unwrap();
        assert_eq!(ledger.balance("alice").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn unknown_user_has_nothing() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.check_and_decrement("bob", 1).await.is_err());
    }
}
