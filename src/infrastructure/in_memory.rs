use crate::domain::otp::OtpCode;
use crate::domain::ports::{OtpNotifier, TransactionStore, WalletStore};
use crate::domain::transaction::{Transaction, TransactionId};
use crate::domain::wallet::{WalletId, WalletSnapshot};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for wallet snapshots.
///
/// Clones share the same map, so a test can keep a handle after boxing one into the
/// engine.
#[derive(Default, Clone)]
pub struct InMemoryWalletStore {
    wallets: Arc<RwLock<HashMap<WalletId, WalletSnapshot>>>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn load_wallet(&self, id: &WalletId) -> Result<Option<WalletSnapshot>> {
        let wallets = self.wallets.read().await;
        Ok(wallets.get(id).cloned())
    }

    async fn save_wallet(&self, snapshot: WalletSnapshot) -> Result<()> {
        let mut wallets = self.wallets.write().await;
        wallets.insert(snapshot.id.clone(), snapshot);
        Ok(())
    }

    async fn all_wallets(&self) -> Result<Vec<WalletSnapshot>> {
        let wallets = self.wallets.read().await;
        let mut all: Vec<WalletSnapshot> = wallets.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

/// A thread-safe in-memory store for transactions, kept in first-save order.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<Vec<Transaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn save(&self, tx: Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        match transactions.iter_mut().find(|stored| stored.id() == tx.id()) {
            Some(stored) => *stored = tx,
            None => transactions.push(tx),
        }
        Ok(())
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.iter().find(|tx| tx.id() == id).cloned())
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.transactions.read().await.clone())
    }
}

/// Keeps delivered codes instead of sending them anywhere.
#[derive(Default, Clone)]
pub struct InMemoryNotifier {
    delivered: Arc<RwLock<Vec<OtpCode>>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn delivered(&self) -> Vec<OtpCode> {
        self.delivered.read().await.clone()
    }

    pub async fn last_code(&self) -> Option<String> {
        self.delivered
            .read()
            .await
            .last()
            .map(|otp| otp.code().to_string())
    }
}

#[async_trait]
impl OtpNotifier for InMemoryNotifier {
    async fn deliver(&self, otp: &OtpCode) -> Result<()> {
        self.delivered.write().await.push(otp.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Balance;
    use crate::domain::transaction::TransactionStatus;
    use crate::domain::wallet::{Wallet, WalletLimits};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn snapshot(id: &str) -> WalletSnapshot {
        Wallet::new(WalletId::new(id).unwrap(), WalletLimits::default(), Utc::now())
            .unwrap()
            .snapshot()
    }

    #[tokio::test]
    async fn test_in_memory_wallet_store() {
        let store = InMemoryWalletStore::new();
        let mut wallet = snapshot("alice");
        wallet.balance = Balance::new(dec!(100.0));

        store.save_wallet(wallet.clone()).await.unwrap();
        let retrieved = store.load_wallet(&wallet.id).await.unwrap().unwrap();
        assert_eq!(retrieved, wallet);

        let missing = WalletId::new("bob").unwrap();
        assert!(store.load_wallet(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_wallet_store_all_sorted() {
        let store = InMemoryWalletStore::new();
        store.save_wallet(snapshot("b")).await.unwrap();
        store.save_wallet(snapshot("a")).await.unwrap();

        let all = store.all_wallets().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_in_memory_transaction_store_upserts() {
        let store = InMemoryTransactionStore::new();
        let mut tx = Transaction::deposit(WalletId::new("a").unwrap(), dec!(1), Utc::now()).unwrap();
        let other = Transaction::deposit(WalletId::new("b").unwrap(), dec!(2), Utc::now()).unwrap();

        store.save(tx.clone()).await.unwrap();
        store.save(other.clone()).await.unwrap();
        tx.cancel();
        store.save(tx.clone()).await.unwrap();

        let all = store.all_transactions().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id(), tx.id());
        assert_eq!(all[0].status(), TransactionStatus::Cancelled);
        assert_eq!(store.get(other.id()).await.unwrap(), Some(other));
    }

    #[tokio::test]
    async fn test_in_memory_notifier_keeps_codes() {
        let notifier = InMemoryNotifier::new();
        assert!(notifier.last_code().await.is_none());

        let otp = OtpCode::restore("000123", "a", Utc::now(), chrono::Duration::minutes(5)).unwrap();
        notifier.deliver(&otp).await.unwrap();

        assert_eq!(notifier.last_code().await.as_deref(), Some("000123"));
        assert_eq!(notifier.delivered().await, vec![otp]);
    }
}
