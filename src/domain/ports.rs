use super::otp::OtpCode;
use super::transaction::{Transaction, TransactionId};
use super::wallet::{WalletId, WalletSnapshot};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn load_wallet(&self, id: &WalletId) -> Result<Option<WalletSnapshot>>;
    async fn save_wallet(&self, snapshot: WalletSnapshot) -> Result<()>;
    async fn all_wallets(&self) -> Result<Vec<WalletSnapshot>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn save(&self, tx: Transaction) -> Result<()>;
    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>>;
    async fn all_transactions(&self) -> Result<Vec<Transaction>>;
}

/// Hands an issued one-time code to whoever has to type it back in.
#[async_trait]
pub trait OtpNotifier: Send + Sync {
    async fn deliver(&self, otp: &OtpCode) -> Result<()>;
}

pub type WalletStoreBox = Box<dyn WalletStore>;
pub type TransactionStoreBox = Box<dyn TransactionStore>;
pub type OtpNotifierBox = Box<dyn OtpNotifier>;
