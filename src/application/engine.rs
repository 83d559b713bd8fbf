use crate::application::coordinator::TransferCoordinator;
use crate::application::ledger::WalletLedger;
use crate::config::LedgerConfig;
use crate::domain::clock::SharedClock;
use crate::domain::otp::OtpGate;
use crate::domain::ports::{OtpNotifierBox, TransactionStoreBox, WalletStoreBox};
use crate::domain::transaction::{Transaction, TransactionStatus, TransactionType};
use crate::domain::wallet::{WalletId, WalletLimits, WalletSnapshot};
use crate::error::{LedgerError, Result};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

/// What a caller asks the engine to do with money.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub kind: TransactionType,
    pub source: WalletId,
    pub destination: Option<WalletId>,
    pub amount: Decimal,
    pub description: String,
}

impl TransactionRequest {
    pub fn transfer(source: WalletId, destination: WalletId, amount: Decimal) -> Self {
        Self {
            kind: TransactionType::Transfer,
            source,
            destination: Some(destination),
            amount,
            description: String::new(),
        }
    }

    pub fn deposit(wallet: WalletId, amount: Decimal) -> Self {
        Self {
            kind: TransactionType::Deposit,
            source: wallet,
            destination: None,
            amount,
            description: String::new(),
        }
    }

    pub fn withdraw(wallet: WalletId, amount: Decimal) -> Self {
        Self {
            kind: TransactionType::Withdraw,
            source: wallet,
            destination: None,
            amount,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The entry point for callers that want persistence and code delivery around the
/// in-memory ledger.
///
/// The engine owns the storage backends and the notifier. Every ledger step runs
/// synchronously under the wallet locks; persistence is awaited afterwards, outside any
/// wallet lock. A failed save is logged and does not undo the ledger change.
///
/// Saves of one wallet are serialized, and each reads the wallet's state only once it
/// holds that wallet's save slot, so the store never goes back to an older balance.
pub struct LedgerEngine {
    ledger: Arc<WalletLedger>,
    coordinator: TransferCoordinator,
    wallet_store: WalletStoreBox,
    transaction_store: TransactionStoreBox,
    notifier: OtpNotifierBox,
    wallet_saves: DashMap<WalletId, Arc<AsyncMutex<()>>>,
}

impl LedgerEngine {
    /// Creates an engine with an empty ledger.
    ///
    /// # Arguments
    ///
    /// * `config` - Wallet defaults, transfer policy and code settings.
    /// * `clock` - Time source shared by the ledger and the code gate.
    /// * `wallet_store` - The store for wallet snapshots.
    /// * `transaction_store` - The store for transactions.
    /// * `notifier` - Where issued codes are sent.
    pub fn new(
        config: &LedgerConfig,
        clock: SharedClock,
        wallet_store: WalletStoreBox,
        transaction_store: TransactionStoreBox,
        notifier: OtpNotifierBox,
    ) -> Self {
        let ledger = Arc::new(WalletLedger::new(
            config.transfer_policy(),
            config.wallet_limits(),
            Arc::clone(&clock),
        ));
        let gate = match config.otp.seed {
            Some(seed) => OtpGate::with_seed(clock, config.otp_ttl(), seed),
            None => OtpGate::new(clock, config.otp_ttl()),
        };
        let coordinator = TransferCoordinator::new(Arc::clone(&ledger), Arc::new(gate));
        Self {
            ledger,
            coordinator,
            wallet_store,
            transaction_store,
            notifier,
            wallet_saves: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<WalletLedger> {
        &self.ledger
    }

    pub fn coordinator(&self) -> &TransferCoordinator {
        &self.coordinator
    }

    /// Fills the ledger from the stores.
    ///
    /// Every stored transaction id is claimed, and each wallet's history is rebuilt from
    /// the completed transactions in creation order. Meant to run once, on an empty
    /// ledger.
    pub async fn load(&self) -> Result<()> {
        let snapshots = self.wallet_store.all_wallets().await?;
        let wallets = snapshots.len();
        for mut snapshot in snapshots {
            snapshot.history.clear();
            self.ledger.insert_snapshot(snapshot)?;
        }

        let mut transactions = self.transaction_store.all_transactions().await?;
        transactions.sort_by_key(Transaction::created_at);
        for tx in &transactions {
            self.ledger.register_transaction(tx.id())?;
            if tx.status() != TransactionStatus::Completed {
                continue;
            }
            for wallet in tx.wallets() {
                match self.ledger.replay_history(wallet, tx.id()) {
                    Ok(()) => {}
                    Err(LedgerError::WalletNotFound(_)) => {
                        warn!(tx = %tx.id(), %wallet, "completed transaction names an unknown wallet");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        info!(wallets, transactions = transactions.len(), "ledger loaded");
        Ok(())
    }

    /// Creates a wallet with the configured default limits and saves it.
    pub async fn open_wallet(&self, id: WalletId) -> Result<WalletSnapshot> {
        let snapshot = self.ledger.open_wallet(id)?;
        self.persist_wallet(&snapshot.id).await;
        info!(wallet = %snapshot.id, "wallet created");
        Ok(snapshot)
    }

    /// Creates a `Pending` transaction, sends a fresh code for its source wallet through
    /// the notifier, and saves it.
    ///
    /// If the code cannot be delivered the transaction is cancelled, saved, and the
    /// delivery error returned.
    pub async fn submit(&self, request: TransactionRequest) -> Result<Transaction> {
        let mut tx = Transaction::new(
            request.kind,
            request.source,
            request.destination,
            request.amount,
            self.ledger.clock().now(),
        )?
        .with_description(request.description);
        for wallet in tx.wallets() {
            if !self.ledger.contains(wallet) {
                return Err(LedgerError::WalletNotFound(wallet.to_string()));
            }
        }

        self.coordinator.admit(&tx)?;
        let identity = tx.source().to_string();
        let otp = self.coordinator.issue_otp(&mut tx, &identity)?;
        if let Err(e) = self.notifier.deliver(&otp).await {
            warn!(tx = %tx.id(), error = %e, "code delivery failed, cancelling");
            tx.cancel();
            self.persist_transaction(&tx).await;
            return Err(e);
        }

        self.persist_transaction(&tx).await;
        info!(tx = %tx.id(), kind = %tx.kind(), amount = %tx.amount(), "transaction submitted");
        Ok(tx)
    }

    /// Replaces the transaction's code with a new one and delivers it.
    pub async fn resend_otp(&self, tx: &mut Transaction) -> Result<()> {
        let identity = tx.source().to_string();
        let otp = self.coordinator.issue_otp(tx, &identity)?;
        self.notifier.deliver(&otp).await?;
        self.persist_transaction(tx).await;
        Ok(())
    }

    /// Checks `code` and, if it is right, executes the transaction.
    ///
    /// A wrong or expired code returns `OtpMismatch` or `OtpExpired` and leaves the
    /// transaction `Pending` so the caller may retry or cancel. Otherwise the result is
    /// the execution outcome, and the transaction and its wallets are saved.
    pub async fn confirm(&self, tx: &mut Transaction, code: &str) -> Result<()> {
        if tx.status() != TransactionStatus::Pending {
            return Err(LedgerError::InvalidState(format!(
                "transaction {} is {}",
                tx.id(),
                tx.status()
            )));
        }
        let otp = tx.otp().cloned().ok_or_else(|| {
            LedgerError::InvalidState(format!("transaction {} has no one-time code", tx.id()))
        })?;
        if !self.coordinator.verify_otp(tx, code) {
            let reason = match self.coordinator.gate().check(&otp, code) {
                Err(e) => e,
                Ok(()) => LedgerError::OtpExpired,
            };
            warn!(tx = %tx.id(), error = %reason, "one-time code rejected");
            return Err(reason);
        }

        let outcome = self.coordinator.execute(tx);
        self.persist_transaction(tx).await;
        if outcome.is_ok() {
            for wallet in tx.wallets() {
                self.persist_wallet(wallet).await;
            }
        }
        outcome
    }

    /// Cancels a pending transaction and saves it. Returns false if it was not pending.
    pub async fn cancel(&self, tx: &mut Transaction) -> bool {
        if !tx.cancel() {
            return false;
        }
        self.persist_transaction(tx).await;
        info!(tx = %tx.id(), "transaction cancelled");
        true
    }

    pub async fn set_limits(&self, id: &WalletId, limits: WalletLimits) -> Result<WalletSnapshot> {
        let snapshot = self.ledger.set_limits(id, limits)?;
        self.persist_wallet(id).await;
        Ok(snapshot)
    }

    pub fn snapshot(&self, id: &WalletId) -> Result<WalletSnapshot> {
        self.ledger.snapshot(id)
    }

    pub fn snapshots(&self) -> Vec<WalletSnapshot> {
        self.ledger.snapshots()
    }

    /// The completed transactions that touched a wallet, oldest first.
    pub async fn history(&self, id: &WalletId) -> Result<Vec<Transaction>> {
        let snapshot = self.ledger.snapshot(id)?;
        let mut transactions = Vec::with_capacity(snapshot.history.len());
        for tx_id in snapshot.history {
            match self.transaction_store.get(tx_id).await? {
                Some(tx) => transactions.push(tx),
                None => warn!(wallet = %id, tx = %tx_id, "history entry missing from store"),
            }
        }
        Ok(transactions)
    }

    /// Saves the wallet's current state. The snapshot is taken after the save slot is
    /// acquired, so a later save always carries state at least as new as an earlier one.
    async fn persist_wallet(&self, wallet: &WalletId) {
        let slot = Arc::clone(self.wallet_saves.entry(wallet.clone()).or_default().value());
        let _slot = slot.lock().await;
        let snapshot = match self.ledger.snapshot(wallet) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(%wallet, error = %e, "wallet vanished before save");
                return;
            }
        };
        if let Err(e) = self.wallet_store.save_wallet(snapshot).await {
            warn!(%wallet, error = %e, "failed to save wallet");
        }
    }

    async fn persist_transaction(&self, tx: &Transaction) {
        if let Err(e) = self.transaction_store.save(tx.clone()).await {
            warn!(tx = %tx.id(), error = %e, "failed to save transaction");
        }
    }
}
