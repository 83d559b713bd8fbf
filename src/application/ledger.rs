use crate::domain::clock::SharedClock;
use crate::domain::money::{Amount, Balance};
use crate::domain::transaction::TransactionId;
use crate::domain::wallet::{TransferPolicy, Wallet, WalletId, WalletLimits, WalletSnapshot};
use crate::error::{LedgerError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

type WalletHandle = Arc<Mutex<Wallet>>;

/// The set of live wallets, keyed by identifier.
///
/// Each wallet sits behind its own `Mutex`. A handle is cloned out of the map before its
/// lock is taken, so no map shard is ever held while waiting on a wallet. Operations on
/// two wallets lock them in identifier order, which rules out lock cycles between
/// concurrent transfers.
pub struct WalletLedger {
    wallets: DashMap<WalletId, WalletHandle>,
    transactions: DashSet<TransactionId>,
    policy: TransferPolicy,
    defaults: WalletLimits,
    clock: SharedClock,
}

impl WalletLedger {
    pub fn new(policy: TransferPolicy, defaults: WalletLimits, clock: SharedClock) -> Self {
        Self {
            wallets: DashMap::new(),
            transactions: DashSet::new(),
            policy,
            defaults,
            clock,
        }
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn policy(&self) -> &TransferPolicy {
        &self.policy
    }

    fn handle(&self, id: &WalletId) -> Result<WalletHandle> {
        self.wallets
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::WalletNotFound(id.to_string()))
    }

    /// Creates a wallet with the ledger's default limits.
    pub fn open_wallet(&self, id: WalletId) -> Result<WalletSnapshot> {
        let wallet = Wallet::new(id, self.defaults, self.clock.now())?;
        self.insert(wallet)
    }

    /// Adds a wallet read back from storage.
    pub fn insert_snapshot(&self, snapshot: WalletSnapshot) -> Result<()> {
        self.insert(Wallet::restore(snapshot)?).map(|_| ())
    }

    fn insert(&self, wallet: Wallet) -> Result<WalletSnapshot> {
        match self.wallets.entry(wallet.id().clone()) {
            Entry::Occupied(entry) => Err(LedgerError::DuplicateIdentifier(entry.key().to_string())),
            Entry::Vacant(entry) => {
                let snapshot = wallet.snapshot();
                entry.insert(Arc::new(Mutex::new(wallet)));
                debug!(wallet = %snapshot.id, "wallet opened");
                Ok(snapshot)
            }
        }
    }

    pub fn contains(&self, id: &WalletId) -> bool {
        self.wallets.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn snapshot(&self, id: &WalletId) -> Result<WalletSnapshot> {
        Ok(self.handle(id)?.lock().snapshot())
    }

    /// Snapshots of every wallet, ordered by identifier. Each wallet is locked on its own,
    /// so the result is not one atomic cut across the ledger.
    pub fn snapshots(&self) -> Vec<WalletSnapshot> {
        let mut handles: Vec<(WalletId, WalletHandle)> = self
            .wallets
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles
            .into_iter()
            .map(|(_, handle)| handle.lock().snapshot())
            .collect()
    }

    pub fn balance(&self, id: &WalletId) -> Result<Balance> {
        Ok(self.handle(id)?.lock().balance())
    }

    pub fn deposit(&self, id: &WalletId, amount: Decimal) -> Result<()> {
        self.deposit_recorded(id, amount, None)
    }

    pub fn withdraw(&self, id: &WalletId, amount: Decimal) -> Result<()> {
        self.withdraw_recorded(id, amount, None)
    }

    pub fn transfer(&self, source: &WalletId, destination: &WalletId, amount: Decimal) -> Result<()> {
        self.transfer_recorded(source, destination, amount, None)
    }

    /// Whether `id` could send `amount` right now. Changes nothing; unknown wallets
    /// cannot transfer.
    pub fn can_transfer(&self, id: &WalletId, amount: Decimal) -> bool {
        match self.handle(id) {
            Ok(handle) => handle
                .lock()
                .can_transfer(amount, self.clock.now(), &self.policy),
            Err(_) => false,
        }
    }

    /// Starts a fresh daily window for `id` if the old one has run out, then reports
    /// whether the daily transfer count is used up.
    pub fn is_daily_limit_exceeded(&self, id: &WalletId) -> Result<bool> {
        let handle = self.handle(id)?;
        let mut wallet = handle.lock();
        let now = self.clock.now();
        if wallet.roll_daily_window(now, &self.policy) {
            debug!(wallet = %id, "daily transfer window reset");
        }
        Ok(wallet.is_daily_limit_exceeded(now, &self.policy))
    }

    pub fn set_limits(&self, id: &WalletId, limits: WalletLimits) -> Result<WalletSnapshot> {
        let handle = self.handle(id)?;
        let mut wallet = handle.lock();
        wallet.set_limits(limits)?;
        Ok(wallet.snapshot())
    }

    /// Claims a transaction identifier. Fails if it has been seen before.
    pub fn register_transaction(&self, id: TransactionId) -> Result<()> {
        if !self.transactions.insert(id) {
            return Err(LedgerError::DuplicateIdentifier(id.to_string()));
        }
        Ok(())
    }

    pub fn is_registered(&self, id: TransactionId) -> bool {
        self.transactions.contains(&id)
    }

    /// Appends to a wallet's history outside of a balance change. Only used when
    /// rebuilding history from stored transactions.
    pub(crate) fn replay_history(&self, id: &WalletId, tx: TransactionId) -> Result<()> {
        self.handle(id)?.lock().add_history(tx);
        Ok(())
    }

    pub(crate) fn deposit_recorded(
        &self,
        id: &WalletId,
        amount: Decimal,
        record: Option<TransactionId>,
    ) -> Result<()> {
        let amount = Amount::new(amount)?;
        let handle = self.handle(id)?;
        let mut wallet = handle.lock();
        wallet.deposit(amount)?;
        if let Some(tx) = record {
            wallet.add_history(tx);
        }
        debug!(wallet = %id, %amount, balance = %wallet.balance(), "deposit applied");
        Ok(())
    }

    pub(crate) fn withdraw_recorded(
        &self,
        id: &WalletId,
        amount: Decimal,
        record: Option<TransactionId>,
    ) -> Result<()> {
        let amount = Amount::new(amount)?;
        let handle = self.handle(id)?;
        let mut wallet = handle.lock();
        wallet.withdraw(amount)?;
        if let Some(tx) = record {
            wallet.add_history(tx);
        }
        debug!(wallet = %id, %amount, balance = %wallet.balance(), "withdrawal applied");
        Ok(())
    }

    /// Validates and applies a transfer with both wallets locked for the whole step.
    pub(crate) fn transfer_recorded(
        &self,
        source: &WalletId,
        destination: &WalletId,
        amount: Decimal,
        record: Option<TransactionId>,
    ) -> Result<()> {
        let amount = Amount::new(amount)?;
        if source == destination {
            return Err(LedgerError::InvalidArgument(format!(
                "cannot transfer from wallet {source} to itself"
            )));
        }
        let source_handle = self.handle(source)?;
        let destination_handle = self.handle(destination)?;

        let (mut from, mut to) =
            lock_in_order((source, &source_handle), (destination, &destination_handle));
        let now = self.clock.now();
        from.transfer(&mut to, amount, now, &self.policy)?;
        if let Some(tx) = record {
            from.add_history(tx);
            to.add_history(tx);
        }
        debug!(
            source = %source,
            destination = %destination,
            %amount,
            transfers_today = from.daily_transfer_count(),
            "transfer applied"
        );
        Ok(())
    }
}

/// Locks two distinct wallets, lower identifier first, and hands the guards back in
/// argument order.
fn lock_in_order<'a>(
    (first_id, first): (&WalletId, &'a Mutex<Wallet>),
    (second_id, second): (&WalletId, &'a Mutex<Wallet>),
) -> (MutexGuard<'a, Wallet>, MutexGuard<'a, Wallet>) {
    if first_id < second_id {
        let a = first.lock();
        let b = second.lock();
        (a, b)
    } else {
        let b = second.lock();
        let a = first.lock();
        (a, b)
    }
}
