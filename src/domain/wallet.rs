use crate::domain::money::{Amount, Balance};
use crate::domain::transaction::TransactionId;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_DAILY_TRANSFER_LIMIT: Decimal = dec!(1000000);
pub const DEFAULT_MAX_BALANCE: Decimal = dec!(10000000);
pub const DEFAULT_MAX_DAILY_TRANSFERS: u32 = 10;
pub const DEFAULT_DAILY_WINDOW_SECS: i64 = 24 * 60 * 60;

/// Unique, immutable wallet identifier.
///
/// Ordering is byte-wise on the underlying string; the ledger relies on it as the
/// global lock order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletId(String);

impl WalletId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(LedgerError::InvalidArgument(
                "wallet id cannot be empty".to_string(),
            ));
        }
        if id.contains(['\n', '\r']) {
            return Err(LedgerError::InvalidArgument(format!(
                "wallet id cannot contain line breaks: {id:?}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WalletId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for WalletId {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<WalletId> for String {
    fn from(id: WalletId) -> Self {
        id.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-wallet caps. Both are stored with the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletLimits {
    pub daily_transfer_limit: Decimal,
    pub max_balance: Decimal,
}

impl Default for WalletLimits {
    fn default() -> Self {
        Self {
            daily_transfer_limit: DEFAULT_DAILY_TRANSFER_LIMIT,
            max_balance: DEFAULT_MAX_BALANCE,
        }
    }
}

impl WalletLimits {
    fn validate(&self) -> Result<()> {
        if self.daily_transfer_limit < Decimal::ZERO || self.max_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidArgument(
                "wallet limits cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ledger-wide rule for how many transfers a wallet may make per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    pub max_daily_transfers: u32,
    pub daily_window: Duration,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            max_daily_transfers: DEFAULT_MAX_DAILY_TRANSFERS,
            daily_window: Duration::seconds(DEFAULT_DAILY_WINDOW_SECS),
        }
    }
}

/// Plain copy of a wallet's state, as handed to and from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub id: WalletId,
    pub balance: Balance,
    pub daily_transfer_limit: Decimal,
    pub max_balance: Decimal,
    pub daily_transfer_count: u32,
    pub last_transfer_reset: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<TransactionId>,
}

/// A wallet's balance, limits and history.
///
/// Every method keeps `0 <= balance <= max_balance`; a failed operation leaves the
/// wallet untouched. Locking is the ledger's job, not the wallet's.
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    id: WalletId,
    balance: Balance,
    limits: WalletLimits,
    daily_transfer_count: u32,
    last_transfer_reset: DateTime<Utc>,
    history: Vec<TransactionId>,
}

impl Wallet {
    pub fn new(id: WalletId, limits: WalletLimits, now: DateTime<Utc>) -> Result<Self> {
        limits.validate()?;
        Ok(Self {
            id,
            balance: Balance::ZERO,
            limits,
            daily_transfer_count: 0,
            last_transfer_reset: now,
            history: Vec::new(),
        })
    }

    /// Rebuilds a wallet from storage, rejecting snapshots that break the balance bounds.
    pub fn restore(snapshot: WalletSnapshot) -> Result<Self> {
        let limits = WalletLimits {
            daily_transfer_limit: snapshot.daily_transfer_limit,
            max_balance: snapshot.max_balance,
        };
        limits.validate()?;
        if snapshot.balance < Balance::ZERO || snapshot.balance.value() > limits.max_balance {
            return Err(LedgerError::InvalidArgument(format!(
                "wallet {} balance {} outside [0, {}]",
                snapshot.id, snapshot.balance, limits.max_balance
            )));
        }
        Ok(Self {
            id: snapshot.id,
            balance: snapshot.balance,
            limits,
            daily_transfer_count: snapshot.daily_transfer_count,
            last_transfer_reset: snapshot.last_transfer_reset,
            history: snapshot.history,
        })
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            id: self.id.clone(),
            balance: self.balance,
            daily_transfer_limit: self.limits.daily_transfer_limit,
            max_balance: self.limits.max_balance,
            daily_transfer_count: self.daily_transfer_count,
            last_transfer_reset: self.last_transfer_reset,
            history: self.history.clone(),
        }
    }

    pub fn id(&self) -> &WalletId {
        &self.id
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn limits(&self) -> WalletLimits {
        self.limits
    }

    pub fn daily_transfer_count(&self) -> u32 {
        self.daily_transfer_count
    }

    pub fn last_transfer_reset(&self) -> DateTime<Utc> {
        self.last_transfer_reset
    }

    pub fn history(&self) -> &[TransactionId] {
        &self.history
    }

    pub fn deposit(&mut self, amount: Amount) -> Result<()> {
        self.check_capacity(amount)?;
        self.balance += amount.into();
        Ok(())
    }

    pub fn withdraw(&mut self, amount: Amount) -> Result<()> {
        if amount.value() > self.balance.value() {
            return Err(LedgerError::InsufficientFunds(self.id.to_string()));
        }
        self.balance -= amount.into();
        Ok(())
    }

    /// Fails with `InsufficientCapacity` if `amount` would push the balance past the cap,
    /// including when the sum does not fit in a `Decimal`.
    pub fn check_capacity(&self, amount: Amount) -> Result<()> {
        match self.balance.value().checked_add(amount.value()) {
            Some(total) if total <= self.limits.max_balance => Ok(()),
            _ => Err(LedgerError::InsufficientCapacity(self.id.to_string())),
        }
    }

    fn window_elapsed(&self, now: DateTime<Utc>, policy: &TransferPolicy) -> bool {
        now - self.last_transfer_reset >= policy.daily_window
    }

    /// Pure check. An elapsed window counts as not exceeded, because the next mutating
    /// operation resets it.
    pub fn is_daily_limit_exceeded(&self, now: DateTime<Utc>, policy: &TransferPolicy) -> bool {
        if self.window_elapsed(now, policy) {
            return false;
        }
        self.daily_transfer_count >= policy.max_daily_transfers
    }

    /// Starts a fresh window if the current one has elapsed. Returns whether it did.
    pub fn roll_daily_window(&mut self, now: DateTime<Utc>, policy: &TransferPolicy) -> bool {
        if !self.window_elapsed(now, policy) {
            return false;
        }
        self.daily_transfer_count = 0;
        self.last_transfer_reset = now;
        true
    }

    /// The outgoing-transfer gate, with the reason for a refusal.
    pub fn check_transfer(
        &self,
        amount: Decimal,
        now: DateTime<Utc>,
        policy: &TransferPolicy,
    ) -> Result<()> {
        let amount = Amount::new(amount)?;
        if amount.value() > self.balance.value() {
            return Err(LedgerError::InsufficientFunds(self.id.to_string()));
        }
        if amount.value() > self.limits.daily_transfer_limit
            || self.is_daily_limit_exceeded(now, policy)
        {
            return Err(LedgerError::LimitExceeded(self.id.to_string()));
        }
        Ok(())
    }

    pub fn can_transfer(&self, amount: Decimal, now: DateTime<Utc>, policy: &TransferPolicy) -> bool {
        self.check_transfer(amount, now, policy).is_ok()
    }

    /// Moves `amount` from `self` to `destination`. The caller must hold both wallets
    /// exclusively for the whole call.
    pub fn transfer(
        &mut self,
        destination: &mut Wallet,
        amount: Amount,
        now: DateTime<Utc>,
        policy: &TransferPolicy,
    ) -> Result<()> {
        if self.id == destination.id {
            return Err(LedgerError::InvalidArgument(format!(
                "cannot transfer from wallet {} to itself",
                self.id
            )));
        }
        self.roll_daily_window(now, policy);
        self.check_transfer(amount.value(), now, policy)?;
        destination.check_capacity(amount)?;

        self.balance -= amount.into();
        destination.balance += amount.into();
        self.daily_transfer_count += 1;
        self.last_transfer_reset = now;
        Ok(())
    }

    pub fn set_limits(&mut self, limits: WalletLimits) -> Result<()> {
        limits.validate()?;
        if self.balance.value() > limits.max_balance {
            return Err(LedgerError::InvalidArgument(format!(
                "max balance {} is below the current balance {} of wallet {}",
                limits.max_balance, self.balance, self.id
            )));
        }
        self.limits = limits;
        Ok(())
    }

    pub(crate) fn add_history(&mut self, transaction: TransactionId) {
        self.history.push(transaction);
    }
}
