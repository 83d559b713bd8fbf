#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use walletd::application::ledger::WalletLedger;
use walletd::domain::clock::{ManualClock, SharedClock};
use walletd::domain::money::Balance;
use walletd::domain::wallet::{TransferPolicy, WalletId, WalletLimits, WalletSnapshot};

pub fn id(s: &str) -> WalletId {
    WalletId::new(s).unwrap()
}

pub fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn manual_clock() -> ManualClock {
    ManualClock::new(epoch())
}

pub fn ledger_with(policy: TransferPolicy, clock: SharedClock) -> Arc<WalletLedger> {
    Arc::new(WalletLedger::new(policy, WalletLimits::default(), clock))
}

pub fn ledger(clock: &ManualClock) -> Arc<WalletLedger> {
    ledger_with(TransferPolicy::default(), Arc::new(clock.clone()))
}

/// Opens `wallet` and tops it up to `amount`.
pub fn fund(ledger: &WalletLedger, wallet: &str, amount: Decimal) {
    ledger.open_wallet(id(wallet)).unwrap();
    if amount > Decimal::ZERO {
        ledger.deposit(&id(wallet), amount).unwrap();
    }
}

pub fn snapshot_with(
    wallet: &str,
    balance: Decimal,
    daily_transfer_count: u32,
    now: DateTime<Utc>,
) -> WalletSnapshot {
    WalletSnapshot {
        id: id(wallet),
        balance: Balance::new(balance),
        daily_transfer_limit: WalletLimits::default().daily_transfer_limit,
        max_balance: WalletLimits::default().max_balance,
        daily_transfer_count,
        last_transfer_reset: now,
        history: Vec::new(),
    }
}
