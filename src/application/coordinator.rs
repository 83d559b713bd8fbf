use crate::application::ledger::WalletLedger;
use crate::domain::otp::{OtpCode, OtpGate};
use crate::domain::transaction::{Transaction, TransactionType};
use crate::error::{LedgerError, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Drives verified transactions into the ledger.
///
/// The coordinator never holds a wallet itself: it passes identifiers to the ledger,
/// which resolves them, locks them in identifier order, re-checks every limit under the
/// locks and applies the change together with the history entries.
pub struct TransferCoordinator {
    ledger: Arc<WalletLedger>,
    gate: Arc<OtpGate>,
}

impl TransferCoordinator {
    pub fn new(ledger: Arc<WalletLedger>, gate: Arc<OtpGate>) -> Self {
        Self { ledger, gate }
    }

    pub fn ledger(&self) -> &Arc<WalletLedger> {
        &self.ledger
    }

    pub fn gate(&self) -> &OtpGate {
        &self.gate
    }

    /// Claims the transaction's identifier so a second transaction with the same id is
    /// refused.
    pub fn admit(&self, tx: &Transaction) -> Result<()> {
        self.ledger.register_transaction(tx.id())
    }

    /// Issues a code bound to `identity` and attaches it to `tx`.
    pub fn issue_otp(&self, tx: &mut Transaction, identity: &str) -> Result<OtpCode> {
        let otp = self.gate.generate(identity);
        tx.attach_otp(otp.clone())?;
        Ok(otp)
    }

    pub fn verify_otp(&self, tx: &mut Transaction, input: &str) -> bool {
        tx.verify_otp(&self.gate, input)
    }

    /// Executes a pending, verified transaction and moves it to its terminal state.
    ///
    /// Returns `InvalidState` and changes nothing if the transaction is not pending or
    /// not verified. Otherwise the transaction ends `Completed` on `Ok` and `Failed` on
    /// `Err`, and the error says why.
    pub fn execute(&self, tx: &mut Transaction) -> Result<()> {
        tx.ensure_executable()?;

        let amount = tx.amount().value();
        let record = Some(tx.id());
        let outcome = match tx.kind() {
            TransactionType::Transfer => match tx.destination() {
                Some(destination) => {
                    self.ledger
                        .transfer_recorded(tx.source(), destination, amount, record)
                }
                None => Err(LedgerError::InvalidArgument(
                    "transfer without a destination wallet".to_string(),
                )),
            },
            TransactionType::Deposit => self.ledger.deposit_recorded(tx.source(), amount, record),
            TransactionType::Withdraw => {
                self.ledger.withdraw_recorded(tx.source(), amount, record)
            }
        };

        tx.finish(outcome.is_ok());
        match &outcome {
            Ok(()) => info!(tx = %tx.id(), kind = %tx.kind(), %amount, "transaction completed"),
            Err(e) => warn!(tx = %tx.id(), kind = %tx.kind(), %amount, error = %e, "transaction failed"),
        }
        outcome
    }
}
