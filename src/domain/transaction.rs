use crate::domain::money::Amount;
use crate::domain::otp::{OtpCode, OtpGate};
use crate::domain::wallet::WalletId;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

thread_local! {
    static ID_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_entropy());
}

/// 128-bit random transaction identifier, rendered as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionId(u128);

impl TransactionId {
    pub fn generate() -> Self {
        Self(ID_RNG.with(|rng| rng.borrow_mut().r#gen::<u128>()))
    }

    pub fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(LedgerError::Record(format!("invalid transaction id '{s}'")));
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| LedgerError::Record(format!("invalid transaction id '{s}': {e}")))
    }
}

impl TryFrom<String> for TransactionId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TransactionId> for String {
    fn from(id: TransactionId) -> Self {
        id.to_string()
    }
}

/// Kind of movement. The numeric codes are the persisted representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Transfer,
    Deposit,
    Withdraw,
}

impl TransactionType {
    pub fn code(&self) -> u8 {
        match self {
            TransactionType::Transfer => 0,
            TransactionType::Deposit => 1,
            TransactionType::Withdraw => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TransactionType::Transfer),
            1 => Some(TransactionType::Deposit),
            2 => Some(TransactionType::Withdraw),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionType::Transfer => "TRANSFER",
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdraw => "WITHDRAW",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn code(&self) -> u8 {
        match self {
            TransactionStatus::Pending => 0,
            TransactionStatus::Completed => 1,
            TransactionStatus::Failed => 2,
            TransactionStatus::Cancelled => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TransactionStatus::Pending),
            1 => Some(TransactionStatus::Completed),
            2 => Some(TransactionStatus::Failed),
            3 => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Cancelled => "CANCELLED",
        })
    }
}

/// Every field of a transaction, used to bring one back from storage.
#[derive(Debug, Clone)]
pub struct TransactionParts {
    pub id: TransactionId,
    pub source: WalletId,
    pub destination: Option<WalletId>,
    pub amount: Decimal,
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub otp: Option<OtpCode>,
    pub otp_verified: bool,
}

/// A single intended movement of funds.
///
/// Starts `Pending` and moves to exactly one terminal state. It names its wallets by
/// identifier; the ledger resolves them when the transaction executes. Lifecycle
/// methods take `&mut self`, so one owner drives each transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    id: TransactionId,
    source: WalletId,
    destination: Option<WalletId>,
    amount: Amount,
    kind: TransactionType,
    status: TransactionStatus,
    created_at: DateTime<Utc>,
    description: String,
    otp: Option<OtpCode>,
    otp_verified: bool,
}

impl Transaction {
    /// Validates the request and creates a `Pending` transaction.
    ///
    /// Transfers need a destination distinct from the source. Deposits and withdrawals
    /// act on `source` alone and must not name a destination.
    pub fn new(
        kind: TransactionType,
        source: WalletId,
        destination: Option<WalletId>,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let amount = Amount::new(amount)?;
        match (kind, &destination) {
            (TransactionType::Transfer, None) => {
                return Err(LedgerError::InvalidArgument(
                    "transfer needs a destination wallet".to_string(),
                ));
            }
            (TransactionType::Transfer, Some(destination)) if *destination == source => {
                return Err(LedgerError::InvalidArgument(
                    "source and destination wallets must be different".to_string(),
                ));
            }
            (TransactionType::Deposit | TransactionType::Withdraw, Some(_)) => {
                return Err(LedgerError::InvalidArgument(format!(
                    "{kind} acts on a single wallet and takes no destination"
                )));
            }
            _ => {}
        }

        Ok(Self {
            id: TransactionId::generate(),
            source,
            destination,
            amount,
            kind,
            status: TransactionStatus::Pending,
            created_at: now,
            description: String::new(),
            otp: None,
            otp_verified: false,
        })
    }

    pub fn transfer(
        source: WalletId,
        destination: WalletId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(TransactionType::Transfer, source, Some(destination), amount, now)
    }

    pub fn deposit(wallet: WalletId, amount: Decimal, now: DateTime<Utc>) -> Result<Self> {
        Self::new(TransactionType::Deposit, wallet, None, amount, now)
    }

    pub fn withdraw(wallet: WalletId, amount: Decimal, now: DateTime<Utc>) -> Result<Self> {
        Self::new(TransactionType::Withdraw, wallet, None, amount, now)
    }

    /// Rebuilds a persisted transaction, applying the same checks as construction.
    pub fn restore(parts: TransactionParts) -> Result<Self> {
        let mut tx = Self::new(
            parts.kind,
            parts.source,
            parts.destination,
            parts.amount,
            parts.created_at,
        )?;
        tx.id = parts.id;
        tx.status = parts.status;
        tx.description = parts.description;
        tx.otp = parts.otp;
        tx.otp_verified = parts.otp_verified;
        Ok(tx)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn source(&self) -> &WalletId {
        &self.source
    }

    pub fn destination(&self) -> Option<&WalletId> {
        self.destination.as_ref()
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn kind(&self) -> TransactionType {
        self.kind
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn otp(&self) -> Option<&OtpCode> {
        self.otp.as_ref()
    }

    pub fn is_otp_verified(&self) -> bool {
        self.otp_verified
    }

    /// Wallets this transaction touches, source first.
    pub fn wallets(&self) -> impl Iterator<Item = &WalletId> {
        std::iter::once(&self.source).chain(self.destination.as_ref())
    }

    /// Binds a freshly issued code. Any earlier verification is discarded.
    pub fn attach_otp(&mut self, otp: OtpCode) -> Result<()> {
        if self.status.is_terminal() {
            return Err(LedgerError::InvalidState(format!(
                "transaction {} is {}",
                self.id, self.status
            )));
        }
        self.otp = Some(otp);
        self.otp_verified = false;
        Ok(())
    }

    /// Records whether `input` matches the attached, unexpired code.
    ///
    /// Returns false without touching anything when no code is attached, `input` is
    /// empty, or the transaction is already terminal. Never changes the status.
    pub fn verify_otp(&mut self, gate: &OtpGate, input: &str) -> bool {
        if input.is_empty() || self.status.is_terminal() {
            return false;
        }
        let Some(otp) = &self.otp else {
            return false;
        };
        self.otp_verified = gate.verify(otp, input);
        self.otp_verified
    }

    /// Fails with `InvalidState` unless the transaction is pending and verified.
    pub fn ensure_executable(&self) -> Result<()> {
        if self.status != TransactionStatus::Pending {
            return Err(LedgerError::InvalidState(format!(
                "transaction {} is {}",
                self.id, self.status
            )));
        }
        if !self.otp_verified {
            return Err(LedgerError::InvalidState(format!(
                "transaction {} has not passed one-time code verification",
                self.id
            )));
        }
        Ok(())
    }

    pub fn cancel(&mut self) -> bool {
        if self.status != TransactionStatus::Pending {
            return false;
        }
        self.status = TransactionStatus::Cancelled;
        true
    }

    pub(crate) fn finish(&mut self, succeeded: bool) {
        if self.status == TransactionStatus::Pending {
            self.status = if succeeded {
                TransactionStatus::Completed
            } else {
                TransactionStatus::Failed
            };
        }
    }
}
