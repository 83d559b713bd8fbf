use crate::domain::otp::DEFAULT_OTP_TTL_SECS;
use crate::domain::wallet::{
    DEFAULT_DAILY_TRANSFER_LIMIT, DEFAULT_DAILY_WINDOW_SECS, DEFAULT_MAX_BALANCE,
    DEFAULT_MAX_DAILY_TRANSFERS, TransferPolicy, WalletLimits,
};
use crate::error::{LedgerError, Result};
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Runtime settings. Every field has a default, so a config file only needs the keys
/// it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub log_level: String,
    pub wallet_defaults: WalletDefaults,
    pub transfer_policy: TransferPolicyConfig,
    pub otp: OtpConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletDefaults {
    pub daily_transfer_limit: Decimal,
    pub max_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferPolicyConfig {
    pub max_daily_transfers: u32,
    pub daily_window_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
    pub ttl_secs: i64,
    /// Fixed seed for the code generator. Makes codes predictable; test setups only.
    pub seed: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            wallet_defaults: WalletDefaults::default(),
            transfer_policy: TransferPolicyConfig::default(),
            otp: OtpConfig::default(),
        }
    }
}

impl Default for WalletDefaults {
    fn default() -> Self {
        Self {
            daily_transfer_limit: DEFAULT_DAILY_TRANSFER_LIMIT,
            max_balance: DEFAULT_MAX_BALANCE,
        }
    }
}

impl Default for TransferPolicyConfig {
    fn default() -> Self {
        Self {
            max_daily_transfers: DEFAULT_MAX_DAILY_TRANSFERS,
            daily_window_secs: DEFAULT_DAILY_WINDOW_SECS,
        }
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_OTP_TTL_SECS,
            seed: None,
        }
    }
}

impl LedgerConfig {
    /// Reads a JSON config file, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                serde_json::from_str::<Self>(&content)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.wallet_defaults.daily_transfer_limit < Decimal::ZERO
            || self.wallet_defaults.max_balance < Decimal::ZERO
        {
            return Err(LedgerError::InvalidArgument(
                "wallet default limits cannot be negative".to_string(),
            ));
        }
        if self.transfer_policy.daily_window_secs <= 0 {
            return Err(LedgerError::InvalidArgument(
                "daily_window_secs must be positive".to_string(),
            ));
        }
        if self.otp.ttl_secs <= 0 {
            return Err(LedgerError::InvalidArgument(
                "otp ttl_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn wallet_limits(&self) -> WalletLimits {
        WalletLimits {
            daily_transfer_limit: self.wallet_defaults.daily_transfer_limit,
            max_balance: self.wallet_defaults.max_balance,
        }
    }

    pub fn transfer_policy(&self) -> TransferPolicy {
        TransferPolicy {
            max_daily_transfers: self.transfer_policy.max_daily_transfers,
            daily_window: Duration::seconds(self.transfer_policy.daily_window_secs),
        }
    }

    pub fn otp_ttl(&self) -> Duration {
        Duration::seconds(self.otp.ttl_secs)
    }
}
