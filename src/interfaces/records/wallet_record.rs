use super::from_epoch_seconds;
use crate::domain::money::Balance;
use crate::domain::wallet::{WalletId, WalletSnapshot};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `id|balance|dailyTransferLimit|maxBalance|dailyTransferCount|lastTransferResetEpochSeconds`
///
/// History is not part of the line; it is rebuilt from stored transactions on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub id: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub daily_transfer_limit: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_balance: Decimal,
    pub daily_transfer_count: u32,
    pub last_transfer_reset: i64,
}

impl From<&WalletSnapshot> for WalletRecord {
    fn from(snapshot: &WalletSnapshot) -> Self {
        Self {
            id: snapshot.id.to_string(),
            balance: snapshot.balance.value(),
            daily_transfer_limit: snapshot.daily_transfer_limit,
            max_balance: snapshot.max_balance,
            daily_transfer_count: snapshot.daily_transfer_count,
            last_transfer_reset: snapshot.last_transfer_reset.timestamp(),
        }
    }
}

impl TryFrom<WalletRecord> for WalletSnapshot {
    type Error = LedgerError;

    fn try_from(record: WalletRecord) -> Result<Self> {
        let id = WalletId::new(record.id)
            .map_err(|e| LedgerError::Record(format!("wallet record: {e}")))?;
        Ok(Self {
            id,
            balance: Balance::new(record.balance),
            daily_transfer_limit: record.daily_transfer_limit,
            max_balance: record.max_balance,
            daily_transfer_count: record.daily_transfer_count,
            last_transfer_reset: from_epoch_seconds(record.last_transfer_reset)?,
            history: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::records::{RecordReader, RecordWriter};
    use rust_decimal_macros::dec;

    #[test]
    fn test_wallet_line_layout() {
        let record = WalletRecord {
            id: "alice".to_string(),
            balance: dec!(150.25),
            daily_transfer_limit: dec!(1000000),
            max_balance: dec!(10000000),
            daily_transfer_count: 3,
            last_transfer_reset: 1_700_000_000,
        };

        let mut buf = Vec::new();
        {
            let mut writer = RecordWriter::new(&mut buf);
            writer.write(&record).unwrap();
            writer.flush().unwrap();
        }
        let line = String::from_utf8(buf).unwrap();
        assert_eq!(line, "alice|150.25|1000000|10000000|3|1700000000\n");
    }

    #[test]
    fn test_read_wallet_lines() {
        let data = "alice|100|1000000|10000000|0|1700000000\n\nbob|0.0001|50|60|10|1700000100\n";
        let records: Vec<Result<WalletRecord>> =
            RecordReader::new(data.as_bytes()).records().collect();

        assert_eq!(records.len(), 2);
        let bob = records[1].as_ref().unwrap();
        assert_eq!(bob.id, "bob");
        assert_eq!(bob.balance, dec!(0.0001));
        assert_eq!(bob.daily_transfer_count, 10);

        let snapshot = WalletSnapshot::try_from(bob.clone()).unwrap();
        assert_eq!(snapshot.last_transfer_reset.timestamp(), 1_700_000_100);
        assert!(snapshot.history.is_empty());
    }

    #[test]
    fn test_malformed_wallet_line() {
        let data = "alice|lots|1000000|10000000|0|1700000000\nbob|1|2|3|4\n";
        let records: Vec<Result<WalletRecord>> =
            RecordReader::new(data.as_bytes()).records().collect();
        assert!(records[0].is_err());
        assert!(records[1].is_err());
    }

    #[test]
    fn test_empty_wallet_id_rejected() {
        let record = WalletRecord {
            id: String::new(),
            balance: dec!(1),
            daily_transfer_limit: dec!(1),
            max_balance: dec!(1),
            daily_transfer_count: 0,
            last_transfer_reset: 0,
        };
        assert!(matches!(
            WalletSnapshot::try_from(record),
            Err(LedgerError::Record(_))
        ));
    }
}
