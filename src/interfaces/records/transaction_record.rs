use super::from_epoch_seconds;
use crate::domain::otp::OtpCode;
use crate::domain::transaction::{
    Transaction, TransactionParts, TransactionStatus, TransactionType,
};
use crate::domain::wallet::WalletId;
use crate::error::{LedgerError, Result};
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `id|sourceId|destinationId|amount|typeCode|statusCode|timestampEpochSeconds|description|otpCode|verifiedFlag`
///
/// An absent destination or code is written as an empty field; the verified flag is
/// `0` or `1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub source: String,
    pub destination: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub type_code: u8,
    pub status_code: u8,
    pub timestamp: i64,
    pub description: String,
    pub otp_code: String,
    pub verified: u8,
}

impl From<&Transaction> for TransactionRecord {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id().to_string(),
            source: tx.source().to_string(),
            destination: tx.destination().map(ToString::to_string).unwrap_or_default(),
            amount: tx.amount().value(),
            type_code: tx.kind().code(),
            status_code: tx.status().code(),
            timestamp: tx.created_at().timestamp(),
            description: tx.description().to_string(),
            otp_code: tx.otp().map(|otp| otp.code().to_string()).unwrap_or_default(),
            verified: u8::from(tx.is_otp_verified()),
        }
    }
}

impl TransactionRecord {
    /// Decodes the line into a transaction. A stored code is taken to have been issued
    /// when the transaction was created, so it expires `otp_ttl` after `timestamp`.
    pub fn into_transaction(self, otp_ttl: Duration) -> Result<Transaction> {
        let kind = TransactionType::from_code(self.type_code).ok_or_else(|| {
            LedgerError::Record(format!("unknown transaction type code {}", self.type_code))
        })?;
        let status = TransactionStatus::from_code(self.status_code).ok_or_else(|| {
            LedgerError::Record(format!("unknown transaction status code {}", self.status_code))
        })?;
        let otp_verified = match self.verified {
            0 => false,
            1 => true,
            other => {
                return Err(LedgerError::Record(format!("invalid verified flag {other}")));
            }
        };
        let created_at = from_epoch_seconds(self.timestamp)?;
        let source = WalletId::new(self.source)
            .map_err(|e| LedgerError::Record(format!("transaction record: {e}")))?;
        let destination = if self.destination.is_empty() {
            None
        } else {
            Some(
                WalletId::new(self.destination)
                    .map_err(|e| LedgerError::Record(format!("transaction record: {e}")))?,
            )
        };
        let otp = if self.otp_code.is_empty() {
            None
        } else {
            Some(OtpCode::restore(self.otp_code, source.as_str(), created_at, otp_ttl)?)
        };

        Transaction::restore(TransactionParts {
            id: self.id.parse()?,
            source,
            destination,
            amount: self.amount,
            kind,
            status,
            created_at,
            description: self.description,
            otp,
            otp_verified,
        })
        .map_err(|e| match e {
            LedgerError::InvalidArgument(msg) => LedgerError::Record(msg),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::{Clock, ManualClock};
    use crate::domain::otp::OtpGate;
    use crate::interfaces::records::{RecordReader, RecordWriter};
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn ttl() -> Duration {
        Duration::minutes(5)
    }

    fn encode(record: &TransactionRecord) -> String {
        let mut buf = Vec::new();
        {
            let mut writer = RecordWriter::new(&mut buf);
            writer.write(record).unwrap();
            writer.flush().unwrap();
        }
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_transfer_line_layout() {
        let record = TransactionRecord {
            id: "0123456789abcdef0123456789abcdef".to_string(),
            source: "alice".to_string(),
            destination: "bob".to_string(),
            amount: dec!(50),
            type_code: 0,
            status_code: 1,
            timestamp: 1_700_000_000,
            description: "rent".to_string(),
            otp_code: "004211".to_string(),
            verified: 1,
        };
        assert_eq!(
            encode(&record),
            "0123456789abcdef0123456789abcdef|alice|bob|50|0|1|1700000000|rent|004211|1\n"
        );
    }

    #[test]
    fn test_deposit_line_has_empty_destination() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let tx = Transaction::deposit(WalletId::new("alice").unwrap(), dec!(7.5), now).unwrap();
        let line = encode(&TransactionRecord::from(&tx));
        let fields: Vec<&str> = line.trim_end().split('|').collect();

        assert_eq!(fields.len(), 10);
        assert_eq!(fields[1], "alice");
        assert_eq!(fields[2], "");
        assert_eq!(fields[3], "7.5");
        assert_eq!(fields[4], "1");
        assert_eq!(fields[5], "0");
        assert_eq!(fields[8], "");
        assert_eq!(fields[9], "0");
    }

    #[test]
    fn test_description_with_delimiter_survives() {
        let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let gate = OtpGate::with_seed(Arc::new(clock.clone()), ttl(), 5);
        let mut tx = Transaction::transfer(
            WalletId::new("a").unwrap(),
            WalletId::new("b").unwrap(),
            dec!(1.25),
            clock.now(),
        )
        .unwrap()
        .with_description("split | dinner");
        let otp = gate.generate("a");
        let code = otp.code().to_string();
        tx.attach_otp(otp).unwrap();
        assert!(tx.verify_otp(&gate, &code));

        let line = encode(&TransactionRecord::from(&tx));
        let mut records: Vec<Result<TransactionRecord>> =
            RecordReader::new(line.as_bytes()).records().collect();
        let decoded = records.remove(0).unwrap().into_transaction(ttl()).unwrap();

        assert_eq!(decoded, tx);
        assert_eq!(decoded.description(), "split | dinner");
    }

    #[test]
    fn test_restored_code_expires_from_creation() {
        let created = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let record = TransactionRecord {
            id: "0000000000000000000000000000000a".to_string(),
            source: "a".to_string(),
            destination: String::new(),
            amount: dec!(1),
            type_code: 2,
            status_code: 0,
            timestamp: created.timestamp(),
            description: String::new(),
            otp_code: "123456".to_string(),
            verified: 0,
        };
        let tx = record.into_transaction(ttl()).unwrap();
        let otp = tx.otp().unwrap();
        assert_eq!(otp.expires_at(), created + ttl());
        assert_eq!(otp.identity(), "a");

        let clock = ManualClock::new(created + Duration::minutes(10));
        let gate = OtpGate::with_seed(Arc::new(clock), ttl(), 0);
        let mut tx = tx;
        assert!(!tx.verify_otp(&gate, "123456"));
    }

    #[test]
    fn test_rejects_unknown_codes() {
        let base = TransactionRecord {
            id: "0000000000000000000000000000000b".to_string(),
            source: "a".to_string(),
            destination: "b".to_string(),
            amount: dec!(1),
            type_code: 0,
            status_code: 0,
            timestamp: Utc::now().timestamp(),
            description: String::new(),
            otp_code: String::new(),
            verified: 0,
        };

        let mut bad_type = base.clone();
        bad_type.type_code = 9;
        assert!(matches!(bad_type.into_transaction(ttl()), Err(LedgerError::Record(_))));

        let mut bad_status = base.clone();
        bad_status.status_code = 4;
        assert!(matches!(bad_status.into_transaction(ttl()), Err(LedgerError::Record(_))));

        let mut bad_flag = base.clone();
        bad_flag.verified = 2;
        assert!(matches!(bad_flag.into_transaction(ttl()), Err(LedgerError::Record(_))));

        let mut same_wallets = base.clone();
        same_wallets.destination = "a".to_string();
        assert!(matches!(same_wallets.into_transaction(ttl()), Err(LedgerError::Record(_))));

        let mut bad_id = base;
        bad_id.id = "short".to_string();
        assert!(matches!(bad_id.into_transaction(ttl()), Err(LedgerError::Record(_))));
    }
}
