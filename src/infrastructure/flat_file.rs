use crate::domain::ports::{TransactionStore, WalletStore};
use crate::domain::transaction::{Transaction, TransactionId};
use crate::domain::wallet::{WalletId, WalletSnapshot};
use crate::error::{LedgerError, Result};
use crate::interfaces::records::transaction_record::TransactionRecord;
use crate::interfaces::records::wallet_record::WalletRecord;
use crate::interfaces::records::{RecordReader, RecordWriter};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// File holding one wallet record per line.
pub const WALLETS_FILE: &str = "wallets.txt";
/// File holding one transaction record per line.
pub const TRANSACTIONS_FILE: &str = "transactions.txt";

const DATA_FILES: [&str; 2] = [WALLETS_FILE, TRANSACTIONS_FILE];

#[derive(Default)]
struct Image {
    wallets: BTreeMap<WalletId, WalletSnapshot>,
    transactions: Vec<Transaction>,
}

/// A persistent store that keeps wallets and transactions in two pipe-delimited text
/// files inside `data_dir`.
///
/// The store holds the whole data set in memory and rewrites the affected file on every
/// save, through a temporary file renamed into place. Clones share the same image.
#[derive(Clone)]
pub struct FlatFileStore {
    data_dir: Arc<PathBuf>,
    otp_ttl: Duration,
    image: Arc<Mutex<Image>>,
}

impl FlatFileStore {
    /// Opens (creating if needed) the data directory and loads whatever it holds.
    ///
    /// Missing files mean an empty store. Lines that fail to parse are logged and
    /// skipped.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Directory holding `wallets.txt` and `transactions.txt`.
    /// * `otp_ttl` - Lifetime assumed for one-time codes found in stored transactions.
    pub fn open<P: AsRef<Path>>(data_dir: P, otp_ttl: Duration) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        let image = read_image(&data_dir, otp_ttl, false)?;
        info!(
            dir = %data_dir.display(),
            wallets = image.wallets.len(),
            transactions = image.transactions.len(),
            "flat-file store opened"
        );
        Ok(Self {
            data_dir: Arc::new(data_dir),
            otp_ttl,
            image: Arc::new(Mutex::new(image)),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Copies both data files into a new `backup_<epochSeconds>` directory and returns
    /// its path.
    pub async fn backup(&self) -> Result<PathBuf> {
        let _image = self.image.lock().await;
        let backup_dir = self
            .data_dir
            .join(format!("backup_{}", Utc::now().timestamp()));
        fs::create_dir(&backup_dir)?;

        for file in DATA_FILES {
            let source = self.data_dir.join(file);
            if !source.exists() {
                warn!(file, "data file missing, not included in backup");
                continue;
            }
            fs::copy(&source, backup_dir.join(file))?;
        }
        info!(dir = %backup_dir.display(), "backup created");
        Ok(backup_dir)
    }

    /// Replaces the live data with a backup directory's files.
    ///
    /// The backup is copied to a scratch directory and parsed in full first; if any line
    /// is malformed nothing is replaced.
    pub async fn restore<P: AsRef<Path>>(&self, backup_dir: P) -> Result<()> {
        let backup_dir = backup_dir.as_ref();
        for file in DATA_FILES {
            if !backup_dir.join(file).is_file() {
                return Err(LedgerError::InvalidArgument(format!(
                    "backup {} is missing {file}",
                    backup_dir.display()
                )));
            }
        }

        let mut image = self.image.lock().await;
        let staging = tempfile::tempdir_in(self.data_dir.as_path())?;
        for file in DATA_FILES {
            fs::copy(backup_dir.join(file), staging.path().join(file))?;
        }
        let restored = read_image(staging.path(), self.otp_ttl, true)?;

        for file in DATA_FILES {
            fs::copy(staging.path().join(file), self.data_dir.join(file))?;
        }
        *image = restored;
        info!(from = %backup_dir.display(), "restore completed");
        Ok(())
    }

    fn write_wallets(&self, image: &Image) -> Result<()> {
        self.replace_file(WALLETS_FILE, |writer| {
            for snapshot in image.wallets.values() {
                writer.write(&WalletRecord::from(snapshot))?;
            }
            Ok(())
        })
    }

    fn write_transactions(&self, image: &Image) -> Result<()> {
        self.replace_file(TRANSACTIONS_FILE, |writer| {
            for tx in &image.transactions {
                writer.write(&TransactionRecord::from(tx))?;
            }
            Ok(())
        })
    }

    fn replace_file<F>(&self, name: &str, fill: F) -> Result<()>
    where
        F: FnOnce(&mut RecordWriter<BufWriter<&File>>) -> Result<()>,
    {
        let temp = NamedTempFile::new_in(self.data_dir.as_path())?;
        {
            let mut writer = RecordWriter::new(BufWriter::new(temp.as_file()));
            fill(&mut writer)?;
            writer.flush()?;
        }
        temp.persist(self.data_dir.join(name))
            .map_err(|e| LedgerError::Io(e.error))?;
        Ok(())
    }
}

fn read_image(dir: &Path, otp_ttl: Duration, strict: bool) -> Result<Image> {
    let mut image = Image::default();

    let wallets_path = dir.join(WALLETS_FILE);
    if wallets_path.exists() {
        let reader = RecordReader::new(File::open(&wallets_path)?);
        for (line, record) in reader.records::<WalletRecord>().enumerate() {
            match record.and_then(WalletSnapshot::try_from) {
                Ok(snapshot) => {
                    image.wallets.insert(snapshot.id.clone(), snapshot);
                }
                Err(e) if strict => return Err(e),
                Err(e) => warn!(file = WALLETS_FILE, line = line + 1, error = %e, "skipping wallet record"),
            }
        }
    }

    let transactions_path = dir.join(TRANSACTIONS_FILE);
    if transactions_path.exists() {
        let reader = RecordReader::new(File::open(&transactions_path)?);
        for (line, record) in reader.records::<TransactionRecord>().enumerate() {
            match record.and_then(|record| record.into_transaction(otp_ttl)) {
                Ok(tx) => image.transactions.push(tx),
                Err(e) if strict => return Err(e),
                Err(e) => warn!(file = TRANSACTIONS_FILE, line = line + 1, error = %e, "skipping transaction record"),
            }
        }
    }

    Ok(image)
}

#[async_trait]
impl WalletStore for FlatFileStore {
    async fn load_wallet(&self, id: &WalletId) -> Result<Option<WalletSnapshot>> {
        let image = self.image.lock().await;
        Ok(image.wallets.get(id).cloned())
    }

    async fn save_wallet(&self, mut snapshot: WalletSnapshot) -> Result<()> {
        let mut image = self.image.lock().await;
        snapshot.history.clear();
        image.wallets.insert(snapshot.id.clone(), snapshot);
        self.write_wallets(&image)
    }

    async fn all_wallets(&self) -> Result<Vec<WalletSnapshot>> {
        let image = self.image.lock().await;
        Ok(image.wallets.values().cloned().collect())
    }
}

#[async_trait]
impl TransactionStore for FlatFileStore {
    async fn save(&self, tx: Transaction) -> Result<()> {
        let mut image = self.image.lock().await;
        match image.transactions.iter_mut().find(|stored| stored.id() == tx.id()) {
            Some(stored) => *stored = tx,
            None => image.transactions.push(tx),
        }
        self.write_transactions(&image)
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let image = self.image.lock().await;
        Ok(image.transactions.iter().find(|tx| tx.id() == id).cloned())
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        let image = self.image.lock().await;
        Ok(image.transactions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Balance;
    use crate::domain::transaction::TransactionStatus;
    use crate::domain::wallet::{Wallet, WalletLimits};
    use chrono::DateTime;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn ttl() -> Duration {
        Duration::minutes(5)
    }

    fn snapshot(id: &str, balance: rust_decimal::Decimal) -> WalletSnapshot {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut snapshot = Wallet::new(WalletId::new(id).unwrap(), WalletLimits::default(), now)
            .unwrap()
            .snapshot();
        snapshot.balance = Balance::new(balance);
        snapshot
    }

    #[tokio::test]
    async fn test_open_empty_dir() {
        let dir = tempdir().unwrap();
        let store = FlatFileStore::open(dir.path().join("data"), ttl()).unwrap();
        assert!(store.all_wallets().await.unwrap().is_empty());
        assert!(store.all_transactions().await.unwrap().is_empty());
        assert!(store.data_dir().is_dir());
    }

    #[tokio::test]
    async fn test_wallets_survive_reopen() {
        let dir = tempdir().unwrap();
        let store = FlatFileStore::open(dir.path(), ttl()).unwrap();
        let alice = snapshot("alice", dec!(12.5));
        store.save_wallet(alice.clone()).await.unwrap();
        store.save_wallet(snapshot("bob", dec!(0))).await.unwrap();

        let content = fs::read_to_string(dir.path().join(WALLETS_FILE)).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.starts_with("alice|12.5|1000000|10000000|0|1700000000\n"));

        let reopened = FlatFileStore::open(dir.path(), ttl()).unwrap();
        let loaded = reopened.load_wallet(&alice.id).await.unwrap().unwrap();
        assert_eq!(loaded, alice);
    }

    #[tokio::test]
    async fn test_transactions_upsert_and_reopen() {
        let dir = tempdir().unwrap();
        let store = FlatFileStore::open(dir.path(), ttl()).unwrap();
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut tx = Transaction::deposit(WalletId::new("alice").unwrap(), dec!(3), now).unwrap();

        store.save(tx.clone()).await.unwrap();
        tx.cancel();
        store.save(tx.clone()).await.unwrap();

        let reopened = FlatFileStore::open(dir.path(), ttl()).unwrap();
        let all = reopened.all_transactions().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status(), TransactionStatus::Cancelled);
        assert_eq!(reopened.get(tx.id()).await.unwrap(), Some(tx));
    }

    #[tokio::test]
    async fn test_malformed_lines_skipped_on_open() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(WALLETS_FILE),
            "alice|10|1000000|10000000|0|1700000000\nbroken|line\nbob|1|1000000|10000000|0|1700000000\n",
        )
        .unwrap();

        let store = FlatFileStore::open(dir.path(), ttl()).unwrap();
        let ids: Vec<String> = store
            .all_wallets()
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.id.to_string())
            .collect();
        assert_eq!(ids, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_short_first_line_does_not_hide_later_records() {
        let dir = tempdir().unwrap();
        {
            let store = FlatFileStore::open(dir.path(), ttl()).unwrap();
            let tx = Transaction::deposit(WalletId::new("alice").unwrap(), dec!(3), Utc::now()).unwrap();
            store.save(tx).await.unwrap();
        }
        let transactions = dir.path().join(TRANSACTIONS_FILE);
        let content = fs::read_to_string(&transactions).unwrap();
        fs::write(&transactions, format!("x|y\n{content}")).unwrap();
        fs::write(
            dir.path().join(WALLETS_FILE),
            "broken|line\nalice|10|1000000|10000000|0|1700000000\nbob|1|1000000|10000000|0|1700000000\n",
        )
        .unwrap();

        let store = FlatFileStore::open(dir.path(), ttl()).unwrap();
        let ids: Vec<String> = store
            .all_wallets()
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.id.to_string())
            .collect();
        assert_eq!(ids, vec!["alice", "bob"]);
        assert_eq!(store.all_transactions().await.unwrap().len(), 1);

        store.save_wallet(snapshot("carol", dec!(2))).await.unwrap();
        let reopened = FlatFileStore::open(dir.path(), ttl()).unwrap();
        assert_eq!(reopened.all_wallets().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_backup_and_restore() {
        let dir = tempdir().unwrap();
        let store = FlatFileStore::open(dir.path(), ttl()).unwrap();
        store.save_wallet(snapshot("alice", dec!(100))).await.unwrap();
        let tx = Transaction::deposit(WalletId::new("alice").unwrap(), dec!(3), Utc::now()).unwrap();
        store.save(tx).await.unwrap();

        let backup = store.backup().await.unwrap();
        assert!(backup.join(WALLETS_FILE).is_file());
        assert!(backup.join(TRANSACTIONS_FILE).is_file());

        store.save_wallet(snapshot("alice", dec!(1))).await.unwrap();
        store.save_wallet(snapshot("carol", dec!(5))).await.unwrap();

        store.restore(&backup).await.unwrap();

        let wallets = store.all_wallets().await.unwrap();
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].balance, Balance::new(dec!(100)));
        assert_eq!(store.all_transactions().await.unwrap().len(), 1);

        let reopened = FlatFileStore::open(dir.path(), ttl()).unwrap();
        assert_eq!(reopened.all_wallets().await.unwrap(), wallets);
    }

    #[tokio::test]
    async fn test_restore_rejects_incomplete_or_corrupt_backup() {
        let dir = tempdir().unwrap();
        let store = FlatFileStore::open(dir.path().join("live"), ttl()).unwrap();
        store.save_wallet(snapshot("alice", dec!(100))).await.unwrap();

        let incomplete = dir.path().join("incomplete");
        fs::create_dir(&incomplete).unwrap();
        fs::write(incomplete.join(WALLETS_FILE), "").unwrap();
        assert!(matches!(
            store.restore(&incomplete).await,
            Err(LedgerError::InvalidArgument(_))
        ));

        let corrupt = dir.path().join("corrupt");
        fs::create_dir(&corrupt).unwrap();
        fs::write(corrupt.join(WALLETS_FILE), "x|not-a-number|1|1|0|0\n").unwrap();
        fs::write(corrupt.join(TRANSACTIONS_FILE), "").unwrap();
        assert!(store.restore(&corrupt).await.is_err());

        let wallets = store.all_wallets().await.unwrap();
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].balance, Balance::new(dec!(100)));
    }
}
