use crate::domain::otp::OtpCode;
use crate::domain::ports::OtpNotifier;
use crate::error::Result;
use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stderr, stderr};
use tokio::sync::Mutex;

/// Delivers codes by printing them on standard error, one line each.
pub struct ConsoleNotifier {
    out: Mutex<Stderr>,
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(stderr()),
        }
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_delivery(otp: &OtpCode) -> String {
    format!(
        "OTP for {}: {} (expires {})\n",
        otp.identity(),
        otp.code(),
        otp.expires_at().format("%H:%M:%S UTC")
    )
}

#[async_trait]
impl OtpNotifier for ConsoleNotifier {
    async fn deliver(&self, otp: &OtpCode) -> Result<()> {
        let mut out = self.out.lock().await;
        out.write_all(format_delivery(otp).as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};

    #[test]
    fn test_delivery_line() {
        let issued = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let otp = OtpCode::restore("042424", "alice", issued, Duration::minutes(5)).unwrap();
        assert_eq!(
            format_delivery(&otp),
            "OTP for alice: 042424 (expires 22:18:20 UTC)\n"
        );
    }
}
