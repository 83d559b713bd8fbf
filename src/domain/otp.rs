//! One-time codes gating transaction execution.
//!
//! Codes come from `SmallRng`, which is not a cryptographic generator, and are compared
//! with plain string equality. Both are known weaknesses of this ledger; a deployment that
//! needs real protection has to replace the generator and use a constant-time compare.

use crate::domain::clock::SharedClock;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub const OTP_DIGITS: usize = 6;
pub const DEFAULT_OTP_TTL_SECS: i64 = 5 * 60;

const OTP_SPACE: u32 = 1_000_000;

/// A code issued to an identity, valid until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpCode {
    code: String,
    identity: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl OtpCode {
    /// Rebuilds a code read back from storage, assuming it was issued at `issued_at`.
    pub fn restore(
        code: impl Into<String>,
        identity: impl Into<String>,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self> {
        let code = code.into();
        if code.len() != OTP_DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LedgerError::Record(format!("invalid one-time code '{code}'")));
        }
        Ok(Self {
            code,
            identity: identity.into(),
            issued_at,
            expires_at: issued_at + ttl,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Issues and checks one-time codes against a shared clock.
#[derive(Debug)]
pub struct OtpGate {
    clock: SharedClock,
    rng: Mutex<SmallRng>,
    ttl: Duration,
}

impl OtpGate {
    pub fn new(clock: SharedClock, ttl: Duration) -> Self {
        Self {
            clock,
            rng: Mutex::new(SmallRng::from_entropy()),
            ttl,
        }
    }

    /// A gate whose code sequence is reproducible from `seed`.
    pub fn with_seed(clock: SharedClock, ttl: Duration, seed: u64) -> Self {
        Self {
            clock,
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn generate(&self, identity: &str) -> OtpCode {
        let value = self.rng.lock().gen_range(0..OTP_SPACE);
        let issued_at = self.clock.now();
        OtpCode {
            code: format!("{value:0width$}", width = OTP_DIGITS),
            identity: identity.to_string(),
            issued_at,
            expires_at: issued_at + self.ttl,
        }
    }

    pub fn is_valid(&self, otp: &OtpCode) -> bool {
        self.clock.now() < otp.expires_at
    }

    pub fn verify(&self, otp: &OtpCode, input: &str) -> bool {
        self.is_valid(otp) && input == otp.code
    }

    /// Like [`OtpGate::verify`], but says why a code was rejected.
    pub fn check(&self, otp: &OtpCode, input: &str) -> Result<()> {
        if !self.is_valid(otp) {
            return Err(LedgerError::OtpExpired);
        }
        if input != otp.code {
            return Err(LedgerError::OtpMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use std::sync::Arc;

    fn gate(clock: &ManualClock) -> OtpGate {
        OtpGate::with_seed(
            Arc::new(clock.clone()),
            Duration::seconds(DEFAULT_OTP_TTL_SECS),
            7,
        )
    }

    #[test]
    fn test_generate_six_digit_code() {
        let clock = ManualClock::default();
        let gate = gate(&clock);
        for _ in 0..100 {
            let otp = gate.generate("alice");
            assert_eq!(otp.code().len(), OTP_DIGITS);
            assert!(otp.code().bytes().all(|b| b.is_ascii_digit()));
            assert_eq!(otp.identity(), "alice");
            assert_eq!(otp.expires_at() - otp.issued_at(), Duration::minutes(5));
        }
    }

    #[test]
    fn test_seeded_gates_agree() {
        let clock = ManualClock::default();
        let first = gate(&clock).generate("a");
        let second = gate(&clock).generate("a");
        assert_eq!(first.code(), second.code());
    }

    #[test]
    fn test_verify_before_and_after_expiry() {
        let clock = ManualClock::default();
        let gate = gate(&clock);
        let otp = gate.generate("alice");
        let code = otp.code().to_string();

        assert!(gate.verify(&otp, &code));
        assert!(!gate.verify(&otp, "not-it"));

        clock.advance(Duration::seconds(DEFAULT_OTP_TTL_SECS - 1));
        assert!(gate.is_valid(&otp));

        clock.advance(Duration::seconds(1));
        assert!(!gate.is_valid(&otp));
        assert!(!gate.verify(&otp, &code));
    }

    #[test]
    fn test_check_reports_reason() {
        let clock = ManualClock::default();
        let gate = gate(&clock);
        let otp = gate.generate("alice");
        let code = otp.code().to_string();

        assert!(gate.check(&otp, &code).is_ok());
        assert!(matches!(gate.check(&otp, "x"), Err(LedgerError::OtpMismatch)));

        clock.advance(Duration::minutes(6));
        assert!(matches!(gate.check(&otp, &code), Err(LedgerError::OtpExpired)));
    }

    #[test]
    fn test_restore_rejects_malformed_code() {
        let now = Utc::now();
        let ttl = Duration::minutes(5);
        assert!(OtpCode::restore("012345", "w", now, ttl).is_ok());
        assert!(matches!(
            OtpCode::restore("12a456", "w", now, ttl),
            Err(LedgerError::Record(_))
        ));
        assert!(matches!(
            OtpCode::restore("1234", "w", now, ttl),
            Err(LedgerError::Record(_))
        ));
    }
}
