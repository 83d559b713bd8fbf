//! Domain model: wallets, transactions, one-time codes, and the ports the
//! application layer talks to.

pub mod clock;
pub mod money;
pub mod otp;
pub mod ports;
pub mod transaction;
pub mod wallet;
