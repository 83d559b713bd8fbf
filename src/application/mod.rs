//! Application layer: the shared wallet ledger, the coordinator that drives verified
//! transactions into it, and the async engine that adds persistence and code delivery.
//!
//! Ledger and coordinator are synchronous and safe to call from any number of OS
//! threads. The engine awaits its stores only after every wallet lock is released.

pub mod coordinator;
pub mod engine;
pub mod ledger;
