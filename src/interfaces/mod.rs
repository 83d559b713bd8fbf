//! Adapters between the ledger and the outside world: the on-disk line formats and the
//! console code delivery used by the binary.

pub mod console;
pub mod records;
