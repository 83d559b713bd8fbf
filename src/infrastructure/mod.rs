pub mod flat_file;
pub mod in_memory;
