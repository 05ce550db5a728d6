pub mod fmt;
pub mod testing;
