pub mod btle;
pub mod codec;
pub mod constants;
pub mod control;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod manager;
pub mod permissions;
pub mod scanner;
pub mod transport;
pub mod types;
