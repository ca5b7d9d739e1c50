pub mod aes;
pub mod attack;
pub mod config;
mod error;
pub mod layout;
pub mod modes;
pub mod oracle;
mod xor;

pub use attack::{extract_pin, AttackReport, KeyRecovery, RecoveredBlock};
pub use config::AttackConfig;
pub use error::{Error, Result};
pub use oracle::client::OracleClient;
pub use oracle::server::{spawn_server, FlawedOracle};
pub use oracle::{Challenge, Oracle};
pub use xor::{xor_block, xor_bytes};
