use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::layout::{
    BLOCK_SIZE, COUNTER_OFFSET, LEAKED_KEY_LEN, MAX_REQUEST_LEN, PIN_END_TRIM, PIN_START,
    TRIAL_LEN,
};
use crate::{Error, Result};

/// Tunables for a run. Defaults describe the original target; a JSON file
/// only needs the fields it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttackConfig {
    /// First ciphertext block to recover.
    pub start_block: usize,
    /// One past the last block to recover. `None` means every block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_block: Option<usize>,
    pub counter_offset: u32,
    pub known_key_len: usize,
    pub max_request_len: usize,
    pub pin_start: usize,
    pub pin_end_trim: usize,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            end_block: None,
            counter_offset: COUNTER_OFFSET,
            known_key_len: LEAKED_KEY_LEN,
            max_request_len: MAX_REQUEST_LEN,
            pin_start: PIN_START,
            pin_end_trim: PIN_END_TRIM,
        }
    }
}

impl AttackConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(BLOCK_SIZE - 2..=BLOCK_SIZE).contains(&self.known_key_len) {
            return Err(Error::InvalidConfig(format!(
                "known_key_len must be between {} and {BLOCK_SIZE}, got {}",
                BLOCK_SIZE - 2,
                self.known_key_len
            )));
        }
        if self.max_request_len < TRIAL_LEN {
            return Err(Error::InvalidConfig(format!(
                "max_request_len must fit at least one {TRIAL_LEN} byte trial, got {}",
                self.max_request_len
            )));
        }
        if let Some(end) = self.end_block {
            if end <= self.start_block {
                return Err(Error::InvalidConfig(format!(
                    "end_block ({end}) must be greater than start_block ({})",
                    self.start_block
                )));
            }
        }
        Ok(())
    }

    pub fn trials_per_request(&self) -> usize {
        self.max_request_len / TRIAL_LEN
    }

    /// Number of trial keys per block: every value of the unleaked tail.
    pub fn search_space(&self) -> usize {
        1 << (8 * (BLOCK_SIZE - self.known_key_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[test]
    fn default_matches_target_layout() {
        let config = AttackConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.trials_per_request(), 16);
        assert_eq!(config.search_space(), 65536);
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config: AttackConfig =
            serde_json::from_str(r#"{"start_block": 1, "end_block": 18}"#).unwrap();

        assert_eq!(config.start_block, 1);
        assert_eq!(config.end_block, Some(18));
        assert_eq!(config.counter_offset, COUNTER_OFFSET);
        assert_eq!(config.pin_start, PIN_START);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<AttackConfig>(r#"{"start_blok": 1}"#);

        assert!(result.is_err());
    }

    #[test]
    fn from_file_reads_and_validates() {
        let path = std::env::temp_dir().join(format!("ctrleak-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"max_request_len": 16}"#).unwrap();

        let result = AttackConfig::from_file(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[rstest]
    #[case(13)]
    #[case(17)]
    fn known_key_len_outside_searchable_range_is_rejected(#[case] known_key_len: usize) {
        let config = AttackConfig {
            known_key_len,
            ..Default::default()
        };

        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[rstest]
    #[case(14, 65536)]
    #[case(15, 256)]
    #[case(16, 1)]
    fn search_space_covers_unknown_tail(#[case] known_key_len: usize, #[case] expected: usize) {
        let config = AttackConfig {
            known_key_len,
            ..Default::default()
        };

        assert_eq!(config.search_space(), expected);
    }

    #[test]
    fn empty_block_range_is_rejected() {
        let config = AttackConfig {
            start_block: 3,
            end_block: Some(3),
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }
}
