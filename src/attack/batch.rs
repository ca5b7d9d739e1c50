// Packing trial keys into oracle requests.
//
// Each trial occupies one (zero block, guessed key) pair. CBC decryption of
// the pair gives D(guess) ⊕ 0 in the second block, so the right guess shows up
// as the counter block it was derived from.
use crate::layout::{BLOCK_SIZE, TRIAL_LEN};
use crate::{Error, Result};

/// Candidate key number `trial`: the leaked prefix followed by the trial
/// number in big-endian, e.g. trial `0x1234` appends `[0x12, 0x34]`.
pub fn trial_key(partial_key: &[u8], trial: usize) -> [u8; BLOCK_SIZE] {
    let mut key = [0u8; BLOCK_SIZE];
    let tail_len = BLOCK_SIZE - partial_key.len();
    key[..partial_key.len()].copy_from_slice(partial_key);
    let trial_bytes = trial.to_be_bytes();
    key[partial_key.len()..].copy_from_slice(&trial_bytes[trial_bytes.len() - tail_len..]);
    key
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialBatch {
    pub first_trial: usize,
    pub keys: Vec<[u8; BLOCK_SIZE]>,
    pub payload: Vec<u8>,
}

impl TrialBatch {
    /// Look through the reply for the slot whose second block decrypted to
    /// `expected`. Padding slots past `keys` are never examined.
    pub fn confirmed_key(
        &self,
        response: &[u8],
        expected: &[u8; BLOCK_SIZE],
    ) -> Result<Option<[u8; BLOCK_SIZE]>> {
        let needed = self.keys.len() * TRIAL_LEN;
        if response.len() < needed {
            return Err(Error::ShortResponse {
                expected: needed,
                got: response.len(),
            });
        }
        Ok(response
            .chunks_exact(TRIAL_LEN)
            .zip(self.keys.iter())
            .find(|(slot, _)| &slot[BLOCK_SIZE..] == expected)
            .map(|(_, key)| *key))
    }
}

/// Splits the search space for one block into fixed-size requests.
#[derive(Debug, Clone)]
pub struct BatchPlan<'a> {
    partial_key: &'a [u8],
    search_space: usize,
    trials_per_request: usize,
    next_batch: usize,
}

impl<'a> BatchPlan<'a> {
    pub fn new(partial_key: &'a [u8], trials_per_request: usize) -> Self {
        let tail_len = BLOCK_SIZE - partial_key.len();
        Self {
            partial_key,
            search_space: 1 << (8 * tail_len),
            trials_per_request,
            next_batch: 0,
        }
    }

    pub fn num_batches(&self) -> usize {
        self.search_space.div_ceil(self.trials_per_request)
    }

    pub fn request_len(&self) -> usize {
        self.trials_per_request * TRIAL_LEN
    }

    /// Batch number `idx`. The last batch is padded with zero pairs so every
    /// request has the same length.
    pub fn batch(&self, idx: usize) -> Option<TrialBatch> {
        let first_trial = idx * self.trials_per_request;
        if first_trial >= self.search_space {
            return None;
        }
        let last_trial = (first_trial + self.trials_per_request).min(self.search_space);
        let keys: Vec<_> = (first_trial..last_trial)
            .map(|trial| trial_key(self.partial_key, trial))
            .collect();
        let mut payload = Vec::with_capacity(self.request_len());
        for key in keys.iter() {
            payload.extend_from_slice(&[0u8; BLOCK_SIZE]);
            payload.extend_from_slice(key);
        }
        payload.resize(self.request_len(), 0);
        Some(TrialBatch {
            first_trial,
            keys,
            payload,
        })
    }
}

impl Iterator for BatchPlan<'_> {
    type Item = TrialBatch;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = self.batch(self.next_batch)?;
        self.next_batch += 1;
        Some(batch)
    }
}
