// Recover the CTR keystream of a secret, one block at a time.
//
// The target encrypts its secret as C_i = P_i ⊕ K_i with K_i = E(nonce|ctr_i),
// and will decrypt requests with the same key in other modes:
//
// 1. Leak. Asking for a CFB decryption of `nonce|ctr_i ‖ C_i` returns
//    C_i ⊕ E(nonce|ctr_i) = P_i as the second output block, but the target
//    only returns the first 14 bytes of it faithfully. C_i ⊕ P_i then gives
//    the first 14 bytes of K_i.
//
// 2. Brute force. The other 2 bytes of K_i are guessed. A CBC decryption of
//    `0 ‖ guess` returns D(guess), which is `nonce|ctr_i` exactly when
//    guess = K_i. Many guesses fit into one request.
//
// 3. P_i = C_i ⊕ K_i.
pub mod batch;

use std::ops::Range;

use tracing::{debug, info};

use crate::config::AttackConfig;
use crate::layout::{BLOCK_SIZE, LEAK_WINDOW, NONCE_SIZE};
use crate::modes::counter_block;
use crate::oracle::{Challenge, Oracle};
use crate::xor::xor_block;
use crate::{Error, Result};

pub use batch::{trial_key, BatchPlan, TrialBatch};

const PROGRESS_EVERY: usize = 100;

/// Counter block keying ciphertext block `block`: the nonce followed by
/// `block + offset` in big-endian.
pub fn block_counter(
    nonce: &[u8; NONCE_SIZE],
    block: usize,
    offset: u32,
) -> Result<[u8; BLOCK_SIZE]> {
    let counter = u32::try_from(block)
        .ok()
        .and_then(|block| block.checked_add(offset))
        .ok_or_else(|| Error::InvalidConfig(format!("counter for block {block} overflows")))?;
    Ok(counter_block(nonce, counter))
}

/// The pin is everything between a fixed prefix and a fixed suffix.
pub fn extract_pin(plaintext: &[u8], start: usize, end_trim: usize) -> Result<&[u8]> {
    let out_of_range = || Error::PinOutOfRange {
        start,
        end_trim,
        len: plaintext.len(),
    };
    let end = plaintext
        .len()
        .checked_sub(end_trim)
        .ok_or_else(out_of_range)?;
    plaintext.get(start..end).ok_or_else(out_of_range)
}

/// First phase for one block: learn the high bytes of its key.
#[derive(Debug, Clone)]
pub struct LeakPhase {
    block: usize,
    ciphertext_block: [u8; BLOCK_SIZE],
    counter: [u8; BLOCK_SIZE],
    request: Vec<u8>,
}

impl LeakPhase {
    pub fn new(challenge: &Challenge, block: usize, counter_offset: u32) -> Result<Self> {
        let ciphertext_block = challenge.block(block).ok_or(Error::InvalidBlockRange {
            start: block,
            end: block.saturating_add(1),
            num_blocks: challenge.num_blocks(),
        })?;
        let counter = block_counter(&challenge.nonce, block, counter_offset)?;

        // Same length as the real ciphertext so the target picks its CFB path.
        let mut request = Vec::with_capacity(challenge.ciphertext.len());
        request.extend_from_slice(&counter);
        request.extend_from_slice(&ciphertext_block);
        request.resize(challenge.ciphertext.len(), 0);

        Ok(Self {
            block,
            ciphertext_block,
            counter,
            request,
        })
    }

    pub fn request(&self) -> &[u8] {
        &self.request
    }

    pub fn counter(&self) -> &[u8; BLOCK_SIZE] {
        &self.counter
    }

    /// Turn the oracle's reply into the partial key and move on.
    pub fn finish(self, response: &[u8], known_key_len: usize) -> Result<BruteForcePhase> {
        let leaked = response.get(LEAK_WINDOW).ok_or(Error::ShortResponse {
            expected: LEAK_WINDOW.end,
            got: response.len(),
        })?;
        let mut partial_plaintext = [0u8; BLOCK_SIZE];
        partial_plaintext.copy_from_slice(leaked);
        let block_key = xor_block(&self.ciphertext_block, &partial_plaintext);
        let partial_key = block_key[..known_key_len].to_vec();
        info!(
            block = self.block,
            partial_key = %hex::encode(&partial_key),
            "leaked partial key"
        );
        Ok(BruteForcePhase {
            block: self.block,
            ciphertext_block: self.ciphertext_block,
            counter: self.counter,
            partial_key,
        })
    }
}

/// Second phase for one block: guess the rest of the key.
#[derive(Debug, Clone)]
pub struct BruteForcePhase {
    block: usize,
    ciphertext_block: [u8; BLOCK_SIZE],
    counter: [u8; BLOCK_SIZE],
    partial_key: Vec<u8>,
}

impl BruteForcePhase {
    pub fn partial_key(&self) -> &[u8] {
        &self.partial_key
    }

    pub fn plan(&self, trials_per_request: usize) -> BatchPlan<'_> {
        BatchPlan::new(&self.partial_key, trials_per_request)
    }

    pub async fn run<O: Oracle>(
        self,
        oracle: &mut O,
        trials_per_request: usize,
    ) -> Result<RecoveredBlock> {
        let plan = self.plan(trials_per_request);
        let num_batches = plan.num_batches();
        for (request_idx, batch) in plan.enumerate() {
            if request_idx % PROGRESS_EVERY == 0 {
                debug!(block = self.block, request_idx, num_batches, "brute forcing");
            }
            let response = oracle.send(&batch.payload).await?;
            if let Some(key) = batch.confirmed_key(&response, &self.counter)? {
                let plaintext = xor_block(&self.ciphertext_block, &key);
                info!(
                    block = self.block,
                    key = %hex::encode(key),
                    plaintext = %plaintext.escape_ascii(),
                    requests = request_idx + 1,
                    "recovered block"
                );
                return Ok(RecoveredBlock {
                    index: self.block,
                    key,
                    plaintext,
                });
            }
        }
        Err(Error::SearchExhausted {
            block: self.block,
            partial_key: hex::encode(&self.partial_key),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredBlock {
    pub index: usize,
    pub key: [u8; BLOCK_SIZE],
    pub plaintext: [u8; BLOCK_SIZE],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackReport {
    pub blocks: Vec<RecoveredBlock>,
    pub plaintext: Vec<u8>,
    pub pin: Vec<u8>,
    pub verdict: String,
}

/// Drives both phases over a range of blocks against one oracle session.
pub struct KeyRecovery<'o, O> {
    oracle: &'o mut O,
    challenge: Challenge,
    config: AttackConfig,
    recovered: Vec<RecoveredBlock>,
}

impl<'o, O: Oracle> KeyRecovery<'o, O> {
    pub fn new(oracle: &'o mut O, challenge: Challenge, config: AttackConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            oracle,
            challenge,
            config,
            recovered: Vec::new(),
        })
    }

    /// The blocks this run will recover, checked against the ciphertext.
    pub fn block_range(&self) -> Result<Range<usize>> {
        let num_blocks = self.challenge.num_blocks();
        let start = self.config.start_block;
        let end = self.config.end_block.unwrap_or(num_blocks);
        if start >= end || end > num_blocks {
            return Err(Error::InvalidBlockRange {
                start,
                end,
                num_blocks,
            });
        }
        Ok(start..end)
    }

    pub async fn recover_block(&mut self, block: usize) -> Result<RecoveredBlock> {
        let leak = LeakPhase::new(&self.challenge, block, self.config.counter_offset)?;
        let response = self.oracle.send(leak.request()).await?;
        let brute_force = leak.finish(&response, self.config.known_key_len)?;
        brute_force
            .run(self.oracle, self.config.trials_per_request())
            .await
    }

    /// Recover every block in the configured range, in order, and return the
    /// concatenated plaintext.
    pub async fn recover_plaintext(&mut self) -> Result<Vec<u8>> {
        for block in self.block_range()? {
            let recovered = self.recover_block(block).await?;
            self.recovered.push(recovered);
        }
        let plaintext = self.plaintext();
        info!(plaintext = %plaintext.escape_ascii(), "recovered plaintext");
        Ok(plaintext)
    }

    pub fn plaintext(&self) -> Vec<u8> {
        self.recovered
            .iter()
            .flat_map(|block| block.plaintext)
            .collect()
    }

    /// Recover the plaintext, cut the pin out of it and hand it back to the
    /// oracle. The oracle's reply is returned as-is.
    pub async fn run(mut self) -> Result<AttackReport> {
        let plaintext = self.recover_plaintext().await?;
        let pin =
            extract_pin(&plaintext, self.config.pin_start, self.config.pin_end_trim)?.to_vec();
        info!(pin = %hex::encode(&pin), "submitting pin");
        let verdict = self.oracle.submit(&pin).await?;
        info!(%verdict, "oracle verdict");
        Ok(AttackReport {
            blocks: self.recovered,
            plaintext,
            pin,
            verdict,
        })
    }
}
