// The decryption oracle the attack runs against.
pub mod client;
pub mod server;

use serde::{Deserialize, Serialize};

use crate::layout::{BLOCK_SIZE, NONCE_SIZE};
use crate::{Error, Result};

/// A single request/response capability. Implementations must answer strictly
/// in order: each reply belongs to the request sent just before it.
#[allow(async_fn_in_trait)]
pub trait Oracle {
    /// Send a crafted payload and return the decoded `ret` bytes.
    async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>>;

    /// Send a payload whose reply is not a `ret` envelope. The raw reply line
    /// is returned untouched.
    async fn submit(&mut self, payload: &[u8]) -> Result<String>;
}

/// What the server hands out when a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl Challenge {
    pub fn new(nonce: &[u8], ciphertext: Vec<u8>) -> Result<Self> {
        let nonce: [u8; NONCE_SIZE] = nonce.try_into().map_err(|_| Error::InvalidNonce {
            expected: NONCE_SIZE,
            got: nonce.len(),
        })?;
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(Error::InvalidCiphertext(format!(
                "length {} is not a multiple of {BLOCK_SIZE}",
                ciphertext.len()
            )));
        }
        // The leak request is a counter block plus the target block padded
        // out to the ciphertext length, so two blocks is the minimum.
        if ciphertext.len() < 2 * BLOCK_SIZE {
            return Err(Error::InvalidCiphertext(format!(
                "need at least two blocks, got {} bytes",
                ciphertext.len()
            )));
        }
        Ok(Self { nonce, ciphertext })
    }

    pub fn num_blocks(&self) -> usize {
        self.ciphertext.len() / BLOCK_SIZE
    }

    pub fn block(&self, idx: usize) -> Option<[u8; BLOCK_SIZE]> {
        let chunk = self.ciphertext.chunks_exact(BLOCK_SIZE).nth(idx)?;
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(chunk);
        Some(block)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengeEnvelope {
    pub nonce: String,
    pub ct: String,
}

impl TryFrom<ChallengeEnvelope> for Challenge {
    type Error = Error;

    fn try_from(envelope: ChallengeEnvelope) -> Result<Self> {
        let nonce = hex::decode(envelope.nonce.trim())?;
        let ciphertext = hex::decode(envelope.ct.trim())?;
        Challenge::new(&nonce, ciphertext)
    }
}

impl From<&Challenge> for ChallengeEnvelope {
    fn from(challenge: &Challenge) -> Self {
        Self {
            nonce: hex::encode(challenge.nonce),
            ct: hex::encode(&challenge.ciphertext),
        }
    }
}

/// Reply to a decryption request. The toy server also reports rejected
/// requests through `error` instead of `ret`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    pub fn ret(bytes: &[u8]) -> Self {
        Self {
            ret: Some(hex::encode(bytes)),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ret: None,
            error: Some(message.into()),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match (self.ret, self.error) {
            (Some(ret), _) => Ok(hex::decode(ret.trim())?),
            (None, Some(error)) => Err(Error::OracleRejected(error)),
            (None, None) => Err(Error::OracleRejected("reply has no 'ret' field".to_string())),
        }
    }
}
