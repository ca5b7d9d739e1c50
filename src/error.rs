use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed json from oracle: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed hex from oracle: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("oracle closed the connection")]
    ConnectionClosed,
    #[error("oracle replied with an error: {0}")]
    OracleRejected(String),
    #[error("nonce must be {expected} bytes, got {got}")]
    InvalidNonce { expected: usize, got: usize },
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),
    #[error("response too short: expected at least {expected} bytes, got {got}")]
    ShortResponse { expected: usize, got: usize },
    #[error("block range {start}..{end} is not within 0..{num_blocks}")]
    InvalidBlockRange {
        start: usize,
        end: usize,
        num_blocks: usize,
    },
    #[error("no trial key confirmed for block {block} (partial key {partial_key})")]
    SearchExhausted { block: usize, partial_key: String },
    #[error("pin slice {start}..len-{end_trim} is out of range for {len} bytes of plaintext")]
    PinOutOfRange {
        start: usize,
        end_trim: usize,
        len: usize,
    },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("buffers are not of equal length ({0} != {1})")]
    LengthMismatch(usize, usize),
}
