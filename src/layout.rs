// Constants describing the target. Everything here is specific to the one
// oracle this tool was written against; other oracles with the same flaw will
// leak a different window and need these revisited.

/// Cipher block size. Every request and response is read in these units.
pub const BLOCK_SIZE: usize = crate::aes::BLOCK_SIZE;

/// The server's nonce fills a block apart from a 4 byte counter.
pub const NONCE_SIZE: usize = 12;

/// Data blocks are encrypted starting at counter 2 (counter 1 is the server's
/// own CFB IV). Block `i` is therefore keyed by `nonce|be32(i + 2)`.
pub const COUNTER_OFFSET: u32 = 2;

/// The CFB leak only returns this many trustworthy bytes of each keystream
/// block; the rest of the block has to be brute forced.
pub const LEAKED_KEY_LEN: usize = 14;

/// The oracle refuses requests longer than 1024 hex characters.
pub const MAX_REQUEST_LEN: usize = 512;

/// One brute-force trial costs a zero block followed by the guessed key.
pub const TRIAL_LEN: usize = 2 * BLOCK_SIZE;

/// Where the leaked plaintext block sits in the leak response: the first
/// output block is the decryption of the counter we supplied.
pub const LEAK_WINDOW: std::ops::Range<usize> = BLOCK_SIZE..2 * BLOCK_SIZE;

/// Plaintext layout of the target's secret: a 13 byte prefix, the pin and a
/// 3 byte suffix.
pub const PIN_START: usize = 13;
pub const PIN_END_TRIM: usize = 3;
