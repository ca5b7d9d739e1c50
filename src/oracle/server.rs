// A toy target with the same flaw as the real one.
//
// The server encrypts its secret in CTR mode starting at counter 2. It will
// decrypt anything it is sent, choosing the mode by request length:
//
//   * a request exactly as long as the secret is decrypted in CFB mode, with
//     only the first 14 bytes of every output block returned intact;
//   * any other request (up to 512 bytes) is decrypted in CBC mode.
//
// Both modes share the key used for CTR, which is the whole vulnerability.
use std::net::SocketAddr;
use std::ops::Range;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

use super::{Challenge, ChallengeEnvelope, Oracle, ResponseEnvelope};
use crate::layout::{
    BLOCK_SIZE, COUNTER_OFFSET, LEAKED_KEY_LEN, MAX_REQUEST_LEN, NONCE_SIZE, PIN_END_TRIM,
    PIN_START, TRIAL_LEN,
};
use crate::modes::{aes_128_ctr, counter_block, decrypt_aes_128_cbc_raw, decrypt_aes_128_cfb};
use crate::{Error, Result};

const PIN_PREFIX: &[u8; PIN_START] = b"your pin is: ";
const PIN_SUFFIX: &[u8; PIN_END_TRIM] = b"end";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Decrypted(Vec<u8>),
    Rejected(String),
    Verdict(bool),
}

impl Reply {
    pub fn to_line(&self) -> Result<String> {
        #[derive(Serialize)]
        struct VerdictEnvelope {
            result: &'static str,
        }

        let line = match self {
            Reply::Decrypted(bytes) => serde_json::to_string(&ResponseEnvelope::ret(bytes))?,
            Reply::Rejected(message) => {
                serde_json::to_string(&ResponseEnvelope::error(message.as_str()))?
            }
            Reply::Verdict(correct) => serde_json::to_string(&VerdictEnvelope {
                result: if *correct { "correct" } else { "wrong" },
            })?,
        };
        Ok(line)
    }
}

#[derive(Debug, Clone)]
pub struct FlawedOracle {
    key: [u8; BLOCK_SIZE],
    nonce: [u8; NONCE_SIZE],
    plaintext: Vec<u8>,
    ciphertext: Vec<u8>,
    pin: Range<usize>,
}

impl FlawedOracle {
    pub fn new(
        key: [u8; BLOCK_SIZE],
        nonce: [u8; NONCE_SIZE],
        plaintext: Vec<u8>,
        pin: Range<usize>,
    ) -> Result<Self> {
        if plaintext.len() % BLOCK_SIZE != 0 || plaintext.len() < 2 * BLOCK_SIZE {
            return Err(Error::InvalidCiphertext(format!(
                "secret must be at least two whole blocks, got {} bytes",
                plaintext.len()
            )));
        }
        if pin.is_empty() || pin.end > plaintext.len() {
            return Err(Error::PinOutOfRange {
                start: pin.start,
                end_trim: plaintext.len().saturating_sub(pin.end),
                len: plaintext.len(),
            });
        }
        // A request as long as the pin is read as a guess, so the pin must not
        // share a length with the leak request or a full brute-force batch.
        let batch_len = MAX_REQUEST_LEN / TRIAL_LEN * TRIAL_LEN;
        if pin.len() == plaintext.len() || pin.len() == batch_len {
            return Err(Error::InvalidConfig(format!(
                "pin length {} collides with a decryption request length",
                pin.len()
            )));
        }
        let ciphertext = aes_128_ctr(&plaintext, &key, &nonce, COUNTER_OFFSET);
        Ok(Self {
            key,
            nonce,
            plaintext,
            ciphertext,
            pin,
        })
    }

    /// Build a secret laid out like the real target's: a fixed prefix, the
    /// pin, then a fixed suffix. The pin length must keep the whole secret a
    /// multiple of the block size.
    pub fn with_pin(key: [u8; BLOCK_SIZE], nonce: [u8; NONCE_SIZE], pin: &[u8]) -> Result<Self> {
        let plaintext = [&PIN_PREFIX[..], pin, &PIN_SUFFIX[..]].concat();
        let range = PIN_START..PIN_START + pin.len();
        Self::new(key, nonce, plaintext, range)
    }

    pub fn random<R: Rng>(rng: &mut R, pin_len: usize) -> Result<Self> {
        let pin: Vec<u8> = (0..pin_len).map(|_| rng.gen()).collect();
        Self::with_pin(rng.gen(), rng.gen(), &pin)
    }

    pub fn challenge(&self) -> Challenge {
        Challenge {
            nonce: self.nonce,
            ciphertext: self.ciphertext.clone(),
        }
    }

    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    pub fn pin(&self) -> &[u8] {
        &self.plaintext[self.pin.clone()]
    }

    pub fn respond(&self, request: &[u8]) -> Reply {
        // Anything the length of the pin is taken as a guess at it.
        if request.len() == self.pin.len() {
            return Reply::Verdict(request == self.pin());
        }
        if request.is_empty() || request.len() % BLOCK_SIZE != 0 {
            return Reply::Rejected(format!(
                "request must be whole {BLOCK_SIZE} byte blocks, got {} bytes",
                request.len()
            ));
        }
        if request.len() == self.ciphertext.len() {
            return self.cfb_window(request);
        }
        if request.len() > MAX_REQUEST_LEN {
            return Reply::Rejected(format!(
                "request of {} bytes exceeds {MAX_REQUEST_LEN}",
                request.len()
            ));
        }
        match decrypt_aes_128_cbc_raw(request, &self.key, &[0u8; BLOCK_SIZE]) {
            Ok(decrypted) => Reply::Decrypted(decrypted),
            Err(e) => Reply::Rejected(e.to_string()),
        }
    }

    fn cfb_window(&self, request: &[u8]) -> Reply {
        let iv = counter_block(&self.nonce, COUNTER_OFFSET - 1);
        match decrypt_aes_128_cfb(request, &self.key, &iv) {
            Ok(mut decrypted) => {
                decrypted
                    .chunks_exact_mut(BLOCK_SIZE)
                    .for_each(|block| block[LEAKED_KEY_LEN..].fill(0));
                Reply::Decrypted(decrypted)
            }
            Err(e) => Reply::Rejected(e.to_string()),
        }
    }
}

impl Oracle for FlawedOracle {
    async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        match self.respond(payload) {
            Reply::Decrypted(bytes) => Ok(bytes),
            Reply::Rejected(message) => Err(Error::OracleRejected(message)),
            verdict @ Reply::Verdict(_) => Err(Error::OracleRejected(verdict.to_line()?)),
        }
    }

    async fn submit(&mut self, payload: &[u8]) -> Result<String> {
        self.respond(payload).to_line()
    }
}

/// Serve `oracle` over TCP, one independent session per connection. Returns
/// the bound address.
pub async fn spawn_server(address: impl ToSocketAddrs, oracle: FlawedOracle) -> Result<SocketAddr> {
    let listener = TcpListener::bind(address).await?;
    let addr = listener.local_addr()?;
    let oracle = Arc::new(oracle);
    info!(%addr, "toy oracle listening");
    tokio::spawn(async move {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            };
            let oracle = Arc::clone(&oracle);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, &oracle).await {
                    warn!(%peer, "session ended with error: {e}");
                }
            });
        }
    });
    Ok(addr)
}

async fn handle_connection(stream: TcpStream, oracle: &FlawedOracle) -> Result<()> {
    let mut stream = BufReader::new(stream);
    let greeting = serde_json::to_string(&ChallengeEnvelope::from(&oracle.challenge()))?;
    write_line(&mut stream, &greeting).await?;

    let mut line = String::new();
    let mut requests = 0usize;
    loop {
        line.clear();
        if stream.read_line(&mut line).await? == 0 {
            debug!(requests, "client hung up");
            return Ok(());
        }
        requests += 1;
        let reply = match hex::decode(line.trim()) {
            Ok(request) => oracle.respond(&request),
            Err(e) => Reply::Rejected(format!("bad hex: {e}")),
        };
        write_line(&mut stream, &reply.to_line()?).await?;
        if let Reply::Verdict(correct) = reply {
            info!(correct, requests, "pin submitted, closing session");
            stream.get_mut().shutdown().await?;
            return Ok(());
        }
    }
}

async fn write_line(stream: &mut BufReader<TcpStream>, line: &str) -> Result<()> {
    let writer = stream.get_mut();
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{rngs::StdRng, SeedableRng};
    use rstest::rstest;

    use crate::aes::AesCipher;
    use crate::oracle::client::OracleClient;
    use crate::xor::xor_block;

    fn toy_oracle() -> FlawedOracle {
        FlawedOracle::with_pin(*b"YELLOW SUBMARINE", [0u8; NONCE_SIZE], &[0x5A; 32]).unwrap()
    }

    #[test]
    fn with_pin_lays_out_prefix_pin_suffix() {
        let oracle = toy_oracle();

        assert_eq!(oracle.plaintext().len(), 48);
        assert_eq!(&oracle.plaintext()[..PIN_START], PIN_PREFIX);
        assert_eq!(oracle.pin(), &[0x5A; 32]);
        assert!(oracle.plaintext().ends_with(PIN_SUFFIX));
    }

    #[test]
    fn with_pin_rejects_ragged_secret() {
        let result = FlawedOracle::with_pin([0u8; 16], [0u8; NONCE_SIZE], &[1u8; 30]);

        assert!(result.is_err());
    }

    #[rstest]
    #[case::as_long_as_the_secret(64, 0..64)]
    #[case::as_long_as_a_full_batch(MAX_REQUEST_LEN + 16, 16..MAX_REQUEST_LEN + 16)]
    fn pin_sharing_a_request_length_is_rejected(
        #[case] secret_len: usize,
        #[case] pin: Range<usize>,
    ) {
        let result = FlawedOracle::new([0u8; 16], [0u8; NONCE_SIZE], vec![0u8; secret_len], pin);

        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn with_pin_rejects_pin_as_long_as_a_full_batch() {
        let pin = [0x5A; MAX_REQUEST_LEN];

        let result = FlawedOracle::with_pin([0u8; 16], [0u8; NONCE_SIZE], &pin);

        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn ciphertext_is_ctr_from_counter_offset() {
        let oracle = toy_oracle();
        let challenge = oracle.challenge();
        let cipher = AesCipher::new(b"YELLOW SUBMARINE");

        for block_idx in 0..challenge.num_blocks() {
            let key_stream =
                cipher.encrypt_block(counter_block(&challenge.nonce, block_idx as u32 + 2));
            let plaintext_block = xor_block(&challenge.block(block_idx).unwrap(), &key_stream);
            assert_eq!(
                &plaintext_block[..],
                &oracle.plaintext()[block_idx * 16..(block_idx + 1) * 16]
            );
        }
    }

    #[test]
    fn length_of_ciphertext_leaks_truncated_plaintext() {
        let oracle = toy_oracle();
        let challenge = oracle.challenge();
        let request = [
            &counter_block(&challenge.nonce, 3)[..],
            &challenge.block(1).unwrap()[..],
            &[0u8; 16][..],
        ]
        .concat();

        let Reply::Decrypted(response) = oracle.respond(&request) else {
            panic!("expected a decryption");
        };

        assert_eq!(&response[16..30], &oracle.plaintext()[16..30]);
        assert_eq!(&response[30..32], &[0, 0]);
    }

    #[test]
    fn other_lengths_are_cbc_decrypted() {
        let oracle = toy_oracle();
        let counter = counter_block(&[0u8; NONCE_SIZE], 7);
        let key_stream = AesCipher::new(b"YELLOW SUBMARINE").encrypt_block(counter);
        let request = [[0u8; 16], key_stream, [0u8; 16], [0u8; 16]].concat();

        let Reply::Decrypted(response) = oracle.respond(&request) else {
            panic!("expected a decryption");
        };

        assert_eq!(&response[16..32], &counter);
    }

    #[test]
    fn oversized_and_ragged_requests_are_rejected() {
        let oracle = toy_oracle();

        assert!(matches!(oracle.respond(&[0u8; 528]), Reply::Rejected(_)));
        assert!(matches!(oracle.respond(&[0u8; 20]), Reply::Rejected(_)));
        assert!(matches!(oracle.respond(&[]), Reply::Rejected(_)));
    }

    #[test]
    fn pin_guesses_get_a_verdict() {
        let oracle = toy_oracle();

        assert_eq!(oracle.respond(&[0x5A; 32]), Reply::Verdict(true));
        assert_eq!(oracle.respond(&[0x00; 32]), Reply::Verdict(false));
        assert_eq!(
            Reply::Verdict(true).to_line().unwrap(),
            r#"{"result":"correct"}"#
        );
    }

    #[test]
    fn random_oracle_is_seedable() {
        let a = FlawedOracle::random(&mut StdRng::from_seed([101; 32]), 32).unwrap();
        let b = FlawedOracle::random(&mut StdRng::from_seed([101; 32]), 32).unwrap();

        assert_eq!(a.challenge(), b.challenge());
        assert_eq!(a.pin().len(), 32);
    }

    #[tokio::test]
    async fn served_oracle_greets_and_answers_in_order() {
        let oracle = toy_oracle();
        let expected = oracle.challenge();
        let addr = spawn_server("127.0.0.1:0", oracle).await.unwrap();
        let mut client = OracleClient::connect(addr).await.unwrap();

        let challenge = client.receive_initial().await.unwrap();
        let first = client.send(&[0u8; 64]).await.unwrap();
        let second = client.send(&[0u8; 64]).await.unwrap();
        let verdict = client.submit(&[0x5A; 32]).await.unwrap();

        assert_eq!(challenge, expected);
        assert_eq!(first.len(), 64);
        assert_eq!(first, second);
        assert_eq!(verdict, r#"{"result":"correct"}"#);
    }

    #[tokio::test]
    async fn served_oracle_reports_bad_requests_without_closing() {
        let addr = spawn_server("127.0.0.1:0", toy_oracle()).await.unwrap();
        let mut client = OracleClient::connect(addr).await.unwrap();
        client.receive_initial().await.unwrap();

        let rejected = client.send(&[0u8; 20]).await;
        let accepted = client.send(&[0u8; 64]).await;

        assert!(matches!(rejected, Err(Error::OracleRejected(_))));
        assert!(accepted.is_ok());
    }
}
