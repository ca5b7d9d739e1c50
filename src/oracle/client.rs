use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{info, trace};

use super::{Challenge, ChallengeEnvelope, Oracle, ResponseEnvelope};
use crate::{Error, Result};

/// Line based client for the remote oracle. Requests go out as bare hex
/// lines, replies come back as one JSON object per line.
///
/// The stream is owned for the whole session; dropping the client closes it.
#[derive(Debug)]
pub struct OracleClient<S> {
    stream: BufReader<S>,
    line: String,
}

impl OracleClient<TcpStream> {
    pub async fn connect(address: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(address).await?;
        info!(peer = ?stream.peer_addr().ok(), "connected to oracle");
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> OracleClient<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            line: String::new(),
        }
    }

    /// Read the greeting carrying the nonce and the target ciphertext.
    pub async fn receive_initial(&mut self) -> Result<Challenge> {
        let line = self.read_line().await?;
        let envelope: ChallengeEnvelope = serde_json::from_str(line)?;
        let challenge = Challenge::try_from(envelope)?;
        info!(
            nonce = %hex::encode(challenge.nonce),
            ciphertext = %hex::encode(&challenge.ciphertext),
            blocks = challenge.num_blocks(),
            "received challenge"
        );
        Ok(challenge)
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.get_mut().shutdown().await?;
        Ok(())
    }

    async fn write_hex_line(&mut self, payload: &[u8]) -> Result<()> {
        let mut line = hex::encode(payload);
        trace!(len = payload.len(), "-> {line}");
        line.push('\n');
        let writer = self.stream.get_mut();
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<&str> {
        self.line.clear();
        let n = self.stream.read_line(&mut self.line).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        let line = self.line.trim_end();
        trace!("<- {line}");
        Ok(line)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Oracle for OracleClient<S> {
    async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        self.write_hex_line(payload).await?;
        let line = self.read_line().await?;
        let envelope: ResponseEnvelope = serde_json::from_str(line)?;
        envelope.into_bytes()
    }

    async fn submit(&mut self, payload: &[u8]) -> Result<String> {
        self.write_hex_line(payload).await?;
        Ok(self.read_line().await?.to_string())
    }
}
