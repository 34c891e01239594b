//! Wire-level SOCKS5 liveness check.
//!
//! A candidate works when it accepts a TCP connection and answers the
//! "version 5, one method, no authentication" greeting with exactly
//! "version 5, method 0".

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use trawl_core::error::AppError;
use trawl_core::proxy_list::ProxyCandidate;
use trawl_core::traits::ProxyProbe;

const GREETING: [u8; 3] = [0x05, 0x01, 0x00];
const NO_AUTH_REPLY: [u8; 2] = [0x05, 0x00];

#[derive(Debug, Clone)]
pub struct Socks5Probe {
    connect_timeout: Duration,
    handshake_timeout: Duration,
}

impl Default for Socks5Probe {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(3),
        }
    }
}

impl Socks5Probe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Connect and greet `addr`; returns the round-trip time on success.
    pub async fn check(&self, addr: SocketAddr) -> Result<Duration, AppError> {
        let started = Instant::now();

        let mut stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| AppError::Timeout(self.connect_timeout.as_secs()))?
            .map_err(|e| AppError::NetworkError(format!("connect failed: {e}")))?;

        let handshake = async {
            stream.write_all(&GREETING).await?;
            let mut reply = [0u8; 2];
            stream.read_exact(&mut reply).await?;
            Ok::<_, std::io::Error>(reply)
        };
        let reply = timeout(self.handshake_timeout, handshake)
            .await
            .map_err(|_| AppError::Timeout(self.handshake_timeout.as_secs()))?
            .map_err(|e| AppError::NetworkError(format!("handshake failed: {e}")))?;

        if reply != NO_AUTH_REPLY {
            return Err(AppError::NetworkError(format!(
                "unexpected SOCKS reply {reply:02x?}"
            )));
        }
        Ok(started.elapsed())
    }
}

impl ProxyProbe for Socks5Probe {
    async fn probe(&self, candidate: &ProxyCandidate) -> Option<Duration> {
        match self.check(candidate.addr()).await {
            Ok(latency) => Some(latency),
            Err(e) => {
                tracing::trace!(proxy = %candidate, error = %e, "Proxy rejected");
                None
            }
        }
    }
}
