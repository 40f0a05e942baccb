//! Key management service over a byte stream.
//!
//! The engine builds the complete KMS request (HTTP framing and signing
//! included); this service only moves bytes: connect, write the message,
//! then read until the decryptor reports nothing more is needed.
//!
//! Connections go through a [`KmsConnector`] so the driver can plug in its
//! TLS stack. [`TcpConnector`] opens plain TCP connections.

use crate::collaborators::{BoxError, KeyManagementService};
use crate::config::CryptConfig;
use crate::error::{CryptResult, KmsError};
use async_trait::async_trait;
use fieldcrypt_engine::KeyDecryptor;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Port used when a KMS host name carries none.
pub const DEFAULT_KMS_PORT: u16 = 443;

const READ_CHUNK: usize = 4096;

/// Opens a stream to a KMS host.
#[async_trait]
pub trait KmsConnector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}

/// Plain TCP connector.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl KmsConnector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        TcpStream::connect((host, port)).await
    }
}

/// Splits `host`, `host:port` or `[v6]:port` into host and port.
pub fn parse_host(host_name: &str) -> Result<(&str, u16), KmsError> {
    let invalid = || KmsError::InvalidHost(host_name.to_string());

    if host_name.is_empty() {
        return Err(invalid());
    }

    if let Some(rest) = host_name.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        return match after {
            "" => Ok((host, DEFAULT_KMS_PORT)),
            _ => {
                let port = after.strip_prefix(':').ok_or_else(invalid)?;
                Ok((host, port.parse().map_err(|_| invalid())?))
            }
        };
    }

    match host_name.split_once(':') {
        // Bare IPv6 literal
        Some((_, rest)) if rest.contains(':') => Ok((host_name, DEFAULT_KMS_PORT)),
        Some((host, port)) if !host.is_empty() => Ok((host, port.parse().map_err(|_| invalid())?)),
        Some(_) => Err(invalid()),
        None => Ok((host_name, DEFAULT_KMS_PORT)),
    }
}

/// [`KeyManagementService`] that performs each round trip on a fresh
/// connection from its connector.
pub struct StreamKeyManagementService<C> {
    connector: C,
    connect_timeout: Duration,
    io_timeout: Duration,
    max_response_bytes: usize,
    closed: AtomicBool,
}

impl<C: KmsConnector> StreamKeyManagementService<C> {
    /// Uses the default timeouts and response limit.
    pub fn new(connector: C) -> Self {
        Self::with_settings(connector, &CryptConfig::default())
    }

    /// Takes timeouts and the response limit from `config`, which must pass
    /// [`CryptConfig::validate`].
    pub fn from_config(connector: C, config: &CryptConfig) -> CryptResult<Self> {
        config.validate()?;
        Ok(Self::with_settings(connector, config))
    }

    fn with_settings(connector: C, config: &CryptConfig) -> Self {
        Self {
            connector,
            connect_timeout: config.kms_connect_timeout(),
            io_timeout: config.kms_io_timeout(),
            max_response_bytes: config.kms_max_response_bytes,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, io_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.io_timeout = io_timeout;
        self
    }

    pub fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn round_trip(
        &self,
        stream: &mut C::Stream,
        host: &str,
        decryptor: &mut dyn KeyDecryptor,
    ) -> Result<(), KmsError> {
        let io_err = |source| KmsError::Io {
            host: host.to_string(),
            source,
        };
        let timed_out = |operation| KmsError::Timeout {
            host: host.to_string(),
            operation,
        };

        timeout(self.io_timeout, stream.write_all(decryptor.message()))
            .await
            .map_err(|_| timed_out("write"))?
            .map_err(io_err)?;
        timeout(self.io_timeout, stream.flush())
            .await
            .map_err(|_| timed_out("write"))?
            .map_err(io_err)?;

        let mut buf = vec![0u8; READ_CHUNK];
        let mut received = 0usize;
        loop {
            let needed = decryptor.bytes_needed();
            if needed == 0 {
                break;
            }
            if received >= self.max_response_bytes {
                return Err(KmsError::ResponseTooLarge {
                    host: host.to_string(),
                    limit: self.max_response_bytes,
                });
            }

            let want = needed.min(READ_CHUNK).min(self.max_response_bytes - received);
            let n = timeout(self.io_timeout, stream.read(&mut buf[..want]))
                .await
                .map_err(|_| timed_out("read"))?
                .map_err(io_err)?;
            if n == 0 {
                return Err(KmsError::UnexpectedEof {
                    host: host.to_string(),
                    remaining: needed,
                });
            }

            decryptor.feed(&buf[..n])?;
            received += n;
        }

        debug!("KMS response from {host} complete ({received} bytes)");
        Ok(())
    }
}

#[async_trait]
impl<C: KmsConnector> KeyManagementService for StreamKeyManagementService<C> {
    async fn decrypt_key(&self, decryptor: &mut dyn KeyDecryptor) -> Result<(), KmsError> {
        if self.is_closed() {
            return Err(KmsError::Closed);
        }

        let host_name = decryptor.host_name().to_string();
        let (host, port) = parse_host(&host_name)?;
        debug!(
            "KMS request for provider {} to {host}:{port} ({} bytes)",
            decryptor.kms_provider(),
            decryptor.message().len()
        );

        let mut stream = timeout(self.connect_timeout, self.connector.connect(host, port))
            .await
            .map_err(|_| KmsError::Timeout {
                host: host_name.clone(),
                operation: "connect",
            })?
            .map_err(|source| KmsError::Connect {
                host: host_name.clone(),
                source,
            })?;

        let result = self.round_trip(&mut stream, &host_name, decryptor).await;

        if let Err(e) = stream.shutdown().await {
            debug!("KMS connection to {host_name} did not shut down cleanly: {e}");
        }
        result
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
