//! Bitmask relay board over a persistent Telnet line session
//!
//! Session script: `<username>\r\n`, then the delimiter bytes followed by
//! `<password>\r\n`, then scan the reply for a prompt (`>`) or
//! `Logged in successfully`. Commands are single lines; one is in flight at a
//! time because the board keeps per-session state.

use super::channel_map::{channels_in, encode_mask, parse_status, RelayChannelMap, CHANNEL_COUNT};
use super::{RelayActuator, RelayError};
use crate::config::RelayConfig;
use crate::types::{ApproachKind, Phase};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const TELNET_PORT: u16 = 23;

/// Bytes sent ahead of the password. The board expects them verbatim
/// (two U+FFFD replacement characters and a dash, UTF-8 encoded).
pub const PASSWORD_DELIMITER: &[u8] = &[0xEF, 0xBF, 0xBD, 0xEF, 0xBF, 0xBD, 0x2D];

const LOGIN_MARKERS: [&str; 2] = [">", "Logged in successfully"];

#[derive(Debug, Clone)]
pub struct TelnetSettings {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub connect_timeout: Duration,
    /// Read attempts per response.
    pub response_retries: u32,
    /// Wait per read attempt.
    pub response_timeout: Duration,
}

impl From<&RelayConfig> for TelnetSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            address: config.address.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            response_retries: config.response_retries,
            response_timeout: Duration::from_millis(config.response_timeout_ms),
        }
    }
}

impl TelnetSettings {
    fn addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

pub struct TelnetRelay {
    settings: TelnetSettings,
    map: RelayChannelMap,
    kinds: Vec<ApproachKind>,
    session: Mutex<Option<TcpStream>>,
}

impl TelnetRelay {
    /// Open and authenticate the session.
    pub async fn connect(
        settings: TelnetSettings,
        map: RelayChannelMap,
        kinds: Vec<ApproachKind>,
    ) -> Result<Self, RelayError> {
        let relay = Self {
            settings,
            map,
            kinds,
            session: Mutex::new(None),
        };
        let stream = relay.open_session().await?;
        *relay.session.lock().await = Some(stream);
        Ok(relay)
    }

    async fn open_session(&self) -> Result<TcpStream, RelayError> {
        let addr = self.settings.addr();
        info!(address = %addr, "Connecting to relay board");

        let mut stream = tokio::time::timeout(self.settings.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| RelayError::Timeout(self.settings.connect_timeout))?
            .map_err(|source| RelayError::Connect {
                addr: addr.clone(),
                source,
            })?;

        // Detect a board that vanished without closing the connection
        let sock_ref = socket2::SockRef::from(&stream);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(Duration::from_secs(30))
            .with_interval(Duration::from_secs(10));
        let _ = sock_ref.set_tcp_keepalive(&keepalive);
        let _ = stream.set_nodelay(true);

        write_line(&mut stream, self.settings.username.as_bytes()).await?;
        let mut password = PASSWORD_DELIMITER.to_vec();
        password.extend_from_slice(self.settings.password.as_bytes());
        write_line(&mut stream, &password).await?;

        let response = self
            .read_response(&mut stream, |text| LOGIN_MARKERS.iter().any(|m| text.contains(m)))
            .await?;
        if !LOGIN_MARKERS.iter().any(|m| response.contains(m)) {
            return Err(RelayError::Auth(addr));
        }

        info!(address = %addr, "Relay session authenticated");
        Ok(stream)
    }

    /// Accumulate reply text until `done` accepts it, the peer closes, or the
    /// retry budget runs out.
    async fn read_response(
        &self,
        stream: &mut TcpStream,
        done: impl Fn(&str) -> bool,
    ) -> Result<String, RelayError> {
        let mut response = String::new();
        let mut buf = [0u8; 1024];

        for attempt in 0..self.settings.response_retries {
            match tokio::time::timeout(self.settings.response_timeout, stream.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    response.push_str(&String::from_utf8_lossy(&buf[..n]));
                    if done(&response) {
                        break;
                    }
                }
                Ok(Err(e)) => return Err(RelayError::Send(e)),
                Err(_) => {
                    debug!(attempt, "Timeout waiting for relay response");
                }
            }
        }

        debug!(response = %response.trim(), "Relay response");
        Ok(response)
    }

    /// Send one command line, reconnecting and retrying once on failure.
    ///
    /// Caller holds the session lock for the whole exchange.
    async fn send_locked(&self, session: &mut Option<TcpStream>, command: &str) -> Result<(), RelayError> {
        let first = match session.as_mut() {
            Some(stream) => send_on(stream, command).await,
            None => Err(RelayError::Closed),
        };
        let Err(first) = first else {
            return Ok(());
        };

        warn!(command, error = %first, "Relay send failed, reconnecting");
        *session = None;
        let mut stream = self.open_session().await?;
        match send_on(&mut stream, command).await {
            Ok(()) => {
                *session = Some(stream);
                Ok(())
            }
            Err(second) => {
                warn!(command, error = %second, "Relay send failed after reconnect");
                Err(second)
            }
        }
    }

    pub async fn send_command(&self, command: &str) -> Result<(), RelayError> {
        let mut session = self.session.lock().await;
        self.send_locked(&mut session, command).await
    }

    pub async fn write_mask(&self, mask: u16) -> Result<(), RelayError> {
        self.send_command(&format!("relay writeall {}", encode_mask(mask))).await
    }

    pub async fn relay_on(&self, channel: u8) -> Result<(), RelayError> {
        if channel >= CHANNEL_COUNT {
            return Err(RelayError::InvalidChannel(channel));
        }
        self.send_command(&format!("relay on {}", channel)).await
    }

    pub async fn relay_off(&self, channel: u8) -> Result<(), RelayError> {
        if channel >= CHANNEL_COUNT {
            return Err(RelayError::InvalidChannel(channel));
        }
        self.send_command(&format!("relay off {}", channel)).await
    }

    /// Query the board and return the energised channels.
    pub async fn status(&self) -> Result<Vec<u8>, RelayError> {
        let mut session = self.session.lock().await;
        self.send_locked(&mut session, "relay readall").await?;
        let stream = session.as_mut().ok_or(RelayError::Closed)?;
        let response = self
            .read_response(stream, |text| parse_status(text).is_some() && text.contains('>'))
            .await?;
        let mask = parse_status(&response).ok_or_else(|| RelayError::Status(response.trim().to_string()))?;
        Ok(channels_in(mask))
    }
}

#[async_trait]
impl RelayActuator for TelnetRelay {
    async fn assert_phase(&self, phase: &Phase) -> Result<(), RelayError> {
        let mask = self.map.mask(phase, &self.kinds)?;
        debug!(phase = %phase, mask = %encode_mask(mask), "Writing relay mask");
        self.write_mask(mask).await
    }

    async fn all_off(&self) -> Result<(), RelayError> {
        self.send_command("reset").await
    }

    async fn close(&self) {
        if let Some(mut stream) = self.session.lock().await.take() {
            let _ = stream.shutdown().await;
            info!(address = %self.settings.addr(), "Relay session closed");
        }
    }

    fn backend_name(&self) -> &str {
        "telnet"
    }
}

async fn write_line(stream: &mut TcpStream, payload: &[u8]) -> Result<(), RelayError> {
    let mut line = Vec::with_capacity(payload.len() + 2);
    line.extend_from_slice(payload);
    line.extend_from_slice(b"\r\n");
    stream.write_all(&line).await.map_err(RelayError::Send)?;
    stream.flush().await.map_err(RelayError::Send)
}

/// Drop unread echo/prompt bytes so they cannot pile up in the socket, then
/// send. A zero-length read means the board hung up.
async fn send_on(stream: &mut TcpStream, command: &str) -> Result<(), RelayError> {
    let mut buf = [0u8; 512];
    loop {
        match stream.try_read(&mut buf) {
            Ok(0) => return Err(RelayError::Closed),
            Ok(_) => continue,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(RelayError::Send(e)),
        }
    }
    write_line(stream, command.as_bytes()).await
}
