//! Message-oriented connection carrying markup documents over TCP.
//!
//! Every message is one markup document followed by the sentinel byte. Entity
//! updates travel wrapped in an `<update>` element; an orderly shutdown is
//! announced with a bare `<disconnect/>`.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use anyhow::{Context, Result};
use colonia_codec::markup::CursorOptions;
use colonia_codec::{EntityHandle, GraphReader, GraphWriter, Result as CodecResult, World};
use colonia_core::{ReadScope, WriteScope};
use tracing::{debug, info, warn};

use crate::config::NetConfig;
use crate::framing::{write_frame, FramingStream};

/// Element wrapping the entities of one update message.
pub const UPDATE_TAG: &str = "update";

/// Element announcing that the peer is going away.
pub const DISCONNECT_TAG: &str = "disconnect";

/// One end of a framed markup connection.
pub struct Connection {
    reader: FramingStream<TcpStream>,
    writer: TcpStream,
    peer: SocketAddr,
    config: NetConfig,
    closed: bool,
}

impl Connection {
    /// Connect to the first reachable address of `addr`.
    pub fn connect<A: ToSocketAddrs>(addr: A, config: &NetConfig) -> Result<Self> {
        config.validate().context("Invalid connection settings")?;
        let mut last_err = None;
        for candidate in addr.to_socket_addrs().context("Failed to resolve address")? {
            match TcpStream::connect_timeout(&candidate, config.connect_timeout()) {
                Ok(stream) => return Self::from_stream(stream, config),
                Err(err) => {
                    debug!(%candidate, %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")))
        .context("Failed to connect")
    }

    /// Wrap an accepted or already connected stream.
    pub fn from_stream(stream: TcpStream, config: &NetConfig) -> Result<Self> {
        config.validate().context("Invalid connection settings")?;
        stream
            .set_nodelay(true)
            .context("Failed to disable Nagle's algorithm")?;
        let peer = stream.peer_addr().context("Failed to query peer address")?;
        let writer = stream.try_clone().context("Failed to clone stream")?;
        info!(%peer, "connection established");
        Ok(Self {
            reader: FramingStream::with_config(stream, config.sentinel, config.buffer_size),
            writer,
            peer,
            config: config.clone(),
            closed: false,
        })
    }

    /// Remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether [`Connection::close`] or [`Connection::hard_close`] ran.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send one raw message.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        write_frame(&mut self.writer, payload, self.config.sentinel)
            .with_context(|| format!("Failed to send to {}", self.peer))
    }

    /// Send `entities` as one update, redacted for `scope`.
    pub fn send_entities(&mut self, scope: WriteScope, entities: &[EntityHandle]) -> Result<()> {
        let mut xw = GraphWriter::new(io::sink(), scope).context("Invalid write scope")?;
        xw.write_start(UPDATE_TAG)?;
        for entity in entities {
            xw.write_handle(entity)?;
        }
        xw.write_end()?;
        let document = xw.into_string().context("Failed to serialize update")?;
        debug!(
            peer = %self.peer,
            entities = entities.len(),
            bytes = document.len(),
            "sending update"
        );
        self.send(document.as_bytes())
    }

    /// Receive one raw message; `None` once the peer has closed the stream.
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>> {
        self.reader
            .read_message()
            .with_context(|| format!("Failed to receive from {}", self.peer))
    }

    /// Receive one update and read its entities into `world`.
    ///
    /// Returns `None` when the peer disconnected, either by announcing it or
    /// by closing the stream between messages.
    pub fn read_entities(
        &mut self,
        world: &mut World,
        scope: ReadScope,
    ) -> Result<Option<Vec<EntityHandle>>> {
        if self.reader.at_end().context("Failed to poll connection")? {
            info!(peer = %self.peer, "peer closed the connection");
            return Ok(None);
        }
        let options = CursorOptions {
            trace: self.config.trace_markup,
        };
        let parsed = {
            let mut xr = GraphReader::with_options(&mut self.reader, world, scope, options);
            parse_update(&mut xr)
        };
        let entities = match parsed {
            Ok(entities) => entities,
            Err(err) => {
                // Drop the rest of the bad message so the next one frames cleanly.
                match self.reader.finish_message() {
                    Ok(skipped) => {
                        warn!(peer = %self.peer, skipped, %err, "dropped malformed message")
                    }
                    Err(drain) => {
                        warn!(peer = %self.peer, %err, %drain, "malformed message cut short")
                    }
                }
                return Err(err).with_context(|| format!("Bad message from {}", self.peer));
            }
        };
        let skipped = self.reader.finish_message()?;
        if skipped > 0 {
            warn!(peer = %self.peer, skipped, "discarded trailing message bytes");
        }
        match &entities {
            Some(entities) => debug!(peer = %self.peer, entities = entities.len(), "update read"),
            None => info!(peer = %self.peer, "peer disconnected"),
        }
        Ok(entities)
    }

    /// Announce the disconnect to the peer. The stream stays open until
    /// [`Connection::hard_close`] or drop.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.reader.close();
        info!(peer = %self.peer, "closing connection");
        self.send(format!("<{DISCONNECT_TAG}/>").as_bytes())
    }

    /// Shut the socket down in both directions.
    pub fn hard_close(&mut self) -> Result<()> {
        self.closed = true;
        info!(peer = %self.peer, "hard close");
        self.reader
            .hard_close()
            .with_context(|| format!("Failed to shut down connection to {}", self.peer))
    }
}

/// Read one message document: an `<update>` with entities, or a disconnect.
fn parse_update(xr: &mut GraphReader<'_>) -> CodecResult<Option<Vec<EntityHandle>>> {
    xr.next_tag()?;
    if xr.at_tag(DISCONNECT_TAG) {
        return Ok(None);
    }
    xr.expect_tag(UPDATE_TAG)?;
    let mut entities = Vec::new();
    while xr.more_tags()? {
        entities.push(xr.read_any()?);
    }
    xr.expect_tag(UPDATE_TAG)?;
    if xr.try_next_tag()?.is_some() {
        return Err(xr.parse_error("content after the end of the update"));
    }
    Ok(Some(entities))
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("closed", &self.closed)
            .finish()
    }
}
