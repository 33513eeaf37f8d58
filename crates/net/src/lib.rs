#![warn(missing_docs)]
//! Framed transport for markup messages between client and server.
//!
//! [`FramingStream`] splits a byte stream into sentinel-terminated messages;
//! [`Connection`] layers the object graph reader and writer on top of a TCP
//! stream.

mod config;
mod connection;
mod framing;

pub use config::{NetConfig, SAFE_SENTINELS};
pub use connection::{Connection, DISCONNECT_TAG, UPDATE_TAG};
pub use framing::{
    write_frame, FramingError, FramingStream, HardClose, DEFAULT_BUFFER_SIZE, DEFAULT_SENTINEL,
};
