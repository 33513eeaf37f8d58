//! Splitting captured connection traffic into messages.

use std::fmt;
use std::io::Read;

use anyhow::Result;
use colonia_codec::markup::{CursorOptions, MarkupReader, TagKind};
use colonia_net::{FramingError, FramingStream, NetConfig};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub index: usize,
    pub bytes: usize,
    /// Document element, or `None` for an empty or unparseable message.
    pub root: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FrameScan {
    pub frames: Vec<FrameReport>,
    /// Bytes of an unterminated message at the end of the capture.
    pub truncated: Option<usize>,
}

pub fn scan_frames<R: Read>(source: R, net: &NetConfig, trace_markup: bool) -> Result<FrameScan> {
    let mut stream = FramingStream::with_config(source, net.sentinel, net.buffer_size);
    let mut scan = FrameScan::default();
    loop {
        match stream.read_message() {
            Ok(Some(message)) => {
                let index = scan.frames.len();
                scan.frames.push(FrameReport {
                    index,
                    bytes: message.len(),
                    root: root_element(&message, trace_markup),
                });
            }
            Ok(None) => break,
            Err(FramingError::Truncated { read }) => {
                warn!(read, "capture ends inside a message");
                scan.truncated = Some(read);
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(scan)
}

fn root_element(message: &[u8], trace_markup: bool) -> Option<String> {
    let mut cursor = MarkupReader::with_options(message, CursorOptions { trace: trace_markup });
    match cursor.try_next_tag() {
        Ok(Some(TagKind::Start)) => Some(cursor.local_name().to_string()),
        _ => None,
    }
}

impl fmt::Display for FrameScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            writeln!(
                f,
                "#{:<5} {:>8} bytes  {}",
                frame.index,
                frame.bytes,
                frame.root.as_deref().unwrap_or("-")
            )?;
        }
        write!(f, "{} messages", self.frames.len())?;
        if let Some(read) = self.truncated {
            write!(f, ", {read} trailing bytes without a sentinel")?;
        }
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_each_message_and_its_root() {
        let capture = b"<update><unit id=\"unit:1\"/></update>\n\n<disconnect/>\n";
        let scan = scan_frames(&capture[..], &NetConfig::default(), false).unwrap();
        assert_eq!(scan.frames.len(), 3);
        assert_eq!(scan.frames[0].root.as_deref(), Some("update"));
        assert_eq!(scan.frames[0].bytes, 36);
        assert_eq!(scan.frames[1].root, None);
        assert_eq!(scan.frames[2].root.as_deref(), Some("disconnect"));
        assert_eq!(scan.truncated, None);
    }

    #[test]
    fn trailing_partial_message_is_reported() {
        let net = NetConfig {
            sentinel: b'|',
            buffer_size: 4,
            ..NetConfig::default()
        };
        let scan = scan_frames(&b"<a/>|<b/>|<c"[..], &net, true).unwrap();
        assert_eq!(scan.frames.len(), 2);
        assert_eq!(scan.truncated, Some(2));
        assert!(scan.to_string().contains("2 messages, 2 trailing bytes"));
    }
}
