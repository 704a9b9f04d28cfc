//! # Message Frame - Compact Variable-Length Envelope
//!
//! ## Purpose
//!
//! Every logical message travels in one frame: a one-byte prefix carrying
//! the 3-bit type tag and a 5-bit compact length, an optional 32-bit
//! extended length, a 16-bit timestamp offset, and the opaque payload.
//!
//! ```text
//! ┌──────────────────┬───────────────┬──────────────┬─────────────────┐
//! │ type:3 | len:5   │ len:u32be (*) │ ts_off:u16be │ payload: L bytes│
//! └──────────────────┴───────────────┴──────────────┴─────────────────┘
//!  (*) present only when the 5-bit field is zero (payloads ≥ 32 bytes)
//! ```
//!
//! The prefix-then-length shape is what makes streams seekable: a scanner
//! reads at most 7 bytes per frame, then skips the payload wholesale.
//!
//! EOF cleanly between frames is end-of-stream; EOF anywhere inside a
//! frame is a corrupt stream.

use std::io::{self, Read, Write};

use num_enum::TryFromPrimitive;
use tracing::trace;

use crate::error::{ArthurError, ArthurResult};

/// Three-bit message-type tag carried in the frame prefix.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum FrameKind {
    Timestamp = 0,
    Snapshot = 1,
    AskDiff = 2,
    AskRemoval = 3,
    BidDiff = 4,
    BidRemoval = 5,
    Trade = 6,
    Disconnect = 7,
}

impl FrameKind {
    pub fn name(self) -> &'static str {
        match self {
            FrameKind::Timestamp => "timestamp",
            FrameKind::Snapshot => "snapshot",
            FrameKind::AskDiff => "ask-diff",
            FrameKind::AskRemoval => "ask-removal",
            FrameKind::BidDiff => "bid-diff",
            FrameKind::BidRemoval => "bid-removal",
            FrameKind::Trade => "trade",
            FrameKind::Disconnect => "disconnect",
        }
    }

    /// Diff or removal tag for a book side.
    pub fn for_level(is_bid: bool, removal: bool) -> Self {
        match (is_bid, removal) {
            (true, false) => FrameKind::BidDiff,
            (true, true) => FrameKind::BidRemoval,
            (false, false) => FrameKind::AskDiff,
            (false, true) => FrameKind::AskRemoval,
        }
    }

    /// True for diffs and removals, the frame kinds that need book widths
    /// and carry their side in the tag.
    pub fn is_level(self) -> bool {
        matches!(
            self,
            FrameKind::AskDiff | FrameKind::AskRemoval | FrameKind::BidDiff | FrameKind::BidRemoval
        )
    }
}

/// Largest payload the compact single-byte length form can carry.
const COMPACT_LEN_LIMIT: u32 = 31;

/// Byte length of a TIMESTAMP frame payload (u64 big-endian milliseconds).
pub const TIMESTAMP_PAYLOAD_LEN: usize = 8;

/// Everything in a frame except the payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: FrameKind,
    pub payload_len: u32,
    pub ts_off: u16,
}

/// A complete frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

/// Write one frame. The payload length must be in `[1, u32::MAX]`.
pub fn write_frame<W: Write>(
    sink: &mut W,
    kind: FrameKind,
    ts_off: u16,
    payload: &[u8],
) -> ArthurResult<()> {
    debug_assert!(!payload.is_empty() && payload.len() <= u32::MAX as usize);
    let len = payload.len() as u32;

    if len <= COMPACT_LEN_LIMIT {
        sink.write_all(&[(kind as u8) << 5 | len as u8])?;
    } else {
        sink.write_all(&[(kind as u8) << 5])?;
        sink.write_all(&len.to_be_bytes())?;
    }
    sink.write_all(&ts_off.to_be_bytes())?;
    sink.write_all(payload)?;
    trace!(kind = kind.name(), len, ts_off, "frame written");
    Ok(())
}

/// Read a frame header, or `None` on clean EOF at a frame boundary.
pub fn read_frame_header<R: Read>(source: &mut R) -> ArthurResult<Option<FrameHeader>> {
    let mut prefix = [0u8; 1];
    match source.read_exact(&mut prefix) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    // The tag occupies three bits, so every value 0..=7 is a valid kind.
    let kind = FrameKind::try_from(prefix[0] >> 5)
        .map_err(|_| ArthurError::corrupt("frame prefix", "type tag out of range"))?;

    let payload_len = match u32::from(prefix[0] & 0x1F) {
        0 => {
            let mut len = [0u8; 4];
            read_exact_or_corrupt(source, &mut len, "frame length")?;
            match u32::from_be_bytes(len) {
                0 => return Err(ArthurError::corrupt("frame length", "zero payload length")),
                n => n,
            }
        }
        n => n,
    };

    let mut ts_off = [0u8; 2];
    read_exact_or_corrupt(source, &mut ts_off, "frame timestamp offset")?;

    let header = FrameHeader {
        kind,
        payload_len,
        ts_off: u16::from_be_bytes(ts_off),
    };
    trace!(
        kind = header.kind.name(),
        len = header.payload_len,
        ts_off = header.ts_off,
        "frame header read"
    );
    Ok(Some(header))
}

/// Read a complete frame, or `None` on clean EOF at a frame boundary.
pub fn read_frame<R: Read>(source: &mut R) -> ArthurResult<Option<Frame>> {
    let Some(header) = read_frame_header(source)? else {
        return Ok(None);
    };
    let mut payload = vec![0u8; header.payload_len as usize];
    read_exact_or_corrupt(source, &mut payload, "frame payload")?;
    Ok(Some(Frame { header, payload }))
}

/// Discard `len` payload bytes without decoding them.
pub fn skip_payload<R: Read>(source: &mut R, len: u32) -> ArthurResult<()> {
    let copied = io::copy(&mut source.take(u64::from(len)), &mut io::sink())?;
    if copied != u64::from(len) {
        return Err(ArthurError::corrupt("frame payload", "truncated during skip"));
    }
    Ok(())
}

/// Emit a TIMESTAMP frame: tag 0, offset 0, payload the new 64-bit
/// big-endian millisecond reference.
pub fn write_timestamp_frame<W: Write>(sink: &mut W, timestamp: u64) -> ArthurResult<()> {
    write_frame(sink, FrameKind::Timestamp, 0, &timestamp.to_be_bytes())
}

/// Decode a TIMESTAMP frame payload.
pub fn decode_timestamp(payload: &[u8]) -> ArthurResult<u64> {
    let bytes: [u8; TIMESTAMP_PAYLOAD_LEN] = payload.try_into().map_err(|_| {
        ArthurError::corrupt(
            "timestamp payload",
            format!("expected {} bytes, got {}", TIMESTAMP_PAYLOAD_LEN, payload.len()),
        )
    })?;
    Ok(u64::from_be_bytes(bytes))
}

pub(crate) fn read_exact_or_corrupt<R: Read>(
    source: &mut R,
    buf: &mut [u8],
    context: &'static str,
) -> ArthurResult<()> {
    source.read_exact(buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ArthurError::corrupt(context, "truncated mid-frame")
        } else {
            ArthurError::from(err)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_assigned_tag_values() {
        assert_eq!(FrameKind::Timestamp as u8, 0);
        assert_eq!(FrameKind::Snapshot as u8, 1);
        assert_eq!(FrameKind::AskDiff as u8, 2);
        assert_eq!(FrameKind::AskRemoval as u8, 3);
        assert_eq!(FrameKind::BidDiff as u8, 4);
        assert_eq!(FrameKind::BidRemoval as u8, 5);
        assert_eq!(FrameKind::Trade as u8, 6);
        assert_eq!(FrameKind::Disconnect as u8, 7);
    }

    #[test]
    fn test_compact_frame_round_trip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, FrameKind::Disconnect, 500, &[0]).unwrap();
        assert_eq!(buf.len(), 4); // prefix + ts_off + one body byte
        assert_eq!(buf[0], 7 << 5 | 1);

        let frame = read_frame(&mut Cursor::new(&buf)).unwrap().unwrap();
        assert_eq!(frame.header.kind, FrameKind::Disconnect);
        assert_eq!(frame.header.payload_len, 1);
        assert_eq!(frame.header.ts_off, 500);
        assert_eq!(frame.payload, vec![0]);
    }

    #[test]
    fn test_extended_length_boundary() {
        // 31 bytes still fits the compact form; 32 forces the extended form.
        let mut compact = Vec::new();
        write_frame(&mut compact, FrameKind::Trade, 0, &[0xAB; 31]).unwrap();
        assert_eq!(compact.len(), 1 + 2 + 31);

        let mut extended = Vec::new();
        write_frame(&mut extended, FrameKind::Trade, 0, &[0xAB; 32]).unwrap();
        assert_eq!(extended.len(), 1 + 4 + 2 + 32);
        assert_eq!(extended[0], 6 << 5);
        assert_eq!(&extended[1..5], &32u32.to_be_bytes());

        for buf in [compact, extended] {
            let frame = read_frame(&mut Cursor::new(&buf)).unwrap().unwrap();
            assert!(frame.payload.iter().all(|b| *b == 0xAB));
        }
    }

    #[test]
    fn test_eof_at_boundary_is_end_of_stream() {
        assert!(read_frame(&mut Cursor::new(&[])).unwrap().is_none());
    }

    #[test]
    fn test_truncation_mid_frame_is_corrupt() {
        let mut buf = Vec::new();
        write_frame(&mut buf, FrameKind::Snapshot, 7, &[1, 2, 3, 4]).unwrap();
        for cut in 1..buf.len() {
            let err = read_frame(&mut Cursor::new(&buf[..cut])).unwrap_err();
            assert!(
                matches!(err, ArthurError::CorruptStream { .. }),
                "cut at {cut} should be corrupt, got {err}"
            );
        }
    }

    #[test]
    fn test_zero_extended_length_is_corrupt() {
        let buf = [6u8 << 5, 0, 0, 0, 0, 0, 0];
        let err = read_frame(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, ArthurError::CorruptStream { .. }));
    }

    #[test]
    fn test_skip_advances_past_payload() {
        let mut buf = Vec::new();
        write_frame(&mut buf, FrameKind::Trade, 1, &[9; 40]).unwrap();
        write_frame(&mut buf, FrameKind::Disconnect, 2, &[0]).unwrap();

        let mut cursor = Cursor::new(&buf);
        let first = read_frame_header(&mut cursor).unwrap().unwrap();
        skip_payload(&mut cursor, first.payload_len).unwrap();
        let second = read_frame_header(&mut cursor).unwrap().unwrap();
        assert_eq!(second.kind, FrameKind::Disconnect);
    }

    #[test]
    fn test_timestamp_frame_shape() {
        let mut buf = Vec::new();
        write_timestamp_frame(&mut buf, 1_700_000_000_000).unwrap();
        let frame = read_frame(&mut Cursor::new(&buf)).unwrap().unwrap();
        assert_eq!(frame.header.kind, FrameKind::Timestamp);
        assert_eq!(frame.header.ts_off, 0);
        assert_eq!(decode_timestamp(&frame.payload).unwrap(), 1_700_000_000_000);
        assert!(decode_timestamp(&frame.payload[..7]).is_err());
    }
}
