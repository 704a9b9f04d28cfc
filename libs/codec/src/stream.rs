//! # Stream Endpoints - Writer and Reader
//!
//! ## Purpose
//!
//! Thin stateful wrappers tying a serialization context to one byte sink
//! or source. Both are single-threaded, sequentially consistent objects:
//! all I/O is synchronous against the supplied stream, no buffering beyond
//! per-message scratch, no shared state between endpoints. Concurrent
//! writers need independent streams — the on-stream context state machine
//! requires total ordering.

use std::io::{Read, Write};

use tracing::trace;

use arthur_types::Message;

use crate::context::Context;
use crate::driver::{read_message, write_message};
use crate::error::{ArthurError, ArthurResult};
use crate::frame::{
    decode_timestamp, read_exact_or_corrupt, read_frame_header, skip_payload, FrameHeader,
    FrameKind,
};

/// Serializing endpoint over an append-only byte sink.
pub struct Writer<W: Write> {
    context: Context,
    sink: Option<W>,
}

impl<W: Write> Writer<W> {
    pub fn new(sink: W) -> Self {
        Self {
            context: Context::new(),
            sink: Some(sink),
        }
    }

    /// Serialize one message. Emits a TIMESTAMP frame first when the
    /// message's timestamp cannot be expressed as an offset from the
    /// current reference.
    pub fn write(&mut self, message: impl Into<Message>) -> ArthurResult<()> {
        let sink = self.sink.as_mut().ok_or(ArthurError::StreamClosed)?;
        let message = message.into();
        trace!(kind = message.kind_name(), ts = message.timestamp(), "writing message");
        write_message(&mut self.context, sink, message)
    }

    /// Current serialization context (reference timestamp and field widths).
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Flush and release the sink. Idempotent; writes after the first
    /// close fail with [`ArthurError::StreamClosed`].
    pub fn close(&mut self) -> ArthurResult<()> {
        if let Some(mut sink) = self.sink.take() {
            sink.flush()?;
        }
        Ok(())
    }

    /// Flush and hand the sink back (in-memory sinks, tooling).
    pub fn into_inner(mut self) -> ArthurResult<W> {
        let mut sink = self.sink.take().ok_or(ArthurError::StreamClosed)?;
        sink.flush()?;
        Ok(sink)
    }
}

/// Deserializing endpoint over a forward-read byte source.
pub struct Reader<R: Read> {
    context: Context,
    source: Option<R>,
}

impl<R: Read> Reader<R> {
    pub fn new(source: R) -> Self {
        Self {
            context: Context::new(),
            source: Some(source),
        }
    }

    /// Decode the next logical message; `None` at a clean end of stream.
    pub fn read(&mut self) -> ArthurResult<Option<Message>> {
        let source = self.source.as_mut().ok_or(ArthurError::StreamClosed)?;
        read_message(&mut self.context, source)
    }

    /// Advance past one frame without decoding its body.
    ///
    /// TIMESTAMP payloads are still applied so the scan keeps an accurate
    /// clock; skipping a SNAPSHOT forfeits the widths needed to decode the
    /// book frames after it, so a skipping pass is for locating and
    /// counting, not for resuming decodes mid-stream.
    pub fn skip(&mut self) -> ArthurResult<Option<FrameHeader>> {
        let source = self.source.as_mut().ok_or(ArthurError::StreamClosed)?;
        let Some(header) = read_frame_header(source)? else {
            return Ok(None);
        };
        if header.kind == FrameKind::Timestamp {
            let mut payload = vec![0u8; header.payload_len as usize];
            read_exact_or_corrupt(source, &mut payload, "timestamp payload")?;
            self.context.timestamp = Some(decode_timestamp(&payload)?);
        } else {
            skip_payload(source, header.payload_len)?;
        }
        Ok(Some(header))
    }

    /// Current serialization context, as rebuilt from the stream so far.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Release the source. Idempotent; reads after the first close fail
    /// with [`ArthurError::StreamClosed`].
    pub fn close(&mut self) -> ArthurResult<()> {
        self.source = None;
        Ok(())
    }
}

/// Messages until end of stream; a closed reader yields nothing.
impl<R: Read> Iterator for Reader<R> {
    type Item = ArthurResult<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        self.source.as_ref()?;
        self.read().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arthur_types::{BookSnapshot, Disconnect};
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    #[test]
    fn test_writer_close_is_idempotent() {
        let mut writer = Writer::new(Vec::new());
        writer
            .write(BookSnapshot::new(vec![], vec![], 1, dec!(0.01), dec!(0.001)))
            .unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(matches!(
            writer.write(Disconnect::new(2)).unwrap_err(),
            ArthurError::StreamClosed
        ));
    }

    #[test]
    fn test_reader_close_is_idempotent() {
        let mut reader = Reader::new(Cursor::new(Vec::new()));
        reader.close().unwrap();
        reader.close().unwrap();
        assert!(matches!(reader.read().unwrap_err(), ArthurError::StreamClosed));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_into_inner_returns_bytes() {
        let mut writer = Writer::new(Vec::new());
        writer
            .write(BookSnapshot::new(vec![], vec![], 1, dec!(0.01), dec!(0.001)))
            .unwrap();
        let bytes = writer.into_inner().unwrap();
        assert!(!bytes.is_empty());
    }
}
