//! Length-prefixed frame transport.
//!
//! Every frame on the input pipe is a 4-byte big-endian length followed by
//! exactly that many payload bytes:
//!
//! ```text
//! [u32 BE total_length][total_length bytes of payload]
//! ```
//!
//! The reader only hands out payloads that were read in full. A stream that
//! closes inside a payload yields `ReadOutcome::Incomplete`; a stream that
//! closes on (or inside) a length prefix yields `ReadOutcome::EndOfStream`.

use std::io::{self, Read, Write};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Default cap on a single frame payload (32 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 32 * 1024 * 1024;

const DISCARD_CHUNK_BYTES: usize = 64 * 1024;

/// Result of a single `FrameReader::read_frame` call.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete payload of exactly the declared length.
    Frame(Vec<u8>),
    /// The stream ended before a full length prefix was available.
    EndOfStream,
    /// The stream ended inside a payload.
    Incomplete { declared: u32, received: usize },
    /// The declared length exceeded the reader's cap. The payload bytes were
    /// consumed and discarded.
    Oversized { declared: u32 },
}

/// Reads length-prefixed frames from a byte stream.
pub struct FrameReader<R> {
    inner: R,
    max_frame_bytes: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_bytes(inner, DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            inner,
            max_frame_bytes,
        }
    }

    /// Read the next frame.
    ///
    /// Blocks as long as the underlying stream blocks. Errors other than
    /// `ErrorKind::Interrupted` are returned to the caller unchanged.
    pub fn read_frame(&mut self) -> io::Result<ReadOutcome> {
        let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
        if read_full(&mut self.inner, &mut prefix)? < LENGTH_PREFIX_BYTES {
            return Ok(ReadOutcome::EndOfStream);
        }
        let declared = u32::from_be_bytes(prefix);
        let length = declared as usize;

        if length > self.max_frame_bytes {
            let discarded = self.discard(length)?;
            if discarded < length {
                return Ok(ReadOutcome::Incomplete {
                    declared,
                    received: discarded,
                });
            }
            return Ok(ReadOutcome::Oversized { declared });
        }

        let mut payload = vec![0u8; length];
        let received = read_full(&mut self.inner, &mut payload)?;
        if received < length {
            return Ok(ReadOutcome::Incomplete { declared, received });
        }
        Ok(ReadOutcome::Frame(payload))
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn discard(&mut self, length: usize) -> io::Result<usize> {
        let mut scratch = vec![0u8; DISCARD_CHUNK_BYTES.min(length)];
        let mut discarded = 0;
        while discarded < length {
            let want = (length - discarded).min(scratch.len());
            let read = read_full(&mut self.inner, &mut scratch[..want])?;
            discarded += read;
            if read < want {
                break;
            }
        }
        Ok(discarded)
    }
}

/// Fill `buf` from `reader`, stopping early only when a read returns zero.
///
/// Returns the number of bytes actually placed in `buf`.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Write one frame (length prefix + payload) to `writer`.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let length = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame payload of {} bytes exceeds u32 length prefix", payload.len()),
        )
    })?;
    writer.write_all(&length.to_be_bytes())?;
    writer.write_all(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Yields at most `step` bytes per read to exercise partial reads.
    struct Trickle<R> {
        inner: R,
        step: usize,
    }

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.inner.read(&mut buf[..n])
        }
    }

    fn framed(payloads: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for payload in payloads {
            write_frame(&mut out, payload).unwrap();
        }
        out
    }

    #[test]
    fn reads_frames_of_declared_length() {
        let bytes = framed(&[b"hello", b"", b"world!"]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        assert_eq!(reader.read_frame().unwrap(), ReadOutcome::Frame(b"hello".to_vec()));
        assert_eq!(reader.read_frame().unwrap(), ReadOutcome::Frame(Vec::new()));
        assert_eq!(reader.read_frame().unwrap(), ReadOutcome::Frame(b"world!".to_vec()));
        assert_eq!(reader.read_frame().unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn accumulates_partial_reads() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let bytes = framed(&[&payload]);
        let mut reader = FrameReader::new(Trickle {
            inner: Cursor::new(bytes),
            step: 7,
        });

        assert_eq!(reader.read_frame().unwrap(), ReadOutcome::Frame(payload));
        assert_eq!(reader.read_frame().unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn empty_stream_is_end_of_stream() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        assert_eq!(reader.read_frame().unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn short_length_prefix_is_end_of_stream() {
        let mut reader = FrameReader::new(Cursor::new(vec![0u8, 0, 1]));
        assert_eq!(reader.read_frame().unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn truncated_payload_is_incomplete() {
        let mut bytes = framed(&[b"0123456789"]);
        bytes.truncate(LENGTH_PREFIX_BYTES + 4);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        assert_eq!(
            reader.read_frame().unwrap(),
            ReadOutcome::Incomplete {
                declared: 10,
                received: 4
            }
        );
        assert_eq!(reader.read_frame().unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn oversized_frame_is_drained_and_next_frame_survives() {
        let big = vec![0xAB; 100];
        let bytes = framed(&[&big, b"ok"]);
        let mut reader = FrameReader::with_max_frame_bytes(Cursor::new(bytes), 16);

        assert_eq!(
            reader.read_frame().unwrap(),
            ReadOutcome::Oversized { declared: 100 }
        );
        assert_eq!(reader.read_frame().unwrap(), ReadOutcome::Frame(b"ok".to_vec()));
    }

    #[test]
    fn oversized_frame_cut_short_is_incomplete() {
        let mut bytes = framed(&[&[1u8; 64]]);
        bytes.truncate(LENGTH_PREFIX_BYTES + 20);
        let mut reader = FrameReader::with_max_frame_bytes(Cursor::new(bytes), 8);

        assert_eq!(
            reader.read_frame().unwrap(),
            ReadOutcome::Incomplete {
                declared: 64,
                received: 20
            }
        );
    }

    #[test]
    fn write_frame_prefixes_big_endian_length() {
        let mut out = Vec::new();
        write_frame(&mut out, &[9u8; 258]).unwrap();
        assert_eq!(&out[..4], &[0, 0, 1, 2]);
        assert_eq!(out.len(), 4 + 258);
    }
}
