//! Fixed-size buffered copy between the record stream and a destination.

use std::io::{self, Read, Write};
use thiserror::Error;

pub const DEFAULT_BUFFER_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum CopyError {
    /// The stream ended early or failed; record alignment is lost.
    #[error("reading stream: {0}")]
    Read(io::Error),

    /// The destination rejected a chunk. The stream was still consumed.
    #[error("writing destination: {0}")]
    Write(io::Error),
}

/// Copy exactly `size` bytes from `input` to `output`, full buffers first,
/// then the remainder.
///
/// After a write failure the remaining bytes are still read and discarded,
/// so `input` ends up right behind the content either way.
pub fn copy_exact<R, W>(
    input: &mut R,
    output: &mut W,
    size: u64,
    buffer_size: usize,
) -> Result<u64, CopyError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; buffer_size.clamp(1, 1 << 24)];
    let chunk = buf.len() as u64;
    let (full, rest) = (size / chunk, size % chunk);

    let mut written = 0u64;
    let mut failure = None;

    let lengths = std::iter::repeat(chunk)
        .take(full as usize)
        .chain((rest > 0).then_some(rest));

    for len in lengths {
        let part = &mut buf[..len as usize];
        input.read_exact(part).map_err(CopyError::Read)?;

        if failure.is_none() {
            match output.write_all(part) {
                Ok(()) => written += len,
                Err(e) => failure = Some(e),
            }
        }
    }

    match failure {
        Some(e) => Err(CopyError::Write(e)),
        None => output.flush().map(|_| written).map_err(CopyError::Write),
    }
}

/// Skip `size` bytes of `input`.
pub fn drain<R: Read + ?Sized>(input: &mut R, size: u64) -> Result<u64, CopyError> {
    copy_exact(input, &mut io::sink(), size, DEFAULT_BUFFER_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Accepts `limit` bytes, then fails every write.
    struct FailingWriter {
        accepted: Vec<u8>,
        limit: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.accepted.len() + buf.len() > self.limit {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.accepted.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_copy_full_chunks_and_rest() {
        let mut input = Cursor::new(b"0123456789tail".to_vec());
        let mut output = Vec::new();

        let copied = copy_exact(&mut input, &mut output, 10, 4).unwrap();

        assert_eq!(copied, 10);
        assert_eq!(output, b"0123456789");
        assert_eq!(input.position(), 10);
    }

    #[test]
    fn test_copy_zero_bytes() {
        let mut input = Cursor::new(b"abc".to_vec());
        let mut output = Vec::new();
        assert_eq!(copy_exact(&mut input, &mut output, 0, 4).unwrap(), 0);
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn test_write_failure_keeps_stream_aligned() {
        let mut input = Cursor::new(b"0123456789next".to_vec());
        let mut output = FailingWriter {
            accepted: Vec::new(),
            limit: 4,
        };

        let result = copy_exact(&mut input, &mut output, 10, 4);

        assert!(matches!(result, Err(CopyError::Write(_))));
        assert_eq!(output.accepted, b"0123");
        assert_eq!(input.position(), 10);
    }

    #[test]
    fn test_short_stream_is_read_error() {
        let mut input = Cursor::new(b"abc".to_vec());
        let result = copy_exact(&mut input, &mut Vec::new(), 5, 4);
        assert!(matches!(result, Err(CopyError::Read(_))));
    }

    #[test]
    fn test_drain() {
        let mut input = Cursor::new(b"skipme!rest".to_vec());
        assert_eq!(drain(&mut input, 7).unwrap(), 7);
        assert_eq!(input.position(), 7);
    }
}
