//! Wire codec for the capacity server.
//!
//! One exchange per connection: the client writes a single big-endian `i32`,
//! the server answers with a single big-endian `i32`, and both sides close.
//! There is no header, length prefix or keep-alive.
//!
//! | request code | meaning              | success response   |
//! |--------------|----------------------|--------------------|
//! | `n > 0`      | acquire `n` units    | `n`                |
//! | `n < 0`      | release `-n` units   | `-n`               |
//! | `0`          | query available      | available (`>= 0`) |
//!
//! A failed acquire is answered with [`REFUSED`].

use std::io::{self, Read, Write};

/// Size in bytes of a request or a response frame.
pub const FRAME_LEN: usize = 4;

/// Response sent when a request cannot be honoured.
pub const REFUSED: i32 = -1;

/// Decoded request code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Report the currently available units.
    Query,
    /// Take the given number of units.
    Acquire(i32),
    /// Hand back the given number of units.
    Release(i32),
}

impl Request {
    /// Interpret a signed request code.
    ///
    /// Returns `None` for `i32::MIN`, whose magnitude has no `i32` encoding.
    #[must_use]
    pub const fn decode(code: i32) -> Option<Self> {
        if code == 0 {
            Some(Self::Query)
        } else if code > 0 {
            Some(Self::Acquire(code))
        } else {
            match code.checked_neg() {
                Some(units) => Some(Self::Release(units)),
                None => None,
            }
        }
    }

    /// Signed code that carries this request on the wire.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Query => 0,
            Self::Acquire(units) => units,
            Self::Release(units) => -units,
        }
    }

    /// Response that confirms this request, if the request has a fixed one.
    #[must_use]
    pub const fn confirmation(self) -> Option<i32> {
        match self {
            Self::Query => None,
            Self::Acquire(units) | Self::Release(units) => Some(units),
        }
    }
}

/// Write one frame and flush it.
///
/// # Errors
///
/// Propagates any I/O error from the underlying writer.
pub fn write_code<W: Write>(writer: &mut W, code: i32) -> io::Result<()> {
    writer.write_all(&code.to_be_bytes())?;
    writer.flush()
}

/// Read exactly one frame.
///
/// # Errors
///
/// `UnexpectedEof` if the peer closes before four bytes arrive, or any other
/// I/O error from the underlying reader.
pub fn read_code<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut frame = [0_u8; FRAME_LEN];
    reader.read_exact(&mut frame)?;
    Ok(i32::from_be_bytes(frame))
}

/// Client half of an exchange: send `code`, wait for the response.
///
/// # Errors
///
/// Propagates write and read failures.
pub fn exchange<S: Read + Write>(stream: &mut S, code: i32) -> io::Result<i32> {
    write_code(stream, code)?;
    read_code(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frames_are_big_endian() {
        let mut out = Vec::new();
        write_code(&mut out, 7).unwrap();
        write_code(&mut out, REFUSED).unwrap();
        assert_eq!(out, vec![0, 0, 0, 7, 0xff, 0xff, 0xff, 0xff]);

        let mut input = Cursor::new(vec![0, 0, 0, 43]);
        assert_eq!(read_code(&mut input).unwrap(), 43);
    }

    #[test]
    fn test_short_frame_is_unexpected_eof() {
        let mut input = Cursor::new(vec![0, 0, 7]);
        let err = read_code(&mut input).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_decode_request_codes() {
        assert_eq!(Request::decode(0), Some(Request::Query));
        assert_eq!(Request::decode(7), Some(Request::Acquire(7)));
        assert_eq!(Request::decode(-7), Some(Request::Release(7)));
        assert_eq!(Request::decode(i32::MIN), None);
        assert_eq!(Request::Release(7).code(), -7);
        assert_eq!(Request::Release(7).confirmation(), Some(7));
        assert_eq!(Request::Query.confirmation(), None);
    }

    #[test]
    fn test_exchange_writes_request_then_reads_response() {
        struct Duplex {
            written: Vec<u8>,
            reply: Cursor<Vec<u8>>,
        }
        impl Read for Duplex {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                self.reply.read(buf)
            }
        }
        impl Write for Duplex {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.written.write(buf)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut stream = Duplex {
            written: Vec::new(),
            reply: Cursor::new(7_i32.to_be_bytes().to_vec()),
        };
        assert_eq!(exchange(&mut stream, -7).unwrap(), 7);
        assert_eq!(stream.written, (-7_i32).to_be_bytes().to_vec());
    }
}
