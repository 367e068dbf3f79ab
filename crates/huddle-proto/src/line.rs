//! Bounded line decoding.
//!
//! Lines are cut out of a receive buffer in place. A line ends at the first
//! `\n` or NUL byte; NUL bytes left in front of the next line (the padding of
//! a fixed-size frame) are discarded before searching. The limit applies to
//! the line content, excluding its terminator, and is checked before the
//! whole line has arrived so a peer cannot grow the buffer without bound.

use bytes::{Buf, BytesMut};

use crate::errors::{ProtocolError, Result};

/// Decode the next complete line from `buf`.
///
/// Returns `Ok(None)` when more bytes are needed. Consumed bytes, including
/// the terminator, are removed from `buf`.
///
/// # Errors
///
/// - `ProtocolError::LineTooLong` if the line content exceeds `limit`, whether
///   or not its terminator has arrived yet
/// - `ProtocolError::InvalidUtf8` if the line is not UTF-8
pub fn decode_line(buf: &mut BytesMut, limit: usize) -> Result<Option<String>> {
    skip_padding(buf);

    let Some(end) = buf.iter().position(|&b| b == b'\n' || b == 0) else {
        if buf.len() > limit {
            return Err(ProtocolError::LineTooLong { limit });
        }
        return Ok(None);
    };

    if end > limit {
        return Err(ProtocolError::LineTooLong { limit });
    }

    let line = buf.split_to(end);
    buf.advance(1);
    into_text(&line).map(Some)
}

/// Decode whatever is left in `buf` once the peer stopped sending.
///
/// A peer may close its side right after the last line without terminating
/// it. Returns `Ok(None)` if nothing but padding remains.
pub fn decode_eof(buf: &mut BytesMut, limit: usize) -> Result<Option<String>> {
    if let Some(line) = decode_line(buf, limit)? {
        return Ok(Some(line));
    }

    if buf.is_empty() {
        return Ok(None);
    }

    let rest = buf.split();
    into_text(&rest).map(Some)
}

fn skip_padding(buf: &mut BytesMut) {
    let padding = buf.iter().take_while(|&&b| b == 0).count();
    buf.advance(padding);
}

fn into_text(bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok(text.strip_suffix('\r').unwrap_or(text).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_newline_terminated_lines() {
        let mut buf = BytesMut::from(&b"R\nalice\n"[..]);

        assert_eq!(decode_line(&mut buf, 32).unwrap(), Some("R".to_string()));
        assert_eq!(decode_line(&mut buf, 32).unwrap(), Some("alice".to_string()));
        assert_eq!(decode_line(&mut buf, 32).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_terminator() {
        let mut buf = BytesMut::from(&b"ali"[..]);
        assert_eq!(decode_line(&mut buf, 32).unwrap(), None);

        buf.extend_from_slice(b"ce\n");
        assert_eq!(decode_line(&mut buf, 32).unwrap(), Some("alice".to_string()));
    }

    #[test]
    fn accepts_nul_padded_frames() {
        let mut frame = vec![0u8; 32];
        frame[0] = b'L';
        let mut second = vec![0u8; 32];
        second[..3].copy_from_slice(b"bob");
        frame.extend_from_slice(&second);

        let mut buf = BytesMut::from(frame.as_slice());
        assert_eq!(decode_line(&mut buf, 32).unwrap(), Some("L".to_string()));
        assert_eq!(decode_line(&mut buf, 32).unwrap(), Some("bob".to_string()));
        assert_eq!(decode_line(&mut buf, 32).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn strips_carriage_return() {
        let mut buf = BytesMut::from(&b"sgroups\r\n"[..]);
        assert_eq!(decode_line(&mut buf, 32).unwrap(), Some("sgroups".to_string()));
    }

    #[test]
    fn rejects_overlong_line_before_terminator_arrives() {
        let mut buf = BytesMut::from(vec![b'a'; 33].as_slice());
        assert_eq!(decode_line(&mut buf, 32), Err(ProtocolError::LineTooLong { limit: 32 }));
    }

    #[test]
    fn line_at_limit_is_accepted() {
        let mut bytes = vec![b'a'; 32];
        bytes.push(b'\n');
        let mut buf = BytesMut::from(bytes.as_slice());
        assert_eq!(decode_line(&mut buf, 32).unwrap().map(|l| l.len()), Some(32));
    }

    #[test]
    fn rejects_invalid_utf8() {
        let mut buf = BytesMut::from(&[0xff, 0xfe, b'\n'][..]);
        assert_eq!(decode_line(&mut buf, 32), Err(ProtocolError::InvalidUtf8));
    }

    #[test]
    fn eof_flushes_unterminated_tail() {
        let mut buf = BytesMut::from(&b"exit"[..]);
        assert_eq!(decode_eof(&mut buf, 32).unwrap(), Some("exit".to_string()));
        assert_eq!(decode_eof(&mut buf, 32).unwrap(), None);
    }

    #[test]
    fn eof_ignores_padding() {
        let mut buf = BytesMut::from(&[0u8; 8][..]);
        assert_eq!(decode_eof(&mut buf, 32).unwrap(), None);
    }
}
