//! Splits telnet input into command lines.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::ProtocolError;

/// Longest line kept by default.
pub const DEFAULT_MAX_LINE: usize = 4096;

/// A [`Decoder`] that yields one `String` per input line.
///
/// `\r\n`, `\r\0`, `\n` and a bare `\r` all end a line, including when
/// the two bytes of a pair arrive in different reads. Invalid UTF-8 is
/// replaced, and input that runs past the maximum length without a line
/// break is cut into pieces of that size.
#[derive(Debug)]
pub struct LineCodec {
    max_length: usize,
    /// Where to resume scanning for a line break.
    next_index: usize,
    /// The last line ended on `\r`; a leading `\n` or `\0` belongs to it.
    after_cr: bool,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE)
    }

    /// `max_length` is raised to at least 1.
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
            next_index: 0,
            after_cr: false,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn to_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<String>, ProtocolError> {
        if self.after_cr && !src.is_empty() {
            self.after_cr = false;
            if matches!(src[0], b'\n' | 0) {
                src.advance(1);
            }
        }

        let found = src[self.next_index..]
            .iter()
            .position(|b| matches!(b, b'\r' | b'\n'));
        let Some(offset) = found else {
            if src.len() >= self.max_length {
                self.next_index = 0;
                let line = src.split_to(self.max_length);
                return Ok(Some(to_line(&line)));
            }
            self.next_index = src.len();
            return Ok(None);
        };

        let end = self.next_index + offset;
        self.next_index = 0;
        let line = src.split_to(end);
        let eol = src.get_u8();
        if eol == b'\r' {
            match src.first() {
                Some(b'\n' | 0) => src.advance(1),
                Some(_) => {}
                None => self.after_cr = true,
            }
        }
        Ok(Some(to_line(&line)))
    }

    /// Whatever is left without a line break is the last line.
    fn decode_eof(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<String>, ProtocolError> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        self.next_index = 0;
        let rest = src.split();
        Ok(Some(to_line(&rest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<String> {
        std::iter::from_fn(|| codec.decode(buf).unwrap()).collect()
    }

    #[test]
    fn test_decode_handles_every_line_ending() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"a\r\nb\nc\r\0d\re"[..]);

        assert_eq!(lines(&mut codec, &mut buf), vec!["a", "b", "c", "d"]);
        // `e` has no line ending yet.
        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("e"));
    }

    #[test]
    fn test_decode_crlf_split_across_reads_is_one_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"look\r"[..]);
        assert_eq!(lines(&mut codec, &mut buf), vec!["look"]);

        buf.extend_from_slice(b"\nnorth\r\n");
        assert_eq!(lines(&mut codec, &mut buf), vec!["north"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_keeps_empty_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"\r\n\r\n"[..]);
        assert_eq!(
            lines(&mut codec, &mut buf),
            vec![String::new(), String::new()]
        );
    }

    #[test]
    fn test_decode_partial_line_waits_for_more() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"lo"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"ok\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("look"));
    }

    #[test]
    fn test_decode_cuts_overlong_input() {
        let mut codec = LineCodec::with_max_length(8);
        let mut buf = BytesMut::from(&[b'x'; 10][..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap().map(|l| l.len()),
            Some(8)
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_decode_replaces_invalid_utf8() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&[b'a', 0xFF, b'\n'][..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("a\u{FFFD}")
        );
    }

    #[test]
    fn test_decode_eof_returns_unterminated_tail() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"look\nsay hi"[..]);
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap().as_deref(),
            Some("look")
        );
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap().as_deref(),
            Some("say hi")
        );
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }
}
