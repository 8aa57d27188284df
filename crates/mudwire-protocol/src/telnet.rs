//! Telnet command codec (RFC 854 / RFC 855).
//!
//! Clients negotiate extensions with three-byte commands such as
//! `IAC WILL 91` and carry option payloads in subnegotiations
//! (`IAC SB <opt> ... IAC SE`). Everything else on the wire is data,
//! with a literal 0xFF byte doubled to `IAC IAC`.
//!
//! [`TelnetCodec`] is incremental: a TCP read may end in the middle of
//! a command, and the codec picks up where it left off on the next call.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::ProtocolError;

/// Interpret As Command.
pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
/// Subnegotiation begin.
pub const SB: u8 = 250;
/// Subnegotiation end.
pub const SE: u8 = 240;

/// MUD eXtension Protocol.
pub const OPT_MXP: u8 = 91;

/// Largest subnegotiation payload kept. Bytes past this are dropped.
const MAX_SUBNEGOTIATION: usize = 8 * 1024;

/// The four option negotiation verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetVerb {
    Will,
    Wont,
    Do,
    Dont,
}

impl TelnetVerb {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            WILL => Some(Self::Will),
            WONT => Some(Self::Wont),
            DO => Some(Self::Do),
            DONT => Some(Self::Dont),
            _ => None,
        }
    }

    /// The wire byte for this verb.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Will => WILL,
            Self::Wont => WONT,
            Self::Do => DO,
            Self::Dont => DONT,
        }
    }
}

/// An option negotiation command: `IAC <verb> <option>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TelnetCommand {
    pub verb: TelnetVerb,
    pub option: u8,
}

impl TelnetCommand {
    pub fn new(verb: TelnetVerb, option: u8) -> Self {
        Self { verb, option }
    }

    /// Encodes the command as it appears on the wire.
    pub fn to_bytes(self) -> [u8; 3] {
        [IAC, self.verb.as_byte(), self.option]
    }
}

/// Something decoded from the inbound byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    /// Plain data with telnet framing removed.
    Data(Vec<u8>),
    /// An option negotiation command.
    Command(TelnetCommand),
    /// A complete subnegotiation for `option`.
    Subnegotiation { option: u8, data: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Data,
    Iac,
    Verb(TelnetVerb),
    SbOption,
    SbData { option: u8 },
    SbIac { option: u8 },
}

/// Incremental telnet stream decoder.
///
/// One codec per connection, usually driven by a
/// [`FramedRead`](tokio_util::codec::FramedRead). Data bytes are grouped
/// into as few `Data` events as possible: one per run between
/// commands. A command split across two reads is emitted once the read
/// that completes it arrives.
#[derive(Debug)]
pub struct TelnetCodec {
    state: DecodeState,
    sb: Vec<u8>,
}

impl TelnetCodec {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Data,
            sb: Vec::new(),
        }
    }

    fn push_sb(&mut self, b: u8) {
        if self.sb.len() < MAX_SUBNEGOTIATION {
            self.sb.push(b);
        }
    }
}

impl Default for TelnetCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TelnetCodec {
    type Item = TelnetEvent;
    type Error = ProtocolError;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<TelnetEvent>, ProtocolError> {
        let mut data = Vec::new();
        let mut i = 0;

        while i < src.len() {
            let b = src[i];
            match self.state {
                DecodeState::Data if b == IAC => {
                    if !data.is_empty() {
                        match src.get(i + 1).copied() {
                            Some(IAC) => {
                                data.push(IAC);
                                i += 2;
                                continue;
                            }
                            // NOP, GA, AYT and friends carry no payload.
                            Some(next)
                                if next != SB
                                    && TelnetVerb::from_byte(next).is_none() =>
                            {
                                i += 2;
                                continue;
                            }
                            // The data run ends here; the command comes
                            // out on the next call.
                            _ => break,
                        }
                    }
                    self.state = DecodeState::Iac;
                }
                DecodeState::Data => data.push(b),
                DecodeState::Iac => {
                    self.state = match b {
                        IAC => {
                            data.push(IAC);
                            DecodeState::Data
                        }
                        SB => DecodeState::SbOption,
                        _ => match TelnetVerb::from_byte(b) {
                            Some(verb) => DecodeState::Verb(verb),
                            None => DecodeState::Data,
                        },
                    };
                }
                DecodeState::Verb(verb) => {
                    self.state = DecodeState::Data;
                    src.advance(i + 1);
                    return Ok(Some(TelnetEvent::Command(TelnetCommand::new(
                        verb, b,
                    ))));
                }
                DecodeState::SbOption => {
                    self.sb.clear();
                    self.state = DecodeState::SbData { option: b };
                }
                DecodeState::SbData { option } => {
                    if b == IAC {
                        self.state = DecodeState::SbIac { option };
                    } else {
                        self.push_sb(b);
                    }
                }
                DecodeState::SbIac { option } => match b {
                    SE => {
                        self.state = DecodeState::Data;
                        src.advance(i + 1);
                        return Ok(Some(TelnetEvent::Subnegotiation {
                            option,
                            data: std::mem::take(&mut self.sb),
                        }));
                    }
                    IAC => {
                        self.push_sb(IAC);
                        self.state = DecodeState::SbData { option };
                    }
                    // A stray command inside a subnegotiation; skip it.
                    _ => self.state = DecodeState::SbData { option },
                },
            }
            i += 1;
        }

        src.advance(i);
        Ok((!data.is_empty()).then_some(TelnetEvent::Data(data)))
    }
}

/// Encodes `IAC SB <option> <data> IAC SE`, doubling any 0xFF in `data`.
pub fn subnegotiation(option: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 5);
    out.extend_from_slice(&[IAC, SB, option]);
    out.extend_from_slice(&escape_iac(data));
    out.extend_from_slice(&[IAC, SE]);
    out
}

/// Doubles every 0xFF byte so the peer reads it as data.
pub fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if b == IAC {
            out.push(IAC);
        }
        out.push(b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(verb: TelnetVerb, option: u8) -> TelnetEvent {
        TelnetEvent::Command(TelnetCommand::new(verb, option))
    }

    /// Feeds `input` in one read and collects every event.
    fn decode_all(codec: &mut TelnetCodec, input: &[u8]) -> Vec<TelnetEvent> {
        let mut buf = BytesMut::from(input);
        let events = std::iter::from_fn(|| codec.decode(&mut buf).unwrap())
            .collect();
        assert!(buf.is_empty(), "codec left {buf:?} unconsumed");
        events
    }

    #[test]
    fn test_decode_plain_data_passes_through() {
        let mut codec = TelnetCodec::new();
        assert_eq!(
            decode_all(&mut codec, b"look\r\n"),
            vec![TelnetEvent::Data(b"look\r\n".to_vec())]
        );
    }

    #[test]
    fn test_decode_command_between_data_runs() {
        let mut codec = TelnetCodec::new();
        let input = [b'a', IAC, DO, OPT_MXP, b'b'];
        assert_eq!(
            decode_all(&mut codec, &input),
            vec![
                TelnetEvent::Data(b"a".to_vec()),
                cmd(TelnetVerb::Do, OPT_MXP),
                TelnetEvent::Data(b"b".to_vec()),
            ]
        );
    }

    #[test]
    fn test_decode_command_split_across_reads() {
        let mut codec = TelnetCodec::new();
        assert!(decode_all(&mut codec, &[IAC]).is_empty());
        assert!(decode_all(&mut codec, &[DONT]).is_empty());
        assert_eq!(
            decode_all(&mut codec, &[OPT_MXP]),
            vec![cmd(TelnetVerb::Dont, OPT_MXP)]
        );
    }

    #[test]
    fn test_decode_data_then_iac_at_end_of_read() {
        let mut codec = TelnetCodec::new();
        assert_eq!(
            decode_all(&mut codec, &[b'a', IAC]),
            vec![TelnetEvent::Data(b"a".to_vec())]
        );
        assert_eq!(
            decode_all(&mut codec, &[IAC, b'b']),
            vec![TelnetEvent::Data(vec![0xFF, b'b'])]
        );
    }

    #[test]
    fn test_decode_doubled_iac_is_literal_byte() {
        let mut codec = TelnetCodec::new();
        assert_eq!(
            decode_all(&mut codec, &[b'x', IAC, IAC, b'y']),
            vec![TelnetEvent::Data(vec![b'x', 0xFF, b'y'])]
        );
    }

    #[test]
    fn test_decode_subnegotiation_with_escaped_iac() {
        let mut codec = TelnetCodec::new();
        let input = [IAC, SB, 24, 0, b'x', IAC, IAC, IAC, SE];
        assert_eq!(
            decode_all(&mut codec, &input),
            vec![TelnetEvent::Subnegotiation {
                option: 24,
                data: vec![0, b'x', 0xFF],
            }]
        );
    }

    #[test]
    fn test_decode_skips_two_byte_commands() {
        let mut codec = TelnetCodec::new();
        // IAC NOP, IAC GA
        assert_eq!(
            decode_all(&mut codec, &[b'a', IAC, 241, IAC, 249, b'b']),
            vec![TelnetEvent::Data(b"ab".to_vec())]
        );
    }

    #[test]
    fn test_decode_caps_subnegotiation_payload() {
        let mut codec = TelnetCodec::new();
        let mut input = vec![IAC, SB, 200];
        input.extend(std::iter::repeat_n(b'z', MAX_SUBNEGOTIATION + 100));
        input.extend_from_slice(&[IAC, SE]);

        match decode_all(&mut codec, &input).as_slice() {
            [TelnetEvent::Subnegotiation { option: 200, data }] => {
                assert_eq!(data.len(), MAX_SUBNEGOTIATION);
            }
            other => panic!("expected one subnegotiation, got {other:?}"),
        }
    }

    #[test]
    fn test_command_to_bytes() {
        let will = TelnetCommand::new(TelnetVerb::Will, OPT_MXP);
        assert_eq!(will.to_bytes(), [IAC, WILL, OPT_MXP]);
    }

    #[test]
    fn test_subnegotiation_encodes_and_decodes() {
        let bytes = subnegotiation(OPT_MXP, &[]);
        assert_eq!(bytes, vec![IAC, SB, OPT_MXP, IAC, SE]);

        let mut codec = TelnetCodec::new();
        let wire = subnegotiation(7, &[1, 0xFF, 2]);
        assert_eq!(
            decode_all(&mut codec, &wire),
            vec![TelnetEvent::Subnegotiation {
                option: 7,
                data: vec![1, 0xFF, 2],
            }]
        );
    }

    #[test]
    fn test_escape_iac_doubles_ff() {
        assert_eq!(escape_iac(&[1, 0xFF, 2]), vec![1, 0xFF, 0xFF, 2]);
        assert_eq!(escape_iac(b"plain"), b"plain".to_vec());
    }
}
