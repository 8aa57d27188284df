//! Peer announcement packets.
//!
//! Game servers on a loose inter-server network announce themselves
//! periodically and say goodbye when they shut down. A packet is just a
//! string map; the fields this crate understands are:
//!
//! | key | meaning |
//! |---|---|
//! | `name` (or `origin`) | peer identity, required |
//! | `versionid` | server software version |
//! | `networkname` | which network the peer belongs to |
//! | `url` | the peer's web page |
//! | `host`, `port` | where players connect |
//! | `fingerprint` (or `sha256`) | the peer's hashing identifier |
//!
//! Unknown keys are kept so callers can read them with [`PeerPacket::get`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// A single announcement or departure packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, Option<RawField>>")]
#[serde(into = "HashMap<String, String>")]
pub struct PeerPacket {
    fields: HashMap<String, String>,
}

/// A JSON scalar accepted as a packet value. Peers disagree on whether
/// `port` is a number or a string, so both are taken.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawField {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Flag(bool),
}

impl From<HashMap<String, Option<RawField>>> for PeerPacket {
    fn from(raw: HashMap<String, Option<RawField>>) -> Self {
        let fields = raw
            .into_iter()
            .filter_map(|(key, value)| {
                let text = match value? {
                    RawField::Text(s) => s,
                    RawField::Unsigned(n) => n.to_string(),
                    RawField::Signed(n) => n.to_string(),
                    RawField::Float(n) => n.to_string(),
                    RawField::Flag(b) => b.to_string(),
                };
                Some((key, text))
            })
            .collect();
        Self { fields }
    }
}

impl From<PeerPacket> for HashMap<String, String> {
    fn from(packet: PeerPacket) -> Self {
        packet.fields
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PeerPacket {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl PeerPacket {
    /// Creates an empty packet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets a field, replacing any previous value.
    pub fn insert(&mut self, key: &str, value: &str) {
        self.fields.insert(key.to_string(), value.to_string());
    }

    /// Returns a field's value, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Returns a field's value if present and not blank, trimmed.
    pub fn get_trimmed(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// The peer this packet is about: `name`, falling back to `origin`.
    ///
    /// Returns `None` for a packet that identifies nobody; such packets
    /// are dropped by the registry.
    pub fn identity(&self) -> Option<&str> {
        self.get_trimmed("name")
            .or_else(|| self.get_trimmed("origin"))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the packet has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses the line format used on the wire by older peers:
    ///
    /// ```text
    /// name=Foo versionid="Mud 1.0" port=4000 url="http://x/\"q\""
    /// ```
    ///
    /// Values are bare words or double-quoted strings where `\"` and
    /// `\\` are escapes. Later duplicates of a key win.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidPacket`] for a token without `=`,
    /// an empty key, or an unterminated quoted value.
    pub fn parse_kv(line: &str) -> Result<Self, ProtocolError> {
        let mut packet = Self::new();
        let mut chars = line.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let mut key = String::new();
            while let Some(c) =
                chars.next_if(|c| *c != '=' && !c.is_whitespace())
            {
                key.push(c);
            }
            if chars.next_if_eq(&'=').is_none() {
                return Err(ProtocolError::InvalidPacket(format!(
                    "expected '=' after {key:?}"
                )));
            }
            if key.is_empty() {
                return Err(ProtocolError::InvalidPacket("empty key".into()));
            }

            let mut value = String::new();
            if chars.next_if_eq(&'"').is_some() {
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some(escaped) => value.push(escaped),
                            None => break,
                        },
                        _ => value.push(c),
                    }
                }
                if !closed {
                    return Err(ProtocolError::InvalidPacket(format!(
                        "unterminated quote in value of {key:?}"
                    )));
                }
            } else {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    value.push(c);
                }
            }

            packet.fields.insert(key, value);
        }

        Ok(packet)
    }
}
