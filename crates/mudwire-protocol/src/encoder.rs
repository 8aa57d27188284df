//! Wire encoder: turns markup tokens into the bytes a client sees.
//!
//! Two rendering paths exist:
//!
//! - **Plain** (`capable == false`): links collapse to their display text.
//!   Literal text passes through untouched unless entity escaping is
//!   switched on for a markup-sensitive renderer (e.g. the browser client).
//! - **MXP** (`capable == true`): links become MXP `SEND` tags, each
//!   prefixed by the temp-secure mode switch:
//!
//! ```text
//! ESC[4z<SEND HREF='target'>display ESC[4z</SEND>
//! ```
//!
//! On the MXP path, text that came from the game (and possibly from
//! players) is neutralized first so it can't open tags of its own:
//! `&`, `<` and `>` become entities, ESC bytes are removed from link
//! segments, and `ESC[<n>z` mode switches are cut out of literal text.
//! Complete ANSI CSI sequences (colour) in literal text are left alone;
//! any other ESC in literal text is dropped.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::{LinkSyntax, MarkupToken, parse};

/// The escape byte that starts every MXP mode switch.
pub const ESC: char = '\x1b';

/// `ESC [ 4 z`: switch to temp-secure mode for the next tag.
pub const MXP_TEMP_SECURE: &str = "\x1b[4z";

/// Markup handling settings for one output target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkupConfig {
    /// Which link grammar outgoing text is written in.
    pub syntax: LinkSyntax,

    /// Entity-escape `&`, `<` and `>` on the plain path.
    ///
    /// Turn this on when the receiving end renders HTML. The MXP path
    /// always escapes regardless of this flag.
    pub escape_entities: bool,
}

/// Renders a token stream for one connection.
///
/// Output length for a given link depends only on its display text,
/// target and `capable`, never on surrounding text.
pub fn encode<'a>(
    tokens: impl IntoIterator<Item = MarkupToken<'a>>,
    capable: bool,
    escape_entities: bool,
) -> String {
    let mut out = String::new();

    for token in tokens {
        match (token, capable) {
            (MarkupToken::Literal(text), false) => {
                if escape_entities {
                    push_escaped(&mut out, text);
                } else {
                    out.push_str(text);
                }
            }
            (MarkupToken::Link { display, .. }, false) => {
                if escape_entities {
                    push_escaped(&mut out, display);
                } else {
                    out.push_str(display);
                }
            }
            (MarkupToken::Literal(text), true) => {
                push_escaped(&mut out, &strip_mode_switches(text));
            }
            (MarkupToken::Link { display, target }, true) => {
                push_send_tag(&mut out, display, target);
            }
        }
    }

    out
}

/// Parses and encodes `text` in one step.
pub fn render(text: &str, capable: bool, config: &MarkupConfig) -> String {
    encode(parse(text, config.syntax), capable, config.escape_entities)
}

/// Writes one MXP `SEND` link with both segments sanitized.
fn push_send_tag(out: &mut String, display: &str, target: &str) {
    let clean_target: String =
        target.chars().filter(|c| !c.is_control()).collect();
    let clean_display: String =
        display.chars().filter(|c| *c != ESC).collect();

    let target_removed = target.len() - clean_target.len();
    let display_removed = display.len() - clean_display.len();
    if target_removed > 0 || display_removed > 0 {
        tracing::debug!(
            target_removed,
            display_removed,
            "stripped control bytes from link"
        );
    }

    out.push_str(MXP_TEMP_SECURE);
    out.push_str("<SEND HREF='");
    for c in clean_target.chars() {
        // The attribute is single-quoted; a bare quote would end it early.
        if c == '\'' {
            out.push_str("&#39;");
        } else {
            push_escaped_char(out, c);
        }
    }
    out.push_str("'>");
    push_escaped(out, &clean_display);
    out.push_str(MXP_TEMP_SECURE);
    out.push_str("</SEND>");
}

/// Keeps complete CSI sequences (`ESC [ <params> <final>`) whose final
/// byte isn't `z` and drops every other ESC.
///
/// MXP mode switches (`ESC [ <n> z`) are removed whole. A lone or
/// unfinished ESC is removed by itself, so it can't pair up with the text
/// after it to form a new switch.
fn strip_mode_switches(text: &str) -> Cow<'_, str> {
    if !text.contains(ESC) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut dropped = 0usize;
    while let Some(pos) = rest.find(ESC) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + ESC.len_utf8()..];
        match csi_len(tail) {
            Some((len, final_byte)) if final_byte != b'z' => {
                out.push(ESC);
                out.push_str(&tail[..len]);
                rest = &tail[len..];
            }
            Some((len, _)) => {
                dropped += 1;
                rest = &tail[len..];
            }
            None => {
                dropped += 1;
                rest = tail;
            }
        }
    }
    out.push_str(rest);

    tracing::debug!(dropped, "stripped escape sequences from literal text");
    Cow::Owned(out)
}

/// If `tail` (the text right after an ESC) is a complete CSI body
/// `[ <parameter bytes> <intermediate bytes> <final byte>`, returns its
/// byte length and final byte.
fn csi_len(tail: &str) -> Option<(usize, u8)> {
    let bytes = tail.as_bytes();
    if bytes.first() != Some(&b'[') {
        return None;
    }
    let params = bytes[1..]
        .iter()
        .take_while(|b| (0x30..=0x3F).contains(*b))
        .count();
    let inters = bytes[1 + params..]
        .iter()
        .take_while(|b| (0x20..=0x2F).contains(*b))
        .count();
    let end = 1 + params + inters;
    match bytes.get(end) {
        Some(&b) if (0x40..=0x7E).contains(&b) => Some((end + 1, b)),
        _ => None,
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        push_escaped_char(out, c);
    }
}

fn push_escaped_char(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        _ => out.push(c),
    }
}
