//! In-game markup parser.
//!
//! Outgoing game text may embed clickable links written in a small
//! delimited grammar. [`parse`] splits a string into [`MarkupToken`]s:
//! runs of literal text and links with a display text and a target
//! command.
//!
//! Two grammars are supported (see [`LinkSyntax`]):
//!
//! ```text
//! Brace:  {lc<target>{lt<display>{le
//! Wiki:   [[<display>|<target>]]
//! ```
//!
//! The parser never fails. An opening marker without its middle and
//! closing markers is left in the text as a literal, so nothing written
//! by a builder or player is ever dropped.

use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};

/// Which delimiter grammar marks up links in outgoing text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LinkSyntax {
    /// `{lc<target>{lt<display>{le` (target first).
    #[default]
    Brace,
    /// `[[<display>|<target>]]` (display first).
    Wiki,
}

/// The three markers of a link grammar, in the order they appear.
#[derive(Debug, Clone, Copy)]
struct Delimiters {
    open: &'static str,
    mid: &'static str,
    close: &'static str,
    /// `true` when the segment before `mid` is the target command.
    target_first: bool,
}

impl LinkSyntax {
    fn delimiters(self) -> Delimiters {
        match self {
            Self::Brace => Delimiters {
                open: "{lc",
                mid: "{lt",
                close: "{le",
                target_first: true,
            },
            Self::Wiki => Delimiters {
                open: "[[",
                mid: "|",
                close: "]]",
                target_first: false,
            },
        }
    }

    /// Writes a link in this grammar. Useful for game code that builds
    /// markup programmatically instead of by hand.
    pub fn link(self, display: &str, target: &str) -> String {
        let d = self.delimiters();
        let (first, second) = if d.target_first {
            (target, display)
        } else {
            (display, target)
        };
        format!("{}{first}{}{second}{}", d.open, d.mid, d.close)
    }
}

/// One parsed unit of outgoing text.
///
/// Tokens borrow from the parsed string; nothing is copied until the
/// encoder writes its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupToken<'a> {
    /// Text outside any link, exactly as it appeared in the input.
    Literal(&'a str),

    /// A clickable link.
    Link {
        /// What the player sees.
        display: &'a str,
        /// The command sent back when the player clicks.
        target: &'a str,
    },
}

/// Splits `text` into markup tokens using the given grammar.
///
/// The returned iterator makes a single left-to-right pass over the
/// input and yields tokens in source order. Adjacent literal runs are
/// never split and empty literals are never produced, so input without
/// any link markers comes back as exactly one `Literal` (or nothing, for
/// an empty string).
///
/// ```rust
/// use mudwire_protocol::{LinkSyntax, MarkupToken, parse};
///
/// let tokens: Vec<_> =
///     parse("Click [[here|go north]] now", LinkSyntax::Wiki).collect();
/// assert_eq!(
///     tokens,
///     vec![
///         MarkupToken::Literal("Click "),
///         MarkupToken::Link { display: "here", target: "go north" },
///         MarkupToken::Literal(" now"),
///     ]
/// );
/// ```
pub fn parse(text: &str, syntax: LinkSyntax) -> Tokens<'_> {
    Tokens {
        rest: text,
        delims: syntax.delimiters(),
        pending: None,
    }
}

/// Lazy token stream returned by [`parse`].
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    /// Input not yet consumed.
    rest: &'a str,
    delims: Delimiters,
    /// A link found while scanning for the end of a literal run. It is
    /// returned on the following call to `next`.
    pending: Option<MarkupToken<'a>>,
}

/// A complete link located inside `rest`.
struct LinkMatch<'a> {
    /// Byte offset of the opening marker.
    start: usize,
    /// Byte offset just past the closing marker.
    end: usize,
    token: MarkupToken<'a>,
}

impl<'a> Tokens<'a> {
    /// Finds the leftmost complete link in `self.rest`.
    ///
    /// An opening marker whose first segment runs into the closing marker
    /// before any middle marker can't start a link; scanning resumes
    /// right after it.
    fn find_link(&self) -> Option<LinkMatch<'a>> {
        let d = self.delims;
        let rest = self.rest;
        let mut from = 0;

        while let Some(offset) = rest[from..].find(d.open) {
            let start = from + offset;
            let body_start = start + d.open.len();
            let body = &rest[body_start..];

            let mid = body.find(d.mid)?;
            let first = &body[..mid];
            if first.contains(d.close) {
                from = body_start;
                continue;
            }

            let after_mid = &body[mid + d.mid.len()..];
            let close = after_mid.find(d.close)?;
            let second = &after_mid[..close];

            let (display, target) = if d.target_first {
                (second, first)
            } else {
                (first, second)
            };
            let end = body_start + mid + d.mid.len() + close + d.close.len();

            return Some(LinkMatch {
                start,
                end,
                token: MarkupToken::Link { display, target },
            });
        }

        None
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = MarkupToken<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(token) = self.pending.take() {
            return Some(token);
        }
        if self.rest.is_empty() {
            return None;
        }

        let rest = self.rest;
        match self.find_link() {
            Some(found) if found.start == 0 => {
                self.rest = &rest[found.end..];
                Some(found.token)
            }
            Some(found) => {
                self.rest = &rest[found.end..];
                self.pending = Some(found.token);
                Some(MarkupToken::Literal(&rest[..found.start]))
            }
            None => {
                // No complete link left: everything remaining, including
                // any dangling opening marker, is literal text.
                self.rest = "";
                Some(MarkupToken::Literal(rest))
            }
        }
    }
}

impl FusedIterator for Tokens<'_> {}
