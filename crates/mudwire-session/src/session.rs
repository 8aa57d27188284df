//! A connected client as the rendering layer sees it.

use std::fmt;

use mudwire_protocol::{MarkupConfig, render};
use tokio::sync::mpsc;

use crate::{MXP, NegotiationConfig, Negotiator};

/// One client connection's negotiation state plus its markup settings.
///
/// Created when a socket is accepted and dropped when it closes; nothing
/// about it outlives the connection. Dropping a session denies any
/// extension still awaiting a reply.
#[derive(Debug)]
pub struct Session {
    conn: String,
    negotiator: Negotiator,
    markup: MarkupConfig,
}

impl Session {
    /// Creates a session whose negotiation offers are written to `outbound`.
    pub fn new(
        conn: impl fmt::Display,
        negotiation: &NegotiationConfig,
        markup: MarkupConfig,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        let conn = conn.to_string();
        Self {
            negotiator: Negotiator::new(&conn, negotiation, outbound),
            conn,
            markup,
        }
    }

    /// The connection label used in logs.
    pub fn conn(&self) -> &str {
        &self.conn
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    pub fn markup(&self) -> &MarkupConfig {
        &self.markup
    }

    /// Renders outgoing game text for this connection.
    ///
    /// Links become MXP tags once MXP has been granted; until then (and
    /// forever, if it's denied) they render as their display text.
    pub fn render(&self, text: &str) -> String {
        let capable = self.negotiator.is_capable(MXP);
        tracing::trace!(conn = %self.conn, capable, len = text.len(), "render");
        render(text, capable, &self.markup)
    }

    /// Denies anything still being negotiated.
    pub fn close(&self) {
        self.negotiator.close();
    }
}

#[cfg(test)]
mod tests {
    use mudwire_protocol::LinkSyntax;
    use mudwire_protocol::telnet::{OPT_MXP, TelnetCommand, TelnetVerb};

    use super::*;

    fn session() -> (Session, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let markup = MarkupConfig {
            syntax: LinkSyntax::Wiki,
            escape_entities: false,
        };
        let negotiation = NegotiationConfig::default();
        let s = Session::new("conn-7", &negotiation, markup, tx);
        (s, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_before_negotiation_is_plain() {
        let (s, _rx) = session();
        assert_eq!(s.render("Click [[here|go north]] now"), "Click here now");
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_while_awaiting_is_plain() {
        let (s, _rx) = session();
        s.negotiator().negotiate(MXP, |_| {}).unwrap();
        assert_eq!(s.render("[[a|b]]"), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_after_grant_emits_send_tags() {
        let (s, _rx) = session();
        s.negotiator().negotiate(MXP, |_| {}).unwrap();
        s.negotiator()
            .handle_command(TelnetCommand::new(TelnetVerb::Do, OPT_MXP));

        assert_eq!(
            s.render("Click [[here|go north]] now"),
            "Click \x1b[4z<SEND HREF='go north'>here\x1b[4z</SEND> now"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_after_close_stays_plain() {
        let (s, _rx) = session();
        s.negotiator().negotiate(MXP, |_| {}).unwrap();
        s.close();
        s.negotiator()
            .handle_command(TelnetCommand::new(TelnetVerb::Do, OPT_MXP));

        assert_eq!(s.render("[[a|b]]"), "a");
        assert_eq!(s.conn(), "conn-7");
    }
}
