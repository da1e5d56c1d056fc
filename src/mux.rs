//! Multiplexed request/reply correlator.
//!
//! A single wildcard inbox subscription (`_INBOX.<prefix>.*`) carries every
//! reply for the connection. Each in-flight request owns a distinct trailing
//! token; replies are matched back to their waiter by that token. The table
//! lives on the connection task, so registration, resolution, and
//! cancellation are all serialized and a reply resolves its waiter exactly
//! once.

use crate::frame::Message;
use crate::inbox::TokenGenerator;
use std::collections::HashMap;
use tokio::sync::oneshot;

pub(crate) struct MuxCorrelator {
    prefix: String,
    mux_sid: Option<u64>,
    pending: HashMap<String, oneshot::Sender<Message>>,
    tokens: TokenGenerator,
}

impl MuxCorrelator {
    pub(crate) fn new(mut tokens: TokenGenerator) -> Self {
        let prefix = tokens.next_inbox_prefix();
        Self {
            prefix,
            mux_sid: None,
            pending: HashMap::new(),
            tokens,
        }
    }

    /// Wildcard subject covering every reply inbox of this connection.
    pub(crate) fn wildcard(&self) -> String {
        format!("{}.*", self.prefix)
    }

    /// Record the sid of the lazily-created wildcard subscription.
    pub(crate) fn mark_subscribed(&mut self, sid: u64) {
        self.mux_sid = Some(sid);
    }

    pub(crate) fn mux_sid(&self) -> Option<u64> {
        self.mux_sid
    }

    /// Register a new in-flight request. Returns the token (for later
    /// cancellation), the full reply subject, and the receiver the waiter
    /// awaits on.
    pub(crate) fn register(&mut self) -> (String, String, oneshot::Receiver<Message>) {
        let mut token = self.tokens.next_token();
        // Token collisions are astronomically unlikely but cheap to rule out.
        while self.pending.contains_key(&token) {
            token = self.tokens.next_token();
        }
        let reply_subject = format!("{}.{}", self.prefix, token);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(token.clone(), tx);
        (token, reply_subject, rx)
    }

    /// Route an inbox delivery to its waiter. Returns `false` if the subject
    /// doesn't belong to this inbox or the request was already resolved or
    /// cancelled; such replies are dropped.
    pub(crate) fn resolve(&mut self, msg: Message) -> bool {
        let Some(rest) = msg.subject.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        let Some(token) = rest.strip_prefix('.') else {
            return false;
        };
        match self.pending.remove(token) {
            // The waiter may have given up between cancel and this frame;
            // a failed send is just a late reply.
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// Forget an in-flight request (the waiter timed out). Returns `false`
    /// if the reply already arrived.
    pub(crate) fn cancel(&mut self, token: &str) -> bool {
        self.pending.remove(token).is_some()
    }

    /// Drop every waiter; their receivers observe a closed channel.
    pub(crate) fn reject_all(&mut self) {
        self.pending.clear();
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
