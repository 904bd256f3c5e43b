use super::message::{Message, MessageId};

/// Identifies one history request; bumped on every peer change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HistoryGeneration(pub u64);

impl HistoryGeneration {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Result of offering a history response to the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryApply {
    /// The response belongs to an older request and was ignored.
    Stale,
    Replaced {
        history_len: usize,
        live_preserved: usize,
    },
}

/// Ordered messages for one (session, peer) pair.
///
/// Only two mutations exist: append, and replacement by a history response. While a
/// history request is outstanding the transcript remembers where live appends started,
/// so the response can be laid underneath them instead of overwriting them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
    generation: HistoryGeneration,
    live_suffix_start: Option<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn generation(&self) -> HistoryGeneration {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.live_suffix_start.is_some()
    }

    /// Drops everything for a newly selected peer and opens a history request.
    pub fn reset_for_peer(&mut self) -> HistoryGeneration {
        self.messages.clear();
        self.generation = self.generation.next();
        self.live_suffix_start = Some(0);
        self.generation
    }

    pub fn append(&mut self, message: Message) -> MessageId {
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Replaces the transcript with `history`, re-appending anything that arrived live
    /// since the request for `generation` was opened.
    pub fn apply_history(
        &mut self,
        generation: HistoryGeneration,
        history: Vec<Message>,
    ) -> HistoryApply {
        if generation != self.generation {
            return HistoryApply::Stale;
        }

        let Some(start) = self.live_suffix_start.take() else {
            // This generation was already settled.
            return HistoryApply::Stale;
        };

        let live = self.messages.split_off(start.min(self.messages.len()));
        let history_len = history.len();
        let live_preserved = live.len();
        self.messages = history;
        self.messages.extend(live);

        HistoryApply::Replaced {
            history_len,
            live_preserved,
        }
    }

    /// Closes a failed request for `generation` without touching the messages.
    pub fn abandon_history(&mut self, generation: HistoryGeneration) -> bool {
        if generation != self.generation || self.live_suffix_start.is_none() {
            return false;
        }
        self.live_suffix_start = None;
        true
    }

    /// Text of the most recent `limit` peer-authored messages, oldest first.
    pub fn recent_peer_texts(&self, limit: usize) -> Vec<String> {
        let mut texts = self
            .messages
            .iter()
            .rev()
            .filter(|message| message.is_from_peer())
            .take(limit)
            .map(|message| message.text.clone())
            .collect::<Vec<_>>();
        texts.reverse();
        texts
    }
}
