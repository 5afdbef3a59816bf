//! Conversation state and the view model the UI draws from.
//!
//! The controller owns the conversation map, the active selection, the
//! summary list and the visible message pane. It performs no I/O: callers
//! receive a [`ReplyRequest`] from [`ConversationController::submit`] and feed
//! results back through [`ConversationController::dispatch_reply`].

use crate::error::Result;
use crate::events::{ConversationId, ConversationRole, ReplyEnvelope, Turn};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Maximum number of characters shown in a conversation title
pub const TITLE_LENGTH: usize = 20;

/// Conversation id mapped to its chronological turns
pub type ConversationMap = BTreeMap<ConversationId, Vec<Turn>>;

/// One entry in the conversation list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryView {
    pub id: ConversationId,
    pub title: String,
    pub active: bool,
    pub unread: bool,
    pub pending: usize,
}

/// One entry in the visible message pane
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageView {
    Turn(Turn),
    /// A failed reply; shown but never persisted or sent to the model
    Notice(String),
}

impl MessageView {
    pub fn is_notice(&self) -> bool {
        matches!(self, MessageView::Notice(_))
    }
}

/// Work the caller must hand to `send_content`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRequest {
    pub conversation_id: ConversationId,
    pub turns: Vec<Turn>,
}

/// What `dispatch_reply` did with a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Assistant turn stored; `visible` when rendered into the pane
    Appended { visible: bool },
    /// Request failed; `visible` when the notice went into the pane
    Failed { visible: bool },
    /// Conversation no longer exists
    Discarded,
}

impl ReplyOutcome {
    pub fn requires_save(self) -> bool {
        matches!(self, ReplyOutcome::Appended { .. })
    }
}

/// Cut a title to [`TITLE_LENGTH`] characters, on one line
pub fn summary_title(content: &str) -> String {
    content
        .trim_start()
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(TITLE_LENGTH)
        .collect()
}

#[derive(Debug, Default)]
pub struct ConversationController {
    conversations: ConversationMap,
    /// Most recently created first
    summaries: Vec<SummaryView>,
    active: Option<ConversationId>,
    pane: Vec<MessageView>,
    pending: HashMap<ConversationId, usize>,
    failures: HashMap<ConversationId, String>,
}

impl ConversationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild state from whatever `load_conversations` returned.
    ///
    /// Absent, blank or malformed input all yield an empty controller.
    pub fn initialize(persisted: Option<&str>) -> Self {
        let Some(raw) = persisted.filter(|raw| !raw.trim().is_empty()) else {
            debug!("No persisted conversations");
            return Self::new();
        };

        match serde_json::from_str::<ConversationMap>(raw) {
            Ok(map) => Self::from_map(map),
            Err(err) => {
                warn!(error = %err, "Persisted conversations are malformed; starting empty");
                Self::new()
            }
        }
    }

    pub fn from_map(mut map: ConversationMap) -> Self {
        map.retain(|id, turns| {
            if turns.is_empty() {
                warn!(conversation_id = %id, "Dropping persisted conversation without turns");
                false
            } else {
                true
            }
        });

        let summaries = map
            .iter()
            .rev()
            .map(|(id, turns)| SummaryView {
                id: id.clone(),
                title: summary_title(&turns[0].content),
                active: false,
                unread: false,
                pending: 0,
            })
            .collect();

        info!(count = map.len(), "Loaded conversations");

        Self {
            conversations: map,
            summaries,
            ..Self::default()
        }
    }

    /// Append a user turn to the active conversation, starting one if needed.
    ///
    /// Returns `None` for blank input.
    pub fn submit(&mut self, text: &str) -> Option<ReplyRequest> {
        if text.trim().is_empty() {
            return None;
        }

        let id = match self.active.clone() {
            Some(id) => id,
            None => self.start_conversation(text),
        };

        let turn = Turn::user(text);
        self.conversations
            .entry(id.clone())
            .or_default()
            .push(turn.clone());

        self.failures.remove(&id);
        self.pane.retain(|message| !message.is_notice());
        self.pane.push(MessageView::Turn(turn));

        *self.pending.entry(id.clone()).or_default() += 1;
        self.sync_pending(&id);

        debug!(conversation_id = %id, "Submitted user turn");

        Some(ReplyRequest {
            turns: self.conversations[&id].clone(),
            conversation_id: id,
        })
    }

    /// Route one reply to its own conversation.
    pub fn dispatch_reply(&mut self, reply: ReplyEnvelope) -> ReplyOutcome {
        let id = reply.conversation_id;
        let requested_id = reply.requested_id;

        if let Some(count) = self.pending.get_mut(&requested_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.pending.remove(&requested_id);
            }
        }
        self.sync_pending(&requested_id);

        let Some(turns) = self.conversations.get_mut(&id) else {
            debug!(conversation_id = %id, "Discarding reply for removed conversation");
            return ReplyOutcome::Discarded;
        };

        let visible = self.active.as_ref() == Some(&id);

        match reply.outcome {
            Ok(content) => {
                let turn = Turn::assistant(content);
                turns.push(turn.clone());
                if visible {
                    self.pane.push(MessageView::Turn(turn));
                } else {
                    self.mark_unread(&id);
                }
                ReplyOutcome::Appended { visible }
            }
            Err(message) => {
                warn!(conversation_id = %id, error = %message, "Reply request failed");
                if visible {
                    self.pane.push(MessageView::Notice(message.clone()));
                } else {
                    self.mark_unread(&id);
                }
                self.failures.insert(id, message);
                ReplyOutcome::Failed { visible }
            }
        }
    }

    /// Make `id` the active conversation and render its history.
    ///
    /// Returns `false` if no such conversation exists.
    pub fn select(&mut self, id: &ConversationId) -> bool {
        let Some(turns) = self.conversations.get(id) else {
            return false;
        };
        let mut pane: Vec<MessageView> = turns.iter().cloned().map(MessageView::Turn).collect();
        if let Some(message) = self.failures.get(id) {
            pane.push(MessageView::Notice(message.clone()));
        }

        self.clear_active();
        if let Some(summary) = self.summary_mut(id) {
            summary.unread = false;
            summary.active = true;
        }
        self.pane = pane;
        self.active = Some(id.clone());
        true
    }

    /// Delete a conversation. Returns `false` if it did not exist.
    pub fn remove(&mut self, id: &ConversationId) -> bool {
        if self.conversations.remove(id).is_none() {
            return false;
        }
        if self.active.as_ref() == Some(id) {
            self.clear_active();
        }
        self.summaries.retain(|summary| &summary.id != id);
        self.failures.remove(id);
        info!(conversation_id = %id, "Removed conversation");
        true
    }

    /// Deselect so that the next submit starts a fresh conversation
    pub fn new_conversation(&mut self) {
        self.clear_active();
    }

    /// Serialized form of the whole map, as handed to `save_conversations`
    pub fn snapshot_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.conversations)?)
    }

    pub fn summaries(&self) -> &[SummaryView] {
        &self.summaries
    }

    pub fn pane(&self) -> &[MessageView] {
        &self.pane
    }

    pub fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn turns(&self, id: &ConversationId) -> Option<&[Turn]> {
        self.conversations.get(id).map(Vec::as_slice)
    }

    pub fn pending(&self, id: &ConversationId) -> usize {
        self.pending.get(id).copied().unwrap_or(0)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Assistant contents currently in the pane, in display order
    pub fn visible_assistant_contents(&self) -> impl Iterator<Item = &str> {
        self.pane.iter().filter_map(|message| match message {
            MessageView::Turn(turn) if turn.role == ConversationRole::Assistant => {
                Some(turn.content.as_str())
            }
            _ => None,
        })
    }

    fn start_conversation(&mut self, first_content: &str) -> ConversationId {
        let id = ConversationId::generate(|candidate| self.conversations.contains_key(candidate));
        self.clear_active();
        self.summaries.insert(
            0,
            SummaryView {
                id: id.clone(),
                title: summary_title(first_content),
                active: true,
                unread: false,
                pending: 0,
            },
        );
        self.active = Some(id.clone());
        info!(conversation_id = %id, "Started conversation");
        id
    }

    fn clear_active(&mut self) {
        if let Some(previous) = self.active.take() {
            if let Some(summary) = self.summary_mut(&previous) {
                summary.active = false;
            }
        }
        self.pane.clear();
    }

    fn mark_unread(&mut self, id: &ConversationId) {
        if let Some(summary) = self.summary_mut(id) {
            summary.unread = true;
        }
    }

    fn sync_pending(&mut self, id: &ConversationId) {
        let pending = self.pending(id);
        if let Some(summary) = self.summary_mut(id) {
            summary.pending = pending;
        }
    }

    fn summary_mut(&mut self, id: &ConversationId) -> Option<&mut SummaryView> {
        self.summaries.iter_mut().find(|summary| &summary.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persisted(ids: &[(&str, &str)]) -> String {
        let map: ConversationMap = ids
            .iter()
            .map(|(id, first)| {
                (
                    ConversationId::from(*id),
                    vec![Turn::user(*first), Turn::assistant("ok")],
                )
            })
            .collect();
        serde_json::to_string(&map).unwrap()
    }

    fn pane_contents(controller: &ConversationController) -> Vec<String> {
        controller
            .pane()
            .iter()
            .map(|message| match message {
                MessageView::Turn(turn) => turn.content.clone(),
                MessageView::Notice(text) => format!("notice: {text}"),
            })
            .collect()
    }

    #[test]
    fn initialize_orders_most_recent_first() {
        let json = persisted(&[
            ("1700000000000", "first"),
            ("1700000005000", "third"),
            ("1700000002000", "second"),
        ]);
        let controller = ConversationController::initialize(Some(&json));

        let titles: Vec<&str> = controller
            .summaries()
            .iter()
            .map(|summary| summary.title.as_str())
            .collect();
        assert_eq!(titles, vec!["third", "second", "first"]);
        assert!(controller.active().is_none());
        assert!(controller.pane().is_empty());
    }

    #[test]
    fn initialize_without_state_is_empty() {
        assert!(ConversationController::initialize(None).is_empty());
        assert!(ConversationController::initialize(Some("  ")).is_empty());
        assert!(ConversationController::initialize(Some("{not json")).is_empty());
    }

    #[test]
    fn initialize_drops_conversations_without_turns() {
        let json = r#"{"1":[],"2":[{"role":"user","content":"kept"}]}"#;
        let controller = ConversationController::initialize(Some(json));
        assert_eq!(controller.len(), 1);
        assert_eq!(controller.summaries().len(), 1);
        assert_eq!(controller.summaries()[0].title, "kept");
    }

    #[test]
    fn submit_without_active_conversation_starts_one() {
        let mut controller = ConversationController::new();
        let request = controller.submit("hello").expect("request");

        assert_eq!(controller.len(), 1);
        assert_eq!(controller.summaries().len(), 1);
        let summary = &controller.summaries()[0];
        assert!(summary.active);
        assert_eq!(summary.id, request.conversation_id);
        assert_eq!(summary.pending, 1);
        assert_eq!(controller.active(), Some(&request.conversation_id));
        assert_eq!(pane_contents(&controller), vec!["hello"]);
        assert_eq!(request.turns, vec![Turn::user("hello")]);
    }

    #[test]
    fn submit_ignores_blank_input() {
        let mut controller = ConversationController::new();
        assert!(controller.submit("   \n").is_none());
        assert!(controller.is_empty());
    }

    #[test]
    fn sequential_submits_append_in_order() {
        let mut controller = ConversationController::new();
        let first = controller.submit("one").unwrap();
        let second = controller.submit("two").unwrap();

        assert_eq!(first.conversation_id, second.conversation_id);
        assert_eq!(controller.len(), 1);
        assert_eq!(second.turns, vec![Turn::user("one"), Turn::user("two")]);
        assert_eq!(controller.pending(&second.conversation_id), 2);
    }

    #[test]
    fn pending_drops_as_replies_arrive() {
        let mut controller = ConversationController::new();
        let request = controller.submit("one").unwrap();
        controller.submit("two").unwrap();
        let id = request.conversation_id;

        controller.dispatch_reply(ReplyEnvelope::success(id.clone(), "a"));
        assert_eq!(controller.pending(&id), 1);
        assert_eq!(controller.summaries()[0].pending, 1);

        controller.dispatch_reply(ReplyEnvelope::failure(id.clone(), "timeout"));
        assert_eq!(controller.pending(&id), 0);
        assert_eq!(controller.summaries()[0].pending, 0);
    }

    #[test]
    fn new_conversation_starts_fresh_on_next_submit() {
        let mut controller = ConversationController::new();
        let first = controller.submit("first").unwrap();
        controller.new_conversation();
        assert!(controller.active().is_none());
        assert!(controller.pane().is_empty());

        let second = controller.submit("second").unwrap();
        assert_ne!(first.conversation_id, second.conversation_id);
        assert_eq!(controller.len(), 2);
        assert_eq!(controller.summaries()[0].title, "second");
        assert!(!controller.summaries()[1].active);
    }

    #[test]
    fn reply_for_active_conversation_is_rendered() {
        let mut controller = ConversationController::new();
        let request = controller.submit("hello").unwrap();

        let outcome = controller.dispatch_reply(ReplyEnvelope::success(
            request.conversation_id.clone(),
            "hi there",
        ));

        assert_eq!(outcome, ReplyOutcome::Appended { visible: true });
        assert!(outcome.requires_save());
        assert_eq!(pane_contents(&controller), vec!["hello", "hi there"]);
        assert_eq!(controller.pending(&request.conversation_id), 0);
        assert_eq!(controller.summaries()[0].pending, 0);
    }

    #[test]
    fn reply_for_inactive_conversation_marks_unread() {
        let json = persisted(&[("100", "older"), ("200", "newer")]);
        let mut controller = ConversationController::initialize(Some(&json));
        let older = ConversationId::from("100");
        let newer = ConversationId::from("200");

        controller.select(&older);
        controller.submit("follow up").unwrap();
        controller.select(&newer);
        let pane_before = controller.pane().to_vec();

        let outcome = controller.dispatch_reply(ReplyEnvelope::success(older.clone(), "late"));

        assert_eq!(outcome, ReplyOutcome::Appended { visible: false });
        assert_eq!(controller.pane(), pane_before.as_slice());
        let summary = controller
            .summaries()
            .iter()
            .find(|summary| summary.id == older)
            .unwrap();
        assert!(summary.unread);
        assert_eq!(controller.turns(&older).unwrap().last(), Some(&Turn::assistant("late")));
    }

    #[test]
    fn select_clears_unread_and_renders_stored_turns() {
        let json = persisted(&[("100", "older"), ("200", "newer")]);
        let mut controller = ConversationController::initialize(Some(&json));
        let older = ConversationId::from("100");
        let newer = ConversationId::from("200");

        controller.select(&older);
        controller.submit("more").unwrap();
        controller.select(&newer);
        controller.dispatch_reply(ReplyEnvelope::success(older.clone(), "answer"));

        assert!(controller.select(&older));
        let summary = &controller.summaries()[1];
        assert_eq!(summary.id, older);
        assert!(!summary.unread);
        assert!(summary.active);
        assert!(!controller.summaries()[0].active);
        assert_eq!(
            pane_contents(&controller),
            vec!["older", "ok", "more", "answer"]
        );
    }

    #[test]
    fn select_unknown_conversation_is_rejected() {
        let mut controller = ConversationController::new();
        assert!(!controller.select(&ConversationId::from("42")));
        assert!(controller.active().is_none());
    }

    #[test]
    fn out_of_order_replies_route_by_id() {
        let mut controller = ConversationController::new();
        let first = controller.submit("first conversation").unwrap();
        controller.new_conversation();
        let second = controller.submit("second conversation").unwrap();
        assert_ne!(first.conversation_id, second.conversation_id);

        controller.dispatch_reply(ReplyEnvelope::success(second.conversation_id.clone(), "to second"));
        controller.dispatch_reply(ReplyEnvelope::success(first.conversation_id.clone(), "to first"));

        assert_eq!(
            controller.turns(&first.conversation_id).unwrap().last(),
            Some(&Turn::assistant("to first"))
        );
        assert_eq!(
            controller.turns(&second.conversation_id).unwrap().last(),
            Some(&Turn::assistant("to second"))
        );
        assert_eq!(
            pane_contents(&controller),
            vec!["second conversation", "to second"]
        );
        assert_eq!(controller.summaries()[0].id, second.conversation_id);
    }

    #[test]
    fn removing_active_conversation_clears_pane() {
        let mut controller = ConversationController::new();
        let request = controller.submit("bye").unwrap();

        assert!(controller.remove(&request.conversation_id));
        assert!(controller.active().is_none());
        assert!(controller.pane().is_empty());
        assert!(controller.summaries().is_empty());
        assert!(controller.is_empty());
    }

    #[test]
    fn removing_other_conversation_leaves_pane() {
        let json = persisted(&[("100", "older"), ("200", "newer")]);
        let mut controller = ConversationController::initialize(Some(&json));
        let newer = ConversationId::from("200");
        controller.select(&newer);
        let pane_before = controller.pane().to_vec();

        assert!(controller.remove(&ConversationId::from("100")));
        assert_eq!(controller.pane(), pane_before.as_slice());
        assert_eq!(controller.active(), Some(&newer));
        assert_eq!(controller.summaries().len(), 1);
    }

    #[test]
    fn removing_missing_conversation_is_noop() {
        let mut controller = ConversationController::new();
        assert!(!controller.remove(&ConversationId::from("7")));
    }

    #[test]
    fn reply_for_removed_conversation_is_discarded() {
        let mut controller = ConversationController::new();
        let request = controller.submit("gone soon").unwrap();
        controller.remove(&request.conversation_id);

        let outcome = controller.dispatch_reply(ReplyEnvelope::success(
            request.conversation_id.clone(),
            "too late",
        ));

        assert_eq!(outcome, ReplyOutcome::Discarded);
        assert!(!outcome.requires_save());
        assert!(controller.is_empty());
        assert_eq!(controller.pending(&request.conversation_id), 0);
    }

    #[test]
    fn failed_reply_shows_notice_until_next_submit() {
        let mut controller = ConversationController::new();
        let request = controller.submit("hello").unwrap();

        let outcome = controller.dispatch_reply(ReplyEnvelope::failure(
            request.conversation_id.clone(),
            "connection refused",
        ));

        assert_eq!(outcome, ReplyOutcome::Failed { visible: true });
        assert!(!outcome.requires_save());
        assert_eq!(
            pane_contents(&controller),
            vec!["hello", "notice: connection refused"]
        );
        assert_eq!(controller.turns(&request.conversation_id).unwrap().len(), 1);

        controller.submit("again").unwrap();
        assert_eq!(pane_contents(&controller), vec!["hello", "again"]);
    }

    #[test]
    fn failed_reply_in_background_marks_unread_and_shows_on_select() {
        let mut controller = ConversationController::new();
        let request = controller.submit("hello").unwrap();
        controller.new_conversation();

        let outcome = controller.dispatch_reply(ReplyEnvelope::failure(
            request.conversation_id.clone(),
            "timeout",
        ));
        assert_eq!(outcome, ReplyOutcome::Failed { visible: false });
        assert!(controller.summaries()[0].unread);

        controller.select(&request.conversation_id);
        assert_eq!(pane_contents(&controller), vec!["hello", "notice: timeout"]);
    }

    #[test]
    fn titles_are_cut_to_twenty_characters() {
        assert_eq!(summary_title("abcdefghijklmnopqrstuvwxy"), "abcdefghijklmnopqrst");
        assert_eq!(summary_title("abcdefgh"), "abcdefgh");
        assert_eq!(summary_title("ünïcödé ünïcödé ünïcödé").chars().count(), 20);
    }

    #[test]
    fn titles_stay_on_one_line() {
        assert_eq!(summary_title("\n  hello\nworld"), "hello world");
        assert_eq!(summary_title("tab\there"), "tab here");
        assert_eq!(
            summary_title("\nfirst line is long enough\nsecond"),
            "first line is long e"
        );
    }

    #[test]
    fn reply_for_another_id_still_clears_the_requester() {
        let json = persisted(&[("100", "older")]);
        let mut controller = ConversationController::initialize(Some(&json));
        let request = controller.submit("new").unwrap();
        let requester = request.conversation_id;
        let older = ConversationId::from("100");

        let outcome = controller
            .dispatch_reply(ReplyEnvelope::success(older.clone(), "x").requested_by(requester.clone()));

        assert_eq!(outcome, ReplyOutcome::Appended { visible: false });
        assert_eq!(controller.pending(&requester), 0);
        assert_eq!(controller.summaries()[0].pending, 0);
        assert_eq!(controller.turns(&older).unwrap().last(), Some(&Turn::assistant("x")));
        assert!(controller.summaries()[1].unread);
    }

    #[test]
    fn new_conversation_title_uses_first_turn() {
        let mut controller = ConversationController::new();
        controller.submit("How do I read a file in Rust?").unwrap();
        assert_eq!(controller.summaries()[0].title, "How do I read a file");
    }

    #[test]
    fn snapshot_round_trips_through_initialize() {
        let mut controller = ConversationController::new();
        let request = controller.submit("persist me").unwrap();
        controller.dispatch_reply(ReplyEnvelope::success(request.conversation_id.clone(), "done"));

        let json = controller.snapshot_json().unwrap();
        let restored = ConversationController::initialize(Some(&json));
        assert_eq!(
            restored.turns(&request.conversation_id).unwrap(),
            &[Turn::user("persist me"), Turn::assistant("done")]
        );
    }
}
