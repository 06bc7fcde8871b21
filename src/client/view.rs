//! View model of a live chat client.
//!
//! Holds everything a front-end renders: the append-only message log, the
//! subscription state behind the connection indicator, the outgoing draft and
//! the entry to keep scrolled into view.

use crate::message::{ChatMessage, SubmitMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionState {
    #[default]
    Disconnected,
    Joining,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Join,
    Subscribed,
    Error,
    Leave,
}

impl SubscriptionState {
    /// `Disconnected -(join)-> Joining -(subscribed)-> Connected -(error)-> Disconnected`.
    ///
    /// `Leave` and `Error` force `Disconnected` from anywhere; any other
    /// transition not in the chain leaves the state unchanged.
    pub fn apply(self, transition: Transition) -> Self {
        use SubscriptionState::*;

        match (self, transition) {
            (Disconnected, Transition::Join) => Joining,
            (Joining, Transition::Subscribed) => Connected,
            (_, Transition::Error | Transition::Leave) => Disconnected,
            (state, _) => state,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SubscriptionState::Disconnected => "disconnected",
            SubscriptionState::Joining => "connecting",
            SubscriptionState::Connected => "connected",
        }
    }
}

/// Outgoing input. The username survives a send, the message text does not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub username: String,
    pub message: String,
}

impl Draft {
    pub fn can_submit(&self) -> bool {
        !self.username.trim().is_empty() && !self.message.trim().is_empty()
    }

    /// The request to send, or `None` while submitting is disabled.
    pub fn submission(&self) -> Option<SubmitMessage> {
        self.can_submit()
            .then(|| SubmitMessage::new(self.username.trim(), self.message.trim()))
    }

    /// Call once the server accepted the submission.
    pub fn submitted(&mut self) {
        self.message.clear();
    }
}

#[derive(Debug, Default)]
pub struct ChatView {
    entries: Vec<ChatMessage>,
    state: SubscriptionState,
    pub draft: Draft,
    scroll_to: Option<usize>,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an incoming message. Duplicates are kept as separate entries.
    pub fn receive(&mut self, message: ChatMessage) -> &ChatMessage {
        self.entries.push(message);
        let last = self.entries.len() - 1;
        self.scroll_to = Some(last);

        &self.entries[last]
    }

    /// Mirrors a state observed on a subscription's lifecycle stream.
    pub fn set_state(&mut self, state: SubscriptionState) {
        self.state = state;
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn connected(&self) -> bool {
        self.state == SubscriptionState::Connected
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    /// Index of the entry that must be scrolled into view, if any.
    pub fn scroll_target(&self) -> Option<usize> {
        self.scroll_to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ValidMessage;
    use serde_json::Value;

    fn message(username: &str, text: &str) -> ChatMessage {
        ChatMessage::stamp(ValidMessage {
            username: username.into(),
            message: text.into(),
        })
    }

    #[test]
    fn follows_the_subscription_lifecycle() {
        use SubscriptionState::*;

        let joined = Disconnected.apply(Transition::Join);
        assert_eq!(joined, Joining);
        assert_eq!(joined.apply(Transition::Subscribed), Connected);
        assert_eq!(Connected.apply(Transition::Error), Disconnected);
        assert_eq!(Joining.apply(Transition::Error), Disconnected);
    }

    #[test]
    fn leave_disconnects_from_any_state() {
        use SubscriptionState::*;

        for state in [Disconnected, Joining, Connected] {
            assert_eq!(state.apply(Transition::Leave), Disconnected);
        }
    }

    #[test]
    fn out_of_order_transitions_are_ignored() {
        use SubscriptionState::*;

        assert_eq!(Disconnected.apply(Transition::Subscribed), Disconnected);
        assert_eq!(Connected.apply(Transition::Join), Connected);
        assert_eq!(Joining.apply(Transition::Join), Joining);
    }

    #[test]
    fn appends_in_arrival_order_without_dedup() {
        let mut view = ChatView::new();
        let hi = message("Alice", "hi");

        view.receive(hi.clone());
        view.receive(message("Bob", "hey"));
        view.receive(hi.clone());

        let texts: Vec<_> = view.entries().iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, ["hi", "hey", "hi"]);
        assert_eq!(view.entries()[0], view.entries()[2]);
    }

    #[test]
    fn scrolls_to_the_latest_entry() {
        let mut view = ChatView::new();
        assert_eq!(view.scroll_target(), None);

        view.receive(message("Alice", "one"));
        assert_eq!(view.scroll_target(), Some(0));

        view.receive(message("Alice", "two"));
        assert_eq!(view.scroll_target(), Some(1));
    }

    #[test]
    fn connected_flag_tracks_state() {
        let mut view = ChatView::new();
        assert!(!view.connected());

        let mut state = SubscriptionState::default();
        for (transition, connected) in [
            (Transition::Join, false),
            (Transition::Subscribed, true),
            (Transition::Error, false),
        ] {
            state = state.apply(transition);
            view.set_state(state);
            assert_eq!(view.connected(), connected);
        }
    }

    #[test]
    fn submit_is_disabled_until_both_fields_have_text() {
        let mut draft = Draft::default();
        assert!(draft.submission().is_none());

        draft.username = "Alice".into();
        draft.message = "   ".into();
        assert!(!draft.can_submit());
        assert!(draft.submission().is_none());

        draft.message = " hi ".into();
        let submission = draft.submission().unwrap();
        assert_eq!(submission.username, Some(Value::from("Alice")));
        assert_eq!(submission.message, Some(Value::from("hi")));
    }

    #[test]
    fn successful_send_clears_only_the_message() {
        let mut draft = Draft {
            username: "Alice".into(),
            message: "hi".into(),
        };

        draft.submitted();

        assert_eq!(draft.username, "Alice");
        assert!(draft.message.is_empty());
    }
}
