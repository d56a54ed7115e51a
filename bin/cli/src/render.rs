//! Turns chat state updates into terminal lines.

use chrono::{DateTime, Local};
use parley_conversation::{Author, ChatError, ChatState};
use parley_core::{MessageId, PrincipalId};
use std::collections::HashSet;

/// Tracks what has already been printed so each update prints only what is new.
///
/// Messages are remembered by id: a reply stamped earlier than messages already
/// on screen is printed when it arrives.
#[derive(Debug)]
pub struct Transcript {
    counterpart_label: String,
    principal: Option<PrincipalId>,
    printed: HashSet<MessageId>,
    error: Option<ChatError>,
}

impl Transcript {
    /// Creates an empty transcript labelling the counterpart's messages.
    pub fn new(counterpart_label: impl Into<String>) -> Self {
        Self {
            counterpart_label: counterpart_label.into(),
            principal: None,
            printed: HashSet::new(),
            error: None,
        }
    }

    /// Returns the lines to print for `state`.
    pub fn update(&mut self, state: &ChatState) -> Vec<String> {
        let mut lines = Vec::new();

        if state.principal != self.principal {
            self.principal = state.principal.clone();
            self.printed.clear();
            if let Some(principal) = &self.principal {
                lines.push(format!("-- signed in as {principal} --"));
            }
        }

        for entry in state.entries() {
            if !self.printed.insert(entry.message.id) {
                continue;
            }
            let author = match entry.author {
                Author::You => "You",
                Author::Counterpart => self.counterpart_label.as_str(),
            };
            let local: DateTime<Local> = entry.message.created_at.with_timezone(&Local);
            lines.push(format!(
                "[{}] {}: {}",
                local.format("%H:%M"),
                author,
                entry.message.body
            ));
        }

        if state.pending_error != self.error {
            self.error = state.pending_error.clone();
            if let Some(err) = &self.error {
                lines.push(format!("! {}", err.user_message()));
            }
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_conversation::{Message, MessageBody, NewMessage};

    fn message(sender: &str, body: &str) -> Message {
        NewMessage::new(
            PrincipalId::new(sender),
            PrincipalId::new("admin1"),
            MessageBody::parse(body).unwrap(),
        )
        .into_message(MessageId::new())
    }

    fn with_messages(principal: &str, messages: Vec<Message>) -> ChatState {
        ChatState {
            principal: Some(PrincipalId::new(principal)),
            messages,
            ..ChatState::default()
        }
    }

    fn state(principal: &str, messages: &[(&str, &str)]) -> ChatState {
        let messages = messages
            .iter()
            .map(|(sender, body)| message(sender, body))
            .collect();
        with_messages(principal, messages)
    }

    #[test]
    fn prints_only_new_messages() {
        let mut transcript = Transcript::new("Admin");

        let first = transcript.update(&state("s1", &[("s1", "hi")]));
        assert_eq!(first.len(), 2);
        assert!(first[0].contains("signed in as s1"));
        assert!(first[1].ends_with("You: hi"));

        let second = transcript.update(&state("s1", &[("s1", "hi"), ("admin1", "hello")]));
        assert_eq!(second.len(), 1);
        assert!(second[0].ends_with("Admin: hello"));
    }

    #[test]
    fn late_reply_inserted_mid_list_is_printed() {
        let mut transcript = Transcript::new("Admin");
        let first = message("s1", "first");
        let late = message("admin1", "second-late");
        let third = message("s1", "third");

        transcript.update(&with_messages("s1", vec![first.clone(), third.clone()]));
        let lines = transcript.update(&with_messages("s1", vec![first, late, third]));

        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("Admin: second-late"));
    }

    #[test]
    fn principal_change_reprints_from_start() {
        let mut transcript = Transcript::new("Admin");
        transcript.update(&state("s1", &[("s1", "hi")]));

        let lines = transcript.update(&state("s2", &[("s2", "hey")]));
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("You: hey"));
    }

    #[test]
    fn errors_are_printed_once() {
        let mut transcript = Transcript::new("Admin");
        let mut failing = state("s1", &[]);
        failing.pending_error = Some(ChatError::EmptyMessage);

        let lines = transcript.update(&failing);
        assert_eq!(lines.last().map(String::as_str), Some("! Message can't be empty"));
        assert!(transcript.update(&failing).is_empty());
    }
}
