use natter_services::{NotificationSink, PeerId};
use natter_sync::{Message, Origin, Peer, ViewEvent};

pub const PEER_USAGE: &str = "usage: /peer <id> [display name]";

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    SelectPeer(Peer),
    ToggleTopics,
    StopTopics,
    RefreshSession,
    ReloadSettings,
    Quit,
    Send(String),
    Empty,
    Invalid(&'static str),
}

pub fn parse_line(line: &str) -> ConsoleCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ConsoleCommand::Empty;
    }

    let (head, rest) = trimmed
        .split_once(char::is_whitespace)
        .map(|(head, rest)| (head, rest.trim()))
        .unwrap_or((trimmed, ""));

    match head {
        "/peer" => {
            let (peer_id, display_name) = rest
                .split_once(char::is_whitespace)
                .map(|(id, name)| (id, name.trim()))
                .unwrap_or((rest, ""));
            if peer_id.is_empty() {
                return ConsoleCommand::Invalid(PEER_USAGE);
            }
            let display_name = if display_name.is_empty() {
                peer_id
            } else {
                display_name
            };
            ConsoleCommand::SelectPeer(Peer::new(peer_id, display_name))
        }
        "/topics" => ConsoleCommand::ToggleTopics,
        "/stop" => ConsoleCommand::StopTopics,
        "/session" => ConsoleCommand::RefreshSession,
        "/reload" => ConsoleCommand::ReloadSettings,
        "/quit" | "/exit" => ConsoleCommand::Quit,
        _ => ConsoleCommand::Send(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

/// Prints topic notifications inline with the conversation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl NotificationSink for ConsoleNotifier {
    fn notify(&self, label: &str) {
        println!("{}", format_topic(label));
    }
}

pub fn format_topic(label: &str) -> String {
    format!("[topic] {label}")
}

/// Turns view events into terminal lines.
#[derive(Debug, Default)]
pub struct ConsoleView {
    peer: Option<PeerId>,
}

impl ConsoleView {
    pub fn render(&mut self, event: &ViewEvent) -> Vec<String> {
        match event {
            ViewEvent::HistoryLoading { peer_id } => {
                self.peer = Some(peer_id.clone());
                vec![format!("-- loading conversation with {peer_id} --")]
            }
            ViewEvent::TranscriptReplaced { messages, .. } => messages
                .iter()
                .map(|message| self.format_message(message))
                .collect(),
            ViewEvent::MessageAppended { message } => vec![self.format_message(message)],
            ViewEvent::ScrollToLatest => Vec::new(),
            ViewEvent::HistoryFailed { peer_id, error } => {
                vec![format!(
                    "!! could not load history with {peer_id}: {error} (/peer {peer_id} to retry)"
                )]
            }
            ViewEvent::DeliveryFailed { message_id, error } => {
                vec![format!("!! message {message_id} may not have been delivered: {error}")]
            }
            ViewEvent::PollingChanged { running: true } => {
                vec!["-- topic detection on --".to_string()]
            }
            ViewEvent::PollingChanged { running: false } => {
                vec!["-- topic detection off --".to_string()]
            }
        }
    }

    fn format_message(&self, message: &Message) -> String {
        match message.origin {
            Origin::Local => format!("me: {}", message.text),
            Origin::Peer => match &self.peer {
                Some(peer_id) => format!("{peer_id}: {}", message.text),
                None => format!("them: {}", message.text),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_command_takes_optional_display_name() {
        assert_eq!(
            parse_line("/peer 42 Ada Lovelace"),
            ConsoleCommand::SelectPeer(Peer::new("42", "Ada Lovelace"))
        );
        assert_eq!(
            parse_line("/peer 42"),
            ConsoleCommand::SelectPeer(Peer::new("42", "42"))
        );
        assert_eq!(parse_line("/peer   "), ConsoleCommand::Invalid(PEER_USAGE));
    }

    #[test]
    fn control_commands_are_recognised() {
        assert_eq!(parse_line("/topics"), ConsoleCommand::ToggleTopics);
        assert_eq!(parse_line(" /stop "), ConsoleCommand::StopTopics);
        assert_eq!(parse_line("/session"), ConsoleCommand::RefreshSession);
        assert_eq!(parse_line("/reload"), ConsoleCommand::ReloadSettings);
        assert_eq!(parse_line("/quit"), ConsoleCommand::Quit);
    }

    #[test]
    fn other_lines_are_sent_verbatim() {
        assert_eq!(
            parse_line("  hello there\n"),
            ConsoleCommand::Send("  hello there".to_string())
        );
        assert_eq!(
            parse_line("/shrug"),
            ConsoleCommand::Send("/shrug".to_string())
        );
        assert_eq!(parse_line("   \n"), ConsoleCommand::Empty);
    }

    #[test]
    fn view_labels_peer_messages_with_selected_peer() {
        let mut view = ConsoleView::default();
        view.render(&ViewEvent::HistoryLoading {
            peer_id: PeerId::new("bob"),
        });

        let lines = view.render(&ViewEvent::TranscriptReplaced {
            peer_id: PeerId::new("bob"),
            messages: vec![Message::peer("hey"), Message::local("hi bob")],
        });

        assert_eq!(lines, ["bob: hey", "me: hi bob"]);
        assert!(view.render(&ViewEvent::ScrollToLatest).is_empty());
    }

    #[test]
    fn failed_history_suggests_retry() {
        let lines = ConsoleView::default().render(&ViewEvent::HistoryFailed {
            peer_id: PeerId::new("bob"),
            error: "server unavailable".to_string(),
        });

        assert_eq!(
            lines,
            ["!! could not load history with bob: server unavailable (/peer bob to retry)"]
        );
    }

    #[test]
    fn topics_render_with_prefix() {
        assert_eq!(format_topic("sports"), "[topic] sports");
    }
}
