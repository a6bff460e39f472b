use serde::{Deserialize, Serialize};

use crate::models::UserId;

/// One update received from the messenger, already flattened to the three
/// shapes the dispatcher cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Incoming {
    /// A slash command, e.g. `/enroll` or `/announce 3 see you tomorrow`.
    Command { name: String, args: String },
    /// Plain text, fed to whatever flow the user is in.
    Text(String),
    /// Data attached to an inline menu button the user pressed.
    Callback(String),
}

impl Incoming {
    /// Split raw message text into a command or plain text.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if let Some(rest) = trimmed.strip_prefix('/') {
            let (name, args) = match rest.split_once(char::is_whitespace) {
                Some((name, args)) => (name, args.trim()),
                None => (rest, ""),
            };
            Incoming::Command {
                name: name.to_ascii_lowercase(),
                args: args.to_string(),
            }
        } else {
            Incoming::Text(trimmed.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub user_id: UserId,
    pub incoming: Incoming,
}

/// An inline button: visible label plus the callback data sent back when
/// the user presses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// An inline menu attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }

    /// One button per row, the layout used by almost every selection menu.
    pub fn single_column(buttons: impl IntoIterator<Item = Button>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
