//! Chat history export.
//!
//! Two formats:
//!
//! - **JSON**: a pretty-printed array of [`HistoryEntry`] objects.
//! - **Text**: one line per message,
//!   `[2026-10-17T09:30:00.000Z] You [photo]: text`, with `\`, newlines and
//!   carriage returns escaped so each message stays on one line.
//!
//! [`parse_history`] reads either format back, so an exported file can be
//! checked against the log it came from.

use super::Message;
use crate::error::ExportError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Language for sender labels and the photo marker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Es,
    Fr,
    De,
}

impl Locale {
    pub fn user_label(self) -> &'static str {
        match self {
            Locale::En => "You",
            Locale::Es => "Tú",
            Locale::Fr => "Vous",
            Locale::De => "Du",
        }
    }

    pub fn assistant_label(self) -> &'static str {
        match self {
            Locale::En | Locale::Fr => "Assistant",
            Locale::Es => "Asistente",
            Locale::De => "Assistent",
        }
    }

    pub fn photo_marker(self) -> &'static str {
        match self {
            Locale::En | Locale::Fr => "photo",
            Locale::Es => "foto",
            Locale::De => "Foto",
        }
    }

    fn sender(self, is_user: bool) -> &'static str {
        if is_user {
            self.user_label()
        } else {
            self.assistant_label()
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "es" => Ok(Locale::Es),
            "fr" => Ok(Locale::Fr),
            "de" => Ok(Locale::De),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}

/// Output format of an exported history.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryFormat {
    #[default]
    Json,
    Text,
}

impl HistoryFormat {
    pub fn extension(self) -> &'static str {
        match self {
            HistoryFormat::Json => "json",
            HistoryFormat::Text => "txt",
        }
    }
}

impl std::str::FromStr for HistoryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(HistoryFormat::Json),
            "text" | "txt" => Ok(HistoryFormat::Text),
            other => Err(format!("unsupported history format: {other}")),
        }
    }
}

/// One exported message. Photos are recorded as a flag, not as image data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub sender: String,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
    pub text: Option<String>,
    pub has_photo: bool,
}

impl HistoryEntry {
    fn from_message(message: &Message, locale: Locale) -> Self {
        Self {
            sender: locale.sender(message.is_user).to_owned(),
            is_user: message.is_user,
            timestamp: message.timestamp,
            text: message.text.clone(),
            has_photo: message.has_photo(),
        }
    }
}

/// Convert log messages to export entries.
pub fn entries(messages: &[Message], locale: Locale) -> Vec<HistoryEntry> {
    messages
        .iter()
        .map(|m| HistoryEntry::from_message(m, locale))
        .collect()
}

/// Render `messages` in `format`.
///
/// # Errors
///
/// Returns [`ExportError::Serialize`] if JSON encoding fails.
pub fn render(messages: &[Message], format: HistoryFormat, locale: Locale) -> Result<String, ExportError> {
    let entries = entries(messages, locale);
    match format {
        HistoryFormat::Json => Ok(serde_json::to_string_pretty(&entries)?),
        HistoryFormat::Text => Ok(entries
            .iter()
            .map(|e| render_line(e, locale))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

fn render_line(entry: &HistoryEntry, locale: Locale) -> String {
    let timestamp = entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
    let marker = if entry.has_photo {
        format!(" [{}]", locale.photo_marker())
    } else {
        String::new()
    };
    let text = escape(entry.text.as_deref().unwrap_or(""));
    format!("[{timestamp}] {}{marker}: {text}", entry.sender)
}

/// Parse a rendered history back into entries.
///
/// # Errors
///
/// Returns [`ExportError::Parse`] for malformed lines or unknown senders and
/// [`ExportError::Serialize`] for malformed JSON.
pub fn parse_history(format: HistoryFormat, locale: Locale, input: &str) -> Result<Vec<HistoryEntry>, ExportError> {
    match format {
        HistoryFormat::Json => Ok(serde_json::from_str(input)?),
        HistoryFormat::Text => input
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| parse_line(line, locale).map_err(|reason| ExportError::Parse { line: idx + 1, reason }))
            .collect(),
    }
}

fn parse_line(line: &str, locale: Locale) -> Result<HistoryEntry, String> {
    let rest = line.strip_prefix('[').ok_or("missing timestamp")?;
    let (timestamp, rest) = rest.split_once("] ").ok_or("unterminated timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| format!("bad timestamp: {e}"))?
        .with_timezone(&Utc);

    let (head, text) = rest.split_once(": ").ok_or("missing sender separator")?;
    let marker = format!(" [{}]", locale.photo_marker());
    let (sender, has_photo) = match head.strip_suffix(marker.as_str()) {
        Some(sender) => (sender, true),
        None => (head, false),
    };

    let is_user = if sender == locale.user_label() {
        true
    } else if sender == locale.assistant_label() {
        false
    } else {
        return Err(format!("unknown sender: {sender}"));
    };

    let text = unescape(text);
    Ok(HistoryEntry {
        sender: sender.to_owned(),
        is_user,
        timestamp,
        // the line format has no null; empty text reads back as `None`
        text: Some(text).filter(|t| !t.is_empty()),
        has_photo,
    })
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// `chat-history-YYYY-MM-DD.<ext>`
pub fn file_name(format: HistoryFormat, date: NaiveDate) -> String {
    format!("chat-history-{}.{}", date.format("%Y-%m-%d"), format.extension())
}

/// True when the log holds more than the welcome message.
pub fn can_export(messages: &[Message]) -> bool {
    messages.len() > 1
}

/// Write `messages` to a timestamped file in `dir` and return its path.
///
/// An existing file for the same day is not overwritten; a numeric suffix
/// is added instead.
///
/// # Errors
///
/// Returns [`ExportError::NothingToExport`] if only the welcome message
/// exists, or an I/O / serialization error.
pub fn write_history(
    messages: &[Message],
    dir: &Path,
    format: HistoryFormat,
    locale: Locale,
    now: DateTime<Utc>,
) -> Result<PathBuf, ExportError> {
    if !can_export(messages) {
        return Err(ExportError::NothingToExport);
    }

    let content = render(messages, format, locale)?;
    std::fs::create_dir_all(dir)?;

    let base = file_name(format, now.date_naive());
    let mut path = dir.join(&base);
    let mut n = 1;
    while path.exists() {
        let stem = base.trim_end_matches(&format!(".{}", format.extension()));
        path = dir.join(format!("{stem}-{n}.{}", format.extension()));
        n += 1;
    }

    std::fs::write(&path, content)?;
    info!(path = %path.display(), messages = messages.len(), "chat history exported");
    Ok(path)
}
