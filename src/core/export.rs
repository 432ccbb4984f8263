use crate::core::message::{MessageQuery, TerminalMessage};
use crate::domain::error::{TermLinkError, TermLinkResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const CSV_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f UTC";

/// Output format for a message export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Text,
    Csv,
    Json,
}

impl ExportFormat {
    /// Conventional file extension
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = TermLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(ExportFormat::Text),
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(TermLinkError::InvalidInput(format!(
                "unsupported export format: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub include_timestamp: bool,
    pub include_direction: bool,
    /// Only messages accepted by this query are exported
    pub query: Option<MessageQuery>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Text,
            include_timestamp: true,
            include_direction: true,
            query: None,
        }
    }
}

impl ExportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }
}

/// Render `messages` in the requested format. Input order is preserved.
pub fn export_messages(
    messages: &[TerminalMessage],
    options: &ExportOptions,
) -> TermLinkResult<String> {
    let selected: Vec<&TerminalMessage> = match &options.query {
        Some(query) => {
            let mut matched: Vec<&TerminalMessage> =
                messages.iter().filter(|m| query.matches(m)).collect();
            if let Some(limit) = query.limit {
                if matched.len() > limit {
                    matched.drain(..matched.len() - limit);
                }
            }
            matched
        }
        None => messages.iter().collect(),
    };

    match options.format {
        ExportFormat::Text => Ok(export_text(&selected, options)),
        ExportFormat::Csv => Ok(export_csv(&selected, options)),
        ExportFormat::Json => serde_json::to_string_pretty(&selected)
            .map_err(|e| TermLinkError::Output(format!("JSON serialization error: {}", e))),
    }
}

fn export_text(messages: &[&TerminalMessage], options: &ExportOptions) -> String {
    let mut out = String::new();
    for message in messages {
        if options.include_timestamp {
            out.push_str(&format!("[{}] ", message.timestamp.to_rfc3339()));
        }
        if options.include_direction {
            out.push_str(&format!("{}: ", message.direction));
        }
        out.push_str(&message.content);
        if let Some(error) = &message.error {
            out.push_str(&format!(" [failed: {}]", error));
        }
        out.push('\n');
    }
    out
}

fn export_csv(messages: &[&TerminalMessage], options: &ExportOptions) -> String {
    let mut headers = Vec::new();
    if options.include_timestamp {
        headers.push("timestamp");
    }
    if options.include_direction {
        headers.push("direction");
    }
    headers.push("content");
    headers.push("encoding");

    let mut out = headers.join(",");
    out.push('\n');

    for message in messages {
        let mut row = Vec::new();
        if options.include_timestamp {
            row.push(message.timestamp.format(CSV_TIMESTAMP_FORMAT).to_string());
        }
        if options.include_direction {
            row.push(message.direction.to_string());
        }
        row.push(csv_quote(&message.content));
        row.push(message.encoding.clone());

        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
