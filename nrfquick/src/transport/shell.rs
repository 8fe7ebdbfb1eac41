//! Line-oriented parser for shell-mode AT hosts.
//!
//! Firmware built on the Zephyr shell wraps its AT host in a terminal:
//! commands are echoed back behind a prompt, structured log lines carry a
//! timestamp header, and the actual AT response is interleaved between
//! them. The accumulator here turns that stream back into the plain
//! response text a line-mode host would have produced.

use std::sync::OnceLock;

use regex::Regex;

/// Shell prompt prefix emitted before echoed commands.
const PROMPT: &str = "uart:~$ ";

/// Timestamped log-line grammar, e.g.
/// `[00:00:12.345,678] <inf> at_host: AT command received`.
fn log_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[\d{2}:\d{2}:\d{2}\.\d{3},\d{3}\] <(\w+)> ([^:]+): (.*)$")
            .unwrap_or_else(|e| unreachable!("static log regex: {e}"))
    })
}

/// Explicit error pattern terminating a shell-mode exchange.
fn error_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(ERROR|\+CM[ES] ERROR:.*)$")
            .unwrap_or_else(|e| unreachable!("static error regex: {e}"))
    })
}

/// A parsed structured log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellLogLine {
    /// Log level tag (`inf`, `wrn`, `err`, ...).
    pub level: String,
    /// Emitting module name.
    pub module: String,
    /// Message body.
    pub body: String,
}

/// Parse a structured log line, if the line matches the grammar.
#[must_use]
pub fn parse_log_line(line: &str) -> Option<ShellLogLine> {
    let caps = log_line_regex().captures(line)?;
    Some(ShellLogLine {
        level: caps[1].to_string(),
        module: caps[2].trim().to_string(),
        body: caps[3].to_string(),
    })
}

/// Outcome of one shell-mode command exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutcome {
    /// The host acknowledged the command; payload is the collected
    /// response text (without the trailing `OK`).
    Done(String),
    /// The host reported an explicit error; payload is the error line.
    Error(String),
}

/// Accumulates decoded shell output and extracts one command's response.
///
/// Feed raw bytes with [`push`](Self::push); poll with
/// [`outcome`](Self::outcome) after each read. The accumulator drops log
/// lines, the prompt and the command echo, and collects everything else as
/// response text until a terminating `OK`/error line arrives.
#[derive(Debug, Default)]
pub struct ShellAccumulator {
    partial: String,
    response: Vec<String>,
    outcome: Option<ShellOutcome>,
}

impl ShellAccumulator {
    /// Create an empty accumulator for a new command exchange.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the port.
    ///
    /// `echo` is the command text as sent (without terminator), used to
    /// drop the host's echo line.
    pub fn push(&mut self, bytes: &[u8], echo: &str) {
        self.partial.push_str(&String::from_utf8_lossy(bytes));

        while let Some(newline) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=newline).collect();
            self.consume_line(line.trim_end_matches(['\r', '\n']), echo);
        }
    }

    fn consume_line(&mut self, line: &str, echo: &str) {
        if self.outcome.is_some() {
            return;
        }

        let line = line.strip_prefix(PROMPT).unwrap_or(line);
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed == echo || parse_log_line(trimmed).is_some() {
            return;
        }

        if trimmed == "OK" {
            self.outcome = Some(ShellOutcome::Done(self.response.join("\n")));
        } else if error_regex().is_match(trimmed) {
            self.outcome = Some(ShellOutcome::Error(trimmed.to_string()));
        } else {
            self.response.push(trimmed.to_string());
        }
    }

    /// The exchange outcome, once a terminating line has been seen.
    #[must_use]
    pub fn outcome(&self) -> Option<&ShellOutcome> {
        self.outcome.as_ref()
    }
}
