//! Check-output classifier
//!
//! Turns the raw text printed by the toolchain's check verb into an ordered
//! list of severity-tagged findings.
//!
//! Every line starting with the item prefix (`"* "` by default) opens a new
//! item. The last whitespace-separated token of the item header decides its
//! severity:
//!
//! - `NOTE`, `WARNING`, `ERROR` or `OK` set the level immediately
//! - a bare `...` defers the decision: following lines are collected until
//!   one of them ends with a tag
//! - anything else leaves the item at `OK`
//!
//! Lines after the header belong to the item until the next header. Text
//! before the first header is ignored.
//!
//! An item is only emitted when the next header arrives, so by default the
//! final item of the input is not part of the result. This matches the
//! historical reports; set [`ParserConfig::flush_trailing`] to emit it.

use crate::severity::Severity;
use regex::Regex;
use serde::{Deserialize, Serialize};

const DEFAULT_ITEM_PREFIX: &str = "* ";
const ELLIPSIS: &str = "...";

/// One classified excerpt of check output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Severity of the item
    pub severity: Severity,
    /// Header and continuation lines, newline-terminated
    pub text: String,
}

/// Parser settings
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Prefix that opens a new item
    pub item_prefix: String,
    /// NOTE/WARNING findings matching this pattern force `should_fail`
    pub fail_on: Option<Regex>,
    /// Emit the final item at end of input
    pub flush_trailing: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            item_prefix: DEFAULT_ITEM_PREFIX.to_string(),
            fail_on: None,
            flush_trailing: false,
        }
    }
}

/// Parse result for one log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedLog {
    /// Findings in order of appearance
    pub findings: Vec<Finding>,
    /// Most severe level among the emitted findings
    pub severity: Severity,
    /// Forced by the fail-override pattern
    pub should_fail: bool,
}

impl ParsedLog {
    /// Number of findings at the given level
    pub fn count(&self, level: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == level).count()
    }

    /// Short status line, e.g. `1 ERROR, 2 WARNINGs, 0 NOTEs`
    pub fn status_line(&self) -> String {
        format!(
            "{} ERROR{}, {} WARNING{}, {} NOTE{}",
            self.count(Severity::Error),
            plural(self.count(Severity::Error)),
            self.count(Severity::Warning),
            plural(self.count(Severity::Warning)),
            self.count(Severity::Note),
            plural(self.count(Severity::Note)),
        )
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Scanning,
    InItem,
    AwaitingTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trailer {
    Tag(Severity),
    Ellipsis,
    Other,
}

fn trailer(line: &str) -> Trailer {
    match line.split_whitespace().next_back() {
        Some(ELLIPSIS) => Trailer::Ellipsis,
        Some(token) => Severity::from_tag(token).map_or(Trailer::Other, Trailer::Tag),
        None => Trailer::Other,
    }
}

/// Stateful line classifier for check output
#[derive(Debug, Clone, Default)]
pub struct LogParser {
    config: ParserConfig,
}

impl LogParser {
    /// Create a parser with the given settings
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parser settings
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Classify a complete log
    pub fn parse(&self, text: &str) -> ParsedLog {
        let mut out = ParsedLog::default();
        let mut state = State::Scanning;
        let mut current: Option<Finding> = None;

        for line in text.lines() {
            if line.starts_with(&self.config.item_prefix) {
                if let Some(done) = current.take() {
                    self.finalize(done, &mut out);
                }

                let mut item = Finding {
                    severity: Severity::Ok,
                    text: format!("{line}\n"),
                };
                state = match trailer(line) {
                    Trailer::Tag(level) => {
                        item.severity = level;
                        State::InItem
                    }
                    Trailer::Ellipsis => State::AwaitingTag,
                    Trailer::Other => State::InItem,
                };
                current = Some(item);
                continue;
            }

            let Some(item) = current.as_mut() else {
                continue;
            };
            item.text.push_str(line);
            item.text.push('\n');

            if state == State::AwaitingTag
                && let Trailer::Tag(level) = trailer(line)
            {
                item.severity = level;
                state = State::InItem;
            }
        }

        if self.config.flush_trailing
            && let Some(done) = current.take()
        {
            self.finalize(done, &mut out);
        }

        out
    }

    fn finalize(&self, finding: Finding, out: &mut ParsedLog) {
        out.severity = out.severity.merge(finding.severity);

        if finding.severity.overridable()
            && let Some(pattern) = &self.config.fail_on
            && pattern.is_match(&finding.text)
        {
            tracing::debug!(severity = %finding.severity, "finding matches fail-override pattern");
            out.should_fail = true;
        }

        out.findings.push(finding);
    }
}
