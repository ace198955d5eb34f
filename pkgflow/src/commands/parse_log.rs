//! Classify a saved check log

use super::{CommandError, OutputFormat};
use pkgflow_core::{LogParser, ParsedLog, PipelineConfig, Severity};
use std::path::Path;

/// Parse `log` and print its findings; returns whether the log fails
pub fn execute(
    log: &Path,
    fail_on: Option<&str>,
    flush_trailing: bool,
    format: OutputFormat,
) -> Result<bool, CommandError> {
    let text = std::fs::read_to_string(log)?;
    let config = PipelineConfig {
        fail_on: fail_on.map(str::to_string),
        flush_trailing_finding: flush_trailing,
        ..PipelineConfig::default()
    };
    let parser = LogParser::new(config.parser_config()?);
    let parsed = parser.parse(&text);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&parsed)?),
        OutputFormat::Text => print_text(&parsed),
    }

    Ok(parsed.should_fail || parsed.severity.fails())
}

fn print_text(parsed: &ParsedLog) {
    for finding in parsed.findings.iter().filter(|f| f.severity != Severity::Ok) {
        println!("[{}]", finding.severity);
        print!("{}", finding.text);
        println!();
    }
    println!("Status: {} ({})", parsed.severity, parsed.status_line());
    if parsed.should_fail {
        println!("❌ A finding matched the fail-override pattern");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NOTE_THEN_WARNING: &str = "\
* checking package dependencies ... NOTE
Package suggested but not available: 'rmarkdown'
* checking R code for possible problems ... WARNING
no visible binding for global variable 'x'
* DONE
";

    fn log(tmp: &TempDir, text: &str) -> std::path::PathBuf {
        let path = tmp.path().join("00check.log");
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_notes_and_warnings_pass() {
        let tmp = TempDir::new().unwrap();
        let path = log(&tmp, NOTE_THEN_WARNING);

        assert!(!execute(&path, None, false, OutputFormat::Text).unwrap());
        assert!(!execute(&path, None, false, OutputFormat::Json).unwrap());
    }

    #[test]
    fn test_fail_pattern_escalates() {
        let tmp = TempDir::new().unwrap();
        let path = log(&tmp, NOTE_THEN_WARNING);

        assert!(execute(&path, Some("no visible binding"), false, OutputFormat::Text).unwrap());
        assert!(!execute(&path, Some("not present anywhere"), false, OutputFormat::Text).unwrap());
    }

    #[test]
    fn test_error_fails() {
        let tmp = TempDir::new().unwrap();
        let path = log(&tmp, "* checking examples ... ERROR\nExecution halted\n* DONE\n");

        assert!(execute(&path, None, false, OutputFormat::Text).unwrap());
    }

    #[test]
    fn test_trailing_error_counts_only_when_flushed() {
        let tmp = TempDir::new().unwrap();
        let path = log(&tmp, "* checking tests ... OK\n* checking PDF manual ... ERROR\n");

        assert!(!execute(&path, None, false, OutputFormat::Text).unwrap());
        assert!(execute(&path, None, true, OutputFormat::Text).unwrap());
    }

    #[test]
    fn test_bad_input_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = log(&tmp, NOTE_THEN_WARNING);

        assert!(execute(&path, Some("(unclosed"), false, OutputFormat::Text).is_err());
        assert!(execute(&tmp.path().join("missing.log"), None, false, OutputFormat::Text).is_err());
    }
}
