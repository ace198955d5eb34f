//! Per-package log files at `<root>/<phase>/<package>.log`

use crate::executor::{EngineError, EngineResult, Phase};
use std::path::{Path, PathBuf};

/// Writes raw toolchain output, one file per (phase, package)
#[derive(Debug, Clone)]
pub struct LogStore {
    root: PathBuf,
    html: bool,
}

impl LogStore {
    /// `html` escapes the output and wraps it in `<pre>` for report embedding
    pub fn new(root: impl Into<PathBuf>, html: bool) -> Self {
        Self {
            root: root.into(),
            html,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fixed location of a package's log for a phase
    pub fn path(&self, phase: Phase, package: &str) -> PathBuf {
        self.root.join(phase.as_str()).join(format!("{package}.log"))
    }

    /// Write a log, replacing any previous one
    pub async fn write(&self, phase: Phase, package: &str, output: &str) -> EngineResult<PathBuf> {
        let path = self.path(phase, package);
        let dir = self.root.join(phase.as_str());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| EngineError::io(&dir, e))?;

        let body = if self.html {
            format!("<pre>\n{}</pre>\n", escape_html(output))
        } else {
            output.to_string()
        };
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| EngineError::io(&path, e))?;
        Ok(path)
    }
}

/// Escape `& < > " '`
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape_html(r#"a < b && c > "d" 'e'"#),
            "a &lt; b &amp;&amp; c &gt; &quot;d&quot; &#x27;e&#x27;"
        );
    }

    #[tokio::test]
    async fn test_plain_log() {
        let tmp = TempDir::new().unwrap();
        let logs = LogStore::new(tmp.path().join("logs"), false);

        let path = logs.write(Phase::Install, "teal", "* installing <teal>\n").await.unwrap();
        assert_eq!(path, tmp.path().join("logs/install/teal.log"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "* installing <teal>\n");
    }

    #[tokio::test]
    async fn test_html_log() {
        let tmp = TempDir::new().unwrap();
        let logs = LogStore::new(tmp.path(), true);

        let path = logs.write(Phase::Check, "teal", "x < y\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<pre>\nx &lt; y\n</pre>\n");
    }

    #[tokio::test]
    async fn test_unwritable_root() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("logs");
        std::fs::write(&blocker, b"").unwrap();

        let err = LogStore::new(&blocker, false)
            .write(Phase::Check, "teal", "")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
