//! Response type for command execution results.

use std::fmt;
use std::time::Duration;

/// Output of one command sent to a device.
#[derive(Debug, Clone)]
pub struct Response {
    /// The command that was sent.
    pub command: String,

    /// Output with line endings normalized, the command echo and the
    /// trailing prompt removed.
    pub result: String,

    /// Output as received (escape sequences already stripped).
    pub raw_result: String,

    /// The prompt the device returned to; empty for timed sends.
    pub prompt: String,

    /// Time taken to execute the command.
    pub elapsed: Duration,

    /// For timed sends, whether the awaited text appeared in the window.
    /// Always true for synchronous sends.
    pub matched: bool,

    /// The device complaint, if the output carries one.
    pub failure_message: Option<String>,
}

impl Response {
    pub(crate) fn new(
        command: impl Into<String>,
        raw_result: String,
        prompt: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        let command = command.into();
        let result = normalize(&raw_result, &command);
        Self {
            command,
            result,
            raw_result,
            prompt: prompt.into(),
            elapsed,
            matched: true,
            failure_message: None,
        }
    }

    pub(crate) fn timed(
        command: impl Into<String>,
        raw_result: String,
        matched: bool,
        elapsed: Duration,
    ) -> Self {
        Self {
            matched,
            prompt: String::new(),
            ..Self::new(command, raw_result, String::new(), elapsed)
        }
    }

    pub(crate) fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.failure_message.is_none()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.result.lines()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.raw_result.contains(pattern)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.result)
    }
}

/// Normalize line endings, then drop the command echo and the prompt line.
fn normalize(raw: &str, command: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "");
    let text = text.trim_start_matches('\n');

    let body = match text.split_once('\n') {
        Some((first, rest)) if !command.is_empty() && first.trim_end() == command => rest,
        None if text.trim_end() == command => "",
        _ => text,
    };

    // The last line is the prompt for synchronous sends; timed output may
    // end mid-line and is kept whole.
    let body = match body.rfind('\n') {
        Some(pos) if ends_with_prompt(&body[pos + 1..]) => &body[..pos],
        None if ends_with_prompt(body) => "",
        _ => body,
    };

    body.trim_end_matches('\n').to_string()
}

fn ends_with_prompt(line: &str) -> bool {
    let line = line.trim_end();
    !line.is_empty() && !line.contains(' ') && (line.ends_with('#') || line.ends_with('>'))
}
