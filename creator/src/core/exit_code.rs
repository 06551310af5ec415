//! Exit code detection in execution replies.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::SpanStatus;

static EXIT_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"exitcode: (\d+)").unwrap());

/// First `exitcode: <n>` reported in `message`.
pub fn parse_exit_code(message: &str) -> Option<i32> {
    EXIT_CODE_RE
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Span status implied by a reply, if it reports an exit code.
pub fn status_from_reply(message: &str) -> Option<SpanStatus> {
    parse_exit_code(message).map(|code| {
        if code == 0 {
            SpanStatus::Success
        } else {
            SpanStatus::Error
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exit_code() {
        assert_eq!(
            parse_exit_code("exitcode: 0 (execution succeeded)\nCode output: ok"),
            Some(0)
        );
        assert_eq!(parse_exit_code("before\nexitcode: 127 (execution failed)"), Some(127));
        assert_eq!(parse_exit_code("no code here"), None);
    }

    #[test]
    fn status_follows_exit_code() {
        assert_eq!(status_from_reply("exitcode: 0"), Some(SpanStatus::Success));
        assert_eq!(status_from_reply("exitcode: 1"), Some(SpanStatus::Error));
        assert_eq!(status_from_reply("please fix the layer"), None);
    }
}
