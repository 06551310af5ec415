//! Termination marker for commander/coder exchanges.

/// Marker the coder appends once the task is done.
pub const TERMINATE: &str = "TERMINATE";

/// Whether a coder reply ends the current exchange.
///
/// Only a trailing marker counts; trailing whitespace is ignored.
pub fn is_termination_msg(content: &str) -> bool {
    content.trim_end().ends_with(TERMINATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_marker_terminates() {
        assert!(is_termination_msg("All done.\nTERMINATE"));
        assert!(is_termination_msg("TERMINATE\n\n  "));
    }

    #[test]
    fn marker_elsewhere_does_not_terminate() {
        assert!(!is_termination_msg("TERMINATE after you run this:\n```python\nprint(1)\n```"));
        assert!(!is_termination_msg("terminate"));
        assert!(!is_termination_msg(""));
    }
}
