//! Outgoing line normalisation.

use std::borrow::Cow;

/// Terminator appended to every line sent to the device.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Ensures `text` ends with exactly one CRLF terminator.
///
/// - Text already ending in `"\r\n"` is returned unchanged.
/// - A bare trailing `"\n"` is replaced with `"\r\n"`.
/// - Otherwise `"\r\n"` is appended.
///
/// # Examples
///
/// ```rust
/// use robolink_core::normalize_line;
///
/// assert_eq!(normalize_line("go"), "go\r\n");
/// assert_eq!(normalize_line("go\n"), "go\r\n");
/// assert_eq!(normalize_line("go\r\n"), "go\r\n");
/// ```
pub fn normalize_line(text: &str) -> Cow<'_, str> {
    if text.ends_with(LINE_TERMINATOR) {
        Cow::Borrowed(text)
    } else if let Some(body) = text.strip_suffix('\n') {
        Cow::Owned(format!("{body}{LINE_TERMINATOR}"))
    } else {
        Cow::Owned(format!("{text}{LINE_TERMINATOR}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_line_appends_crlf() {
        let out = normalize_line("go");
        assert_eq!(out.as_bytes(), b"go\r\n");
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_normalize_line_keeps_existing_crlf_borrowed() {
        let out = normalize_line("go\r\n");
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, "go\r\n");
    }

    #[test]
    fn test_normalize_line_replaces_bare_lf() {
        assert_eq!(normalize_line("lf\n"), "lf\r\n");
    }

    #[test]
    fn test_normalize_line_bare_cr_still_gets_crlf() {
        assert_eq!(normalize_line("r\r"), "r\r\r\n");
    }

    #[test]
    fn test_normalize_line_empty_text_becomes_terminator() {
        assert_eq!(normalize_line(""), "\r\n");
    }
}
