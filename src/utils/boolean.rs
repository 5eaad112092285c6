//! Tolerant boolean-literal parsing for bootstrap values.

/// Literals accepted as `true`, compared case-insensitively.
const TRUE_LITERALS: [&str; 3] = ["1", "t", "true"];

/// Literals accepted as `false`, compared case-insensitively.
const FALSE_LITERALS: [&str; 3] = ["0", "f", "false"];

/// Parse a boolean literal.
///
/// Accepts `1`, `t`, `true`, `0`, `f` and `false` in any letter case
/// (`TRUE`, `True`, `F`, ...). Surrounding whitespace is not trimmed.
/// Returns `None` for anything else.
///
/// # Examples
///
/// ```
/// use flopt::parse_bool;
///
/// assert_eq!(parse_bool("T"), Some(true));
/// assert_eq!(parse_bool("False"), Some(false));
/// assert_eq!(parse_bool("yes"), None);
/// ```
pub fn parse_bool(literal: &str) -> Option<bool> {
    if TRUE_LITERALS.iter().any(|l| l.eq_ignore_ascii_case(literal)) {
        return Some(true);
    }
    if FALSE_LITERALS.iter().any(|l| l.eq_ignore_ascii_case(literal)) {
        return Some(false);
    }
    None
}
