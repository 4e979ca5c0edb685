//! POSIX shell quoting for strings interpolated into remote commands.

/// Wrap `value` in single quotes so a POSIX shell passes it through unchanged.
///
/// Embedded single quotes become `'\''`.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len().saturating_add(2));
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}
