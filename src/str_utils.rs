/// Prefix of at most `max_chars` characters, never cutting a UTF-8 sequence.
pub fn prefix_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Shortens text for log lines, marking the cut.
pub fn preview(s: &str, max_chars: usize) -> String {
    let head = prefix_chars(s, max_chars);
    if head.len() == s.len() {
        s.to_string()
    } else {
        format!("{}…", head)
    }
}
