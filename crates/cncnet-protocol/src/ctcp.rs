//! CTCP quoting: control messages travel inside `NOTICE`/`PRIVMSG` payloads
//! wrapped in `\u{1}` delimiters.

/// Delimiter byte surrounding a CTCP payload.
pub const CTCP_DELIMITER: char = '\u{1}';

/// Whether a message payload is a CTCP-wrapped control message.
pub fn is_ctcp(payload: &str) -> bool {
    payload.len() >= 2 && payload.starts_with(CTCP_DELIMITER) && payload.ends_with(CTCP_DELIMITER)
}

/// Strip the CTCP delimiters. Returns `None` for plain chat payloads.
pub fn unwrap_ctcp(payload: &str) -> Option<&str> {
    if !is_ctcp(payload) {
        return None;
    }
    let inner = &payload[1..payload.len() - 1];
    Some(inner)
}

/// Wrap a control message in CTCP delimiters.
pub fn wrap_ctcp(command: &str) -> String {
    format!("{CTCP_DELIMITER}{command}{CTCP_DELIMITER}")
}
