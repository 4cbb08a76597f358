//! Credential sanitization: a small state machine over an error string that
//! elides the substring between known key prefixes and the next delimiter,
//! so publish error messages surfaced to clients never carry secrets.

const KEY_PREFIXES: &[&str] = &["Authorization:", "Bearer ", "token=", "api_key=", "X-API-Key:"];
const DELIMITERS: &[char] = &[' ', '&', '\n', '\t', ','];
const REDACTED: &str = "[REDACTED]";

/// Elide any substring following a known credential-key prefix up to the
/// next delimiter (or end of string).
#[must_use]
pub fn sanitize(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    'outer: while !rest.is_empty() {
        for prefix in KEY_PREFIXES {
            if let Some(after_prefix) = rest.strip_prefix(*prefix) {
                output.push_str(prefix);
                let end = after_prefix
                    .find(DELIMITERS)
                    .unwrap_or(after_prefix.len());
                output.push_str(REDACTED);
                rest = &after_prefix[end..];
                continue 'outer;
            }
        }
        // No prefix matched at the current position: copy one char and advance.
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            output.push(c);
        }
        rest = chars.as_str();
    }

    output
}
