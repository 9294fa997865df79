//! Reversible key escaping
//!
//! Keys may contain the path separator, NUL, or the escape marker itself.
//! Each of these is replaced by the marker followed by two hex digits so
//! the result is usable as a single path component.

/// Marker that introduces an escape sequence
pub const ESCAPE_MARKER: char = '=';

const ESCAPES: [(char, &str); 3] = [('=', "=3D"), ('/', "=2F"), ('\0', "=00")];

/// Escape `/`, `=` and NUL in `key`
pub fn escape(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        match ESCAPES.iter().find(|(raw, _)| *raw == c) {
            Some((_, seq)) => out.push_str(seq),
            None => out.push(c),
        }
    }
    out
}

/// Reverse [`escape`]
///
/// Decodes in a single left-to-right pass so an escaped marker can never
/// combine with the following characters into another sequence. A marker
/// that does not start a known sequence is kept as is.
pub fn unescape(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut rest = token;

    while let Some(pos) = rest.find(ESCAPE_MARKER) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match ESCAPES.iter().find(|(_, seq)| tail.starts_with(seq)) {
            Some((raw, seq)) => {
                out.push(*raw);
                rest = &tail[seq.len()..];
            }
            None => {
                out.push(ESCAPE_MARKER);
                rest = &tail[ESCAPE_MARKER.len_utf8()..];
            }
        }
    }
    out.push_str(rest);
    out
}
