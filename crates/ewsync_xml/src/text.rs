//! Text escaping for element content and attribute values.

use crate::error::{XmlError, XmlResult};

/// Escape the five XML entities in element or attribute text.
pub fn escape_text(input: &str) -> String {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len() + 8);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Resolve entity and character references in raw markup text.
///
/// # Errors
///
/// Returns an error for unterminated or unknown references.
pub fn unescape_text(input: &str) -> XmlResult<String> {
    if !input.contains('&') {
        return Ok(input.to_string());
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        let end = tail
            .find(';')
            .ok_or_else(|| XmlError::malformed("unterminated entity reference"))?;
        match &tail[1..end] {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            entity => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                let ch = code.and_then(char::from_u32).ok_or_else(|| {
                    XmlError::malformed(format!("unknown entity reference &{entity};"))
                })?;
                out.push(ch);
            }
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
