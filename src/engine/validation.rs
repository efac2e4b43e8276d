// Identifier validation for container spec ids

/// Whether `candidate` is usable as a container id.
///
/// Container ids end up as identifiers on execution servers, so they follow
/// identifier rules: non-empty, first character a letter, `_` or `$`, the
/// rest letters, digits, `_` or `$`.
pub fn is_valid_identifier(candidate: &str) -> bool {
    let mut chars = candidate.chars();

    let Some(first) = chars.next() else {
        return false;
    };
    if !is_identifier_start(first) {
        return false;
    }

    chars.all(is_identifier_part)
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
