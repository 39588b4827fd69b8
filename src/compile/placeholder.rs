//! Bracketed placeholder scanner for model-written SQL.
//!
//! Custom field expressions reference other fields as `[author.name]` and
//! custom joins reference collections as `[company]`. A placeholder is a
//! non-empty run of `[A-Za-z0-9_.]` between square brackets; any other
//! bracketed text is left alone.

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Byte ranges `(start, end)` of each placeholder, brackets included.
fn spans(template: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut rest = 0;
    while let Some(open) = template[rest..].find('[').map(|i| rest + i) {
        let body_start = open + 1;
        let body_len = template[body_start..]
            .find(|c: char| !is_token_char(c))
            .unwrap_or(template.len() - body_start);
        let close = body_start + body_len;
        if body_len > 0 && template[close..].starts_with(']') {
            spans.push((open, close + 1));
            rest = close + 1;
        } else {
            rest = body_start;
        }
    }
    spans
}

/// The placeholder names in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    spans(template)
        .into_iter()
        .map(|(start, end)| &template[start + 1..end - 1])
        .collect()
}

/// Replace every placeholder with what `resolve` returns for its name.
///
/// The first resolver error aborts the substitution.
pub fn substitute_placeholders<E>(
    template: &str,
    mut resolve: impl FnMut(&str) -> Result<String, E>,
) -> Result<String, E> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for (start, end) in spans(template) {
        out.push_str(&template[last..start]);
        out.push_str(&resolve(&template[start + 1..end - 1])?);
        last = end;
    }
    out.push_str(&template[last..]);
    Ok(out)
}
