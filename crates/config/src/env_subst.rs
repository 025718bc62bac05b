/// Expand `${VAR}` and `${VAR:-fallback}` placeholders in raw config text.
///
/// Unset variables without a fallback are left untouched so the parse error
/// (or the literal value) points at the missing variable.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated placeholder: keep the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };

        let body = &after[..end];
        let (name, fallback) = match body.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (body, None),
        };

        match (lookup(name), fallback) {
            (Some(value), _) if !name.is_empty() => out.push_str(&value),
            (None, Some(fallback)) if !name.is_empty() => out.push_str(fallback),
            _ => {
                out.push_str("${");
                out.push_str(body);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}
