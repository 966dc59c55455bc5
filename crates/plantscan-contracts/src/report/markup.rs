use super::SECTION_MARKER;

/// Inline emphasis tokens removed from every line, longest first.
const STRIPPED_TOKENS: &[&str] = &["**", "__", "_"];

/// Normalizes model output once before section parsing.
///
/// Bold and underscore emphasis is removed. Markdown headings of level one or
/// two lose their marker. Headings of level three or deeper become the
/// canonical `### ` section marker. Single `*` characters are left alone;
/// the section parser turns them into bullets.
pub fn normalize_markup(text: &str) -> String {
    text.lines()
        .map(normalize_line)
        .collect::<Vec<String>>()
        .join("\n")
        .trim()
        .to_string()
}

fn normalize_line(line: &str) -> String {
    let mut out = line.to_string();
    for token in STRIPPED_TOKENS {
        out = out.replace(token, "");
    }

    let content = out.trim_start();
    let depth = content.chars().take_while(|ch| *ch == '#').count();
    if depth == 0 {
        return out;
    }
    let rest = &content[depth..];
    if depth >= 3 {
        return format!("{SECTION_MARKER} {}", rest.trim());
    }
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        return rest.trim_start().to_string();
    }
    // `#tag` style text, not a heading.
    out
}
