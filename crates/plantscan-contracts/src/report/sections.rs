use serde::{Deserialize, Serialize};

pub const SECTION_MARKER: &str = "###";
pub const BULLET: char = '•';

const TITLE_HINT_MAX_CHARS: usize = 30;
const FALLBACK_TITLE: &str = "Scan Result";

/// One named block of an identification report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub header: String,
    pub body: String,
}

impl Section {
    pub fn is_headerless(&self) -> bool {
        self.header.is_empty()
    }
}

/// Splits model text into ordered sections on `###` header lines.
///
/// Text without any header marker (the older numbered-list answer format)
/// yields a single headerless section carrying the whole text. Every body,
/// headerless or not, has residual `*` turned into bullets. Duplicate
/// headers are kept as separate sections.
pub fn parse_sections(raw_text: &str) -> Vec<Section> {
    let trimmed = raw_text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let Some(chunks) = split_on_markers(trimmed) else {
        return vec![Section {
            header: String::new(),
            body: bulleted(trimmed),
        }];
    };
    chunks
        .iter()
        .filter_map(|chunk| section_from_chunk(chunk))
        .collect()
}

/// Rebuilds marker text from sections; `parse_sections` maps it back to the
/// same sections.
pub fn render_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|section| {
            if section.is_headerless() {
                return section.body.clone();
            }
            if section.body.is_empty() {
                return format!("{SECTION_MARKER} {}", section.header);
            }
            format!("{SECTION_MARKER} {}\n{}", section.header, section.body)
        })
        .collect::<Vec<String>>()
        .join("\n")
}

/// Short display name for a report, preferring the common name.
pub fn title_hint(sections: &[Section]) -> String {
    let common_name = sections
        .iter()
        .find(|section| section.header.starts_with("COMMON NAME"))
        .and_then(|section| section.body.lines().map(str::trim).find(|line| !line.is_empty()));
    let candidate = common_name
        .or_else(|| {
            sections
                .iter()
                .find(|section| !section.is_headerless())
                .map(|section| section.header.as_str())
        })
        .or_else(|| {
            sections
                .first()
                .and_then(|section| section.body.lines().next())
                .map(str::trim)
        })
        .unwrap_or_default();
    if candidate.is_empty() {
        return FALLBACK_TITLE.to_string();
    }
    candidate.chars().take(TITLE_HINT_MAX_CHARS).collect()
}

fn bulleted(body: &str) -> String {
    body.replace('*', &BULLET.to_string())
}

fn marker_rest(line: &str) -> Option<&str> {
    line.trim_start()
        .strip_prefix(SECTION_MARKER)
        .map(|rest| rest.trim_start_matches('#'))
}

fn split_on_markers(text: &str) -> Option<Vec<String>> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut saw_marker = false;
    for line in text.lines() {
        if let Some(rest) = marker_rest(line) {
            saw_marker = true;
            chunks.push(std::mem::take(&mut current));
            current.push_str(rest);
        } else {
            current.push('\n');
            current.push_str(line);
        }
    }
    chunks.push(current);
    saw_marker.then_some(chunks)
}

fn section_from_chunk(chunk: &str) -> Option<Section> {
    let chunk = chunk.trim();
    if chunk.is_empty() {
        return None;
    }
    let (header, body) = chunk.split_once('\n').unwrap_or((chunk, ""));
    Some(Section {
        header: header.trim().to_uppercase(),
        body: bulleted(body.trim()),
    })
}
