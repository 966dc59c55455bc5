mod markup;
mod sections;

pub use markup::normalize_markup;
pub use sections::{parse_sections, render_sections, title_hint, Section, BULLET, SECTION_MARKER};
