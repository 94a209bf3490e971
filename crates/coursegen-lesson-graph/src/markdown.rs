//! The `##`-section model used throughout the lesson graph. Intentionally
//! a hand-written splitter rather than a full markdown AST: the only
//! structural unit the graph cares about is the level-2 heading, and
//! re-serialization must reproduce the source byte-for-byte outside the
//! section(s) touched.

use coursegen_types::LessonSpec;

use crate::error::LessonGraphError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownSection {
    pub id: String,
    pub heading: String,
    heading_line: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMarkdown {
    pub preamble: String,
    pub sections: Vec<MarkdownSection>,
}

impl ParsedMarkdown {
    pub fn section(&self, id: &str) -> Option<&MarkdownSection> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn reserialize(&self) -> String {
        let mut out = self.preamble.clone();
        for section in &self.sections {
            out.push_str(&section.heading_line);
            out.push_str(&section.body);
        }
        out
    }

    /// Replaces the body of section `id` and reserializes, leaving every
    /// other section's heading and body byte-identical.
    pub fn with_section_body(
        &self,
        id: &str,
        new_body: impl Into<String>,
    ) -> Result<String, LessonGraphError> {
        if !self.sections.iter().any(|s| s.id == id) {
            return Err(LessonGraphError::MalformedMarkdown(format!(
                "no section with id {id}"
            )));
        }
        let new_body = new_body.into();
        let mut out = self.preamble.clone();
        for section in &self.sections {
            out.push_str(&section.heading_line);
            if section.id == id {
                out.push_str(&new_body);
            } else {
                out.push_str(&section.body);
            }
        }
        Ok(out)
    }
}

/// Splits on lines starting with exactly `## ` (not `### ` or deeper).
/// When `lesson_spec` is given and its section count matches the number
/// of headings found, ids are taken positionally from
/// `lesson_spec.sections[i].section_id` so downstream executors address
/// the same ids the spec assigned; otherwise ids fall back to a slug of
/// the heading text.
pub fn split_sections(markdown: &str, lesson_spec: Option<&LessonSpec>) -> ParsedMarkdown {
    let mut preamble = String::new();
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in markdown.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n');
        if trimmed.starts_with("## ") && !trimmed.starts_with("###") {
            if let Some(finished) = current.take() {
                sections.push(finished);
            }
            current = Some((line.to_string(), String::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push_str(line);
        } else {
            preamble.push_str(line);
        }
    }
    if let Some(finished) = current.take() {
        sections.push(finished);
    }

    let use_spec_ids = lesson_spec.is_some_and(|spec| spec.sections.len() == sections.len());

    let sections = sections
        .into_iter()
        .enumerate()
        .map(|(i, (heading_line, body))| {
            let heading = heading_line
                .trim_start_matches("## ")
                .trim_end_matches('\n')
                .trim()
                .to_string();
            let id = if use_spec_ids {
                lesson_spec.unwrap().sections[i].section_id.clone()
            } else {
                slugify(&heading)
            };
            MarkdownSection {
                id,
                heading,
                heading_line,
                body,
            }
        })
        .collect();

    ParsedMarkdown { preamble, sections }
}

fn slugify(heading: &str) -> String {
    let slug: String = heading
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    format!("sec_{slug}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Borrowing\n\nIntro text.\n\n## Ownership\n\nBody one.\n\n## Borrowing rules\n\nBody two.\n";

    #[test]
    fn splits_into_preamble_and_sections_preserving_bytes() {
        let parsed = split_sections(SAMPLE, None);
        assert_eq!(parsed.preamble, "# Borrowing\n\nIntro text.\n\n");
        assert_eq!(parsed.sections.len(), 2);
        assert_eq!(parsed.sections[0].id, "sec_ownership");
        assert_eq!(parsed.sections[1].heading, "Borrowing rules");
        assert_eq!(parsed.reserialize(), SAMPLE);
    }

    #[test]
    fn with_section_body_preserves_other_sections_and_order() {
        let parsed = split_sections(SAMPLE, None);
        let updated = parsed.with_section_body("sec_ownership", "\n\nRewritten body.\n\n").unwrap();
        let reparsed = split_sections(&updated, None);

        assert_eq!(reparsed.sections.len(), 2);
        assert_eq!(reparsed.sections[0].heading, "Ownership");
        assert_eq!(reparsed.sections[0].body, "\n\nRewritten body.\n\n");
        assert_eq!(reparsed.sections[1].body, parsed.sections[1].body);
        assert_eq!(parsed.preamble, reparsed.preamble);
    }

    #[test]
    fn unknown_section_id_is_rejected() {
        let parsed = split_sections(SAMPLE, None);
        assert!(parsed.with_section_body("sec_missing", "x").is_err());
    }

    #[test]
    fn triple_hash_headings_do_not_start_a_new_section() {
        let md = "## One\n\nbody\n\n### nested\n\nmore body\n";
        let parsed = split_sections(md, None);
        assert_eq!(parsed.sections.len(), 1);
        assert!(parsed.sections[0].body.contains("### nested"));
    }
}
