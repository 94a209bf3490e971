//! The Self-Review node's cheap deterministic pre-filter, plus the
//! optional LLM pass that only runs when the heuristics alone found
//! nothing wrong (facts can't be checked without a model).

use std::collections::HashMap;

use coursegen_llm::{CompletionRequest, ResponseFormat};
use coursegen_types::Severity;
use serde::Deserialize;

use crate::error::LessonGraphError;
use crate::linter::MarkdownLinter;
use crate::markdown::ParsedMarkdown;
use crate::ports::Completions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    Pass,
    PassWithFlags,
    Fixed,
    Regenerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    Language,
    Truncation,
    Hygiene,
    Structure,
    Facts,
}

#[derive(Debug, Clone)]
pub struct ReviewIssue {
    pub issue_type: IssueType,
    pub severity: Severity,
    pub location: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct HeuristicDetails {
    pub foreign_script_chars: u32,
    pub per_section_foreign_ratio: HashMap<String, f32>,
    pub fences_balanced: bool,
    pub hygiene_autofixed: bool,
    pub structure_issue_count: usize,
}

#[derive(Debug, Clone)]
pub struct SelfReviewResult {
    pub status: ReviewStatus,
    pub issues: Vec<ReviewIssue>,
    pub sections_to_regenerate: Vec<String>,
    pub heuristics_passed: bool,
    pub patched_content: Option<String>,
    pub tokens_used: u32,
    pub duration_ms: u64,
    pub heuristic_details: HeuristicDetails,
}

/// Per-section ratio above which foreign-script content triggers a
/// targeted (not whole-lesson) regeneration.
const PER_SECTION_RATIO_THRESHOLD: f32 = 0.05;
/// Absolute count of foreign-script characters, anywhere in the lesson,
/// above which the whole lesson is regenerated rather than one section.
const CRITICAL_FOREIGN_CHAR_THRESHOLD: u32 = 10;

const CHATBOT_ARTIFACTS: &[&str] = &[
    "sure, here is",
    "sure, here's",
    "as an ai language model",
    "i hope this helps",
    "certainly! here",
    "i'd be happy to",
];

fn is_cjk(c: char) -> bool {
    matches!(c as u32, 0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x3400..=0x4DBF)
}

fn is_cyrillic(c: char) -> bool {
    matches!(c as u32, 0x0400..=0x04FF)
}

fn target_is_cjk(target_language: &str) -> bool {
    matches!(
        target_language.to_lowercase().as_str(),
        "zh" | "chinese" | "ja" | "japanese" | "ko" | "korean"
    )
}

/// Fraction of non-whitespace characters in a foreign script relative to
/// the target language, per section, plus the lesson-wide absolute count.
fn language_check(
    parsed: &ParsedMarkdown,
    target_language: &str,
) -> (Vec<ReviewIssue>, Vec<String>, u32, HashMap<String, f32>) {
    let mut issues = Vec::new();
    let mut sections_to_regenerate = Vec::new();
    let mut total_foreign = 0u32;
    let mut per_section = HashMap::new();
    let cjk_is_target = target_is_cjk(target_language);

    for section in &parsed.sections {
        let mut foreign = 0u32;
        let mut total_chars = 0u32;
        for c in section.body.chars() {
            if c.is_whitespace() {
                continue;
            }
            total_chars += 1;
            let is_foreign = if cjk_is_target { is_cyrillic(c) } else { is_cjk(c) };
            if is_foreign {
                foreign += 1;
            }
        }
        total_foreign += foreign;
        let ratio = if total_chars > 0 { foreign as f32 / total_chars as f32 } else { 0.0 };
        per_section.insert(section.id.clone(), ratio);

        if foreign > 0 && ratio > PER_SECTION_RATIO_THRESHOLD {
            sections_to_regenerate.push(section.id.clone());
            issues.push(ReviewIssue {
                issue_type: IssueType::Language,
                severity: Severity::Major,
                location: section.id.clone(),
                description: format!(
                    "{foreign} foreign-script characters, {:.1}% of the section",
                    ratio * 100.0
                ),
            });
        }
    }

    if total_foreign >= CRITICAL_FOREIGN_CHAR_THRESHOLD {
        issues.push(ReviewIssue {
            issue_type: IssueType::Language,
            severity: Severity::Critical,
            location: "lesson".to_string(),
            description: format!(
                "{total_foreign} foreign-script characters across the lesson, at or above the critical threshold"
            ),
        });
    }

    (issues, sections_to_regenerate, total_foreign, per_section)
}

fn truncation_check(parsed: &ParsedMarkdown, full_content: &str) -> Vec<ReviewIssue> {
    let mut issues = Vec::new();
    let trimmed = full_content.trim_end();

    if trimmed.ends_with('\u{2026}') || trimmed.ends_with("...") {
        issues.push(ReviewIssue {
            issue_type: IssueType::Truncation,
            severity: Severity::Critical,
            location: "lesson".into(),
            description: "content ends with an ellipsis, suggesting truncation".into(),
        });
    } else if !trimmed.is_empty() && !trimmed.ends_with(['.', '!', '?', '"', ')', '`']) {
        issues.push(ReviewIssue {
            issue_type: IssueType::Truncation,
            severity: Severity::Major,
            location: "lesson".into(),
            description: "final sentence does not end in a terminator".into(),
        });
    }

    if full_content.matches("```").count() % 2 != 0 {
        issues.push(ReviewIssue {
            issue_type: IssueType::Truncation,
            severity: Severity::Critical,
            location: "lesson".into(),
            description: "a fenced code block is never closed".into(),
        });
    }

    if let Some(last) = parsed.sections.last() {
        if last.body.trim().is_empty() {
            issues.push(ReviewIssue {
                issue_type: IssueType::Truncation,
                severity: Severity::Major,
                location: last.id.clone(),
                description: "last heading has an empty body".into(),
            });
        }
    }

    issues
}

/// Returns the autofixed content only when an artifact phrase was found;
/// re-running on already-stripped content finds nothing and returns
/// `None`, which is what makes the autofix idempotent.
fn hygiene_check(content: &str) -> (Vec<ReviewIssue>, Option<String>) {
    let lower = content.to_lowercase();
    let Some(phrase) = CHATBOT_ARTIFACTS.iter().find(|p| lower.contains(**p)) else {
        return (Vec::new(), None);
    };

    let issue = ReviewIssue {
        issue_type: IssueType::Hygiene,
        severity: Severity::Minor,
        location: "lesson".into(),
        description: format!("chatbot artifact phrase detected: \"{phrase}\""),
    };

    (vec![issue], Some(strip_chatbot_artifacts(content)))
}

fn strip_chatbot_artifacts(content: &str) -> String {
    content
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            !CHATBOT_ARTIFACTS.iter().any(|p| lower.contains(*p))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The deterministic pre-filter: no LLM call, no network, pure function
/// of the already-generated markdown.
pub fn run_heuristics(
    parsed: &ParsedMarkdown,
    full_content: &str,
    target_language: &str,
    linter: &dyn MarkdownLinter,
) -> SelfReviewResult {
    let (mut issues, sections_to_regenerate, foreign_chars, per_section_ratio) =
        language_check(parsed, target_language);
    issues.extend(truncation_check(parsed, full_content));

    let structure_issues = linter.lint(full_content);
    let structure_issue_count = structure_issues.len();
    issues.extend(structure_issues.into_iter().map(|li| ReviewIssue {
        issue_type: IssueType::Structure,
        severity: li.severity,
        location: "lesson".into(),
        description: li.description,
    }));

    let (hygiene_issues, patched_content) = hygiene_check(full_content);
    let hygiene_autofixed = patched_content.is_some();
    issues.extend(hygiene_issues);

    let critical_language = foreign_chars >= CRITICAL_FOREIGN_CHAR_THRESHOLD;
    let other_critical = issues
        .iter()
        .any(|i| i.severity == Severity::Critical && i.issue_type != IssueType::Language);

    let status = if hygiene_autofixed {
        ReviewStatus::Fixed
    } else if critical_language || other_critical {
        ReviewStatus::Regenerate
    } else if !sections_to_regenerate.is_empty() || !issues.is_empty() {
        ReviewStatus::PassWithFlags
    } else {
        ReviewStatus::Pass
    };

    SelfReviewResult {
        heuristics_passed: status == ReviewStatus::Pass,
        status,
        issues,
        sections_to_regenerate,
        patched_content,
        tokens_used: 0,
        duration_ms: 0,
        heuristic_details: HeuristicDetails {
            foreign_script_chars: foreign_chars,
            per_section_foreign_ratio: per_section_ratio,
            fences_balanced: full_content.matches("```").count() % 2 == 0,
            hygiene_autofixed,
            structure_issue_count,
        },
    }
}

#[derive(Debug, Deserialize)]
struct LlmSelfReviewPayload {
    status: String,
    #[serde(default)]
    issues: Vec<LlmIssuePayload>,
    #[serde(default)]
    sections_to_regenerate: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LlmIssuePayload {
    #[serde(default)]
    location: String,
    #[serde(default)]
    description: String,
}

impl SelfReviewResult {
    fn merge_llm_payload(&mut self, payload: LlmSelfReviewPayload) {
        for issue in payload.issues {
            self.issues.push(ReviewIssue {
                issue_type: IssueType::Facts,
                severity: Severity::Major,
                location: issue.location,
                description: issue.description,
            });
        }
        for id in payload.sections_to_regenerate {
            if !self.sections_to_regenerate.contains(&id) {
                self.sections_to_regenerate.push(id);
            }
        }

        if payload.status == "regenerate" {
            self.status = ReviewStatus::Regenerate;
        } else if !self.sections_to_regenerate.is_empty() {
            self.status = ReviewStatus::PassWithFlags;
        } else if payload.status == "pass_with_flags" {
            self.status = ReviewStatus::PassWithFlags;
        }
    }
}

/// Runs the heuristic pre-filter, then — only if it found nothing
/// actionable — an LLM pass that can catch factual issues the
/// deterministic checks can't.
pub async fn run_self_review(
    llm: &dyn Completions,
    parsed: &ParsedMarkdown,
    full_content: &str,
    target_language: &str,
    linter: &dyn MarkdownLinter,
) -> Result<SelfReviewResult, LessonGraphError> {
    let mut result = run_heuristics(parsed, full_content, target_language, linter);

    if result.status == ReviewStatus::Pass {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "status": {"type": "string", "enum": ["pass", "pass_with_flags", "regenerate"]},
                "issues": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "location": {"type": "string"},
                            "description": {"type": "string"}
                        }
                    }
                },
                "sections_to_regenerate": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["status"]
        });
        let request = CompletionRequest {
            response_format: ResponseFormat::JsonSchema(schema),
            max_tokens: 1024,
            temperature: 0.0,
            ..CompletionRequest::new(
                "You are a meticulous lesson content reviewer. Check only for factual \
                 errors the author may have introduced; the structure and language have \
                 already been checked. Respond only with the requested JSON.",
                full_content.to_string(),
            )
        };

        let response = llm.complete_with_escalation(&request).await?;
        result.tokens_used += response.tokens_prompt + response.tokens_completion;
        result.duration_ms += response.duration_ms;

        if let Ok(payload) = serde_json::from_str::<LlmSelfReviewPayload>(&response.text) {
            result.merge_llm_payload(payload);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linter::DefaultLinter;
    use crate::markdown::split_sections;

    #[test]
    fn clean_cyrillic_content_passes_heuristics() {
        let md = "## Введение\n\nЭто короткий урок о владении данными в Rust.\n";
        let parsed = split_sections(md, None);
        let result = run_heuristics(&parsed, md, "russian", &DefaultLinter);
        assert_eq!(result.status, ReviewStatus::Pass);
        assert!(result.sections_to_regenerate.is_empty());
    }

    #[test]
    fn thirteen_cjk_characters_force_regenerate_or_section_list() {
        let md = "## Раздел\n\n这是一个测试内容十二个汉字。\n\n## Дальше\n\nВалидный кириллический текст здесь.\n";
        let parsed = split_sections(md, None);
        let result = run_heuristics(&parsed, md, "russian", &DefaultLinter);
        assert!(
            result.status == ReviewStatus::Regenerate || !result.sections_to_regenerate.is_empty()
        );
    }

    #[test]
    fn hygiene_autofix_is_idempotent() {
        let md = "## Intro\n\nSure, here is your lesson.\nThe rest is fine.\n";
        let (_, patched) = hygiene_check(md);
        let patched = patched.expect("artifact phrase should be detected");
        let (issues_again, patched_again) = hygiene_check(&patched);
        assert!(issues_again.is_empty());
        assert!(patched_again.is_none());
    }

    #[test]
    fn unterminated_code_fence_is_flagged_critical() {
        let md = "## Example\n\n```rust\nlet x = 1;\n";
        let parsed = split_sections(md, None);
        let result = run_heuristics(&parsed, md, "english", &DefaultLinter);
        assert_eq!(result.status, ReviewStatus::Regenerate);
        assert!(issues_contain(&result, IssueType::Truncation));
    }

    fn issues_contain(result: &SelfReviewResult, issue_type: IssueType) -> bool {
        result.issues.iter().any(|i| i.issue_type == issue_type)
    }
}
