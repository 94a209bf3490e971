//! The Judge node: an LLM call that grades the
//! lesson against the closed criteria set and either accepts it or
//! returns a list of `TargetedIssue`s. The judge never mutates content.

use std::collections::HashMap;

use coursegen_llm::{CompletionRequest, ResponseFormat};
use coursegen_types::{Criterion, LessonSpec, TargetedIssue};
use serde::Deserialize;

use crate::error::LessonGraphError;
use crate::ports::Completions;

#[derive(Debug, Clone)]
pub struct JudgeVerdict {
    pub scores: HashMap<Criterion, f32>,
    pub overall_score: f32,
    pub accept: bool,
    pub issues: Vec<TargetedIssue>,
    pub tokens_used: u32,
    pub duration_ms: u64,
}

const CRITERIA: &[Criterion] = &[
    Criterion::PedagogicalStructure,
    Criterion::FactualAccuracy,
    Criterion::ClarityReadability,
    Criterion::Completeness,
    Criterion::LearningObjectiveAlignment,
    Criterion::EngagementExamples,
];

#[derive(Debug, Deserialize)]
struct JudgePayload {
    scores: HashMap<String, f32>,
    #[serde(default)]
    issues: Vec<JudgeIssuePayload>,
}

#[derive(Debug, Deserialize)]
struct JudgeIssuePayload {
    criterion: String,
    severity: String,
    location: String,
    description: String,
    suggested_fix: String,
    target_section_id: String,
}

fn parse_criterion(s: &str) -> Option<Criterion> {
    CRITERIA.iter().copied().find(|c| criterion_wire_name(*c) == s)
}

fn criterion_wire_name(c: Criterion) -> &'static str {
    match c {
        Criterion::PedagogicalStructure => "pedagogical_structure",
        Criterion::FactualAccuracy => "factual_accuracy",
        Criterion::ClarityReadability => "clarity_readability",
        Criterion::Completeness => "completeness",
        Criterion::LearningObjectiveAlignment => "learning_objective_alignment",
        Criterion::EngagementExamples => "engagement_examples",
    }
}

fn parse_severity(s: &str) -> coursegen_types::Severity {
    use coursegen_types::Severity;
    match s {
        "critical" => Severity::Critical,
        "major" => Severity::Major,
        _ => Severity::Minor,
    }
}

pub async fn run_judge(
    llm: &dyn Completions,
    lesson_spec: &LessonSpec,
    content: &str,
    acceptance_threshold: f32,
) -> Result<JudgeVerdict, LessonGraphError> {
    let criteria_list = CRITERIA.iter().map(|c| criterion_wire_name(*c)).collect::<Vec<_>>().join(", ");
    let schema = serde_json::json!({
        "type": "object",
        "properties": {
            "scores": {"type": "object"},
            "issues": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "criterion": {"type": "string"},
                        "severity": {"type": "string", "enum": ["minor", "major", "critical"]},
                        "location": {"type": "string"},
                        "description": {"type": "string"},
                        "suggested_fix": {"type": "string"},
                        "target_section_id": {"type": "string"}
                    },
                    "required": ["criterion", "severity", "location", "description", "target_section_id"]
                }
            }
        },
        "required": ["scores"]
    });

    let system = format!(
        "You are grading a lesson against these criteria, each scored 0.0-1.0: {criteria_list}. \
         Return a score per criterion and, for every deficiency you find, an issue entry naming \
         the violated criterion, its severity, and the section it belongs to. You never rewrite \
         content yourself."
    );

    let request = CompletionRequest {
        response_format: ResponseFormat::JsonSchema(schema),
        max_tokens: 2048,
        temperature: 0.0,
        ..CompletionRequest::new(system, format!("Lesson title: {}\n\n{content}", lesson_spec.title))
    };

    let response = llm.complete_with_escalation(&request).await?;
    let payload: JudgePayload = serde_json::from_str(&response.text)
        .map_err(|e| LessonGraphError::MalformedMarkdown(format!("judge response: {e}")))?;

    let scores: HashMap<Criterion, f32> = payload
        .scores
        .into_iter()
        .filter_map(|(k, v)| parse_criterion(&k).map(|c| (c, v)))
        .collect();

    let overall_score = if scores.is_empty() {
        0.0
    } else {
        scores.values().sum::<f32>() / scores.len() as f32
    };

    let issues: Vec<TargetedIssue> = payload
        .issues
        .into_iter()
        .enumerate()
        .filter_map(|(i, issue)| {
            parse_criterion(&issue.criterion).map(|criterion| TargetedIssue {
                id: format!("judge-{i}"),
                criterion,
                severity: parse_severity(&issue.severity),
                location: issue.location,
                description: issue.description,
                suggested_fix: issue.suggested_fix,
                target_section_id: issue.target_section_id,
                fix_action: coursegen_types::FixAction::SurgicalEdit,
                context: coursegen_types::refinement::ContextWindow {
                    scope: "section".to_string(),
                    start_quote: String::new(),
                    end_quote: String::new(),
                },
                fix_instructions: String::new(),
            })
        })
        .collect();

    let accept = overall_score >= acceptance_threshold && issues.is_empty();

    Ok(JudgeVerdict {
        scores,
        overall_score,
        accept,
        issues,
        tokens_used: response.tokens_prompt + response.tokens_completion,
        duration_ms: response.duration_ms,
    })
}
