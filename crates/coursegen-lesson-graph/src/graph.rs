//! The driver loop around `state::step`: performs the I/O each
//! `LessonState` implies, translates the result into a `LessonEvent`,
//! and folds the effects `step` returns back into the carried state.

use std::collections::{HashMap, HashSet};

use coursegen_llm::CompletionRequest;
use coursegen_types::lesson_spec::Exercise;
use coursegen_types::{
    Executor, FixAction, LessonSpec, NodeMetric, NodeMetrics, RagChunk, RouterDecision,
    RoutingConfig, SectionRefinementTask, TargetedIssue,
};
use futures::future::join_all;
use tracing::instrument;
use uuid::Uuid;

use crate::batcher::batch_tasks;
use crate::error::LessonGraphError;
use crate::judge::{run_judge, JudgeVerdict};
use crate::linter::MarkdownLinter;
use crate::markdown::{split_sections, ParsedMarkdown};
use crate::ports::Completions;
use crate::router::route_task;
use crate::self_review::{run_self_review, SelfReviewResult};
use crate::state::{step, Effect, GraphLimits, LessonEvent, LessonOutcome, LessonState, StepContext};

const GENERATE_SYSTEM_PROMPT: &str = "You write a single self-contained lesson as markdown. \
Use a `##` heading for each section named in the section breakdown you are given, in order, \
and nothing else at that heading level. Write in the requested target language.";

const REGENERATE_SECTION_SYSTEM_PROMPT: &str = "You rewrite one section of a lesson. Return only \
the section's body prose — no heading line, no surrounding sections.";

/// Full-auto runs the refinement loop unattended; human-in-loop stops
/// after routing so a person can approve the batch before execution
/// (the caller is responsible for the approval step itself — this flag
/// only changes what `LessonGraphRunner` decides not to do on its own).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetedRefinementMode {
    FullAuto,
    HumanInLoop,
}

pub struct LessonContentDraft {
    pub intro: String,
    pub sections: Vec<(String, String)>,
    pub exercises: Vec<Exercise>,
}

pub struct LessonGraphOutcome {
    pub outcome: LessonOutcome,
    pub content: LessonContentDraft,
    pub metrics: NodeMetrics,
    pub quality_score: Option<f32>,
}

/// Everything the graph accumulates across its run. Not `Clone`: this is
/// meant to be owned by one `run()` call, not shared.
pub struct LessonGraphState {
    pub lesson_id: Uuid,
    pub generated_content: Option<String>,
    pub self_review_result: Option<SelfReviewResult>,
    pub errors: Vec<String>,
    pub retry_count: u32,
    pub fixed_loop_used: bool,
    pub model_used: Option<String>,
    pub metrics: NodeMetrics,
    pub temperature: f32,
    pub quality_score: Option<f32>,
    pub judge_verdict: Option<JudgeVerdict>,
    pub judge_recommendation: Option<String>,
    pub needs_human_review: bool,
    pub previous_scores: Vec<f32>,
    pub refinement_iteration_count: u32,
    pub targeted_refinement_mode: TargetedRefinementMode,
    pub locked_sections: HashSet<String>,
    pub section_edit_count: HashMap<String, u32>,
    pub targeted_refinement_tokens_used: u32,
    outcome: Option<LessonOutcome>,
    pending_batches: Vec<Vec<SectionRefinementTask>>,
    pending_decisions: HashMap<String, RouterDecision>,
}

impl LessonGraphState {
    fn new(lesson_id: Uuid) -> Self {
        Self {
            lesson_id,
            generated_content: None,
            self_review_result: None,
            errors: Vec::new(),
            retry_count: 0,
            fixed_loop_used: false,
            model_used: None,
            metrics: NodeMetrics::default(),
            temperature: 0.7,
            quality_score: None,
            judge_verdict: None,
            judge_recommendation: None,
            needs_human_review: false,
            previous_scores: Vec::new(),
            refinement_iteration_count: 0,
            targeted_refinement_mode: TargetedRefinementMode::FullAuto,
            locked_sections: HashSet::new(),
            section_edit_count: HashMap::new(),
            targeted_refinement_tokens_used: 0,
            outcome: None,
            pending_batches: Vec::new(),
            pending_decisions: HashMap::new(),
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::IncrementRetryCount => self.retry_count += 1,
            Effect::MarkFixedLoopUsed => self.fixed_loop_used = true,
            Effect::IncrementRefinementIteration => self.refinement_iteration_count += 1,
            Effect::SetOutcome(outcome) => {
                self.needs_human_review = matches!(outcome, LessonOutcome::ReviewRequired);
                self.outcome = Some(outcome);
            }
        }
    }

    fn step_context(&self) -> StepContext {
        StepContext {
            retry_count: self.retry_count,
            fixed_loop_used: self.fixed_loop_used,
            refinement_iteration_count: self.refinement_iteration_count,
        }
    }

    fn record_llm_node(&mut self, node_name: &str, response: &coursegen_llm::CompletionResponse) {
        self.model_used = Some(response.model_used.clone());
        self.metrics.record(NodeMetric {
            node_name: node_name.to_string(),
            model: response.model_used.clone(),
            input_tokens: response.tokens_prompt,
            output_tokens: response.tokens_completion,
            cost_usd: response.cost_usd,
            duration_ms: response.duration_ms,
            ok: true,
            error_class: None,
        });
    }
}

/// Drives `state::step` to completion, performing the I/O each state
/// implies. Holds no mutable state of its own — everything accumulated
/// across a run lives in the `LessonGraphState` passed through `run()`.
pub struct LessonGraphRunner<'a> {
    llm: &'a dyn Completions,
    linter: &'a dyn MarkdownLinter,
    limits: GraphLimits,
    routing: RoutingConfig,
    max_concurrency: usize,
    adjacent_section_gap: i64,
}

impl<'a> LessonGraphRunner<'a> {
    pub fn new(
        llm: &'a dyn Completions,
        linter: &'a dyn MarkdownLinter,
        limits: GraphLimits,
        routing: RoutingConfig,
        max_concurrency: usize,
        adjacent_section_gap: i64,
    ) -> Self {
        Self {
            llm,
            linter,
            limits,
            routing,
            max_concurrency,
            adjacent_section_gap,
        }
    }

    #[instrument(skip_all, fields(lesson_id = %lesson_spec.lesson_id))]
    pub async fn run(
        &self,
        lesson_spec: &LessonSpec,
        rag_chunks: &HashMap<String, Vec<RagChunk>>,
    ) -> Result<LessonGraphOutcome, LessonGraphError> {
        let mut g = LessonGraphState::new(lesson_spec.lesson_id);
        let mut state = LessonState::Generate;

        loop {
            let event = match state {
                LessonState::Generate => self.node_generate(lesson_spec, rag_chunks, &mut g).await?,
                LessonState::SelfReview => self.node_self_review(lesson_spec, &mut g).await?,
                LessonState::RegenerateSections => {
                    self.node_regenerate_sections(lesson_spec, rag_chunks, &mut g).await?
                }
                LessonState::Judge => self.node_judge(lesson_spec, &mut g).await?,
                LessonState::RouteAndBatch => self.node_route_and_batch(&mut g),
                LessonState::ExecuteTasks => {
                    self.node_execute_tasks(lesson_spec, rag_chunks, &mut g).await?
                }
                LessonState::Done => break,
            };

            let (next, effects) = step(state, event, g.step_context(), &self.limits);
            for effect in effects {
                g.apply(effect);
            }
            state = next;
        }

        self.node_finalize(lesson_spec, g)
    }

    async fn node_generate(
        &self,
        lesson_spec: &LessonSpec,
        rag_chunks: &HashMap<String, Vec<RagChunk>>,
        g: &mut LessonGraphState,
    ) -> Result<LessonEvent, LessonGraphError> {
        let request = CompletionRequest {
            temperature: g.temperature,
            max_tokens: 4096,
            ..CompletionRequest::new(GENERATE_SYSTEM_PROMPT, build_generate_prompt(lesson_spec, rag_chunks))
        };
        let response = self.llm.complete_with_escalation(&request).await?;
        g.record_llm_node("generate", &response);
        g.generated_content = Some(response.text);
        Ok(LessonEvent::Generated)
    }

    async fn node_self_review(
        &self,
        lesson_spec: &LessonSpec,
        g: &mut LessonGraphState,
    ) -> Result<LessonEvent, LessonGraphError> {
        let content = g.generated_content.clone().unwrap_or_default();
        let parsed = split_sections(&content, Some(lesson_spec));
        let result = run_self_review(self.llm, &parsed, &content, &lesson_spec.target_language, self.linter).await?;

        if let Some(patched) = &result.patched_content {
            g.generated_content = Some(patched.clone());
        }

        let event = LessonEvent::SelfReviewed {
            status: result.status,
            sections_to_regenerate: result.sections_to_regenerate.clone(),
        };
        g.self_review_result = Some(result);
        Ok(event)
    }

    async fn node_regenerate_sections(
        &self,
        lesson_spec: &LessonSpec,
        rag_chunks: &HashMap<String, Vec<RagChunk>>,
        g: &mut LessonGraphState,
    ) -> Result<LessonEvent, LessonGraphError> {
        let targets = g
            .self_review_result
            .as_ref()
            .map(|r| r.sections_to_regenerate.clone())
            .unwrap_or_default();

        let mut content = g.generated_content.clone().unwrap_or_default();

        for id in &targets {
            if g.locked_sections.contains(id) {
                continue;
            }
            let parsed = split_sections(&content, Some(lesson_spec));
            let Some(section) = parsed.section(id) else { continue };
            let spec_section = lesson_spec.section(id);
            let prompt = build_section_regenerate_prompt(lesson_spec, spec_section, section, rag_chunks.get(id));
            let request = CompletionRequest {
                temperature: g.temperature,
                max_tokens: 2048,
                ..CompletionRequest::new(REGENERATE_SECTION_SYSTEM_PROMPT, prompt)
            };
            let response = self.llm.complete_with_escalation(&request).await?;
            g.record_llm_node("regenerate_section", &response);
            content = parsed.with_section_body(id, format!("\n\n{}\n\n", response.text.trim()))?;
            *g.section_edit_count.entry(id.clone()).or_insert(0) += 1;
        }

        g.generated_content = Some(content);
        Ok(LessonEvent::SectionsRegenerated)
    }

    async fn node_judge(
        &self,
        lesson_spec: &LessonSpec,
        g: &mut LessonGraphState,
    ) -> Result<LessonEvent, LessonGraphError> {
        let content = g.generated_content.clone().unwrap_or_default();
        let verdict = run_judge(self.llm, lesson_spec, &content, self.limits.acceptance_threshold).await?;

        g.metrics.record(NodeMetric {
            node_name: "judge".to_string(),
            model: g.model_used.clone().unwrap_or_default(),
            input_tokens: 0,
            output_tokens: verdict.tokens_used,
            cost_usd: 0.0,
            duration_ms: verdict.duration_ms,
            ok: true,
            error_class: None,
        });

        g.previous_scores.push(verdict.overall_score);
        g.quality_score = Some(verdict.overall_score);
        g.judge_recommendation = Some(if verdict.accept { "accept" } else { "targeted_refine" }.to_string());
        let accept = verdict.accept;
        g.judge_verdict = Some(verdict);
        Ok(LessonEvent::Judged { accept })
    }

    /// Pure bookkeeping — no I/O, so this isn't async.
    fn node_route_and_batch(&self, g: &mut LessonGraphState) -> LessonEvent {
        let issues: Vec<TargetedIssue> = g
            .judge_verdict
            .as_ref()
            .map(|v| v.issues.clone())
            .unwrap_or_default();

        let mut by_section: HashMap<String, Vec<TargetedIssue>> = HashMap::new();
        for issue in issues {
            if g.locked_sections.contains(&issue.target_section_id) {
                continue;
            }
            by_section.entry(issue.target_section_id.clone()).or_default().push(issue);
        }

        let tasks: Vec<SectionRefinementTask> = by_section
            .into_iter()
            .map(|(section_id, source_issues)| SectionRefinementTask {
                section_id,
                source_issues,
                previous_section_tail: None,
                next_section_head: None,
            })
            .collect();

        g.pending_decisions = tasks
            .iter()
            .map(|t| (t.section_id.clone(), route_task(t, &self.routing)))
            .collect();

        let batch_count = tasks.len();
        g.pending_batches = batch_tasks(tasks, self.max_concurrency, self.adjacent_section_gap);
        LessonEvent::Batched { batch_count }
    }

    async fn node_execute_tasks(
        &self,
        lesson_spec: &LessonSpec,
        rag_chunks: &HashMap<String, Vec<RagChunk>>,
        g: &mut LessonGraphState,
    ) -> Result<LessonEvent, LessonGraphError> {
        let batches = std::mem::take(&mut g.pending_batches);
        let decisions = g.pending_decisions.clone();
        let mut content = g.generated_content.clone().unwrap_or_default();

        'batches: for batch in batches {
            // A full regeneration supersedes every other task this
            // iteration: there is no longer a single section to merge
            // the rest of the batch's edits into.
            if let Some(task) = batch
                .iter()
                .find(|t| matches!(decisions.get(&t.section_id).map(|d| d.action), Some(FixAction::FullRegenerate)))
            {
                let prompt = build_planner_prompt(lesson_spec, task);
                let request = CompletionRequest {
                    max_tokens: 6000,
                    ..CompletionRequest::new(executor_system_prompt(Executor::Planner), prompt)
                };
                let response = self.llm.complete_with_escalation(&request).await?;
                let tokens = response.tokens_prompt + response.tokens_completion;
                g.targeted_refinement_tokens_used += tokens;
                if g.targeted_refinement_tokens_used > self.routing.token_budget {
                    return Err(LessonGraphError::BudgetExceeded {
                        used: g.targeted_refinement_tokens_used,
                        budget: self.routing.token_budget,
                    });
                }
                content = response.text;
                continue 'batches;
            }

            let parsed = split_sections(&content, Some(lesson_spec));
            let results = join_all(batch.iter().map(|task| {
                let decision = decisions.get(&task.section_id).cloned();
                self.execute_task(lesson_spec, rag_chunks, &parsed, task, decision)
            }))
            .await;

            for result in results {
                let (section_id, new_body, tokens) = result?;
                g.targeted_refinement_tokens_used += tokens;
                if g.targeted_refinement_tokens_used > self.routing.token_budget {
                    return Err(LessonGraphError::BudgetExceeded {
                        used: g.targeted_refinement_tokens_used,
                        budget: self.routing.token_budget,
                    });
                }
                let reparsed = split_sections(&content, Some(lesson_spec));
                content = reparsed.with_section_body(&section_id, new_body)?;
                *g.section_edit_count.entry(section_id).or_insert(0) += 1;
            }
        }

        g.generated_content = Some(content);
        Ok(LessonEvent::TasksExecuted)
    }

    async fn execute_task(
        &self,
        lesson_spec: &LessonSpec,
        rag_chunks: &HashMap<String, Vec<RagChunk>>,
        parsed: &ParsedMarkdown,
        task: &SectionRefinementTask,
        decision: Option<RouterDecision>,
    ) -> Result<(String, String, u32), LessonGraphError> {
        let executor = decision.map(|d| d.executor).unwrap_or(Executor::Patcher);
        let section = parsed.section(&task.section_id);
        let prompt = match executor {
            Executor::Patcher => build_patcher_prompt(task, section),
            Executor::SectionExpander => {
                build_section_expander_prompt(lesson_spec, task, section, rag_chunks.get(&task.section_id))
            }
            // Reached only if a router decision says `Planner` for a
            // task that didn't trip the full-regenerate branch above;
            // treat it the same as a section expansion rather than
            // silently dropping the task.
            Executor::Planner => build_section_expander_prompt(lesson_spec, task, section, rag_chunks.get(&task.section_id)),
        };

        let request = CompletionRequest {
            max_tokens: 3072,
            ..CompletionRequest::new(executor_system_prompt(executor), prompt)
        };
        let response = self.llm.complete_with_escalation(&request).await?;
        let tokens = response.tokens_prompt + response.tokens_completion;

        Ok((task.section_id.clone(), format!("\n\n{}\n\n", response.text.trim()), tokens))
    }

    fn node_finalize(
        &self,
        lesson_spec: &LessonSpec,
        g: LessonGraphState,
    ) -> Result<LessonGraphOutcome, LessonGraphError> {
        let outcome = g.outcome.unwrap_or(LessonOutcome::ReviewRequired);
        let content = g.generated_content.unwrap_or_default();
        let parsed = split_sections(&content, Some(lesson_spec));

        let sections = parsed
            .sections
            .iter()
            .map(|s| (s.heading.clone(), s.body.trim().to_string()))
            .collect();

        Ok(LessonGraphOutcome {
            outcome,
            content: LessonContentDraft {
                intro: parsed.preamble.trim().to_string(),
                sections,
                exercises: lesson_spec.exercises.clone(),
            },
            metrics: g.metrics,
            quality_score: g.quality_score,
        })
    }
}

fn executor_system_prompt(executor: Executor) -> &'static str {
    match executor {
        Executor::Patcher => {
            "You make a minimal surgical edit to fix the issue described. Return only the \
             corrected section body, keeping everything else about it unchanged."
        }
        Executor::SectionExpander => {
            "You rewrite one lesson section to resolve the issues described, grounded in the \
             retrieved context you are given. Return only the section body."
        }
        Executor::Planner => {
            "You regenerate an entire lesson from scratch because a structural issue makes a \
             partial fix unsafe. Return the complete lesson as markdown with one `##` heading \
             per section breakdown entry, in order."
        }
    }
}

fn build_generate_prompt(lesson_spec: &LessonSpec, rag_chunks: &HashMap<String, Vec<RagChunk>>) -> String {
    let mut out = format!(
        "Title: {}\nAudience: {}\nTone: {}\nTarget language: {}\n\nHook: {}\nContext: {}\n\nObjectives:\n",
        lesson_spec.title,
        lesson_spec.metadata.audience,
        lesson_spec.metadata.tone,
        lesson_spec.target_language,
        lesson_spec.intro.hook,
        lesson_spec.intro.context,
    );
    for obj in &lesson_spec.objectives {
        out.push_str(&format!("- [{:?}] {}\n", obj.bloom_level, obj.statement));
    }

    out.push_str("\nSections:\n");
    for section in &lesson_spec.sections {
        out.push_str(&format!(
            "\n### {} ({}, depth {})\nKey points: {}\nRequired keywords: {}\n",
            section.section_id,
            section.archetype,
            section.depth,
            section.key_points.join("; "),
            section.required_keywords.join(", "),
        ));
        if let Some(chunks) = rag_chunks.get(&section.section_id) {
            out.push_str("Retrieved context:\n");
            for chunk in chunks.iter().take(section.expected_chunks) {
                out.push_str(&format!("- {}\n", chunk.content));
            }
        }
    }

    out
}

fn build_section_regenerate_prompt(
    lesson_spec: &LessonSpec,
    spec_section: Option<&coursegen_types::SectionBreakdown>,
    current: &crate::markdown::MarkdownSection,
    chunks: Option<&Vec<RagChunk>>,
) -> String {
    let mut out = format!(
        "Lesson: {}\nTarget language: {}\nSection heading: {}\n\nCurrent body:\n{}\n",
        lesson_spec.title, lesson_spec.target_language, current.heading, current.body
    );
    if let Some(section) = spec_section {
        out.push_str(&format!("\nKey points: {}\n", section.key_points.join("; ")));
        out.push_str(&format!("Required keywords: {}\n", section.required_keywords.join(", ")));
    }
    if let Some(chunks) = chunks {
        out.push_str("\nRetrieved context:\n");
        for chunk in chunks {
            out.push_str(&format!("- {}\n", chunk.content));
        }
    }
    out
}

fn build_patcher_prompt(task: &SectionRefinementTask, section: Option<&crate::markdown::MarkdownSection>) -> String {
    let mut out = format!("Section: {}\n", task.section_id);
    if let Some(section) = section {
        out.push_str(&format!("Current body:\n{}\n", section.body));
    }
    out.push_str("\nIssues to fix:\n");
    for issue in &task.source_issues {
        out.push_str(&format!("- [{:?}] {}: {}\n", issue.severity, issue.description, issue.suggested_fix));
    }
    out
}

fn build_section_expander_prompt(
    lesson_spec: &LessonSpec,
    task: &SectionRefinementTask,
    section: Option<&crate::markdown::MarkdownSection>,
    chunks: Option<&Vec<RagChunk>>,
) -> String {
    let mut out = format!("Lesson: {}\nSection: {}\n", lesson_spec.title, task.section_id);
    if let Some(section) = section {
        out.push_str(&format!("Current body:\n{}\n", section.body));
    }
    out.push_str("\nIssues to resolve:\n");
    for issue in &task.source_issues {
        out.push_str(&format!("- [{:?}] {}: {}\n", issue.severity, issue.description, issue.suggested_fix));
    }
    if let Some(chunks) = chunks {
        out.push_str("\nRetrieved context:\n");
        for chunk in chunks {
            out.push_str(&format!("- {}\n", chunk.content));
        }
    }
    out
}

fn build_planner_prompt(lesson_spec: &LessonSpec, task: &SectionRefinementTask) -> String {
    let mut out = format!(
        "Lesson: {}\nTarget language: {}\n\nA critical structural issue was found; regenerate the whole lesson.\n",
        lesson_spec.title, lesson_spec.target_language
    );
    out.push_str("Sections, in order:\n");
    for section in &lesson_spec.sections {
        out.push_str(&format!("- {} ({})\n", section.section_id, section.archetype));
    }
    out.push_str("\nTriggering issue:\n");
    for issue in &task.source_issues {
        out.push_str(&format!("- {}\n", issue.description));
    }
    out
}
