use serde::{Deserialize, Serialize};

/// Closed set of judge criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    PedagogicalStructure,
    FactualAccuracy,
    ClarityReadability,
    Completeness,
    LearningObjectiveAlignment,
    EngagementExamples,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    // Ordered so `minor < major < critical`: `priority=minor` sorts first
    // with an ascending sort and last with a descending one, matching
    // whichever the caller needs without a second mapping table.
    Minor,
    Major,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixAction {
    SurgicalEdit,
    RegenerateSection,
    FullRegenerate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextWindow {
    pub scope: String,
    pub start_quote: String,
    pub end_quote: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetedIssue {
    pub id: String,
    pub criterion: Criterion,
    pub severity: Severity,
    pub location: String,
    pub description: String,
    pub suggested_fix: String,
    pub target_section_id: String,
    pub fix_action: FixAction,
    pub context: ContextWindow,
    pub fix_instructions: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Executor {
    Patcher,
    SectionExpander,
    Planner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRefinementTask {
    pub section_id: String,
    pub source_issues: Vec<TargetedIssue>,
    /// Previous section's tail and next section's head, carried so an
    /// executor can keep prose consistent at the boundary it did not
    /// itself regenerate.
    pub previous_section_tail: Option<String>,
    pub next_section_head: Option<String>,
}

impl SectionRefinementTask {
    /// Highest severity among this task's source issues; critical > major
    /// > minor, used by the batcher's priority sort.
    pub fn priority(&self) -> Severity {
        self.source_issues
            .iter()
            .map(|i| i.severity)
            .max()
            .unwrap_or(Severity::Minor)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenCostRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenCosts {
    pub patcher: TokenCostRange,
    pub section_expander: TokenCostRange,
    pub full_regenerate: TokenCostRange,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub token_budget: u32,
    pub max_patcher_calls: u32,
    pub prefer_surgical: bool,
    pub token_costs: TokenCosts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterDecision {
    pub section_id: String,
    pub action: FixAction,
    pub executor: Executor,
    pub estimated_tokens: u32,
    pub reason: &'static str,
}
