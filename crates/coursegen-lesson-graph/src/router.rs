//! The Judge & Router decision table. `route_task` is a pure function
//! of its two arguments, which is what makes it deterministic and
//! directly unit-testable.

use coursegen_types::{Criterion, Executor, FixAction, RoutingConfig, RouterDecision, SectionRefinementTask, Severity};

pub fn route_task(task: &SectionRefinementTask, config: &RoutingConfig) -> RouterDecision {
    let issues = &task.source_issues;

    if issues.iter().any(|i| {
        i.severity == Severity::Critical
            && matches!(i.criterion, Criterion::PedagogicalStructure | Criterion::LearningObjectiveAlignment)
    }) {
        return RouterDecision {
            section_id: task.section_id.clone(),
            action: FixAction::FullRegenerate,
            executor: Executor::Planner,
            estimated_tokens: config.token_costs.full_regenerate.max,
            reason: "critical structural or objective-alignment issue requires full regeneration",
        };
    }

    if issues.iter().any(|i| i.criterion == Criterion::FactualAccuracy) {
        return RouterDecision {
            section_id: task.section_id.clone(),
            action: FixAction::RegenerateSection,
            executor: Executor::SectionExpander,
            estimated_tokens: config.token_costs.section_expander.max,
            reason: "factual accuracy issue requires grounded regeneration",
        };
    }

    if issues.len() >= 3 {
        return RouterDecision {
            section_id: task.section_id.clone(),
            action: FixAction::RegenerateSection,
            executor: Executor::SectionExpander,
            estimated_tokens: config.token_costs.section_expander.max,
            reason: "three or more issues exceed surgical-edit scope",
        };
    }

    let minor_or_clarity_only = task.priority() == Severity::Minor
        || (!issues.is_empty()
            && issues
                .iter()
                .all(|i| matches!(i.criterion, Criterion::ClarityReadability | Criterion::EngagementExamples)));
    if minor_or_clarity_only {
        return RouterDecision {
            section_id: task.section_id.clone(),
            action: FixAction::SurgicalEdit,
            executor: Executor::Patcher,
            estimated_tokens: config.token_costs.patcher.max,
            reason: "minor or clarity/engagement-only issues fit a surgical patch",
        };
    }

    if config.prefer_surgical {
        RouterDecision {
            section_id: task.section_id.clone(),
            action: FixAction::SurgicalEdit,
            executor: Executor::Patcher,
            estimated_tokens: config.token_costs.patcher.max,
            reason: "default: caller prefers surgical edits",
        }
    } else {
        RouterDecision {
            section_id: task.section_id.clone(),
            action: FixAction::RegenerateSection,
            executor: Executor::SectionExpander,
            estimated_tokens: config.token_costs.section_expander.max,
            reason: "default: full section regeneration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursegen_types::TargetedIssue;

    fn config(prefer_surgical: bool) -> RoutingConfig {
        use coursegen_types::refinement::{TokenCostRange, TokenCosts};
        RoutingConfig {
            token_budget: 10_000,
            max_patcher_calls: 3,
            prefer_surgical,
            token_costs: TokenCosts {
                patcher: TokenCostRange { min: 100, max: 500 },
                section_expander: TokenCostRange { min: 500, max: 2000 },
                full_regenerate: TokenCostRange { min: 2000, max: 6000 },
            },
        }
    }

    fn issue(criterion: Criterion, severity: Severity) -> TargetedIssue {
        TargetedIssue {
            id: "i1".into(),
            criterion,
            severity,
            location: "p1".into(),
            description: "d".into(),
            suggested_fix: "f".into(),
            target_section_id: "sec_1".into(),
            fix_action: FixAction::SurgicalEdit,
            context: coursegen_types::refinement::ContextWindow {
                scope: "s".into(),
                start_quote: "a".into(),
                end_quote: "b".into(),
            },
            fix_instructions: "do it".into(),
        }
    }

    fn task(issues: Vec<TargetedIssue>) -> SectionRefinementTask {
        SectionRefinementTask {
            section_id: "sec_1".into(),
            source_issues: issues,
            previous_section_tail: None,
            next_section_head: None,
        }
    }

    #[test]
    fn critical_structural_routes_to_full_regenerate() {
        let t = task(vec![issue(Criterion::PedagogicalStructure, Severity::Critical)]);
        let decision = route_task(&t, &config(false));
        assert_eq!(decision.action, FixAction::FullRegenerate);
        assert_eq!(decision.executor, Executor::Planner);
    }

    #[test]
    fn factual_error_overrides_prefer_surgical() {
        let t = task(vec![issue(Criterion::FactualAccuracy, Severity::Major)]);
        let decision = route_task(&t, &config(true));
        assert_eq!(decision.action, FixAction::RegenerateSection);
        assert_eq!(decision.executor, Executor::SectionExpander);
    }

    #[test]
    fn three_minor_clarity_issues_trigger_count_rule() {
        let t = task(vec![
            issue(Criterion::ClarityReadability, Severity::Minor),
            issue(Criterion::ClarityReadability, Severity::Minor),
            issue(Criterion::ClarityReadability, Severity::Minor),
        ]);
        let decision = route_task(&t, &config(true));
        assert_eq!(decision.action, FixAction::RegenerateSection);
        assert_eq!(decision.executor, Executor::SectionExpander);
    }

    #[test]
    fn single_minor_clarity_issue_with_prefer_surgical_is_a_patch() {
        let t = task(vec![issue(Criterion::ClarityReadability, Severity::Minor)]);
        let decision = route_task(&t, &config(true));
        assert_eq!(decision.action, FixAction::SurgicalEdit);
        assert_eq!(decision.executor, Executor::Patcher);
    }

    #[test]
    fn route_task_is_deterministic() {
        let t = task(vec![issue(Criterion::Completeness, Severity::Major)]);
        let c = config(false);
        let a = route_task(&t, &c);
        let b = route_task(&t, &c);
        assert_eq!(a.action, b.action);
        assert_eq!(a.executor, b.executor);
        assert_eq!(a.estimated_tokens, b.estimated_tokens);
    }
}
