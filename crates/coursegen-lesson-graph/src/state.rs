//! The lesson graph's explicit state-transition table: `LessonState` plus
//! a pure `step` function mapping `(state, event) -> (next state,
//! effects)`. No graph library; the driver loop in `graph.rs` performs
//! the I/O each state implies and feeds the resulting event back in.

use crate::self_review::ReviewStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonState {
    Generate,
    SelfReview,
    RegenerateSections,
    Judge,
    RouteAndBatch,
    ExecuteTasks,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonOutcome {
    Completed,
    ReviewRequired,
}

#[derive(Debug, Clone)]
pub enum LessonEvent {
    Generated,
    SelfReviewed {
        status: ReviewStatus,
        sections_to_regenerate: Vec<String>,
    },
    SectionsRegenerated,
    Judged {
        accept: bool,
    },
    Batched {
        batch_count: usize,
    },
    TasksExecuted,
}

#[derive(Debug, Clone, Copy)]
pub enum Effect {
    IncrementRetryCount,
    MarkFixedLoopUsed,
    IncrementRefinementIteration,
    SetOutcome(LessonOutcome),
}

/// Caps and thresholds that bound the graph's loops. `acceptance_threshold`
/// has no single canonical default; 0.75 is a reasonable starting point
/// and must stay caller-configurable.
#[derive(Debug, Clone, Copy)]
pub struct GraphLimits {
    pub max_attempts: u32,
    pub max_iterations: u32,
    pub acceptance_threshold: f32,
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_iterations: 2,
            acceptance_threshold: 0.75,
        }
    }
}

/// Read-only counters `step` needs to decide whether a loop has run its
/// course. Kept separate from the full carried state so `step` stays a
/// pure function of its arguments and is directly unit-testable.
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    pub retry_count: u32,
    pub fixed_loop_used: bool,
    pub refinement_iteration_count: u32,
}

pub fn step(
    state: LessonState,
    event: LessonEvent,
    ctx: StepContext,
    limits: &GraphLimits,
) -> (LessonState, Vec<Effect>) {
    match (state, event) {
        (LessonState::Generate, LessonEvent::Generated) => (LessonState::SelfReview, vec![]),

        (
            LessonState::SelfReview,
            LessonEvent::SelfReviewed {
                status,
                sections_to_regenerate,
            },
        ) => {
            if !sections_to_regenerate.is_empty() {
                return (LessonState::RegenerateSections, vec![]);
            }
            match status {
                ReviewStatus::Pass | ReviewStatus::PassWithFlags => (LessonState::Judge, vec![]),
                ReviewStatus::Fixed => {
                    if ctx.fixed_loop_used {
                        (LessonState::Judge, vec![])
                    } else {
                        (LessonState::SelfReview, vec![Effect::MarkFixedLoopUsed])
                    }
                }
                ReviewStatus::Regenerate => {
                    if ctx.retry_count >= limits.max_attempts {
                        (LessonState::Done, vec![Effect::SetOutcome(LessonOutcome::ReviewRequired)])
                    } else {
                        (LessonState::Generate, vec![Effect::IncrementRetryCount])
                    }
                }
            }
        }

        (LessonState::RegenerateSections, LessonEvent::SectionsRegenerated) => {
            (LessonState::SelfReview, vec![])
        }

        (LessonState::Judge, LessonEvent::Judged { accept }) => {
            if accept {
                (LessonState::Done, vec![Effect::SetOutcome(LessonOutcome::Completed)])
            } else if ctx.refinement_iteration_count >= limits.max_iterations {
                (LessonState::Done, vec![Effect::SetOutcome(LessonOutcome::ReviewRequired)])
            } else {
                (LessonState::RouteAndBatch, vec![Effect::IncrementRefinementIteration])
            }
        }

        (LessonState::RouteAndBatch, LessonEvent::Batched { .. }) => {
            (LessonState::ExecuteTasks, vec![])
        }

        (LessonState::ExecuteTasks, LessonEvent::TasksExecuted) => {
            (LessonState::SelfReview, vec![])
        }

        (state, event) => {
            unreachable!("illegal lesson graph transition: {state:?} driven by {event:?}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StepContext {
        StepContext {
            retry_count: 0,
            fixed_loop_used: false,
            refinement_iteration_count: 0,
        }
    }

    #[test]
    fn pass_moves_to_judge() {
        let (next, effects) = step(
            LessonState::SelfReview,
            LessonEvent::SelfReviewed {
                status: ReviewStatus::Pass,
                sections_to_regenerate: vec![],
            },
            ctx(),
            &GraphLimits::default(),
        );
        assert_eq!(next, LessonState::Judge);
        assert!(effects.is_empty());
    }

    #[test]
    fn sections_to_regenerate_wins_even_with_pass_status() {
        let (next, _) = step(
            LessonState::SelfReview,
            LessonEvent::SelfReviewed {
                status: ReviewStatus::Pass,
                sections_to_regenerate: vec!["sec_1".to_string()],
            },
            ctx(),
            &GraphLimits::default(),
        );
        assert_eq!(next, LessonState::RegenerateSections);
    }

    #[test]
    fn fixed_loops_back_once_then_falls_through_to_judge() {
        let limits = GraphLimits::default();
        let event = || LessonEvent::SelfReviewed {
            status: ReviewStatus::Fixed,
            sections_to_regenerate: vec![],
        };

        let (next, effects) = step(LessonState::SelfReview, event(), ctx(), &limits);
        assert_eq!(next, LessonState::SelfReview);
        assert!(matches!(effects[0], Effect::MarkFixedLoopUsed));

        let looped_ctx = StepContext { fixed_loop_used: true, ..ctx() };
        let (next, _) = step(LessonState::SelfReview, event(), looped_ctx, &limits);
        assert_eq!(next, LessonState::Judge);
    }

    #[test]
    fn regenerate_exhausting_attempts_ends_in_review_required() {
        let limits = GraphLimits::default();
        let event = || LessonEvent::SelfReviewed {
            status: ReviewStatus::Regenerate,
            sections_to_regenerate: vec![],
        };
        let exhausted = StepContext { retry_count: limits.max_attempts, ..ctx() };
        let (next, effects) = step(LessonState::SelfReview, event(), exhausted, &limits);
        assert_eq!(next, LessonState::Done);
        assert!(matches!(effects[0], Effect::SetOutcome(LessonOutcome::ReviewRequired)));
    }

    #[test]
    fn judge_accept_completes_the_lesson() {
        let (next, effects) = step(
            LessonState::Judge,
            LessonEvent::Judged { accept: true },
            ctx(),
            &GraphLimits::default(),
        );
        assert_eq!(next, LessonState::Done);
        assert!(matches!(effects[0], Effect::SetOutcome(LessonOutcome::Completed)));
    }

    #[test]
    fn judge_reject_at_iteration_cap_requires_review() {
        let limits = GraphLimits::default();
        let at_cap = StepContext { refinement_iteration_count: limits.max_iterations, ..ctx() };
        let (next, effects) = step(LessonState::Judge, LessonEvent::Judged { accept: false }, at_cap, &limits);
        assert_eq!(next, LessonState::Done);
        assert!(matches!(effects[0], Effect::SetOutcome(LessonOutcome::ReviewRequired)));
    }

    #[test]
    fn judge_reject_under_cap_routes_for_refinement() {
        let (next, effects) = step(
            LessonState::Judge,
            LessonEvent::Judged { accept: false },
            ctx(),
            &GraphLimits::default(),
        );
        assert_eq!(next, LessonState::RouteAndBatch);
        assert!(matches!(effects[0], Effect::IncrementRefinementIteration));
    }

    #[test]
    fn step_is_deterministic_given_the_same_inputs() {
        let limits = GraphLimits::default();
        let a = step(LessonState::Generate, LessonEvent::Generated, ctx(), &limits);
        let b = step(LessonState::Generate, LessonEvent::Generated, ctx(), &limits);
        assert_eq!(a.0, b.0);
    }
}
