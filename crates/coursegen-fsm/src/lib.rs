//! Course FSM: a persistent, linear per-course state machine with a
//! failure sink. Transitions are requested by stage workers and applied
//! through the [`CourseTransitions`] port, which the metadata store
//! implements inside its own transactions — the FSM never touches
//! storage directly, it only decides legality and the resulting progress.

use async_trait::async_trait;
use coursegen_types::{CourseStatus, ErrorKind, ErrorKindExt};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum FsmError {
    #[error("course {0} not found")]
    NotFound(Uuid),
    #[error("cannot transition course {course_id} from {from} to {to}")]
    IllegalTransition {
        course_id: Uuid,
        from: CourseStatus,
        to: CourseStatus,
    },
    #[error("store error: {0}")]
    Store(String),
}

impl ErrorKindExt for FsmError {
    fn kind(&self) -> ErrorKind {
        match self {
            FsmError::NotFound(_) => ErrorKind::ValidationError,
            FsmError::IllegalTransition { .. } => ErrorKind::StateConflict,
            FsmError::Store(_) => ErrorKind::NetTransient,
        }
    }
}

/// The transactional surface the FSM needs from the metadata store. Implemented by the
/// metadata store adapter; a course is never mutated except through this
/// port so that the "only the successor or failed is legal" rule has a
/// single enforcement point.
#[async_trait]
pub trait CourseTransitions: Send + Sync {
    async fn current_status(&self, course_id: Uuid) -> Result<CourseStatus, FsmError>;

    /// Persists `to` and `progress` for `course_id`, and — when `to` is
    /// `Failed` — records `error_message` in `generation_metadata`. Must
    /// be applied inside a transaction by the implementer.
    async fn apply_transition(
        &self,
        course_id: Uuid,
        to: CourseStatus,
        progress: u8,
        error_message: Option<&str>,
    ) -> Result<(), FsmError>;
}

/// Drives FSM transitions against a [`CourseTransitions`] port.
pub struct CourseFsm<P: CourseTransitions> {
    port: P,
}

impl<P: CourseTransitions> CourseFsm<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Requests a transition to `to`. If the course is already at `to`,
    /// this is treated as success (idempotent retry of an already-applied
    /// transition) rather than a `STATE_CONFLICT`, per the error taxonomy.
    pub async fn transition(
        &self,
        course_id: Uuid,
        to: CourseStatus,
        error_message: Option<&str>,
    ) -> Result<(), FsmError> {
        let current = self.port.current_status(course_id).await?;

        if current == to {
            return Ok(());
        }

        if !current.can_transition_to(to) {
            return Err(FsmError::IllegalTransition {
                course_id,
                from: current,
                to,
            });
        }

        let progress = to.fixed_progress().unwrap_or_else(|| {
            // `Failed` keeps whatever progress the course last reported;
            // callers that drive to `Failed` pass the last known stage's
            // progress through `transition_to_failed` instead.
            current.fixed_progress().unwrap_or(0)
        });

        self.port
            .apply_transition(course_id, to, progress, error_message)
            .await
    }

    /// Convenience for the common "stage failed fatally" path: always
    /// legal, and carries the human-readable reason into
    /// `generation_metadata.error_message`.
    pub async fn transition_to_failed(
        &self,
        course_id: Uuid,
        reason: &str,
    ) -> Result<(), FsmError> {
        let current = self.port.current_status(course_id).await?;
        if current == CourseStatus::Failed {
            return Ok(());
        }
        let last_progress = current.fixed_progress().unwrap_or(0);
        self.port
            .apply_transition(course_id, CourseStatus::Failed, last_progress, Some(reason))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakePort {
        status: Mutex<CourseStatus>,
    }

    #[async_trait]
    impl CourseTransitions for FakePort {
        async fn current_status(&self, _course_id: Uuid) -> Result<CourseStatus, FsmError> {
            Ok(*self.status.lock().unwrap())
        }

        async fn apply_transition(
            &self,
            _course_id: Uuid,
            to: CourseStatus,
            _progress: u8,
            _error_message: Option<&str>,
        ) -> Result<(), FsmError> {
            *self.status.lock().unwrap() = to;
            Ok(())
        }
    }

    #[tokio::test]
    async fn linear_successor_transition_succeeds() {
        let fsm = CourseFsm::new(FakePort {
            status: Mutex::new(CourseStatus::Pending),
        });
        let id = Uuid::new_v4();
        fsm.transition(id, CourseStatus::Uploading, None).await.unwrap();
        assert_eq!(fsm.port.current_status(id).await.unwrap(), CourseStatus::Uploading);
    }

    #[tokio::test]
    async fn skipping_a_state_is_illegal() {
        let fsm = CourseFsm::new(FakePort {
            status: Mutex::new(CourseStatus::Pending),
        });
        let id = Uuid::new_v4();
        let err = fsm.transition(id, CourseStatus::Parsing, None).await.unwrap_err();
        assert!(matches!(err, FsmError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn repeating_the_current_transition_is_idempotent_success() {
        let fsm = CourseFsm::new(FakePort {
            status: Mutex::new(CourseStatus::Parsing),
        });
        let id = Uuid::new_v4();
        fsm.transition(id, CourseStatus::Parsing, None).await.unwrap();
    }

    #[tokio::test]
    async fn failed_is_always_reachable_and_absorbing() {
        let fsm = CourseFsm::new(FakePort {
            status: Mutex::new(CourseStatus::Summarizing),
        });
        let id = Uuid::new_v4();
        fsm.transition_to_failed(id, "all documents failed parsing")
            .await
            .unwrap();
        assert_eq!(fsm.port.current_status(id).await.unwrap(), CourseStatus::Failed);

        let err = fsm
            .transition(id, CourseStatus::Analyzing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FsmError::IllegalTransition { .. }));
    }
}
