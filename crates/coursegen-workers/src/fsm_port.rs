//! Adapts a shared store handle into the owned `CourseTransitions` port
//! `CourseFsm::new` requires, so stage workers can drive the FSM through
//! whatever `Arc<S>` they already hold instead of owning a second copy
//! of the store.

use std::sync::Arc;

use async_trait::async_trait;
use coursegen_fsm::{CourseTransitions, FsmError};
use coursegen_types::CourseStatus;
use uuid::Uuid;

pub struct StorePort<S>(pub Arc<S>);

#[async_trait]
impl<S: CourseTransitions + Send + Sync> CourseTransitions for StorePort<S> {
    async fn current_status(&self, course_id: Uuid) -> Result<CourseStatus, FsmError> {
        self.0.current_status(course_id).await
    }

    async fn apply_transition(
        &self,
        course_id: Uuid,
        to: CourseStatus,
        progress: u8,
        error_message: Option<&str>,
    ) -> Result<(), FsmError> {
        self.0.apply_transition(course_id, to, progress, error_message).await
    }
}
