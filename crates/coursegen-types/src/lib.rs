//! Shared domain and wire types for the course generation pipeline.
//!
//! Every crate in the workspace exchanges data using the types defined
//! here rather than reaching into one another's internals, mirroring a
//! types/execution-types split common to larger multi-crate services.

pub mod error;
pub mod job;
pub mod lesson;
pub mod lesson_spec;
pub mod metrics;
pub mod org;
pub mod rag;
pub mod refinement;
pub mod source;

pub use error::{ErrorKind, ErrorKindExt};
pub use job::{Job, JobPayload, JobState, JobStatusRow, JobStatusState, JobType};
pub use lesson::{
    Course, CourseStatus, Lesson, LessonContent, LessonContentStatus, Section,
};
pub use lesson_spec::{
    BloomLevel, LearningObjective, LessonSpec, SectionBreakdown,
};
pub use metrics::{NodeMetric, NodeMetrics};
pub use org::{Organization, Role, Tier, User};
pub use rag::RagChunk;
pub use refinement::{
    Criterion, Executor, FixAction, RouterDecision, RoutingConfig,
    SectionRefinementTask, Severity, TargetedIssue,
};
pub use source::{FileCatalogEntry, VectorStatus};
