//! Stage workers S1-S6: one `StageWorker` implementation per job type,
//! dispatched through a [`dispatch::StageRegistry`] and driven by a
//! [`pool::WorkerPool`]. Each worker advances the course FSM via
//! [`fsm_port::StorePort`], persists its stage's output through
//! [`coursegen_store::MetadataStore`], and enqueues the next stage's job
//! on success.

pub mod dispatch;
pub mod error;
pub mod fsm_port;
pub mod pool;
pub mod ports;
pub mod s1;
pub mod s2;
pub mod s3;
pub mod s4;
pub mod s5;
pub mod s6;

pub use dispatch::{StageRegistry, StageWorker, WorkerOutcome};
pub use error::StageError;
pub use fsm_port::StorePort;
pub use pool::{PoolConfig, WorkerPool};
pub use ports::{ChunkIndexer, Completions, DocumentParser, ParsedDocument};
pub use s1::DocumentUploadWorker;
pub use s2::DocumentProcessingWorker;
pub use s3::SummarizationWorker;
pub use s4::AnalysisWorker;
pub use s5::StructureGenerationWorker;
pub use s6::LessonContentWorker;
