//! Metadata store adapter: the transactional surface stage workers
//! use to read and write courses, files, sections, lessons, lesson
//! contents, and job-status rows. [`coursegen_fsm::CourseTransitions`] is
//! implemented here too, so course-status writes go through the same
//! transactional boundary as every other row.

pub mod error;
mod memory;
#[cfg(feature = "database")]
mod postgres;
pub mod ports;
mod retry;

pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgStore;
pub use ports::{
    CourseRepo, FileRepo, JobStatusRepo, LessonContentRepo, MetadataStore, OrganizationRepo,
    SectionLessonRepo,
};
