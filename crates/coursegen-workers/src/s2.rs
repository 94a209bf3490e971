//! S2 — Document Processing: parses a file, chunks the resulting
//! markdown with late-chunking semantics, indexes the chunks, and
//! records the outcome on the file row. A single file failing here never
//! fails the course — it is recorded as `vector_status=failed` and the
//! job still completes.

use std::sync::Arc;

use async_trait::async_trait;
use coursegen_fsm::{CourseFsm, CourseTransitions};
use coursegen_queue::{EnqueueOptions, JobQueue};
use coursegen_store::MetadataStore;
use coursegen_types::{CourseStatus, JobPayload, JobType, VectorStatus};
use tracing::warn;

use crate::dispatch::{StageWorker, WorkerOutcome};
use crate::error::StageError;
use crate::fsm_port::StorePort;
use crate::ports::{ChunkIndexer, DocumentParser};
use uuid::Uuid;

pub struct DocumentProcessingWorker<S> {
    store: Arc<S>,
    queue: Arc<dyn JobQueue>,
    parser: Arc<dyn DocumentParser>,
    indexer: Arc<dyn ChunkIndexer>,
}

impl<S> DocumentProcessingWorker<S> {
    pub fn new(
        store: Arc<S>,
        queue: Arc<dyn JobQueue>,
        parser: Arc<dyn DocumentParser>,
        indexer: Arc<dyn ChunkIndexer>,
    ) -> Self {
        Self { store, queue, parser, indexer }
    }
}

#[async_trait]
impl<S> StageWorker for DocumentProcessingWorker<S>
where
    S: MetadataStore + CourseTransitions + Send + Sync + 'static,
{
    async fn handle(&self, payload: JobPayload) -> Result<WorkerOutcome, StageError> {
        let JobPayload::DocumentProcessing {
            file_id,
            course_id,
            file_path,
            mime_type,
            chunk_size,
            chunk_overlap,
        } = payload
        else {
            return Err(StageError::PayloadMismatch);
        };

        let fsm = CourseFsm::new(StorePort(self.store.clone()));
        fsm.transition(course_id, CourseStatus::Parsing, None).await?;

        let parsed = match self.parser.parse(&file_path, &mime_type).await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(file_id = %file_id, error = %e, "S2 parse failed, marking file failed");
                self.store.update_vector_status(file_id, VectorStatus::Failed).await?;
                return self.finish(course_id, format!("parse failed: {e}")).await;
            }
        };

        let chunks = chunk_markdown(&parsed.markdown, chunk_size as usize, chunk_overlap as usize);

        if let Err(e) = self.indexer.index(course_id, file_id, &chunks).await {
            warn!(file_id = %file_id, error = %e, "S2 indexing failed, marking file failed");
            self.store.update_vector_status(file_id, VectorStatus::Failed).await?;
            return self.finish(course_id, format!("indexing failed: {e}")).await;
        }

        self.store.update_markdown_content(file_id, &parsed.markdown).await?;
        self.store.update_vector_status(file_id, VectorStatus::Ready).await?;
        self.finish(course_id, "parsed".to_string()).await
    }
}

impl<S> DocumentProcessingWorker<S>
where
    S: MetadataStore + Send + Sync + 'static,
{
    /// S2 runs once per file; only once every file for the course has
    /// reached a terminal `vector_status` is it safe to hand the course
    /// off to S3, which summarizes across all files at once.
    async fn finish(&self, course_id: Uuid, note: String) -> Result<WorkerOutcome, StageError> {
        let files = self.store.list_files_for_course(course_id).await?;
        if !files.iter().all(|f| f.vector_status().is_terminal()) {
            return Ok(WorkerOutcome::done().with_note(note));
        }

        self.queue
            .enqueue(JobPayload::Summarization { course_id }, EnqueueOptions::default())
            .await?;
        Ok(WorkerOutcome::done().with_note(note).with_enqueued(JobType::Summarization))
    }
}

/// Sliding-window chunker over markdown by character count: `chunk_size`
/// characters per chunk, with `chunk_overlap` characters repeated at the
/// start of the next chunk so a section boundary near a chunk edge is
/// never invisible to both of its neighbours.
fn chunk_markdown(markdown: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if chunk_size == 0 || markdown.len() <= chunk_size {
        return if markdown.trim().is_empty() {
            Vec::new()
        } else {
            vec![markdown.to_string()]
        };
    }

    let chars: Vec<char> = markdown.chars().collect();
    let stride = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::ports::ParsedDocument;
    use chrono::Utc;
    use coursegen_queue::MemoryJobQueue;
    use coursegen_store::MemoryStore;
    use coursegen_types::Course;

    fn parsing_course(id: Uuid) -> Course {
        Course {
            id,
            organization_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Intro to Rust".into(),
            slug: "intro-to-rust".into(),
            status: "active".into(),
            generation_status: "uploading".into(),
            generation_progress: 10,
            generation_metadata: None,
            analysis_result: None,
            course_structure: None,
            language: "en".into(),
            style: None,
            share_token: None,
            is_published: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct OkParser(String);

    #[async_trait]
    impl DocumentParser for OkParser {
        async fn parse(&self, _file_path: &str, _mime_type: &str) -> Result<ParsedDocument, StageError> {
            Ok(ParsedDocument { markdown: self.0.clone() })
        }
    }

    struct FailingParser;

    #[async_trait]
    impl DocumentParser for FailingParser {
        async fn parse(&self, _file_path: &str, _mime_type: &str) -> Result<ParsedDocument, StageError> {
            Err(StageError::DocumentParsing("corrupt PDF".into()))
        }
    }

    struct RecordingIndexer {
        calls: std::sync::Mutex<Vec<usize>>,
    }

    impl RecordingIndexer {
        fn new() -> Self {
            Self { calls: std::sync::Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ChunkIndexer for RecordingIndexer {
        async fn index(&self, _course_id: Uuid, _file_id: Uuid, chunks: &[String]) -> Result<(), StageError> {
            self.calls.lock().unwrap().push(chunks.len());
            Ok(())
        }
    }

    fn payload(file_id: Uuid, course_id: Uuid) -> JobPayload {
        JobPayload::DocumentProcessing {
            file_id,
            course_id,
            file_path: "s3://bucket/doc.pdf".into(),
            mime_type: "application/pdf".into(),
            chunk_size: 10,
            chunk_overlap: 2,
        }
    }

    #[test]
    fn chunker_overlaps_adjacent_windows() {
        let chunks = chunk_markdown("abcdefghijklmnop", 10, 2);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].ends_with(&chunks[1][..2]));
    }

    #[test]
    fn chunker_returns_one_chunk_when_shorter_than_chunk_size() {
        let chunks = chunk_markdown("short", 100, 10);
        assert_eq!(chunks, vec!["short".to_string()]);
    }

    #[tokio::test]
    async fn successful_parse_and_index_marks_file_ready_and_enqueues_s3() {
        let store = Arc::new(MemoryStore::new());
        let course_id = Uuid::new_v4();
        store.seed_course(parsing_course(course_id));
        let file_id = store
            .insert_file(course_id, Uuid::new_v4(), "doc.pdf", "application/pdf", 10, "s3://x")
            .await
            .unwrap();

        let indexer = Arc::new(RecordingIndexer::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let worker = DocumentProcessingWorker::new(
            store.clone(),
            queue.clone(),
            Arc::new(OkParser("# Title\n\nSome body text that is long enough to chunk.".into())),
            indexer.clone(),
        );

        let outcome = worker.handle(payload(file_id, course_id)).await.unwrap();

        let file = store.get_file(file_id).await.unwrap();
        assert_eq!(file.vector_status(), VectorStatus::Ready);
        assert!(file.markdown_content.is_some());
        assert!(!indexer.calls.lock().unwrap().is_empty());
        assert_eq!(outcome.enqueued, vec![JobType::Summarization]);
        assert_eq!(queue.len_waiting(), 1);
        let course = store.get_course(course_id).await.unwrap();
        assert_eq!(course.generation_status(), CourseStatus::Parsing);
    }

    #[tokio::test]
    async fn a_failed_parse_marks_the_file_failed_without_erroring_the_job() {
        let store = Arc::new(MemoryStore::new());
        let course_id = Uuid::new_v4();
        store.seed_course(parsing_course(course_id));
        let file_id = store
            .insert_file(course_id, Uuid::new_v4(), "doc.pdf", "application/pdf", 10, "s3://x")
            .await
            .unwrap();

        let queue = Arc::new(MemoryJobQueue::new());
        let worker = DocumentProcessingWorker::new(
            store.clone(),
            queue.clone(),
            Arc::new(FailingParser),
            Arc::new(RecordingIndexer::new()),
        );

        let outcome = worker.handle(payload(file_id, course_id)).await.unwrap();
        assert!(outcome.note.unwrap().contains("parse failed"));
        let file = store.get_file(file_id).await.unwrap();
        assert_eq!(file.vector_status(), VectorStatus::Failed);
        // The only file for the course failed, but every file is now
        // terminal, so S3 is still enqueued to let summarization decide
        // whether anything eligible survived.
        assert_eq!(outcome.enqueued, vec![JobType::Summarization]);
    }

    #[tokio::test]
    async fn does_not_enqueue_s3_while_sibling_files_are_still_pending() {
        let store = Arc::new(MemoryStore::new());
        let course_id = Uuid::new_v4();
        store.seed_course(parsing_course(course_id));
        let file_id = store
            .insert_file(course_id, Uuid::new_v4(), "doc.pdf", "application/pdf", 10, "s3://x")
            .await
            .unwrap();
        store
            .insert_file(course_id, Uuid::new_v4(), "doc2.pdf", "application/pdf", 10, "s3://y")
            .await
            .unwrap();

        let queue = Arc::new(MemoryJobQueue::new());
        let worker = DocumentProcessingWorker::new(
            store.clone(),
            queue.clone(),
            Arc::new(OkParser("# Title\n\nSome body text that is long enough to chunk.".into())),
            Arc::new(RecordingIndexer::new()),
        );

        let outcome = worker.handle(payload(file_id, course_id)).await.unwrap();
        assert!(outcome.enqueued.is_empty());
        assert_eq!(queue.len_waiting(), 0);
    }
}
