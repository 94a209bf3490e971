//! HTTP adapters for the two collaborators the pipeline treats as
//! external: document parsing/OCR and chunk-vector ingestion. Shaped
//! after the gateway client's own request/response handling — a plain
//! POST, bearer auth, JSON body, wrapped in a deadline.

use std::time::Duration;

use async_trait::async_trait;
use coursegen_workers::{ChunkIndexer, DocumentParser, ParsedDocument, StageError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct HttpDocumentParser {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDocumentParser {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Serialize)]
struct ParseRequest<'a> {
    file_path: &'a str,
    mime_type: &'a str,
}

#[derive(Deserialize)]
struct ParseResponse {
    markdown: String,
}

#[async_trait]
impl DocumentParser for HttpDocumentParser {
    async fn parse(&self, file_path: &str, mime_type: &str) -> Result<ParsedDocument, StageError> {
        let send = self
            .http
            .post(format!("{}/parse", self.base_url))
            .json(&ParseRequest { file_path, mime_type })
            .send();

        let response = tokio::time::timeout(REQUEST_TIMEOUT, send)
            .await
            .map_err(|_| StageError::DocumentParsing(format!("{file_path}: timed out")))?
            .map_err(|e| StageError::DocumentParsing(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StageError::DocumentParsing(format!(
                "{file_path}: parser returned {}",
                response.status()
            )));
        }

        let parsed: ParseResponse = response
            .json()
            .await
            .map_err(|e| StageError::DocumentParsing(e.to_string()))?;
        Ok(ParsedDocument { markdown: parsed.markdown })
    }
}

pub struct HttpChunkIndexer {
    http: reqwest::Client,
    base_url: String,
}

impl HttpChunkIndexer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Serialize)]
struct IndexRequest<'a> {
    course_id: Uuid,
    file_id: Uuid,
    chunks: &'a [String],
}

#[async_trait]
impl ChunkIndexer for HttpChunkIndexer {
    async fn index(&self, course_id: Uuid, file_id: Uuid, chunks: &[String]) -> Result<(), StageError> {
        let send = self
            .http
            .post(format!("{}/index", self.base_url))
            .json(&IndexRequest { course_id, file_id, chunks })
            .send();

        let response = tokio::time::timeout(REQUEST_TIMEOUT, send)
            .await
            .map_err(|_| StageError::ChunkIndexing(format!("{file_id}: timed out")))?
            .map_err(|e| StageError::ChunkIndexing(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StageError::ChunkIndexing(format!(
                "{file_id}: indexer returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// A synchronous query embedder backed by a blocking HTTP call, matching
/// `coursegen_rag::QueryEmbedder`'s plain-`Fn` shape — the RAG context
/// builder calls it from inside otherwise-async code, so it can't itself
/// be async without threading a runtime handle through the query path.
pub fn blocking_embedder(base_url: String) -> coursegen_rag::QueryEmbedder {
    let http = reqwest::blocking::Client::new();
    std::sync::Arc::new(move |text: &str| -> Vec<f32> {
        #[derive(Deserialize)]
        struct EmbedResponse {
            embedding: Vec<f32>,
        }
        #[derive(Serialize)]
        struct EmbedRequest<'a> {
            text: &'a str,
        }

        // `QueryEmbedder` is a plain `Fn`, not `async fn` — the context
        // builder calls it from inside an async method. `block_in_place`
        // hands this thread's other tasks to another worker for the
        // duration of the blocking call instead of stalling the pool.
        let result = tokio::task::block_in_place(|| {
            http.post(format!("{base_url}/embed"))
                .json(&EmbedRequest { text })
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.json::<EmbedResponse>())
        });

        match result {
            Ok(body) => body.embedding,
            Err(e) => {
                tracing::warn!(error = %e, "embedding request failed, returning zero vector");
                Vec::new()
            }
        }
    })
}
