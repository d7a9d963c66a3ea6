//! Fake service adapters for unit tests.

use async_trait::async_trait;
use colloquy_ai::{
    Embedder, Embedding, EmbeddingBackend, EmbeddingRequest, GenerationBackend,
    GenerationRequest, GenerationResponse, Retrier, RetryPolicy, ServiceError,
};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

const DIMENSIONS: usize = 8;

/// Deterministic bag-of-bytes embeddings with a call counter.
#[derive(Default)]
pub(crate) struct CountingEmbeddings {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingEmbeddings {
    pub(crate) fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingBackend for CountingEmbeddings {
    async fn embed(&self, request: &EmbeddingRequest) -> Result<Embedding, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ServiceError::RequestFailed {
                reason: "embedding service down".to_string(),
            });
        }
        let mut vector = vec![0.0f32; DIMENSIONS];
        vector[DIMENSIONS - 1] = 1.0;
        for (i, byte) in request.input.bytes().enumerate() {
            vector[(usize::from(byte) + i) % DIMENSIONS] += 1.0;
        }
        Ok(Embedding::new(vector))
    }
}

pub(crate) fn embedder(backend: &Arc<CountingEmbeddings>) -> Embedder {
    let backend: Arc<dyn EmbeddingBackend> = backend.clone();
    Embedder::new(backend, "test-engine", Retrier::default())
}

/// Replays a queue of canned generation outcomes and records requests.
#[derive(Default)]
pub(crate) struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, ServiceError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub(crate) fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<S, ServiceError>>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(replies.into_iter().map(|r| r.map(Into::into)).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ServiceError> {
        self.requests.lock().expect("lock").push(request.clone());
        let next = self
            .script
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(ServiceError::RequestFailed {
                    reason: "script exhausted".to_string(),
                })
            });
        next.map(|content| GenerationResponse {
            content,
            model: request.model.clone(),
            usage: None,
        })
    }

    fn provider(&self) -> &str {
        "scripted"
    }
}

pub(crate) fn rate_limited() -> ServiceError {
    ServiceError::RateLimited {
        retry_after_secs: None,
    }
}

pub(crate) fn quick_retries() -> RetryPolicy {
    RetryPolicy::fixed(Duration::from_millis(10), 3)
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub(crate) fn dispatch(&self) -> tracing::Dispatch {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::Dispatch::new(subscriber)
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("lock")).into_owned()
    }
}

pub(crate) struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter(Arc::clone(&self.0))
    }
}
