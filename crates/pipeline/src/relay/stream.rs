//! The streaming side of the relay: one lazily-connected, single-use
//! sequence of [`GenerationFragment`]s.
//!
//! ```text
//! Idle → Connecting → Streaming ─┬→ Completed   (record with done = true)
//!                                └→ Failed      (transport error, idle timeout,
//!                                                backend error record, oversized
//!                                                record, or end of transport
//!                                                before done)
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use hnrag_core::backend::{ChunkReceiver, GenerationBackend, StreamRecord};
use hnrag_core::fragment::GenerationFragment;
use tracing::{debug, trace, warn};

use super::frame::FrameDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Failed,
}

impl RelayState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

pub struct RelayStream {
    backend: Arc<dyn GenerationBackend>,
    prompt: String,
    connect_timeout: Duration,
    idle_timeout: Duration,
    state: RelayState,
    receiver: Option<ChunkReceiver>,
    decoder: FrameDecoder,
    ready: VecDeque<GenerationFragment>,
    accumulated: String,
    failure: Option<String>,
    chunks: usize,
}

impl RelayStream {
    pub(crate) fn new(
        backend: Arc<dyn GenerationBackend>,
        prompt: String,
        connect_timeout: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            prompt,
            connect_timeout,
            idle_timeout,
            state: RelayState::Idle,
            receiver: None,
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
            accumulated: String::new(),
            failure: None,
            chunks: 0,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Concatenation of every `Text` fragment produced so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Why the stream failed, once it has.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// The next fragment, or `None` once a terminal fragment was returned.
    pub async fn next(&mut self) -> Option<GenerationFragment> {
        loop {
            if let Some(fragment) = self.ready.pop_front() {
                return Some(fragment);
            }
            match self.state {
                RelayState::Completed | RelayState::Failed => return None,
                RelayState::Idle | RelayState::Connecting => self.connect().await,
                RelayState::Streaming => self.read_chunk().await,
            }
        }
    }

    async fn connect(&mut self) {
        self.state = RelayState::Connecting;
        debug!(backend = self.backend.name(), "Connecting to generation backend");

        match tokio::time::timeout(self.connect_timeout, self.backend.stream(&self.prompt)).await {
            Ok(Ok(receiver)) => {
                self.receiver = Some(receiver);
                self.state = RelayState::Streaming;
            }
            Ok(Err(e)) => self.fail(e.to_string()),
            Err(_) => self.fail(format!(
                "Generation backend did not respond within {}s",
                self.connect_timeout.as_secs()
            )),
        }
    }

    async fn read_chunk(&mut self) {
        let Some(receiver) = self.receiver.as_mut() else {
            self.fail("stream ended before completion".into());
            return;
        };

        match tokio::time::timeout(self.idle_timeout, receiver.recv()).await {
            Err(_) => self.fail(format!(
                "No data from generation backend for {}s",
                self.idle_timeout.as_secs()
            )),
            Ok(None) => self.fail("stream ended before completion".into()),
            Ok(Some(Err(e))) => self.fail(e.to_string()),
            Ok(Some(Ok(bytes))) => {
                self.chunks += 1;
                trace!(bytes = bytes.len(), chunk = self.chunks, "Received stream chunk");
                let records = match self.decoder.push(&bytes) {
                    Ok(records) => records,
                    Err(e) => {
                        self.fail(e.to_string());
                        return;
                    }
                };
                for record in records {
                    self.apply(record);
                    if self.state.is_terminal() {
                        break;
                    }
                }
            }
        }
    }

    fn apply(&mut self, record: StreamRecord) {
        if let Some(error) = record.error {
            self.fail(error);
            return;
        }

        if let Some(text) = record.response.filter(|t| !t.is_empty()) {
            self.accumulated.push_str(&text);
            self.ready.push_back(GenerationFragment::Text(text));
        }

        if record.done {
            debug!(
                chunks = self.chunks,
                chars = self.accumulated.len(),
                "Generation stream completed"
            );
            self.state = RelayState::Completed;
            self.ready.push_back(GenerationFragment::Done);
            self.release();
        }
    }

    fn fail(&mut self, reason: String) {
        warn!(
            backend = self.backend.name(),
            chunks = self.chunks,
            reason = %reason,
            "Generation stream failed"
        );
        self.state = RelayState::Failed;
        self.ready.push_back(GenerationFragment::Error(reason.clone()));
        self.failure = Some(reason);
        self.release();
    }

    /// Close and drop the backend receiver so its reader task stops.
    fn release(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
        }
    }
}
