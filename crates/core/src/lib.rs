//! # hnrag core
//!
//! Domain types, traits, and error definitions for the hnrag conversation
//! pipeline. This crate has **no I/O**; it defines the domain model that
//! the store, provider, pipeline and gateway crates implement against.
//!
//! Every external collaborator is a trait here:
//! - [`ConversationStore`] / [`IngestLedger`]: durable conversation log
//! - [`Embedder`], [`VectorIndex`], [`GenerationBackend`]: HTTP backends
//!
//! so tests swap in scripted fakes and deployments swap backends via config.

pub mod backend;
pub mod context;
pub mod error;
pub mod event;
pub mod fragment;
pub mod message;
pub mod sentinel;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use backend::{ChunkReceiver, Embedder, GenerationBackend, IndexMatch, IndexRecord, StreamRecord, VectorIndex};
pub use context::{ContextSnippet, SnippetSource};
pub use error::{BackendError, ContextError, Error, Result, StoreError};
pub use event::{DomainEvent, EventBus};
pub use fragment::GenerationFragment;
pub use message::{Conversation, ConversationId, Message, Sender};
pub use store::{ConversationStore, IngestLedger};
