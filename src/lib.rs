//! Composable sampler chains and async readback streaming for local LLM
//! inference.
//!
//! Callers compose a pipeline of token-selection stages (the sampler chain),
//! hand it to an [`InferenceEngine`](runtime::InferenceEngine) together with
//! a readback channel, and drain generated text chunks asynchronously while
//! the blocking decode loop runs on its own execution context.

pub mod config;
pub mod error;
pub mod readback;
pub mod runtime;
pub mod sampler;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use readback::{channel, ReadbackReader, ReadbackWriter};
pub use runtime::{
    spawn_generation, ContextHandle, FinishReason, FinishSummary, GenerationHandle,
    GenerationRequest, InferenceEngine, ModelHandle,
};
pub use sampler::{ChainHandle, ChainRegistry, LogitBiasEntry, SamplerPipeline, StageConfig, StageKind};
