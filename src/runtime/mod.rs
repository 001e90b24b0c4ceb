//! Runtime boundary: opaque engine handles, the inference engine trait, and
//! generation request/summary types.
//!
//! The numeric forward pass is an external collaborator. This crate only
//! defines the boundary it must honor: strongly typed opaque handles (a
//! channel handle can never be passed where a chain handle is expected), a
//! blocking generation entry point, and the readback-channel contract for
//! publishing output.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::readback::ReadbackWriter;
use crate::sampler::SamplerPipeline;

pub mod bridge;

pub use bridge::{spawn_generation, GenerationHandle};

/// Opaque reference to a loaded model. Minted by the engine; the raw value
/// has no documented meaning outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(u64);

impl ModelHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Opaque reference to an inference context/session owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(u64);

impl ContextHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Why a generation run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    /// Hit the requested token budget
    MaxNewTokens,
    /// The model emitted an end-of-generation token
    EndOfSequence,
    /// Output matched one of the request's stop strings
    StopString,
    /// The prompt alone exceeded the context window
    ContextExceeded,
    /// The run was cancelled through its cancellation token
    Cancelled,
}

/// Terminal status of a completed generation run, published alongside the
/// channel's done flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishSummary {
    pub reason: FinishReason,
    /// The text the run stopped at (stop string or final token piece), if any.
    pub stopped_at: Option<String>,
    pub prompt_tokens: usize,
    pub gen_tokens: usize,
}

impl FinishSummary {
    /// JSON rendering of the terminal status, for API layers that publish
    /// it alongside the stream.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Parameters for one generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: usize,
    /// Strings that end generation when they appear in the output.
    pub stop_strings: Vec<String>,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            max_tokens: 50,
            stop_strings: Vec::new(),
        }
    }
}

/// Abstract inference engine boundary.
///
/// All methods are blocking; the streaming bridge dispatches
/// `run_generation` onto a dedicated execution context so the async consumer
/// is never blocked by it. Implementations treat the pipeline as immutable
/// for the duration of a run.
pub trait InferenceEngine: Send + Sync {
    /// Loads model weights, offloading `gpu_layers` layers to the GPU.
    fn load_model(&self, path: &Path, gpu_layers: i32) -> anyhow::Result<ModelHandle>;

    /// Allocates an inference context against a loaded model.
    fn create_context(
        &self,
        model: &ModelHandle,
        context_length: u32,
        batch_count: u32,
    ) -> anyhow::Result<ContextHandle>;

    /// Drives the decode loop: per step, applies `pipeline` to the raw
    /// logits to pick one token, decodes it to text, and publishes it with
    /// [`ReadbackWriter::produce`]. Checks `cancel` between steps.
    ///
    /// Implementations return the finish summary rather than terminating the
    /// channel themselves; the bridge owns the terminal write.
    fn run_generation(
        &self,
        model: &ModelHandle,
        pipeline: &SamplerPipeline,
        context: &ContextHandle,
        request: &GenerationRequest,
        writer: &ReadbackWriter,
        cancel: &CancellationToken,
    ) -> anyhow::Result<FinishSummary>;
}
