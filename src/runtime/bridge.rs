//! Streaming bridge between the blocking decode loop and the async consumer.
//!
//! `spawn_generation` validates the request, then runs the engine's decode
//! loop on `tokio::task::spawn_blocking` so the cooperative consumer side is
//! never blocked. The bridge owns the channel's terminal write: engine
//! success becomes `mark_done`, and engine failure or a panic becomes
//! `mark_failed`, so the consumer never sees a silent hang. The returned
//! handle joins the producer independently of channel draining and carries
//! the cancellation token for early abandonment.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::readback::ReadbackWriter;
use crate::runtime::{ContextHandle, FinishSummary, GenerationRequest, InferenceEngine, ModelHandle};
use crate::sampler::{ensure_nul_free, SamplerPipeline};
use crate::{Error, Result};

/// Handle to an in-flight generation run.
#[derive(Debug)]
pub struct GenerationHandle {
    task: JoinHandle<Result<FinishSummary>>,
    cancel: CancellationToken,
}

impl GenerationHandle {
    /// Requests cooperative cancellation; the engine observes the token
    /// between decode steps.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The run's cancellation token, for wiring into shutdown paths.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the producer has finished, without joining it.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the producer to finish, independently of channel draining.
    /// A panicked producer surfaces as a `Producer` error; the channel will
    /// already have been marked failed by then.
    pub async fn join(self) -> Result<FinishSummary> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(Error::Producer(format!(
                "generation task aborted: {}",
                err
            ))),
        }
    }
}

/// Dispatches a generation run onto its own execution context.
///
/// Prompt and stop strings are encoding-checked synchronously, before any
/// work starts. Must be called within a tokio runtime.
///
/// Abandoning the reader does not stop the run; call
/// [`GenerationHandle::cancel`] if early abandonment must also stop
/// generation.
pub fn spawn_generation(
    engine: Arc<dyn InferenceEngine>,
    model: ModelHandle,
    pipeline: SamplerPipeline,
    context: ContextHandle,
    request: GenerationRequest,
    writer: ReadbackWriter,
) -> Result<GenerationHandle> {
    ensure_nul_free(&request.prompt, "prompt")?;
    for stop in &request.stop_strings {
        ensure_nul_free(stop, "stop string")?;
    }

    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    let task = tokio::task::spawn_blocking(move || {
        tracing::debug!(
            max_tokens = request.max_tokens,
            stages = pipeline.stages().len(),
            "generation started"
        );
        match engine.run_generation(&model, &pipeline, &context, &request, &writer, &task_cancel) {
            Ok(summary) => {
                // The terminal write linearizes after the engine's last
                // produce; only then can the consumer observe done.
                writer.mark_done(summary.clone());
                tracing::debug!(reason = ?summary.reason, gen_tokens = summary.gen_tokens, "generation finished");
                Ok(summary)
            }
            Err(err) => {
                tracing::error!(error = %err, "generation failed");
                let reason = err.to_string();
                writer.mark_failed(reason.clone());
                Err(Error::Producer(reason))
            }
        }
    });

    Ok(GenerationHandle { task, cancel })
}
