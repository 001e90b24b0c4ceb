//! Readback channel: ordered text-chunk streaming from a blocking producer
//! to an async consumer.
//!
//! Single-producer/single-consumer. One mutex guards both the FIFO queue and
//! the terminal flag, so termination can never be observed while a produced
//! chunk is still invisible to the reader: `mark_done` linearizes strictly
//! after the final `produce`. The consumer suspends on a [`Notify`] rather
//! than a fixed-delay poll loop; [`ReadbackReader::try_take_next`] remains
//! available as the non-blocking, polling-friendly path.
//!
//! If the consumer stops draining early the producer is NOT cancelled and
//! runs to completion on its own execution context. Callers that need early
//! abandonment to stop generation must cancel through the
//! [`GenerationHandle`](crate::runtime::bridge::GenerationHandle).

use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::runtime::FinishSummary;
use crate::{Error, Result};

/// Creates a connected writer/reader pair over an empty, unterminated
/// channel.
pub fn channel() -> (ReadbackWriter, ReadbackReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::new(),
            terminal: None,
        }),
        notify: Notify::new(),
    });
    (
        ReadbackWriter {
            shared: shared.clone(),
        },
        ReadbackReader { shared },
    )
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

#[derive(Debug)]
struct State {
    queue: VecDeque<String>,
    terminal: Option<Terminal>,
}

#[derive(Debug)]
enum Terminal {
    Done(FinishSummary),
    Failed(String),
}

/// Producer half of the readback channel.
///
/// Held by the generation task. Not cloneable; the channel is strictly
/// single-producer.
#[derive(Debug)]
pub struct ReadbackWriter {
    shared: Arc<Shared>,
}

impl ReadbackWriter {
    /// Appends `chunk` to the tail of the queue.
    ///
    /// Producing into a terminated channel is a producer-side programming
    /// error and fails with `ChannelMisuse`.
    pub fn produce(&self, chunk: impl Into<String>) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.terminal.is_some() {
                return Err(Error::ChannelMisuse(
                    "produce called after the channel was finalized".to_string(),
                ));
            }
            state.queue.push_back(chunk.into());
        }
        self.shared.notify.notify_one();
        Ok(())
    }

    /// Marks the channel done. Must be the producer's last call; it
    /// linearizes after every prior `produce`. A no-op if the channel is
    /// already terminated (first terminal write wins).
    pub fn mark_done(&self, summary: FinishSummary) {
        self.terminate(Terminal::Done(summary));
    }

    /// Marks the channel failed with a reason. Chunks already produced
    /// remain drainable.
    pub fn mark_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(%reason, "readback channel marked failed");
        self.terminate(Terminal::Failed(reason));
    }

    fn terminate(&self, terminal: Terminal) {
        {
            let mut state = self.shared.state.lock();
            if state.terminal.is_some() {
                return;
            }
            state.terminal = Some(terminal);
        }
        self.shared.notify.notify_one();
    }
}

impl Drop for ReadbackWriter {
    fn drop(&mut self) {
        // A vanished producer must never leave the consumer hanging.
        self.terminate(Terminal::Failed(
            "producer dropped before terminating the channel".to_string(),
        ));
    }
}

/// Consumer half of the readback channel.
#[derive(Debug)]
pub struct ReadbackReader {
    shared: Arc<Shared>,
}

impl ReadbackReader {
    /// Non-blocking: pops the oldest unread chunk, or `None` if the queue is
    /// currently empty.
    pub fn try_take_next(&mut self) -> Option<String> {
        self.shared.state.lock().queue.pop_front()
    }

    /// True only once the queue is empty AND the channel is terminated.
    ///
    /// This composite predicate is the correct termination test; the raw
    /// done flag alone would terminate consumption with chunks still queued.
    pub fn is_finished(&self) -> bool {
        let state = self.shared.state.lock();
        state.queue.is_empty() && state.terminal.is_some()
    }

    /// The failure reason, if the producer terminated abnormally.
    pub fn failure(&self) -> Option<String> {
        match &self.shared.state.lock().terminal {
            Some(Terminal::Failed(reason)) => Some(reason.clone()),
            _ => None,
        }
    }

    /// The finish summary, once the producer completed normally.
    pub fn finish_summary(&self) -> Option<FinishSummary> {
        match &self.shared.state.lock().terminal {
            Some(Terminal::Done(summary)) => Some(summary.clone()),
            _ => None,
        }
    }

    /// Waits for the next chunk, suspending until the producer either
    /// publishes one or terminates the channel. Returns `None` exactly once
    /// the channel is finished; every call after that also returns `None`.
    pub async fn next_chunk(&mut self) -> Option<String> {
        loop {
            // Arm the waiter before checking state so a wakeup between the
            // check and the await is not lost.
            let notified = self.shared.notify.notified();
            {
                let mut state = self.shared.state.lock();
                if let Some(chunk) = state.queue.pop_front() {
                    return Some(chunk);
                }
                if state.terminal.is_some() {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// The lazy chunk sequence: yields chunks in production order until the
    /// channel is finished. Destructive and single-pass.
    pub fn chunks(&mut self) -> impl Stream<Item = String> + '_ {
        async_stream::stream! {
            while let Some(chunk) = self.next_chunk().await {
                yield chunk;
            }
        }
    }

    /// Drains the remainder of the channel into one string.
    pub async fn read_to_string(&mut self) -> String {
        let mut text = String::new();
        while let Some(chunk) = self.next_chunk().await {
            text.push_str(&chunk);
        }
        text
    }
}
