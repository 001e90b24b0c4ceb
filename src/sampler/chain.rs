//! Sampler chain composition with ownership-transfer semantics.
//!
//! The native protocol this models replaces the chain handle on every stage
//! addition, so a handle that has been appended to is dead. Handles here are
//! non-cloneable index+stamp tokens into a caller-owned [`ChainRegistry`];
//! a successful `append`/`finalize` marks the input slot consumed and any
//! later use of that handle fails with [`Error::InvalidChain`](crate::Error)
//! instead of silently aliasing.

use std::sync::Arc;

use crate::runtime::ModelHandle;
use crate::{Error, Result, StageConfig};

/// Opaque handle to an in-progress sampler chain.
///
/// Deliberately neither `Copy` nor `Clone`: a handle represents exclusive
/// ownership of one chain state and is invalidated by the append that
/// consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct ChainHandle {
    slot: usize,
    stamp: u64,
}

#[derive(Debug)]
struct ChainSlot {
    stamp: u64,
    consumed: bool,
    model: ModelHandle,
    stages: Vec<StageConfig>,
}

/// Caller-owned registry of chain states.
///
/// One registry per session; there is no ambient global state. All chain
/// operations go through the registry so stale handles stay detectable.
#[derive(Debug, Default)]
pub struct ChainRegistry {
    slots: Vec<ChainSlot>,
    /// Indices of consumed slots, reused by the next insert so the registry
    /// does not grow without bound over a long session.
    free: Vec<usize>,
    next_stamp: u64,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty chain bound to a model's vocabulary. Stage
    /// parameters are not validated against the model at this point.
    pub fn new_chain(&mut self, model: &ModelHandle) -> ChainHandle {
        self.insert(*model, Vec::new())
    }

    /// Consumes `chain` and returns a new handle representing the chain
    /// extended with `stage`.
    ///
    /// Fails with `InvalidChain` if `chain` was already consumed, or if the
    /// chain is already terminated by a selection stage. Grammar and
    /// sequence-breaker text is encoding-checked here, before any dispatch.
    pub fn append(&mut self, chain: &ChainHandle, stage: StageConfig) -> Result<ChainHandle> {
        stage.check_encoding()?;

        // Validate before consuming so a rejected append leaves the caller
        // with a usable handle.
        if self
            .peek(chain)?
            .stages
            .last()
            .is_some_and(StageConfig::is_selection)
        {
            return Err(Error::InvalidChain(
                "chain is already terminated by a selection stage".to_string(),
            ));
        }

        let slot = self.take(chain)?;
        let mut stages = slot.stages;
        stages.push(stage);
        Ok(self.insert(slot.model, stages))
    }

    /// Consumes `chain` and returns an immutable pipeline ready for
    /// generation. Fails with `IncompleteChain` unless the last stage is a
    /// selection stage.
    pub fn finalize(&mut self, chain: &ChainHandle) -> Result<SamplerPipeline> {
        let valid = {
            let slot = self.peek(chain)?;
            slot.stages.last().is_some_and(StageConfig::is_selection)
        };
        if !valid {
            return Err(Error::IncompleteChain(
                "chain must end in a selection stage (greedy, distribution-sample, mirostat, or mirostat-v2)"
                    .to_string(),
            ));
        }

        let slot = self.take(chain)?;
        tracing::debug!(stages = slot.stages.len(), "finalized sampler pipeline");
        Ok(SamplerPipeline {
            model: slot.model,
            stages: slot.stages.into(),
        })
    }

    fn insert(&mut self, model: ModelHandle, stages: Vec<StageConfig>) -> ChainHandle {
        self.next_stamp += 1;
        let stamp = self.next_stamp;
        let slot = ChainSlot {
            stamp,
            consumed: false,
            model,
            stages,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = slot;
                index
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        ChainHandle { slot: index, stamp }
    }

    fn peek(&self, chain: &ChainHandle) -> Result<&ChainSlot> {
        let slot = self
            .slots
            .get(chain.slot)
            .ok_or_else(|| Error::InvalidChain("handle does not belong to this registry".to_string()))?;
        // A reused slot carries a newer stamp, so a stale handle is still
        // detected after its slot has been recycled.
        if slot.stamp != chain.stamp || slot.consumed {
            return Err(Error::InvalidChain(
                "handle was already consumed by a previous append or finalize".to_string(),
            ));
        }
        Ok(slot)
    }

    fn take(&mut self, chain: &ChainHandle) -> Result<ChainSlot> {
        self.peek(chain)?;
        self.free.push(chain.slot);
        let slot = &mut self.slots[chain.slot];
        slot.consumed = true;
        Ok(ChainSlot {
            stamp: slot.stamp,
            consumed: false,
            model: slot.model,
            stages: std::mem::take(&mut slot.stages),
        })
    }
}

/// An immutable, finalized sampler pipeline.
///
/// Cheap to clone; the stage list is shared and read-only, so the engine can
/// treat it as frozen for the duration of a generation call.
#[derive(Debug, Clone)]
pub struct SamplerPipeline {
    model: ModelHandle,
    stages: Arc<[StageConfig]>,
}

impl SamplerPipeline {
    /// The model this pipeline was built against.
    pub fn model(&self) -> ModelHandle {
        self.model
    }

    /// Stages in application order; the last is always a selection stage.
    pub fn stages(&self) -> &[StageConfig] {
        &self.stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ModelHandle {
        ModelHandle::from_raw(1)
    }

    #[test]
    fn test_append_preserves_order() {
        let mut registry = ChainRegistry::new();
        let model = model();
        let chain = registry.new_chain(&model);
        let chain = registry
            .append(&chain, StageConfig::Temperature { temp: 0.8 })
            .unwrap();
        let chain = registry.append(&chain, StageConfig::TopK { k: 40 }).unwrap();
        let chain = registry.append(&chain, StageConfig::Greedy).unwrap();
        let pipeline = registry.finalize(&chain).unwrap();

        assert_eq!(pipeline.stages().len(), 3);
        assert_eq!(pipeline.stages()[0], StageConfig::Temperature { temp: 0.8 });
        assert_eq!(pipeline.stages()[1], StageConfig::TopK { k: 40 });
        assert_eq!(pipeline.stages()[2], StageConfig::Greedy);
        assert_eq!(pipeline.model(), model);
    }

    #[test]
    fn test_consumed_slots_are_reused() {
        let mut registry = ChainRegistry::new();
        let mut handle = registry.new_chain(&model());
        for _ in 0..32 {
            handle = registry
                .append(&handle, StageConfig::Temperature { temp: 1.0 })
                .unwrap();
        }

        // Every append consumes one slot and recycles it for the extended
        // chain, so a single live chain occupies a single slot.
        assert_eq!(registry.slots.len(), 1);

        // Recycling must not resurrect stale handles.
        let stale = registry.new_chain(&model());
        let fresh = registry.append(&stale, StageConfig::Greedy).unwrap();
        assert!(matches!(
            registry.append(&stale, StageConfig::Greedy),
            Err(Error::InvalidChain(_))
        ));
        assert!(registry.finalize(&fresh).is_ok());
    }

    #[test]
    fn test_append_after_selection_keeps_handle_valid() {
        let mut registry = ChainRegistry::new();
        let chain = registry.new_chain(&model());
        let chain = registry.append(&chain, StageConfig::Greedy).unwrap();

        let err = registry
            .append(&chain, StageConfig::TopK { k: 10 })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidChain(_)));

        // The failed append must not have consumed the handle.
        assert!(registry.finalize(&chain).is_ok());
    }
}
