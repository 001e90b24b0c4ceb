//! Stage catalog for sampler chain composition.
//!
//! Each [`StageConfig`] variant names one selection/filtering operation over
//! a scored vocabulary distribution, carrying only its own typed parameters.
//! The filtering math itself lives in the inference engine; this module only
//! describes what to apply and in which order. Serialized stage names are
//! stable identifiers (`top-k`, `mirostat-v2`, `distribution-sample`, ...)
//! shared with engines built against the catalog.

use serde::{Deserialize, Serialize};

pub mod chain;

pub use chain::{ChainHandle, ChainRegistry, SamplerPipeline};

/// Additive logit adjustment for one token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogitBiasEntry {
    pub token: i32,
    pub bias: f32,
}

/// What a stage does to the candidate distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Rescales scores without removing candidates
    Reweight,
    /// Narrows the candidate set
    Truncate,
    /// Restricts candidates to a constrained language (grammar, infill)
    Constrain,
    /// Converts scores to probabilities
    Normalize,
    /// Picks one concrete token; terminates a chain
    Selection,
}

/// One parameterized stage of a sampler chain.
///
/// Reweight/truncate/constrain/normalize stages may appear any number of
/// times in any order; a selection stage must appear exactly once, last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum StageConfig {
    Temperature {
        temp: f32,
    },
    TemperatureExtended {
        temp: f32,
        dynatemp_range: f32,
        dynatemp_exponent: f32,
    },
    TopK {
        k: i32,
    },
    TopP {
        p: f32,
        min_keep: usize,
    },
    MinP {
        p: f32,
        min_keep: usize,
    },
    TailFree {
        z: f32,
        min_keep: usize,
    },
    Typical {
        p: f32,
        min_keep: usize,
    },
    Xtc {
        probability: f32,
        threshold: f32,
        min_keep: usize,
        seed: u32,
    },
    TopNSigma {
        n_sigma: f32,
    },
    Dry {
        multiplier: f32,
        base: f32,
        allowed_length: i32,
        penalty_last_n: i32,
        sequence_breakers: Vec<String>,
    },
    Penalties {
        vocab_size: i32,
        eos_token: i32,
        newline_token: i32,
        last_n_window: i32,
        repeat_penalty: f32,
        freq_penalty: f32,
        presence_penalty: f32,
        penalize_newline: bool,
        ignore_eos: bool,
    },
    LogitBias {
        entries: Vec<LogitBiasEntry>,
    },
    Grammar {
        grammar: String,
        root: String,
    },
    Llguidance {
        grammar: String,
    },
    Infill,
    Softmax,
    Mirostat {
        vocab_size: i32,
        seed: u32,
        tau: f32,
        eta: f32,
        m: i32,
    },
    MirostatV2 {
        seed: u32,
        tau: f32,
        eta: f32,
    },
    Greedy,
    DistributionSample {
        seed: u32,
    },
}

impl StageConfig {
    /// How this stage acts on the distribution.
    pub fn kind(&self) -> StageKind {
        match self {
            StageConfig::Temperature { .. }
            | StageConfig::TemperatureExtended { .. }
            | StageConfig::Dry { .. }
            | StageConfig::Penalties { .. }
            | StageConfig::LogitBias { .. } => StageKind::Reweight,
            StageConfig::TopK { .. }
            | StageConfig::TopP { .. }
            | StageConfig::MinP { .. }
            | StageConfig::TailFree { .. }
            | StageConfig::Typical { .. }
            | StageConfig::Xtc { .. }
            | StageConfig::TopNSigma { .. } => StageKind::Truncate,
            StageConfig::Grammar { .. }
            | StageConfig::Llguidance { .. }
            | StageConfig::Infill => StageKind::Constrain,
            StageConfig::Softmax => StageKind::Normalize,
            StageConfig::Mirostat { .. }
            | StageConfig::MirostatV2 { .. }
            | StageConfig::Greedy
            | StageConfig::DistributionSample { .. } => StageKind::Selection,
        }
    }

    /// True for stages that pick a single token and terminate a chain.
    pub fn is_selection(&self) -> bool {
        self.kind() == StageKind::Selection
    }

    /// Checks that any text carried by this stage is safe to hand across the
    /// native boundary (no embedded NUL terminators).
    pub(crate) fn check_encoding(&self) -> crate::Result<()> {
        match self {
            StageConfig::Grammar { grammar, root } => {
                ensure_nul_free(grammar, "grammar text")?;
                ensure_nul_free(root, "grammar root rule")
            }
            StageConfig::Llguidance { grammar } => ensure_nul_free(grammar, "llguidance grammar"),
            StageConfig::Dry {
                sequence_breakers, ..
            } => {
                for breaker in sequence_breakers {
                    ensure_nul_free(breaker, "dry sequence breaker")?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Rejects text with an embedded NUL, which would truncate at the native
/// boundary instead of failing loudly.
pub(crate) fn ensure_nul_free(text: &str, what: &str) -> crate::Result<()> {
    if text.contains('\0') {
        return Err(crate::Error::Encoding(format!(
            "{} contains an embedded NUL terminator",
            what
        )));
    }
    Ok(())
}
