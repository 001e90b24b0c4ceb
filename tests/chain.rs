use tokenpipe::{ChainRegistry, Error, LogitBiasEntry, ModelHandle, StageConfig};

fn model() -> ModelHandle {
    ModelHandle::from_raw(7)
}

#[test]
fn test_handle_consumed_by_append() {
    let mut registry = ChainRegistry::new();
    let chain = registry.new_chain(&model());

    let extended = registry
        .append(&chain, StageConfig::Temperature { temp: 0.8 })
        .unwrap();

    // Second append reusing the first call's input handle.
    let err = registry
        .append(&chain, StageConfig::TopK { k: 40 })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidChain(_)));

    // The handle returned by the first append is still live.
    assert!(registry.append(&extended, StageConfig::Greedy).is_ok());
}

#[test]
fn test_handle_consumed_by_finalize() {
    let mut registry = ChainRegistry::new();
    let chain = registry.new_chain(&model());
    let chain = registry.append(&chain, StageConfig::Greedy).unwrap();

    registry.finalize(&chain).unwrap();

    assert!(matches!(
        registry.finalize(&chain),
        Err(Error::InvalidChain(_))
    ));
    assert!(matches!(
        registry.append(&chain, StageConfig::Softmax),
        Err(Error::InvalidChain(_))
    ));
}

#[test]
fn test_finalize_requires_selection_stage() {
    let mut registry = ChainRegistry::new();

    let chain = registry.new_chain(&model());
    let chain = registry
        .append(&chain, StageConfig::Temperature { temp: 0.7 })
        .unwrap();
    let chain = registry
        .append(
            &chain,
            StageConfig::TopP {
                p: 0.9,
                min_keep: 1,
            },
        )
        .unwrap();
    assert!(matches!(
        registry.finalize(&chain),
        Err(Error::IncompleteChain(_))
    ));

    // An empty chain is incomplete too.
    let empty = registry.new_chain(&model());
    assert!(matches!(
        registry.finalize(&empty),
        Err(Error::IncompleteChain(_))
    ));
}

#[test]
fn test_every_selection_stage_finalizes() {
    let selections = [
        StageConfig::Greedy,
        StageConfig::DistributionSample { seed: 1337 },
        StageConfig::Mirostat {
            vocab_size: 32000,
            seed: 42,
            tau: 5.0,
            eta: 0.1,
            m: 100,
        },
        StageConfig::MirostatV2 {
            seed: 42,
            tau: 5.0,
            eta: 0.1,
        },
    ];

    for selection in selections {
        let mut registry = ChainRegistry::new();
        let chain = registry.new_chain(&model());
        let chain = registry.append(&chain, selection.clone()).unwrap();
        let pipeline = registry.finalize(&chain).unwrap();
        assert_eq!(pipeline.stages(), &[selection]);
    }
}

#[test]
fn test_stages_apply_in_append_order() {
    let mut registry = ChainRegistry::new();
    let chain = registry.new_chain(&model());
    let stages = vec![
        StageConfig::Penalties {
            vocab_size: 32000,
            eos_token: 2,
            newline_token: 13,
            last_n_window: 64,
            repeat_penalty: 1.1,
            freq_penalty: 0.0,
            presence_penalty: 0.0,
            penalize_newline: false,
            ignore_eos: false,
        },
        StageConfig::LogitBias {
            entries: vec![LogitBiasEntry {
                token: 15043,
                bias: -5.0,
            }],
        },
        StageConfig::Temperature { temp: 0.8 },
        StageConfig::TopK { k: 40 },
        StageConfig::Softmax,
        StageConfig::DistributionSample { seed: 1 },
    ];

    let mut handle = chain;
    for stage in &stages {
        handle = registry.append(&handle, stage.clone()).unwrap();
    }
    let pipeline = registry.finalize(&handle).unwrap();
    assert_eq!(pipeline.stages(), stages.as_slice());
}

#[test]
fn test_grammar_with_embedded_nul_fails_before_dispatch() {
    let mut registry = ChainRegistry::new();
    let chain = registry.new_chain(&model());

    let err = registry
        .append(
            &chain,
            StageConfig::Grammar {
                grammar: "root ::= \"ok\"\0trailing".into(),
                root: "root".into(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::Encoding(_)));

    // A rejected stage does not consume the handle.
    assert!(registry.append(&chain, StageConfig::Greedy).is_ok());
}

#[test]
fn test_pipeline_is_shareable_and_immutable() {
    let mut registry = ChainRegistry::new();
    let chain = registry.new_chain(&model());
    let chain = registry
        .append(&chain, StageConfig::MinP { p: 0.05, min_keep: 1 })
        .unwrap();
    let chain = registry.append(&chain, StageConfig::Greedy).unwrap();
    let pipeline = registry.finalize(&chain).unwrap();

    let shared = pipeline.clone();
    assert_eq!(shared.stages(), pipeline.stages());
    assert_eq!(shared.model(), model());
}
