use parking_lot::Mutex;
use proptest::prelude::*;
use rex_engine::{ExplorationEngine, ExplorerConfig, MergeOutcome};
use rex_gateway::MockRepositoryGateway;
use rex_test_utils::{engine_over, entity_response, guid, traversal_response};
use rex_types::{GenerationIndex, Guid, InstanceCategory, TraversalFilter};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

const ALPHABET: &[&str] = &["A", "B", "C", "D", "E", "F", "G", "H"];

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn retrieval_engine() -> ExplorationEngine {
    let mut mock = MockRepositoryGateway::new();
    mock.expect_fetch_entity()
        .returning(|request| Ok(entity_response(request.guid.as_str(), request.guid.as_str())));
    engine_over(Arc::new(mock), ExplorerConfig::default())
}

/// Engine whose traversals answer from `responses` in order
fn traversal_engine(responses: Vec<(Vec<&'static str>, Vec<&'static str>)>) -> ExplorationEngine {
    let queue = Arc::new(Mutex::new(VecDeque::from(responses)));
    let mut mock = MockRepositoryGateway::new();
    mock.expect_fetch_entity()
        .returning(|request| Ok(entity_response(request.guid.as_str(), "root")));
    mock.expect_traversal().returning(move |_| {
        let (entities, relationships) = queue.lock().pop_front().unwrap_or_default();
        let relationships: Vec<(&str, &str, &str)> =
            relationships.iter().map(|r| (*r, "root", "root")).collect();
        Ok(traversal_response(&entities, &relationships))
    });
    engine_over(Arc::new(mock), ExplorerConfig::default())
}

fn guid_sequence() -> impl Strategy<Value = Vec<&'static str>> {
    proptest::collection::vec(proptest::sample::select(ALPHABET), 1..24)
}

proptest! {
    #[test]
    fn prop_duplicate_retrievals_never_advance_generation(ids in guid_sequence()) {
        let engine = retrieval_engine();
        runtime().block_on(async {
            for id in &ids {
                engine.get_instance(id, InstanceCategory::Entity).await.unwrap();
            }
        });

        let distinct: BTreeSet<&str> = ids.iter().copied().collect();
        let state = engine.snapshot();
        prop_assert!(state.check_invariants().is_ok());
        prop_assert_eq!(state.known_count(), distinct.len());
        prop_assert_eq!(state.current_generation().get() as usize, distinct.len());
        prop_assert_eq!(engine.focus_guid(), ids.last().map(|id| guid(id)));
    }

    #[test]
    fn prop_traversal_commits_only_unknown(
        batches in proptest::collection::vec(
            (
                proptest::sample::subsequence(ALPHABET.to_vec(), 0..ALPHABET.len()),
                proptest::sample::subsequence(vec!["R1", "R2", "R3", "R4"], 0..4),
            ),
            1..8,
        )
    ) {
        let engine = traversal_engine(batches.clone());
        let mut known: BTreeSet<String> = BTreeSet::from(["root".to_string()]);
        runtime().block_on(async {
            engine.get_instance("root", InstanceCategory::Entity).await.unwrap();
            for (entities, relationships) in &batches {
                let before = engine.current_generation();
                let fresh: BTreeSet<String> = entities
                    .iter()
                    .chain(relationships.iter())
                    .map(|s| (*s).to_string())
                    .filter(|s| !known.contains(s))
                    .collect();

                let outcome = engine
                    .traversal("root", 1, TraversalFilter::unfiltered())
                    .await
                    .unwrap();

                if fresh.is_empty() {
                    assert_eq!(outcome, MergeOutcome::Unchanged);
                    assert_eq!(engine.current_generation(), before);
                } else {
                    assert_eq!(outcome, MergeOutcome::Extended(before.next()));
                    let generation = engine.generation(before.next()).unwrap();
                    let added: BTreeSet<String> =
                        generation.guids().map(ToString::to_string).collect();
                    assert_eq!(added, fresh);
                }
                known.extend(fresh);
                engine.snapshot().check_invariants().unwrap();
            }
        });
        prop_assert_eq!(engine.known_count(), known.len());
    }

    #[test]
    fn prop_undo_is_inverse_of_commit(ids in guid_sequence()) {
        let engine = retrieval_engine();
        let mut indexes: Vec<BTreeMap<Guid, GenerationIndex>> = vec![BTreeMap::new()];
        runtime().block_on(async {
            for id in &ids {
                let outcome = engine.get_instance(id, InstanceCategory::Entity).await.unwrap();
                if outcome.generation().is_some() {
                    indexes.push(engine.snapshot().guid_index().clone());
                }
            }
        });

        while let Some(expected) = indexes.pop() {
            let state = engine.snapshot();
            prop_assert_eq!(state.guid_index(), &expected);
            prop_assert_eq!(state.current_generation().get() as usize, indexes.len());
            prop_assert!(state.check_invariants().is_ok());
            engine.undo().unwrap();
        }
        prop_assert!(engine.snapshot().is_empty());
        prop_assert_eq!(engine.undo().unwrap(), None);
    }

    #[test]
    fn prop_clear_is_idempotent(ids in guid_sequence()) {
        let engine = retrieval_engine();
        runtime().block_on(async {
            for id in &ids {
                engine.get_instance(id, InstanceCategory::Entity).await.unwrap();
            }
        });

        engine.clear();
        let once = engine.snapshot();
        engine.clear();
        prop_assert_eq!(&engine.snapshot(), &once);
        prop_assert!(once.is_empty());
        prop_assert_eq!(once.current_generation(), GenerationIndex::NONE);
    }
}
