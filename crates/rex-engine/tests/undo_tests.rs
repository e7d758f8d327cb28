use pretty_assertions::assert_eq;
use rex_engine::{ExplorationEngine, ExplorationEvent, ExplorerConfig, ValidationError};
use rex_test_utils::{guid, sample_engine, RecordingObserver};
use rex_types::{GenerationIndex, InstanceCategory, TraversalFilter};
use std::sync::Arc;

/// T1 in generation 1, its neighbourhood in generation 2
async fn explored(config: ExplorerConfig) -> (ExplorationEngine, Arc<RecordingObserver>) {
    let (engine, _) = sample_engine(config);
    engine.get_instance("T1", InstanceCategory::Entity).await.unwrap();
    engine
        .traversal("T1", 1, TraversalFilter::unfiltered())
        .await
        .unwrap();
    let observer = RecordingObserver::new();
    engine.subscribe(observer.clone());
    (engine, observer)
}

#[tokio::test]
async fn test_begin_undo_announces_without_mutating() {
    let (engine, observer) = explored(ExplorerConfig::default()).await;
    let before = engine.snapshot();

    let announced = engine.begin_undo().unwrap();

    assert_eq!(announced, Some(GenerationIndex::new(2)));
    assert_eq!(engine.snapshot(), before);
    match observer.events().as_slice() {
        [ExplorationEvent::GraphBeingReduced { generation }] => {
            assert_eq!(generation.index, GenerationIndex::new(2));
            assert!(generation.entities.contains_key(&guid("G1")));
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn test_two_phase_undo_events() {
    let (engine, observer) = explored(ExplorerConfig::default()).await;

    engine.begin_undo().unwrap();
    engine.commit_undo().unwrap();

    assert_eq!(observer.names(), vec!["graphBeingReduced", "graphReduced"]);
    assert_eq!(engine.current_generation(), GenerationIndex::FIRST);
    assert!(!engine.contains(&guid("G1")));
    assert_eq!(engine.focus_guid(), Some(guid("T1")));
    engine.snapshot().check_invariants().unwrap();
}

#[tokio::test]
async fn test_commit_without_begin_still_announces() {
    let (engine, observer) = explored(ExplorerConfig::default()).await;

    engine.commit_undo().unwrap();

    assert_eq!(observer.names(), vec!["graphBeingReduced", "graphReduced"]);
}

#[tokio::test]
async fn test_commit_after_intervening_commit_removes_actual_top() {
    let (engine, observer) = explored(ExplorerConfig::default()).await;

    assert_eq!(engine.begin_undo().unwrap(), Some(GenerationIndex::new(2)));
    engine.get_instance("T2", InstanceCategory::Entity).await.unwrap();
    observer.take();

    let removed = engine.commit_undo().unwrap();

    assert_eq!(removed, Some(GenerationIndex::new(3)));
    assert_eq!(
        observer.names(),
        vec!["graphBeingReduced", "focusCleared", "graphReduced"]
    );
    assert_eq!(engine.current_generation(), GenerationIndex::new(2));
}

#[tokio::test]
async fn test_undo_clears_focus_from_removed_generation() {
    let (engine, observer) = explored(ExplorerConfig::default()).await;
    engine.get_instance("G1", InstanceCategory::Entity).await.unwrap();
    assert_eq!(engine.focus_guid(), Some(guid("G1")));
    observer.take();

    engine.undo().unwrap();

    assert_eq!(engine.focus_guid(), None);
    assert_eq!(
        observer.names(),
        vec!["graphBeingReduced", "focusCleared", "graphReduced"]
    );
}

#[tokio::test]
async fn test_undo_to_empty_then_underflow_is_noop() {
    let (engine, observer) = explored(ExplorerConfig::default()).await;

    assert_eq!(engine.undo().unwrap(), Some(GenerationIndex::new(2)));
    assert_eq!(engine.undo().unwrap(), Some(GenerationIndex::FIRST));
    assert!(engine.snapshot().is_empty());
    assert_eq!(engine.focus_guid(), None);
    observer.take();

    assert_eq!(engine.undo().unwrap(), None);
    assert_eq!(engine.begin_undo().unwrap(), None);
    assert_eq!(engine.commit_undo().unwrap(), None);
    assert_eq!(engine.current_generation(), GenerationIndex::NONE);
    assert!(observer.events().is_empty());
}

#[tokio::test]
async fn test_underflow_rejected_when_configured() {
    let (engine, _) = sample_engine(ExplorerConfig::new().with_reject_empty_undo(true));

    assert_eq!(engine.undo().unwrap_err(), ValidationError::EmptyUndo);
    assert_eq!(engine.commit_undo().unwrap_err(), ValidationError::EmptyUndo);
    assert!(engine.snapshot().is_empty());
}

#[tokio::test]
async fn test_undo_restores_previous_index() {
    let (engine, _) = sample_engine(ExplorerConfig::default());
    engine.get_instance("T1", InstanceCategory::Entity).await.unwrap();
    let after_first = engine.snapshot();
    engine
        .traversal("T1", 1, TraversalFilter::unfiltered())
        .await
        .unwrap();

    engine.undo().unwrap();

    let state = engine.snapshot();
    assert_eq!(state.guid_index(), after_first.guid_index());
    assert_eq!(state.generations(), after_first.generations());
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let (engine, observer) = explored(ExplorerConfig::default()).await;

    engine.clear();
    let once = engine.snapshot();
    engine.clear();
    let twice = engine.snapshot();

    assert_eq!(once, twice);
    assert!(twice.is_empty());
    assert!(twice.focus().is_none());
    assert_eq!(observer.names(), vec!["graphCleared", "graphCleared"]);
    assert_eq!(engine.undo().unwrap(), None);
}
