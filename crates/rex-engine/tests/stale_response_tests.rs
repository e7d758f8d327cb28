use pretty_assertions::assert_eq;
use rex_engine::{ExplorationEngine, ExplorerConfig, MergeOutcome};
use rex_gateway::{GatewayError, GatewayOperation};
use rex_test_utils::{
    engine_over, entity_response, guid, other_server, search_response, traversal_response,
    GatewayScript, RecordingObserver, ScriptedGateway,
};
use rex_types::{GenerationIndex, InstanceCategory, TraversalFilter};
use std::sync::Arc;

fn scripted() -> (Arc<ExplorationEngine>, GatewayScript, Arc<RecordingObserver>) {
    let (gateway, script) = ScriptedGateway::new();
    let engine = Arc::new(engine_over(Arc::new(gateway), ExplorerConfig::default()));
    let observer = RecordingObserver::new();
    engine.subscribe(observer.clone());
    (engine, script, observer)
}

/// Retrieve `id` through the script and wait for the commit
async fn retrieve(engine: &Arc<ExplorationEngine>, script: &mut GatewayScript, id: &str) {
    let task = {
        let engine = Arc::clone(engine);
        let id = id.to_string();
        tokio::spawn(async move { engine.get_instance(&id, InstanceCategory::Entity).await })
    };
    script.next_call().await.reply_entity(entity_response(id, id));
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_response_after_clear_is_discarded() {
    let (engine, mut script, observer) = scripted();
    let task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.get_instance("E1", InstanceCategory::Entity).await })
    };

    let call = script.next_call().await;
    assert_eq!(call.operation, GatewayOperation::FetchEntity);
    engine.clear();
    call.reply_entity(entity_response("E1", "Customer"));

    assert_eq!(task.await.unwrap().unwrap(), MergeOutcome::Discarded);
    assert!(engine.snapshot().is_empty());
    assert_eq!(engine.focus_guid(), None);
    assert_eq!(observer.names(), vec!["graphCleared"]);
}

#[tokio::test]
async fn test_response_after_server_switch_is_discarded() {
    let (engine, mut script, observer) = scripted();
    retrieve(&engine, &mut script, "E1").await;
    let task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .traversal("E1", 1, TraversalFilter::unfiltered())
                .await
        })
    };

    let call = script.next_call().await;
    engine.connect(other_server()).unwrap();
    call.reply_traversal(traversal_response(&["E2"], &[("R1", "E1", "E2")]));

    assert_eq!(task.await.unwrap().unwrap(), MergeOutcome::Discarded);
    assert!(engine.snapshot().is_empty());
    assert_eq!(observer.names().last(), Some(&"graphCleared"));
}

#[tokio::test]
async fn test_stale_failure_is_silent() {
    let (engine, mut script, observer) = scripted();
    let task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.get_instance("E1", InstanceCategory::Entity).await })
    };

    let call = script.next_call().await;
    engine.clear();
    observer.take();
    call.fail(GatewayError::Transport("connection reset".into()));

    assert_eq!(task.await.unwrap().unwrap(), MergeOutcome::Discarded);
    assert!(observer.events().is_empty());
}

#[tokio::test]
async fn test_out_of_order_responses_both_apply_without_duplicates() {
    let (engine, mut script, _) = scripted();
    retrieve(&engine, &mut script, "E1").await;

    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .traversal("E1", 1, TraversalFilter::unfiltered())
                .await
        })
    };
    let first_call = script.next_call().await;
    let second = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .traversal("E1", 2, TraversalFilter::unfiltered())
                .await
        })
    };
    let second_call = script.next_call().await;

    // The later request answers first.
    second_call.reply_traversal(traversal_response(
        &["E1", "E2", "E3"],
        &[("R1", "E1", "E2"), ("R2", "E2", "E3")],
    ));
    assert_eq!(
        second.await.unwrap().unwrap(),
        MergeOutcome::Extended(GenerationIndex::new(2))
    );

    first_call.reply_traversal(traversal_response(
        &["E1", "E2", "E4"],
        &[("R1", "E1", "E2"), ("R3", "E1", "E4")],
    ));
    assert_eq!(
        first.await.unwrap().unwrap(),
        MergeOutcome::Extended(GenerationIndex::new(3))
    );

    let state = engine.snapshot();
    state.check_invariants().unwrap();
    assert_eq!(state.known_count(), 7);
    let third = state.generation(GenerationIndex::new(3)).unwrap();
    assert_eq!(
        third.guids().cloned().collect::<Vec<_>>(),
        vec![guid("E4"), guid("R3")]
    );
}

#[tokio::test]
async fn test_in_flight_traversal_survives_undo() {
    let (engine, mut script, _) = scripted();
    retrieve(&engine, &mut script, "E1").await;
    retrieve(&engine, &mut script, "E2").await;

    let task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .traversal("E2", 1, TraversalFilter::unfiltered())
                .await
        })
    };
    let call = script.next_call().await;
    engine.undo().unwrap();
    call.reply_traversal(traversal_response(&["E2", "E3"], &[("R1", "E2", "E3")]));

    // Undo does not supersede requests; the merge dedups against live state.
    assert_eq!(
        task.await.unwrap().unwrap(),
        MergeOutcome::Extended(GenerationIndex::new(2))
    );
    let state = engine.snapshot();
    state.check_invariants().unwrap();
    assert_eq!(state.generation_of(&guid("E2")), Some(GenerationIndex::new(2)));
}

#[tokio::test]
async fn test_search_results_from_superseded_session_are_not_committed() {
    let (engine, mut script, observer) = scripted();
    let task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .search(InstanceCategory::Entity, "Cust.*", None)
                .await
        })
    };
    script
        .next_call()
        .await
        .reply_search(search_response(&["E1", "E2"]));
    let results = task.await.unwrap().unwrap().unwrap();

    engine.clear();
    observer.take();

    let outcome = engine.commit_search_selection(results.select_all()).await;
    assert_eq!(outcome, MergeOutcome::Discarded);
    assert!(engine.snapshot().is_empty());
    assert!(observer.events().is_empty());
    assert!(script.try_next_call().is_none());
}

#[tokio::test]
async fn test_concurrent_retrievals_serialize_merges() {
    let (engine, mut script, _) = scripted();
    let tasks: Vec<_> = ["E1", "E2", "E1", "E3", "E2"]
        .into_iter()
        .map(|id| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.get_instance(id, InstanceCategory::Entity).await })
        })
        .collect();

    let mut calls = Vec::new();
    for _ in 0..tasks.len() {
        calls.push(script.next_call().await);
    }
    for call in calls.into_iter().rev() {
        let subject = call.subject.clone();
        call.reply_entity(entity_response(&subject, &subject));
    }
    let results = futures::future::join_all(tasks).await;
    assert!(results.into_iter().all(|r| r.unwrap().is_ok()));

    let state = engine.snapshot();
    state.check_invariants().unwrap();
    assert_eq!(state.known_count(), 3);
    assert_eq!(state.current_generation(), GenerationIndex::new(3));
}
