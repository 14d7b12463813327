//! End-to-end batch scenarios over in-memory collaborators

mod common;

use atlas_ingest::classifier::{MockClassifier, MockReply};
use atlas_ingest::config::PostAction;
use atlas_ingest::graph::{property, NodeId};
use atlas_ingest::pipeline::{CancellationToken, EvaluationStatus, RunReport};
use atlas_ingest::storage::{GraphStore, VectorIndex};
use common::{classification, not_similar, refinement, similar, Harness};
use serde_json::json;

const TRANSISTOR_TEXT: &str = "A transistor is a semiconductor device used to amplify or switch electrical signals.";

fn transistor_classifier() -> MockClassifier {
    MockClassifier::new()
        .with_reply(
            "handleChoice",
            MockReply::Tool(classification("Transistor", "Knowledge", 0.9)),
        )
        .with_reply("refineNodeSubTypes", refinement(&[]))
}

#[tokio::test]
async fn transistor_is_written_once_with_layer_and_subtype_labels() {
    let h = Harness::new(transistor_classifier());
    h.documents
        .insert_article("wiki/transistor.json", "Transistor", TRANSISTOR_TEXT);

    let report = h.runner().run("", &CancellationToken::new()).await.unwrap();

    assert_eq!(report.files_processed, 1);
    assert_eq!(report.nodes_added, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.subtype_counts.get("Knowledge"), Some(&1));

    let nodes = h.graph.nodes();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].labels, vec!["L1", "Knowledge"]);
    assert_eq!(nodes[0].id, NodeId::for_provenance("wiki/transistor.json"));
    assert!(nodes[0].embedding().is_some());
    assert_eq!(h.vectors.upserts(), 1);
    assert!(h.vectors.contains(&nodes[0].id).await.unwrap());

    let persisted = RunReport::load(&h.report_path()).unwrap();
    assert_eq!(persisted.nodes_added, 1);
}

#[tokio::test]
async fn rejected_documents_write_nothing() {
    let classifier = MockClassifier::new()
        .with_reply(
            "handleChoice",
            MockReply::Tool(classification("List of lists", "None", 0.95)),
        )
        .with_reply_for(
            "handleChoice",
            "Title: Rumour",
            MockReply::Tool(json!({
                "nodeType": "L2",
                "nodeSubtype": "Knowledge",
                "properties": {"name": "Rumour"},
                "confidenceScore": 0.9,
                "reasoning": "not notable",
                "shouldAdd": false
            })),
        );
    let h = Harness::new(classifier);
    h.documents.insert_article("a.json", "List of lists", "This is a list.");
    h.documents.insert_article("b.json", "Rumour", "Something someone said.");

    let report = h.runner().run("", &CancellationToken::new()).await.unwrap();

    assert_eq!(report.rejected, 2);
    assert_eq!(report.nodes_added, 0);
    assert_eq!(h.graph.node_count().await.unwrap(), 0);
    assert_eq!(h.vectors.upserts(), 0);
    assert_eq!(h.classifier.calls("refineNodeSubTypes"), 0);
    assert_eq!(h.sink.with_status(EvaluationStatus::Rejected).len(), 2);
}

#[tokio::test]
async fn second_run_over_same_document_is_a_duplicate() {
    let h = Harness::new(transistor_classifier().with_reply("assessSimilarity", similar(0.97)));
    h.documents
        .insert_article("wiki/transistor.json", "Transistor", TRANSISTOR_TEXT);

    let first = h.runner().run("", &CancellationToken::new()).await.unwrap();
    assert_eq!(first.nodes_added, 1);
    assert_eq!(h.classifier.calls("assessSimilarity"), 0);

    let second = h.runner().run("", &CancellationToken::new()).await.unwrap();
    assert_eq!(second.nodes_added, 0);
    assert_eq!(second.skipped_duplicates, 1);
    assert_eq!(second.review_needed, 1);
    assert_eq!(h.graph.node_count().await.unwrap(), 1);
    assert_eq!(h.vectors.upserts(), 1);

    let reviews = h.sink.with_status(EvaluationStatus::Duplicate);
    assert_eq!(reviews.len(), 1);
    let classification = reviews[0].classification.as_ref().unwrap();
    assert!(!classification.should_add);
    assert!(classification.reasoning.contains("Similar to existing node"));
    assert_eq!(reviews[0].candidates[0].llm_verified, Some(true));
}

#[tokio::test]
async fn rejected_adjudication_does_not_block_the_write() {
    let classifier = transistor_classifier().with_reply("assessSimilarity", not_similar());
    let h = Harness::new(classifier);
    h.documents.insert_article("a.json", "Transistor", TRANSISTOR_TEXT);
    h.documents
        .insert_article("b.json", "Transistor (band)", "Transistor is a rock band from Ohio.");

    let report = h.runner().run("", &CancellationToken::new()).await.unwrap();

    // the band shares the name, so the exact graph match is adjudicated
    assert!(h.classifier.calls("assessSimilarity") >= 1);
    assert_eq!(report.nodes_added, 2);
    assert_eq!(report.skipped_duplicates, 0);
}

#[tokio::test]
async fn malformed_replies_fail_one_document_and_the_batch_continues() {
    let classifier = transistor_classifier().with_reply_for(
        "handleChoice",
        "Title: Broken",
        MockReply::Text("I think this is about electronics.".into()),
    );
    let h = Harness::new(classifier);
    h.documents.insert_article("a_broken.json", "Broken", "Garbled text.");
    h.documents.insert_article("b_transistor.json", "Transistor", TRANSISTOR_TEXT);

    let report = h.runner().run("", &CancellationToken::new()).await.unwrap();

    assert_eq!(report.files_processed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.nodes_added, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].filename, "a_broken.json");
    assert!(report.failures[0].error.contains("classification error"));
    // three attempts for the broken document, one for the transistor
    assert_eq!(h.classifier.calls("handleChoice"), 4);
}

#[tokio::test]
async fn refinements_follow_layer_and_subtype() {
    let classifier = MockClassifier::new()
        .with_reply(
            "handleChoice",
            MockReply::Tool(classification("Industrial Revolution", "Knowledge", 0.92)),
        )
        .with_reply("refineNodeSubTypes", refinement(&["History"]));
    let h = Harness::new(classifier);
    h.documents.insert_article(
        "ir.json",
        "Industrial Revolution",
        "The Industrial Revolution was the transition to new manufacturing processes.",
    );

    h.runner().run("", &CancellationToken::new()).await.unwrap();

    let nodes = h.graph.nodes();
    assert_eq!(nodes[0].labels, vec!["L1", "Knowledge", "History"]);
}

#[tokio::test]
async fn ai_generated_is_forced_on_written_nodes() {
    let mut args = classification("Transistor", "Knowledge", 0.9);
    args["properties"]["aiGenerated"] = json!(false);
    let classifier = MockClassifier::new()
        .with_reply("handleChoice", MockReply::Tool(args))
        .with_reply("refineNodeSubTypes", refinement(&[]));
    let h = Harness::new(classifier);
    h.documents.insert_article("t.json", "Transistor", TRANSISTOR_TEXT);

    h.runner().run("", &CancellationToken::new()).await.unwrap();

    let node = &h.graph.nodes()[0];
    assert!(node.is_ai_generated());
    assert_eq!(node.properties.get(property::AI_GENERATED), Some(&json!(true)));
    assert_eq!(node.provenance(), Some("t.json"));
}

fn linked_classifier() -> MockClassifier {
    let mut transistor = classification("Transistor", "Knowledge", 0.9);
    transistor["relationships"] = json!([
        {"type": "used in", "targetNodeName": "Radio", "properties": {"since": 1954}}
    ]);
    MockClassifier::new()
        .with_reply_for("handleChoice", "Title: Transistor", MockReply::Tool(transistor))
        .with_reply_for(
            "handleChoice",
            "Title: Radio",
            MockReply::Tool(classification("Radio", "Knowledge", 0.9)),
        )
        .with_reply("refineNodeSubTypes", refinement(&[]))
        .with_reply("assessSimilarity", not_similar())
}

#[tokio::test]
async fn missing_targets_are_linked_by_the_retry_pass() {
    let h = Harness::new(linked_classifier());
    h.documents.insert_article("a_transistor.json", "Transistor", TRANSISTOR_TEXT);
    h.documents
        .insert_article("b_radio.json", "Radio", "Radio is communication by radio waves.");

    let report = h.runner().run("", &CancellationToken::new()).await.unwrap();

    assert_eq!(report.nodes_added, 2);
    assert_eq!(report.relationships_created, 1);
    assert_eq!(report.missing_relationship_targets, 0);

    let relationships = h.graph.relationships();
    assert_eq!(relationships.len(), 1);
    assert_eq!(relationships[0].rel_type, "USED_IN");
    assert_eq!(relationships[0].source, NodeId::for_provenance("a_transistor.json"));
    assert_eq!(relationships[0].target, NodeId::for_provenance("b_radio.json"));
    assert_eq!(relationships[0].properties.get("since"), Some(&json!(1954)));
}

#[tokio::test]
async fn missing_targets_are_counted_without_the_retry_pass() {
    let mut h = Harness::new(linked_classifier());
    h.config.runner.retry_missing_relationships = false;
    h.documents.insert_article("a_transistor.json", "Transistor", TRANSISTOR_TEXT);
    h.documents
        .insert_article("b_radio.json", "Radio", "Radio is communication by radio waves.");

    let report = h.runner().run("", &CancellationToken::new()).await.unwrap();

    assert_eq!(report.nodes_added, 2);
    assert_eq!(report.relationships_created, 0);
    assert_eq!(report.missing_relationship_targets, 1);
    assert!(h.graph.relationships().is_empty());
}

#[tokio::test]
async fn partial_commit_is_reported_and_healed_on_rerun() {
    let h = Harness::new(transistor_classifier().with_reply("assessSimilarity", similar(0.97)));
    h.documents.insert_article("t.json", "Transistor", TRANSISTOR_TEXT);
    let id = NodeId::for_provenance("t.json");

    h.vectors.set_failing(true);
    let first = h.runner().run("", &CancellationToken::new()).await.unwrap();
    assert_eq!(first.nodes_added, 1);
    assert_eq!(first.partial_commits, 1);
    assert!(h.graph.get_node(&id).await.unwrap().is_some());
    assert!(!h.vectors.contains(&id).await.unwrap());

    h.vectors.set_failing(false);
    let second = h.runner().run("", &CancellationToken::new()).await.unwrap();
    assert_eq!(second.nodes_added, 0);
    assert_eq!(second.already_present, 1);
    assert_eq!(second.partial_commits, 0);
    assert_eq!(second.skipped_duplicates, 0);
    assert!(h.vectors.contains(&id).await.unwrap());
    assert_eq!(h.graph.node_count().await.unwrap(), 1);
}

#[tokio::test]
async fn confidence_bands_route_to_reject_and_review() {
    let classifier = MockClassifier::new()
        .with_reply_for(
            "handleChoice",
            "Title: Vague",
            MockReply::Tool(classification("Vague", "Knowledge", 0.5)),
        )
        .with_reply_for(
            "handleChoice",
            "Title: Unsure",
            MockReply::Tool(classification("Unsure", "Skill", 0.8)),
        );
    let h = Harness::new(classifier);
    h.documents.insert_article("a.json", "Vague", "Hard to say.");
    h.documents.insert_article("b.json", "Unsure", "Could be a skill.");

    let report = h.runner().run("", &CancellationToken::new()).await.unwrap();

    assert_eq!(report.rejected, 1);
    assert_eq!(report.review_needed, 1);
    assert_eq!(report.nodes_added, 0);
    assert!((report.average_confidence - 0.65).abs() < 1e-9);
    assert_eq!(h.sink.with_status(EvaluationStatus::NeedsReview).len(), 1);
    assert_eq!(h.graph.node_count().await.unwrap(), 0);
}

#[tokio::test]
async fn archive_then_delete_applies_only_to_clean_documents() {
    let mut h = Harness::new(transistor_classifier());
    h.config.documents.post_action = PostAction::ArchiveThenDelete;
    h.documents.insert_article("t.json", "Transistor", TRANSISTOR_TEXT);
    h.documents.insert_raw("bad.json", b"{not json".to_vec());
    h.documents.insert_raw("empty.json", Vec::new());
    h.documents.insert_container("nested/");

    let report = h.runner().run("", &CancellationToken::new()).await.unwrap();

    assert_eq!(report.files_processed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.post_action_failures, 0);
    assert_eq!(h.documents.archived_keys(), vec!["t.json"]);
    assert!(!h.documents.contains("t.json"));
    assert!(h.documents.contains("bad.json"));
}

#[tokio::test]
async fn cancelled_run_still_writes_a_partial_report() {
    let h = Harness::new(transistor_classifier());
    h.documents.insert_article("t.json", "Transistor", TRANSISTOR_TEXT);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = h.runner().run("", &cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.files_processed, 0);
    assert!(h.classifier.requests().is_empty());
    let persisted = RunReport::load(&h.report_path()).unwrap();
    assert!(persisted.cancelled);
}

#[tokio::test]
async fn cancelling_during_the_write_still_reports_the_node() {
    let h = Harness::new(transistor_classifier());
    h.documents.insert_article("t.json", "Transistor", TRANSISTOR_TEXT);
    let cancel = CancellationToken::new();
    h.vectors.cancel_on_upsert(cancel.clone());

    let report = h.runner().run("", &cancel).await.unwrap();

    let id = NodeId::for_provenance("t.json");
    assert!(report.cancelled);
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.nodes_added, 1);
    assert_eq!(report.partial_commits, 0);
    assert!(h.graph.get_node(&id).await.unwrap().is_some());
    assert!(h.vectors.contains(&id).await.unwrap());
}

#[tokio::test]
async fn cancelling_during_a_failed_mirror_reports_the_partial_commit() {
    let h = Harness::new(transistor_classifier());
    h.documents.insert_article("t.json", "Transistor", TRANSISTOR_TEXT);
    let cancel = CancellationToken::new();
    h.vectors.cancel_on_upsert(cancel.clone());
    h.vectors.set_failing(true);

    let report = h.runner().run("", &cancel).await.unwrap();

    let id = NodeId::for_provenance("t.json");
    assert!(report.cancelled);
    assert_eq!(report.nodes_added, 1);
    assert_eq!(report.partial_commits, 1);
    assert!(h.graph.get_node(&id).await.unwrap().is_some());
    assert!(!h.vectors.contains(&id).await.unwrap());
    let persisted = RunReport::load(&h.report_path()).unwrap();
    assert_eq!(persisted.partial_commits, 1);
}

#[tokio::test]
async fn unwritable_report_path_still_returns_the_counts() {
    let mut h = Harness::new(transistor_classifier());
    h.documents.insert_article("t.json", "Transistor", TRANSISTOR_TEXT);
    let dir = h.report_path().parent().unwrap().to_path_buf();
    h.config.report.path = dir;

    let report = h.runner().run("", &CancellationToken::new()).await.unwrap();

    assert_eq!(report.files_processed, 1);
    assert_eq!(report.nodes_added, 1);
    assert!(report.persist_error.is_some());
    assert!(report.summary().contains("Report not saved"));
    assert_eq!(h.graph.node_count().await.unwrap(), 1);
}

#[tokio::test]
async fn paged_listing_covers_every_document() {
    let classifier = MockClassifier::new()
        .with_reply(
            "handleChoice",
            MockReply::Tool(classification("Anything", "None", 0.9)),
        );
    let mut h = Harness::new(classifier);
    h.config.runner.concurrency = 3;
    let documents = atlas_ingest::document::MemoryDocumentStore::new().with_page_size(2);
    for i in 0..5 {
        documents.insert_article(&format!("doc{}.json", i), "Anything", "text");
    }
    h.documents = std::sync::Arc::new(documents);

    let report = h.runner().run("doc", &CancellationToken::new()).await.unwrap();

    assert_eq!(report.files_processed, 5);
    assert_eq!(report.rejected, 5);
}
