/*!
 * Tests for context windows over loaded transcripts
 */

use archivist::context::{ContextEngine, ContextExt, ContextWindowConfig};
use archivist::errors::ContextError;
use archivist::transcript::{Message, MessageId, Transcript, TranscriptLoader};
use chrono::NaiveDate;

use crate::common;

fn sample_transcript() -> Transcript {
    let temp_dir = common::create_temp_dir().unwrap();
    let path = common::write_sample_export(temp_dir.path(), "dump.json").unwrap();
    TranscriptLoader::new(&path)
        .load_and_validate()
        .unwrap()
        .into_transcript()
        .unwrap()
}

fn plain_messages(ids: &[MessageId]) -> Vec<Message> {
    let date = NaiveDate::from_ymd_opt(2023, 7, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    ids.iter()
        .map(|&id| Message::ordinary(id, date, format!("message {}", id)))
        .collect()
}

#[test]
fn test_iterateWithContext_everyMessage_shouldBeSortedAndUnique() {
    let transcript = sample_transcript();
    let engine = transcript.context_engine(ContextWindowConfig::default()).unwrap();

    let mut visited = 0;
    for (message, context) in engine.iterate_with_context() {
        let ids = context.ids();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]), "ids {:?}", ids);
        assert!(context.contains(message.id));
        assert_eq!(context.target_id(), message.id);
        visited += 1;
    }

    assert_eq!(visited, transcript.len());
}

#[test]
fn test_iterateWithContext_calledTwice_shouldStartOver() {
    let transcript = sample_transcript();
    let engine = transcript.context_engine(ContextWindowConfig::target_only()).unwrap();

    let first: Vec<_> = engine.iterate_with_context().map(|(m, _)| m.id).collect();
    let second: Vec<_> = engine.iterate_with_context().map(|(m, _)| m.id).collect();

    assert_eq!(first, vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(first, second);
    assert_eq!(engine.iterate_with_context().len(), 7);
}

#[test]
fn test_contextFor_replyChainDepthTwo_shouldReachGrandparent() {
    let transcript = sample_transcript();
    let engine = transcript
        .context_engine(ContextWindowConfig::new(0, 2, true))
        .unwrap();
    let target = transcript.get(7).unwrap();

    // 7 -> 5 -> 4 -> 3 -> 2, cut after two hops
    assert_eq!(engine.context_for(target).ids(), vec![4, 5, 7]);
}

#[test]
fn test_contextFor_excludeTarget_shouldKeepAncestorsAndNeighbors() {
    let transcript = sample_transcript();
    let engine = transcript
        .context_engine(ContextWindowConfig::new(1, 1, false))
        .unwrap();
    let target = transcript.get(4).unwrap();

    let context = engine.context_for(target);

    assert_eq!(context.ids(), vec![3, 5]);
    assert!(!context.contains(4));
}

#[test]
fn test_contextFor_serviceMessage_shouldNotFollowReplies() {
    let transcript = sample_transcript();
    let engine = transcript
        .context_engine(ContextWindowConfig::new(0, 5, true))
        .unwrap();

    assert_eq!(engine.context_for(transcript.get(1).unwrap()).ids(), vec![1]);
}

#[test]
fn test_contextFor_replyCycle_shouldStopAtDepth() {
    let mut messages = plain_messages(&[1, 2, 3]);
    messages[0] = messages[0].clone().replying_to(2);
    messages[1] = messages[1].clone().replying_to(1);
    let engine = ContextEngine::new(&messages, ContextWindowConfig::new(0, 10, true)).unwrap();

    assert_eq!(engine.context_for(&messages[0]).ids(), vec![1, 2]);
}

#[test]
fn test_contextFor_unknownParent_shouldStopChain() {
    let mut messages = plain_messages(&[10, 11, 12]);
    messages[2] = messages[2].clone().replying_to(999);
    let engine = ContextEngine::new(&messages, ContextWindowConfig::new(0, 3, true)).unwrap();

    assert_eq!(engine.context_for(&messages[2]).ids(), vec![12]);
}

#[test]
fn test_contextFor_targetFromOtherTranscript_shouldBeEmpty() {
    let messages = plain_messages(&[1, 2, 3]);
    let stranger = plain_messages(&[42]).remove(0);
    let engine = ContextEngine::new(&messages, ContextWindowConfig::default()).unwrap();

    let context = engine.context_for(&stranger);

    assert!(context.is_empty());
    assert_eq!(context.target_id(), 42);
}

#[test]
fn test_contextEngine_emptyTranscript_shouldYieldNothing() {
    let messages: Vec<Message> = Vec::new();
    let engine = ContextEngine::new(&messages, ContextWindowConfig::default()).unwrap();

    assert!(engine.is_empty());
    assert_eq!(engine.iterate_with_context().count(), 0);
}

#[test]
fn test_contextEngine_duplicateIds_shouldFail() {
    let messages = plain_messages(&[1, 2, 2]);

    let result = ContextEngine::new(&messages, ContextWindowConfig::default());

    assert_eq!(result.err(), Some(ContextError::DuplicateMessageId(2)));
}

#[test]
fn test_contextEngine_unsortedMessages_shouldFollowExportOrder() {
    let messages = plain_messages(&[5, 1, 9, 3]);
    let engine = ContextEngine::new(&messages, ContextWindowConfig::new(1, 0, true)).unwrap();

    assert!(!engine.is_sorted());
    // neighbors of 9 in export order are 1 and 3
    assert_eq!(engine.context_for(&messages[2]).ids(), vec![1, 3, 9]);
}

#[test]
fn test_render_sampleContext_shouldMarkTarget() {
    let transcript = sample_transcript();
    let engine = transcript
        .context_engine(ContextWindowConfig::new(0, 1, true))
        .unwrap();

    let rendered = engine.context_for(transcript.get(3).unwrap()).render();

    assert_eq!(
        rendered,
        "  [2] Alice: Anyone up for hiking on Saturday?\n> [3] Bob: Count me in"
    );
}

#[test]
fn test_contextEngine_forTranscript_shouldMatchFreshIndex() {
    let messages = plain_messages(&[5, 1, 9, 3])
        .into_iter()
        .map(|message| message.replying_to(1))
        .collect();
    let transcript = Transcript::new("unsorted", messages).unwrap();
    let config = ContextWindowConfig::new(1, 2, true);

    let borrowed = transcript.context_engine(config.clone()).unwrap();
    let fresh = ContextEngine::new(transcript.messages(), config).unwrap();

    assert_eq!(borrowed.is_sorted(), fresh.is_sorted());
    for message in transcript.messages() {
        assert_eq!(borrowed.context_for(message).ids(), fresh.context_for(message).ids());
    }
}
