/*!
 * Tests for the persisted processing state and its tracker
 */

use archivist::errors::StateError;
use archivist::state::{ProcessingState, ProcessingStatus, ProgressTracker, ResumePoint};
use archivist::transcript::TranscriptLoader;

use crate::common;

#[test]
fn test_open_noStateFile_shouldPersistPendingState() {
    let temp_dir = common::create_temp_dir().unwrap();
    let export = common::write_sample_export(temp_dir.path(), "dump.json").unwrap();
    let state_file = temp_dir.path().join("state/processing_state.json");

    let tracker = ProgressTracker::open(&state_file, &export).unwrap();

    assert!(state_file.exists());
    assert_eq!(tracker.state().status, ProcessingStatus::Pending);
    assert_eq!(tracker.state().chat_export_path, export);
    assert_eq!(tracker.state_file(), state_file.as_path());
}

#[test]
fn test_recordProgress_reopen_shouldSurviveRestart() {
    let temp_dir = common::create_temp_dir().unwrap();
    let export = common::write_sample_export(temp_dir.path(), "dump.json").unwrap();
    let state_file = temp_dir.path().join("state.json");

    {
        let mut tracker = ProgressTracker::open(&state_file, &export).unwrap();
        tracker.begin_run().unwrap();
        tracker.record_progress(1).unwrap();
        tracker.record_progress(2).unwrap();
        // dropped without finish, as if the process was killed
    }

    let tracker = ProgressTracker::open(&state_file, &export).unwrap();
    assert_eq!(tracker.state().last_processed_message_id, 2);
    assert_eq!(tracker.state().total_messages_processed, 2);
    assert_eq!(tracker.state().status, ProcessingStatus::InProgress);
    assert!(tracker.state().start_time.is_some());
    assert!(tracker.state().end_time.is_none());
}

#[test]
fn test_finish_failure_shouldRecordEndTime() {
    let temp_dir = common::create_temp_dir().unwrap();
    let export = common::write_sample_export(temp_dir.path(), "dump.json").unwrap();
    let state_file = temp_dir.path().join("state.json");
    let mut tracker = ProgressTracker::open(&state_file, &export).unwrap();

    tracker.begin_run().unwrap();
    tracker.finish(false).unwrap();

    let stored = ProcessingState::load(&state_file).unwrap().unwrap();
    assert_eq!(stored.status, ProcessingStatus::Failed);
    assert!(stored.end_time.is_some());
    assert!(stored.end_time >= stored.start_time);
}

#[test]
fn test_beginRun_afterFinish_shouldKeepStartTimeAndClearEndTime() {
    let temp_dir = common::create_temp_dir().unwrap();
    let export = common::write_sample_export(temp_dir.path(), "dump.json").unwrap();
    let mut tracker = ProgressTracker::open(temp_dir.path().join("state.json"), &export).unwrap();

    tracker.begin_run().unwrap();
    let first_start = tracker.state().start_time;
    tracker.finish(true).unwrap();
    tracker.begin_run().unwrap();

    assert_eq!(tracker.state().start_time, first_start);
    assert!(tracker.state().end_time.is_none());
    assert_eq!(tracker.state().status, ProcessingStatus::InProgress);
}

#[test]
fn test_open_otherExport_shouldConflictWithoutWriting() {
    let temp_dir = common::create_temp_dir().unwrap();
    let first = common::write_sample_export(temp_dir.path(), "first.json").unwrap();
    let second = common::write_sample_export(temp_dir.path(), "second.json").unwrap();
    let state_file = temp_dir.path().join("state.json");
    let mut tracker = ProgressTracker::open(&state_file, &first).unwrap();
    tracker.begin_run().unwrap();
    tracker.record_progress(3).unwrap();
    let before = std::fs::read_to_string(&state_file).unwrap();

    let result = ProgressTracker::open(&state_file, &second);

    match result {
        Err(StateError::Conflict { stored, requested }) => {
            assert_eq!(stored, first);
            assert_eq!(requested, second);
        }
        other => panic!("expected a conflict, got {:?}", other),
    }
    assert_eq!(std::fs::read_to_string(&state_file).unwrap(), before);
}

#[test]
fn test_rebind_otherExport_shouldStartOver() {
    let temp_dir = common::create_temp_dir().unwrap();
    let first = common::write_sample_export(temp_dir.path(), "first.json").unwrap();
    let second = common::write_sample_export(temp_dir.path(), "second.json").unwrap();
    let state_file = temp_dir.path().join("state.json");
    let mut tracker = ProgressTracker::open(&state_file, &first).unwrap();
    tracker.begin_run().unwrap();
    tracker.record_progress(3).unwrap();
    tracker.set_metadata("chat_name", "Weekend plans");
    tracker.finish(true).unwrap();

    let tracker = ProgressTracker::rebind(&state_file, &second).unwrap();

    let stored = ProcessingState::load(&state_file).unwrap().unwrap();
    assert_eq!(stored, *tracker.state());
    assert_eq!(stored.chat_export_path, second);
    assert_eq!(stored.last_processed_message_id, 0);
    assert_eq!(stored.status, ProcessingStatus::Pending);
    assert!(stored.metadata.is_empty());
}

#[test]
fn test_reset_shouldKeepBoundExport() {
    let temp_dir = common::create_temp_dir().unwrap();
    let export = common::write_sample_export(temp_dir.path(), "dump.json").unwrap();
    let state_file = temp_dir.path().join("state.json");
    let mut tracker = ProgressTracker::open(&state_file, &export).unwrap();
    tracker.begin_run().unwrap();
    tracker.record_progress(4).unwrap();

    tracker.reset().unwrap();

    let reloaded = ProgressTracker::load_existing(&state_file).unwrap().unwrap();
    assert_eq!(reloaded.state().chat_export_path, export);
    assert_eq!(reloaded.state().last_processed_message_id, 0);
    assert_eq!(reloaded.state().total_messages_processed, 0);
    assert!(reloaded.state().start_time.is_none());
    assert_eq!(reloaded.state().status, ProcessingStatus::Pending);
}

#[test]
fn test_loadExisting_noFile_shouldReturnNone() {
    let temp_dir = common::create_temp_dir().unwrap();

    let tracker = ProgressTracker::load_existing(temp_dir.path().join("state.json")).unwrap();

    assert!(tracker.is_none());
}

#[test]
fn test_setMetadata_shouldPersistWithNextTransition() {
    let temp_dir = common::create_temp_dir().unwrap();
    let export = common::write_sample_export(temp_dir.path(), "dump.json").unwrap();
    let state_file = temp_dir.path().join("state.json");
    let mut tracker = ProgressTracker::open(&state_file, &export).unwrap();

    tracker.set_metadata("chat_name", "Weekend plans");
    assert!(ProcessingState::load(&state_file).unwrap().unwrap().metadata.is_empty());

    tracker.begin_run().unwrap();
    let stored = ProcessingState::load(&state_file).unwrap().unwrap();
    assert_eq!(stored.metadata.get("chat_name").map(String::as_str), Some("Weekend plans"));
}

#[test]
fn test_resumePoint_againstSampleExport_shouldFollowStoredId() {
    let temp_dir = common::create_temp_dir().unwrap();
    let export = common::write_sample_export(temp_dir.path(), "dump.json").unwrap();
    let transcript = TranscriptLoader::new(&export)
        .load_and_validate()
        .unwrap()
        .into_transcript()
        .unwrap();
    let mut tracker = ProgressTracker::open(temp_dir.path().join("state.json"), &export).unwrap();

    assert_eq!(tracker.resume_point(&transcript), ResumePoint::Fresh);

    tracker.begin_run().unwrap();
    tracker.record_progress(5).unwrap();
    let resume = tracker.resume_point(&transcript);
    assert_eq!(resume, ResumePoint::After { index: 4, id: 5 });
    assert_eq!(resume.start_index(), 5);

    tracker.record_progress(77).unwrap();
    let resume = tracker.resume_point(&transcript);
    assert_eq!(resume, ResumePoint::Mismatch { missing_id: 77 });
    assert_eq!(resume.start_index(), 0);
}

#[test]
fn test_load_negativeId_shouldBeTreatedAsMissing() {
    let temp_dir = common::create_temp_dir().unwrap();
    let state_file = common::create_test_file(
        temp_dir.path(),
        "state.json",
        r#"{"chat_export_path": "dump.json", "last_processed_message_id": -3, "status": "in_progress"}"#,
    )
    .unwrap();

    assert!(ProcessingState::load(&state_file).unwrap().is_none());
    assert!(state_file.exists());
}

#[test]
fn test_load_minimalDocument_shouldFillDefaults() {
    let temp_dir = common::create_temp_dir().unwrap();
    let state_file = common::create_test_file(
        temp_dir.path(),
        "state.json",
        r#"{"chat_export_path": "dump.json"}"#,
    )
    .unwrap();

    let state = ProcessingState::load(&state_file).unwrap().unwrap();

    assert_eq!(state, ProcessingState::new("dump.json"));
}

#[test]
fn test_processingState_display_shouldSummarize() {
    let mut state = ProcessingState::new("data/dump.json");
    state.status = ProcessingStatus::Completed;
    state.last_processed_message_id = 7;
    state.total_messages_processed = 7;

    assert_eq!(
        state.to_string(),
        "data/dump.json [completed] last processed id 7, 7 messages processed"
    );
}
