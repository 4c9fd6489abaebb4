/*!
 * File-backed processing state machine.
 *
 * `ProgressTracker` owns the state for one run and persists it after every
 * transition. A transition is applied to a copy first and only becomes the
 * in-memory state once the copy is on disk, so the tracker never reports
 * progress that a crash could lose.
 */

use chrono::Utc;
use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::errors::StateError;
use crate::transcript::{MessageId, Transcript};

use super::models::{ProcessingState, ProcessingStatus};

/// Where a scan should start, given the stored state and the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    /// Nothing processed yet
    Fresh,
    /// Continue after the message at `index`
    After {
        /// Position of the last processed message
        index: usize,
        /// Its id
        id: MessageId,
    },
    /// The stored id is not part of this transcript
    Mismatch {
        /// Id recorded in the state but absent from the transcript
        missing_id: MessageId,
    },
}

impl ResumePoint {
    /// First transcript position still to be processed
    pub fn start_index(&self) -> usize {
        match self {
            ResumePoint::After { index, .. } => index + 1,
            ResumePoint::Fresh | ResumePoint::Mismatch { .. } => 0,
        }
    }
}

/// Processing state bound to a state file
#[derive(Debug)]
pub struct ProgressTracker {
    state_file: PathBuf,
    state: ProcessingState,
    /// Last id recorded during the current run
    run_last_id: Option<MessageId>,
}

impl ProgressTracker {
    /// Start transition: load the state for `transcript_path`, or create it.
    ///
    /// Fails with `StateError::Conflict` when the stored state belongs to
    /// another export. Nothing is written in that case.
    pub fn open(
        state_file: impl Into<PathBuf>,
        transcript_path: impl AsRef<Path>,
    ) -> Result<Self, StateError> {
        let state_file = state_file.into();
        let transcript_path = transcript_path.as_ref();

        match ProcessingState::load(&state_file)? {
            Some(state) if state.is_bound_to(transcript_path) => {
                info!(
                    "Resuming processing state for {} ({})",
                    transcript_path.display(),
                    state.status
                );
                Ok(Self::with_state(state_file, state))
            }
            Some(state) => Err(StateError::Conflict {
                stored: state.chat_export_path,
                requested: transcript_path.to_path_buf(),
            }),
            None => {
                info!("Creating new processing state for {}", transcript_path.display());
                let state = ProcessingState::new(transcript_path);
                state.save(&state_file)?;
                Ok(Self::with_state(state_file, state))
            }
        }
    }

    /// Reset whatever is stored and bind the state file to `transcript_path`
    pub fn rebind(
        state_file: impl Into<PathBuf>,
        transcript_path: impl AsRef<Path>,
    ) -> Result<Self, StateError> {
        let state_file = state_file.into();
        let transcript_path = transcript_path.as_ref();

        let mut state = ProcessingState::load(&state_file)?
            .unwrap_or_else(|| ProcessingState::new(transcript_path));
        state.reset();
        state.chat_export_path = transcript_path.to_path_buf();
        state.save(&state_file)?;

        info!(
            "Processing state {} rebound to {}",
            state_file.display(),
            transcript_path.display()
        );
        Ok(Self::with_state(state_file, state))
    }

    /// Tracker over an existing state file, whatever export it is bound to
    pub fn load_existing(state_file: impl Into<PathBuf>) -> Result<Option<Self>, StateError> {
        let state_file = state_file.into();
        Ok(ProcessingState::load(&state_file)?.map(|state| Self::with_state(state_file, state)))
    }

    fn with_state(state_file: PathBuf, state: ProcessingState) -> Self {
        Self {
            state_file,
            state,
            run_last_id: None,
        }
    }

    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Mark the run as started
    pub fn begin_run(&mut self) -> Result<(), StateError> {
        self.run_last_id = None;
        self.commit(|state| {
            state.status = ProcessingStatus::InProgress;
            if state.start_time.is_none() {
                state.start_time = Some(Utc::now());
            }
            state.end_time = None;
        })
    }

    /// Record `message_id` as processed. Returns once the change is on disk.
    pub fn record_progress(&mut self, message_id: MessageId) -> Result<(), StateError> {
        if let Some(previous) = self.run_last_id.filter(|&previous| message_id <= previous) {
            warn!(
                "Message {} recorded after message {}; the export is not sorted by id",
                message_id, previous
            );
        }

        self.commit(|state| {
            state.last_processed_message_id = message_id;
            state.total_messages_processed += 1;
            state.status = ProcessingStatus::InProgress;
        })?;
        self.run_last_id = Some(message_id);
        Ok(())
    }

    /// End the run as `completed` or `failed`
    pub fn finish(&mut self, success: bool) -> Result<(), StateError> {
        let status = if success {
            ProcessingStatus::Completed
        } else {
            ProcessingStatus::Failed
        };
        self.commit(|state| {
            state.status = status;
            state.end_time = Some(Utc::now());
        })?;
        info!(
            "Processing finished with status {}. Last processed message ID: {}",
            status, self.state.last_processed_message_id
        );
        Ok(())
    }

    /// Back to `pending`, keeping the bound export
    pub fn reset(&mut self) -> Result<(), StateError> {
        self.run_last_id = None;
        self.commit(ProcessingState::reset)
    }

    /// Set a metadata entry. It is persisted with the next transition.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.state.metadata.insert(key.into(), value.into());
    }

    /// Where a scan over `transcript` should start
    pub fn resume_point(&self, transcript: &Transcript) -> ResumePoint {
        let last_id = self.state.last_processed_message_id;
        if last_id <= 0 {
            return ResumePoint::Fresh;
        }

        match transcript.position_of(last_id) {
            Some(index) => ResumePoint::After { index, id: last_id },
            None => ResumePoint::Mismatch { missing_id: last_id },
        }
    }

    fn commit(&mut self, apply: impl FnOnce(&mut ProcessingState)) -> Result<(), StateError> {
        let mut next = self.state.clone();
        apply(&mut next);
        next.save(&self.state_file)?;
        self.state = next;
        Ok(())
    }
}
