/*!
 * Resumable scan over a chat export.
 *
 * The driver loads the transcript, finds the resume point in the stored
 * state, then walks the remaining messages one at a time: context, then
 * processing, then a durable progress record. A message is never counted
 * as processed before its progress record is on disk.
 *
 * A failed message is recorded only once the backend answers again, so a
 * failure streak that aborts the run leaves those messages for the next run.
 */

use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::fmt;
use std::path::Path;

use crate::context::{ContextExt, ContextWindowConfig};
use crate::errors::ScanError;
use crate::file_utils::FileManager;
use crate::state::{ProgressTracker, ResumePoint};
use crate::transcript::{MessageId, TranscriptLoader};

use super::processor::MessageProcessor;

// @const: metadata keys written during a scan
pub const META_EXPORT_SHA256: &str = "export_sha256";
pub const META_CHAT_NAME: &str = "chat_name";
pub const META_TOTAL_MESSAGES: &str = "total_messages";
pub const META_FAILED_EXTRACTIONS: &str = "failed_extractions";
pub const META_LAST_EXTRACTION_ERROR: &str = "last_extraction_error";
/// Comma-separated ids of messages recorded as processed although their extraction failed
pub const META_FAILED_MESSAGE_IDS: &str = "failed_message_ids";

/// Outcome of a scan run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Messages in the transcript
    pub total_messages: usize,
    /// Messages before the resume point
    pub skipped: usize,
    /// Messages processed during this run
    pub processed: usize,
    /// Messages whose processing failed during this run
    pub failed_extractions: usize,
    /// Id the run resumed after, if any
    pub resumed_after: Option<MessageId>,
    /// The stored progress did not match this transcript
    pub resume_mismatch: bool,
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} messages processed ({} skipped, {} failed extractions)",
            self.processed, self.total_messages, self.skipped, self.failed_extractions
        )?;
        if let Some(id) = self.resumed_after {
            write!(f, ", resumed after message {}", id)?;
        }
        if self.resume_mismatch {
            write!(f, ", restarted because the stored progress did not match")?;
        }
        Ok(())
    }
}

/// Walks a transcript with context, resuming from stored progress
pub struct ScanDriver<P: MessageProcessor> {
    context: ContextWindowConfig,
    processor: P,
    max_consecutive_failures: u32,
    show_progress: bool,
}

impl<P: MessageProcessor> ScanDriver<P> {
    pub fn new(context: ContextWindowConfig, processor: P) -> Self {
        Self {
            context,
            processor,
            max_consecutive_failures: 5,
            show_progress: false,
        }
    }

    /// Abort the run after this many processor failures in a row
    pub fn with_max_consecutive_failures(mut self, max_consecutive_failures: u32) -> Self {
        self.max_consecutive_failures = max_consecutive_failures.max(1);
        self
    }

    /// Draw a progress bar on stderr
    pub fn with_progress_bar(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Scan `transcript_path`, recording progress in `tracker`
    pub async fn run(
        &self,
        transcript_path: &Path,
        tracker: &mut ProgressTracker,
    ) -> Result<ScanReport, ScanError> {
        tracker.begin_run()?;

        let transcript = match TranscriptLoader::new(transcript_path)
            .load_and_validate()
            .map_err(ScanError::from)
            .and_then(|chat| chat.into_transcript().map_err(ScanError::from))
        {
            Ok(transcript) => transcript,
            Err(e) => return Err(fail_run(tracker, e)),
        };

        let engine = match transcript.context_engine(self.context.clone()) {
            Ok(engine) => engine,
            Err(e) => return Err(fail_run(tracker, e.into())),
        };

        self.record_export_metadata(transcript_path, transcript.name(), transcript.len(), tracker);

        let resume = tracker.resume_point(&transcript);
        let mut report = ScanReport {
            total_messages: transcript.len(),
            skipped: resume.start_index(),
            ..ScanReport::default()
        };
        match resume {
            ResumePoint::Fresh => info!("Starting analysis from the first message"),
            ResumePoint::After { id, .. } => {
                info!("Resuming processing after message ID: {}", id);
                report.resumed_after = Some(id);
            }
            ResumePoint::Mismatch { missing_id } => {
                warn!(
                    "Last processed message ID {} not found in {}. Starting from the first message; \
                     the stored ID is kept until new progress is recorded",
                    missing_id,
                    transcript_path.display()
                );
                report.resume_mismatch = true;
            }
        }

        let remaining = &transcript.messages()[report.skipped..];
        let progress_bar = self.progress_bar(remaining.len() as u64);
        let mut failed_total = tracker
            .state()
            .metadata
            .get(META_FAILED_EXTRACTIONS)
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0);
        // failed messages not yet recorded; they stay unrecorded if the run aborts
        let mut failure_streak: Vec<MessageId> = Vec::new();

        for message in remaining {
            let context = engine.context_for(message);

            match self.processor.process(message, &context).await {
                Ok(_) => {
                    for failed_id in std::mem::take(&mut failure_streak) {
                        self.commit_message(failed_id, true, tracker, &mut report, progress_bar.as_ref())?;
                    }
                    self.commit_message(message.id, false, tracker, &mut report, progress_bar.as_ref())?;
                }
                Err(e) => {
                    failed_total += 1;
                    report.failed_extractions += 1;
                    warn!("Extraction failed for message {}: {}", message.id, e);
                    tracker.set_metadata(META_FAILED_EXTRACTIONS, failed_total.to_string());
                    tracker.set_metadata(
                        META_LAST_EXTRACTION_ERROR,
                        format!("message {}: {}", message.id, e),
                    );
                    failure_streak.push(message.id);

                    let consecutive_failures = u32::try_from(failure_streak.len()).unwrap_or(u32::MAX);
                    if consecutive_failures >= self.max_consecutive_failures {
                        error!(
                            "Extraction backend failed {} times in a row, aborting the scan. \
                             Messages {:?} stay unprocessed and are retried on the next run",
                            consecutive_failures, failure_streak
                        );
                        if let Some(pb) = &progress_bar {
                            pb.abandon_with_message("backend unavailable");
                        }
                        return Err(fail_run(
                            tracker,
                            ScanError::BackendUnavailable { consecutive_failures },
                        ));
                    }
                }
            }
        }

        for failed_id in std::mem::take(&mut failure_streak) {
            self.commit_message(failed_id, true, tracker, &mut report, progress_bar.as_ref())?;
        }

        if let Some(pb) = &progress_bar {
            pb.finish_with_message("done");
        }
        tracker.finish(true)?;
        info!("Analysis complete: {}", report);
        Ok(report)
    }

    /// Durably record `message_id` as processed. A failed extraction is also
    /// listed under `META_FAILED_MESSAGE_IDS` in the same write.
    fn commit_message(
        &self,
        message_id: MessageId,
        extraction_failed: bool,
        tracker: &mut ProgressTracker,
        report: &mut ScanReport,
        progress_bar: Option<&ProgressBar>,
    ) -> Result<(), ScanError> {
        if extraction_failed {
            let failed_ids = match tracker.state().metadata.get(META_FAILED_MESSAGE_IDS) {
                Some(existing) if !existing.is_empty() => format!("{},{}", existing, message_id),
                _ => message_id.to_string(),
            };
            tracker.set_metadata(META_FAILED_MESSAGE_IDS, failed_ids);
        }

        if let Err(e) = tracker.record_progress(message_id) {
            if let Some(pb) = progress_bar {
                pb.abandon_with_message("state not saved");
            }
            return Err(fail_run(tracker, e.into()));
        }
        report.processed += 1;
        if let Some(pb) = progress_bar {
            pb.inc(1);
        }
        Ok(())
    }

    fn record_export_metadata(
        &self,
        transcript_path: &Path,
        chat_name: &str,
        total_messages: usize,
        tracker: &mut ProgressTracker,
    ) {
        match FileManager::hash_file(transcript_path) {
            Ok(hash) => {
                let previous = tracker.state().metadata.get(META_EXPORT_SHA256);
                if previous.is_some_and(|previous| previous != &hash) {
                    warn!(
                        "Chat export {} changed since the last run; resuming by message ID",
                        transcript_path.display()
                    );
                }
                tracker.set_metadata(META_EXPORT_SHA256, hash);
            }
            Err(e) => warn!("Could not hash chat export {}: {}", transcript_path.display(), e),
        }
        tracker.set_metadata(META_CHAT_NAME, chat_name);
        tracker.set_metadata(META_TOTAL_MESSAGES, total_messages.to_string());
    }

    fn progress_bar(&self, len: u64) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let progress_bar = ProgressBar::new(len);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} messages ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));
        Some(progress_bar)
    }
}

/// Mark the run failed and hand back the error that ended it
fn fail_run(tracker: &mut ProgressTracker, cause: ScanError) -> ScanError {
    error!("Analysis failed: {}", cause);
    if let Err(e) = tracker.finish(false) {
        error!("Could not record the failed run: {}", e);
    }
    cause
}
