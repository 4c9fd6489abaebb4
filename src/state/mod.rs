/*!
 * Resumable processing state.
 *
 * - `models`: the persisted `ProcessingState` document and its status
 * - `tracker`: the `ProgressTracker` state machine and resume logic
 */

pub mod models;
pub mod tracker;

pub use models::{ProcessingState, ProcessingStatus};
pub use tracker::{ProgressTracker, ResumePoint};
