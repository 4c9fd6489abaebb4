/*!
 * Resumable transcript scanning.
 *
 * - `processor`: the per-message work seam and its implementations
 * - `driver`: the scan loop, resume handling and failure policy
 */

pub mod driver;
pub mod processor;

pub use driver::{ScanDriver, ScanReport};
pub use processor::{BackendProcessor, MessageProcessor, NoopProcessor};
