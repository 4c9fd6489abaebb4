/*!
 * Context construction for per-message analysis.
 *
 * For every message of a transcript the engine computes the neighborhood
 * needed to interpret it: a positional window plus reply-chain ancestors.
 */

pub mod window;

pub use window::{ContextEngine, ContextExt, ContextIter, ContextWindowConfig, MessageContext};
