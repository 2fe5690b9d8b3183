//! # Relaycast Engine
//!
//! The sequential, paced dispatch loop and everything feeding it.
//!
//! ## Architecture
//! ```text
//! RecipientResolver → (per unit) TemplateRenderer → DispatchPacer
//!     → ChannelSender → ledger.mark_result → ledger.recompute
//!
//! RetryOrchestrator re-enters at the pacer stage with the ledger's
//! failed set instead of the resolver's output.
//! ```
//!
//! One campaign pass runs strictly sequentially under a per-campaign
//! lock; the pacer's jittered delay is the only backpressure mechanism.

pub mod dispatcher;
pub mod pacer;
pub mod resolver;
pub mod retry;
pub mod template;

pub use dispatcher::{CancelToken, DispatchEngine};
pub use pacer::{JitterPacer, NoDelayPacer, Pacer};
pub use resolver::{RecipientSource, Selection, SourceEntity, resolve_entities, resolve_selection};
pub use template::render;
