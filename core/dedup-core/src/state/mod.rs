//! Per-tab lifecycle state.
//!
//! The store is the only mutable structure shared between event handlers. It
//! is touched from the single event-processing context, so it carries no
//! locking; every handler mutates it before handing work to the host.
//!
//! - [`types`]: the tracked record kept for each tab
//! - [`store`]: the keyed store plus per-window duplicate counts

mod store;
mod types;

pub use store::TabStateStore;
pub use types::TrackedTab;
