//! Advertisement domain module (ads, ad events, selection policy).
//!
//! Counter increments and the rolling dedup window are enforced atomically at
//! the storage layer; this crate defines the entities and the client-facing
//! selection policy.

pub mod ad;
pub mod selection;

pub use ad::{dedup_window, Ad, AdEvent, AdEventKind};
pub use selection::select_ad;
