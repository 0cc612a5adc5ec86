//! Tracing, logging, metrics (shared setup).

pub mod tracing;

pub use self::tracing::init;
