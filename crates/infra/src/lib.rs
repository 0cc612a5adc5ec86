//! Infrastructure layer: storage backends and the request-scoped services
//! that coordinate them.
//!
//! Every external entry point (attachment call, webhook delivery, ad event)
//! is handled statelessly; all cross-request coordination happens through
//! conditional writes inside the stores, never through shared in-process
//! state.

pub mod ad_events;
pub mod attachment;
pub mod clicks;
pub mod ledger;
pub mod store;


pub use ad_events::{AdEventRecorder, AdRedirectError, ViewerMeta};
pub use attachment::{AttachmentError, ReferralAttachmentService};
pub use clicks::ClickRecorder;
pub use ledger::{CheckoutNotification, EarningsLedger, LedgerError, LedgerOutcome};
pub use store::{AdStore, ClickStore, EarningsStore, ProfileStore, StoreError};
