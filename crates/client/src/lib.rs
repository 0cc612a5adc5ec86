//! Embedded client-side support for the referral subsystem.
//!
//! Three concerns live here, all of them deliberately best-effort from the
//! embedding shell's point of view:
//!
//! - [`store::ReferralCodeStore`]: captures the `ref` query parameter from a
//!   visit URL into two redundant stores (a durable sqlite key/value store
//!   and a cookie the shell forwards on requests), so the code survives
//!   reloads and the clearing of either store.
//! - [`clicks::ClickReporter`]: fire-and-forget reporting of the raw click
//!   to the server-side recorder.
//! - [`impressions::ImpressionTracker`]: the per-session guard that keeps
//!   one rendered ad from being impression-logged more than once per page
//!   view. The server-side dedup window remains the authoritative guard.
//!
//! Ad selection for a placement is the shared policy re-exported as
//! [`select_ad`]; the shell applies it to the active-ads listing before
//! rendering.

pub mod clicks;
pub mod impressions;
pub mod store;

pub use clicks::ClickReporter;
pub use impressions::{ImpressionTracker, VISIBILITY_THRESHOLD};
pub use referly_ads::select_ad;
pub use store::{
    CookieJar, CookieReferenceStore, InMemoryCookieJar, ReferenceStore, ReferralCodeStore,
    SqliteReferenceStore,
};
