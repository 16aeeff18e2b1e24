//! Music playback synchronization
//!
//! - [`request`]: start requests and the single-slot mailbox
//! - [`slot`]: the currently governing sound plus its timing
//! - [`starter`]: resolves requests into aligned, playing slots (music start thread)
//! - [`reconciler`]: per-frame publication of the song position
//! - [`engine`]: the [`MusicSync`] service tying them together

pub mod engine;
pub mod reconciler;
pub mod request;
pub mod shared;
pub mod slot;
pub mod starter;

pub use engine::MusicSync;
pub use reconciler::{ReconcileOutcome, SyncReconciler};
pub use request::{PlayMusicOptions, StartRequest, StartRequestQueue};
pub use shared::{SyncShared, SyncState};
pub use slot::{PlaybackSlot, SlotPhase};
pub use starter::{MusicStarter, StartOutcome};
