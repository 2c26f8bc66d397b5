//! Shared data model.

/// Repository deltas: commits and their operations.
pub mod commit;
/// Per-endpoint resume cursors and bulk-pull intermediate state.
pub mod cursor;
/// Hydrated output events and their two views (`Full`/`Projection`).
pub mod event;
/// Actors: identity and profile.
pub mod identity;
/// Typed and open-ended repository records.
pub mod record;

pub use commit::{Commit, OpAction, Operation};
pub use cursor::{CensusEntry, Cursor, IntermediateState};
pub use event::{
    Actor, BlockedOrFollowedProfile, Embed, EmbedExternal, EmbedImage, EmbedRecord, Full,
    HydratedEvent, LikedOrRepostedPost, Post, Profile as ProjectionProfile, Projection,
};
pub use identity::{Did, Handle, Identity, Profile};
pub use record::Record;
