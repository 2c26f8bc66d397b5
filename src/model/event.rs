//! Hydrated output events and their two views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::commit::OpAction;

/// The core output of the hydrator: a lexicon-typed record enriched with
/// resolved actor/reference data, in two views.
///
/// `seq` is only set for firehose-sourced events; bulk-pull and
/// rehydration events leave it `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydratedEvent {
    /// Lexicon type identifier, e.g. `app.bsky.feed.post`.
    #[serde(rename = "Type")]
    pub event_type: String,
    /// When the record itself claims to have been created.
    #[serde(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
    /// Wall-clock time hydration happened.
    #[serde(rename = "PulledTimestamp")]
    pub pulled_timestamp: DateTime<Utc>,
    /// What happened to the record (firehose only).
    #[serde(rename = "Action", skip_serializing_if = "Option::is_none")]
    pub action: Option<OpAction>,
    /// Monotonic sequence number within the firehose subscription
    /// (firehose only). The canonical written field name is `Seq`,
    /// matching the column-store schema; the file sink's resume reader
    /// additionally accepts the legacy `_Seq` spelling on read.
    #[serde(rename = "Seq", skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
    /// Complete decoded record plus resolved actor/reference objects,
    /// field names preserved from the wire form.
    #[serde(rename = "Full")]
    pub full: Full,
    /// Flat, stable-named subset suitable for a tabular store.
    #[serde(rename = "Projection")]
    pub projection: Projection,
}

/// The generic, wire-shaped view: the decoded record's own fields plus
/// underscored enrichment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Full {
    /// Fields from the decoded record, names preserved from the wire
    /// form.
    #[serde(flatten)]
    pub record: Map<String, Value>,
    /// The actor's DID.
    #[serde(rename = "_ActorDid", skip_serializing_if = "Option::is_none")]
    pub actor_did: Option<String>,
    /// The actor's resolved identity, as a JSON object.
    #[serde(rename = "_ActorIdentity", skip_serializing_if = "Option::is_none")]
    pub actor_identity: Option<Value>,
    /// The actor's resolved profile, as a JSON object.
    #[serde(rename = "_ActorProfile", skip_serializing_if = "Option::is_none")]
    pub actor_profile: Option<Value>,
    /// The liked post, for `like` records.
    #[serde(rename = "_LikedPost", skip_serializing_if = "Option::is_none")]
    pub liked_post: Option<Value>,
    /// The reposted post, for `repost` records.
    #[serde(rename = "_RepostedPost", skip_serializing_if = "Option::is_none")]
    pub reposted_post: Option<Value>,
    /// The blocked actor's profile, for `block` records.
    #[serde(rename = "_BlockedProfile", skip_serializing_if = "Option::is_none")]
    pub blocked_profile: Option<Value>,
    /// The followed actor's profile, for `follow` records.
    #[serde(rename = "_FollowedProfile", skip_serializing_if = "Option::is_none")]
    pub followed_profile: Option<Value>,
}

impl Full {
    /// An empty `Full` view over a raw decoded record, with every
    /// enrichment slot unset.
    #[must_use]
    pub fn new(record: Map<String, Value>) -> Self {
        Self {
            record,
            actor_did: None,
            actor_identity: None,
            actor_profile: None,
            liked_post: None,
            reposted_post: None,
            blocked_profile: None,
            followed_profile: None,
        }
    }
}

/// The flat, stable-named view. Unused subtrees are
/// absent, never null, so a consumer can distinguish "not applicable to
/// this lexicon type" from "lookup failed".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Projection {
    /// The event's own actor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,
    /// Present for `app.bsky.feed.post`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Post>,
    /// Present for `app.bsky.feed.like`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked_post: Option<LikedOrRepostedPost>,
    /// Present for `app.bsky.feed.repost`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reposted_post: Option<LikedOrRepostedPost>,
    /// Present for `app.bsky.graph.block`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_profile: Option<BlockedOrFollowedProfile>,
    /// Present for `app.bsky.graph.follow`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followed_profile: Option<BlockedOrFollowedProfile>,
    /// Present for `app.bsky.actor.profile`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

/// An actor as it appears inline in a projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The actor's DID.
    #[serde(rename = "DID")]
    pub did: String,
    /// The actor's handle.
    #[serde(rename = "Handle")]
    pub handle: String,
    /// The actor's DID-document public key, if extraction succeeded.
    #[serde(rename = "DIDKey", skip_serializing_if = "Option::is_none")]
    pub did_key: Option<String>,
    /// The personal data server hosting the actor's repository.
    #[serde(rename = "PDS")]
    pub pds: String,
}

/// Flattened `app.bsky.feed.post` projection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Post {
    /// Post body text.
    #[serde(rename = "Text")]
    pub text: String,
    /// When the record claims it was created.
    #[serde(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
    /// BCP-47 language tags.
    #[serde(rename = "Langs")]
    pub langs: Vec<String>,
    /// CID of the immediate reply parent, omitted if the reply reference
    /// is missing.
    #[serde(rename = "ReplyParentCID", skip_serializing_if = "Option::is_none")]
    pub reply_parent_cid: Option<String>,
    /// Flattened embed, if any.
    #[serde(rename = "Embed", skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
    /// Hashtags extracted from facets, in order of appearance.
    #[serde(rename = "Hashtags")]
    pub hashtags: Vec<String>,
    /// URLs extracted from facets, in order of appearance.
    #[serde(rename = "URLs")]
    pub urls: Vec<String>,
}

/// Flattened `like`/`repost` target: the referenced post plus its
/// author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikedOrRepostedPost {
    /// The referenced post's author.
    #[serde(rename = "Author")]
    pub author: Actor,
    /// Content hash of the referenced post.
    #[serde(rename = "CID")]
    pub cid: String,
    /// URI of the referenced post.
    #[serde(rename = "URI")]
    pub uri: String,
    /// When the referenced post claims it was created.
    #[serde(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
    /// Referenced post's text.
    #[serde(rename = "Text")]
    pub text: String,
    /// Referenced post's language tags.
    #[serde(rename = "Langs")]
    pub langs: Vec<String>,
    /// Referenced post's like count at resolution time.
    #[serde(rename = "LikeCount", skip_serializing_if = "Option::is_none")]
    pub like_count: Option<i64>,
    /// Referenced post's repost count at resolution time.
    #[serde(rename = "RepostCount", skip_serializing_if = "Option::is_none")]
    pub repost_count: Option<i64>,
    /// Referenced post's extracted hashtags.
    #[serde(rename = "Hashtags")]
    pub hashtags: Vec<String>,
    /// Referenced post's extracted URLs.
    #[serde(rename = "URLs")]
    pub urls: Vec<String>,
    /// Referenced post's flattened embed, if any.
    #[serde(rename = "Embed", skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
}

/// Flattened `block`/`follow` subject profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedOrFollowedProfile {
    /// The subject actor's DID.
    #[serde(rename = "DID")]
    pub did: String,
    /// The subject actor's handle.
    #[serde(rename = "Handle")]
    pub handle: String,
    /// Display name.
    #[serde(rename = "DisplayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Avatar reference.
    #[serde(rename = "Avatar", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Description ("bio").
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Follower count.
    #[serde(rename = "FollowersCount", skip_serializing_if = "Option::is_none")]
    pub followers_count: Option<i64>,
    /// Following count.
    #[serde(rename = "FollowsCount", skip_serializing_if = "Option::is_none")]
    pub follows_count: Option<i64>,
    /// Post count.
    #[serde(rename = "PostsCount", skip_serializing_if = "Option::is_none")]
    pub posts_count: Option<i64>,
    /// When the indexer last observed this actor.
    #[serde(rename = "IndexedAt", skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
}

/// Flattened `app.bsky.actor.profile` projection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    /// Display name.
    #[serde(rename = "DisplayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Description ("bio").
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Flattened embed: exactly one of the four subtrees is
/// ever populated, matching the three-way (plus record-with-media) tag
/// on the raw embed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Embed {
    /// External link card.
    #[serde(rename = "External", skip_serializing_if = "Option::is_none")]
    pub external: Option<EmbedExternal>,
    /// Image set.
    #[serde(rename = "Images", skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<EmbedImage>>,
    /// Referenced record.
    #[serde(rename = "Record", skip_serializing_if = "Option::is_none")]
    pub record: Option<EmbedRecord>,
    /// Media accompanying a record reference.
    #[serde(
        rename = "EmbedRecordMedia",
        skip_serializing_if = "Option::is_none"
    )]
    pub embed_record_media: Option<Vec<EmbedImage>>,
}

/// Flattened external-link embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedExternal {
    /// Link URI.
    #[serde(rename = "URI")]
    pub uri: String,
    /// Link title.
    #[serde(rename = "Title")]
    pub title: Option<String>,
    /// Link description.
    #[serde(rename = "Description")]
    pub description: Option<String>,
}

/// Flattened embedded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedImage {
    /// Alt text.
    #[serde(rename = "Alt")]
    pub alt: Option<String>,
    /// Reference to the underlying blob.
    #[serde(rename = "BlobLink")]
    pub blob_link: Option<String>,
    /// MIME type of the blob.
    #[serde(rename = "MimeType")]
    pub mime_type: Option<String>,
    /// Pixel width, if known.
    #[serde(rename = "Width")]
    pub width: Option<u32>,
    /// Pixel height, if known.
    #[serde(rename = "Height")]
    pub height: Option<u32>,
}

/// Flattened record-reference embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedRecord {
    /// Content hash of the referenced record.
    #[serde(rename = "CID")]
    pub cid: String,
    /// URI of the referenced record.
    #[serde(rename = "URI")]
    pub uri: String,
    /// Lexicon type of the referenced record, if known.
    #[serde(rename = "Type", skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_view_round_trips_through_json() {
        let mut record = Map::new();
        record.insert("text".to_owned(), Value::String("hello world".to_owned()));
        let mut full = Full::new(record);
        full.actor_did = Some("did:plc:abc123".to_owned());

        let encoded = serde_json::to_value(&full).unwrap();
        assert_eq!(encoded["text"], "hello world");
        assert_eq!(encoded["_ActorDid"], "did:plc:abc123");
        assert!(encoded.get("_LikedPost").is_none());
    }

    #[test]
    fn event_seq_is_omitted_for_non_firehose_sources() {
        let event = HydratedEvent {
            event_type: "app.bsky.feed.post".to_owned(),
            created_at: Utc::now(),
            pulled_timestamp: Utc::now(),
            action: None,
            seq: None,
            full: Full::new(Map::new()),
            projection: Projection::default(),
        };
        let encoded = serde_json::to_value(&event).unwrap();
        assert!(encoded.get("Seq").is_none());
        assert!(encoded.get("Action").is_none());
    }
}
