//! Typed and open-ended repository records.
//!
//! The wire records are open-ended and keyed by a lexicon type string.
//! We model the known shapes as a closed sum with an `Other` fallback
//! branch rather than an open string-indexed registry, because the
//! known shapes are few and fixed and a closed enum gives exhaustiveness
//! checking at every dispatch site in `hydrator`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A reference to another record by URI and content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    /// `at://` style URI of the referenced record.
    pub uri: String,
    /// Content hash of the referenced record.
    pub cid: String,
}

/// A reply reference on a post. The parent is the only piece the
/// hydrator projects (`ReplyParentCID`); `root` is kept here because it
/// is present on the wire and belongs in `Full`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    /// Reference to the thread root.
    pub root: StrongRef,
    /// Reference to the immediate parent.
    pub parent: StrongRef,
}

/// A single facet feature: a hashtag or a link, matched by discriminant
/// tag in the raw facet feature array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FacetFeature {
    /// A `#tag` feature.
    Tag {
        /// The tag text, without the leading `#`.
        tag: String,
    },
    /// A link feature.
    Link {
        /// The linked URI.
        uri: String,
    },
}

/// One facet: a byte range plus the features found there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    /// Features attached to this facet's range.
    pub features: Vec<FacetFeature>,
}

/// Raw embed payload, still tagged by its `$type` discriminant. Flattened
/// into `model::event::Embed` by `hydrator::embed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum RawEmbed {
    /// External link card.
    #[serde(rename = "app.bsky.embed.external")]
    External {
        /// Link URI.
        uri: String,
        /// Link title.
        title: Option<String>,
        /// Link description.
        description: Option<String>,
    },
    /// A set of images.
    #[serde(rename = "app.bsky.embed.images")]
    Images {
        /// The images in the set.
        images: Vec<RawEmbedImage>,
    },
    /// A reference to another record (e.g. a quote post).
    #[serde(rename = "app.bsky.embed.record")]
    Record {
        /// The referenced record.
        record: StrongRef,
    },
    /// A record reference plus accompanying media.
    #[serde(rename = "app.bsky.embed.recordWithMedia")]
    RecordWithMedia {
        /// The referenced record.
        record: StrongRef,
        /// The accompanying images.
        media: Vec<RawEmbedImage>,
    },
    /// Any variant not recognized above. Flattens to an empty map, never
    /// an error.
    #[serde(other)]
    Unknown,
}

/// One image within an embed image set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEmbedImage {
    /// Alt text.
    pub alt: Option<String>,
    /// Reference to the underlying blob.
    pub blob_link: Option<String>,
    /// MIME type of the blob.
    pub mime_type: Option<String>,
    /// Pixel width, if known.
    pub width: Option<u32>,
    /// Pixel height, if known.
    pub height: Option<u32>,
}

/// `app.bsky.feed.post`-shaped record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    /// Post body text.
    pub text: String,
    /// When the record claims it was created.
    pub created_at: DateTime<Utc>,
    /// BCP-47 language tags.
    #[serde(default)]
    pub langs: Vec<String>,
    /// Reply reference, if this post is a reply.
    pub reply: Option<ReplyRef>,
    /// Raw embed payload, if any.
    pub embed: Option<RawEmbed>,
    /// Rich-text facets (hashtags, links).
    #[serde(default)]
    pub facets: Vec<Facet>,
}

/// `app.bsky.feed.like` / `app.bsky.feed.repost`-shaped record: a
/// reference to the liked/reposted subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    /// The liked or reposted post.
    pub subject: StrongRef,
    /// When the record claims it was created.
    pub created_at: DateTime<Utc>,
}

/// `app.bsky.graph.follow` / `app.bsky.graph.block`-shaped record: a
/// reference to the subject actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorSubjectRecord {
    /// The followed or blocked actor's DID.
    pub subject: String,
    /// When the record claims it was created.
    pub created_at: DateTime<Utc>,
}

/// `app.bsky.actor.profile`-shaped record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    /// Display name.
    pub display_name: Option<String>,
    /// Description ("bio").
    pub description: Option<String>,
}

/// A typed repository record, discriminated by lexicon type id.
///
/// `Other` is the fallback branch: any lexicon type we don't special-case
/// still decodes (into a generic JSON map) rather than erroring, so an
/// unrecognized collection still produces a minimal hydrated event.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// `app.bsky.feed.post`.
    Post(PostRecord),
    /// `app.bsky.feed.like`.
    Like(SubjectRecord),
    /// `app.bsky.feed.repost`.
    Repost(SubjectRecord),
    /// `app.bsky.graph.follow`.
    Follow(ActorSubjectRecord),
    /// `app.bsky.graph.block`.
    Block(ActorSubjectRecord),
    /// `app.bsky.actor.profile`.
    Profile(ProfileRecord),
    /// Any other lexicon type, kept as a generic JSON object.
    Other(Map<String, Value>),
}

impl Record {
    /// Decode a generic JSON value into a [`Record`], dispatching on its
    /// `$type` field. Unrecognized or malformed typed payloads fall back
    /// to [`Record::Other`] rather than failing: a single record's decode
    /// failure must never abort the run.
    #[must_use]
    pub fn from_value(lexicon_type: &str, value: &Value) -> Self {
        let decode = || -> Option<Record> {
            match lexicon_type {
                "app.bsky.feed.post" => {
                    serde_json::from_value(value.clone()).ok().map(Record::Post)
                }
                "app.bsky.feed.like" => {
                    serde_json::from_value(value.clone()).ok().map(Record::Like)
                }
                "app.bsky.feed.repost" => serde_json::from_value(value.clone())
                    .ok()
                    .map(Record::Repost),
                "app.bsky.graph.follow" => serde_json::from_value(value.clone())
                    .ok()
                    .map(Record::Follow),
                "app.bsky.graph.block" => serde_json::from_value(value.clone())
                    .ok()
                    .map(Record::Block),
                "app.bsky.actor.profile" => serde_json::from_value(value.clone())
                    .ok()
                    .map(Record::Profile),
                _ => None,
            }
        };

        decode().unwrap_or_else(|| Record::Other(as_object(value)))
    }
}

fn as_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_owned(), other.clone());
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unrecognized_lexicon_type_falls_back_to_other() {
        let value = json!({"foo": "bar"});
        let record = Record::from_value("com.example.unknown", &value);
        assert!(matches!(record, Record::Other(_)));
    }

    #[test]
    fn malformed_known_type_falls_back_to_other() {
        let value = json!({"nonsense": true});
        let record = Record::from_value("app.bsky.feed.post", &value);
        assert!(matches!(record, Record::Other(_)));
    }

    #[test]
    fn well_formed_post_decodes() {
        let value = json!({
            "text": "hello world",
            "createdAt": "2024-01-02T03:04:05Z",
            "langs": ["en"],
        });
        let record = Record::from_value("app.bsky.feed.post", &value);
        match record {
            Record::Post(post) => assert_eq!(post.text, "hello world"),
            other => panic!("expected Post, got {other:?}"),
        }
    }
}
