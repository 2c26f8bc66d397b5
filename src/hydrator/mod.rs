//! Enriches a record with actor identity/profile and type-specific
//! references, producing the `Full` and `Projection` views.

/// DID substring discovery, used by the bulk puller's DID-expansion mode.
pub mod discover;
/// Embed flattening.
pub mod embed;
/// Hashtag/URL extraction from post facets.
pub mod facets;

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::warn;

use crate::cache::{Cache, CachedValue};
use crate::http::HttpClient;
use crate::identity_resolver::IdentityResolver;
use crate::model::event::{
    Actor, BlockedOrFollowedProfile, Full, HydratedEvent, LikedOrRepostedPost, Post, Profile,
    Projection,
};
use crate::model::identity::{Identifier, Identity};
use crate::model::record::Record;

/// Stateless (beyond the shared cache) enrichment engine. Safe to share
/// across every worker in every acquisition mode.
#[derive(Debug, Clone)]
pub struct Hydrator {
    identity: Arc<IdentityResolver>,
    http: Arc<HttpClient>,
    cache: Arc<Cache>,
    public_endpoint: String,
}

impl Hydrator {
    /// Build a hydrator over a shared identity resolver, HTTP client,
    /// and cache.
    #[must_use]
    pub fn new(
        identity: Arc<IdentityResolver>,
        http: Arc<HttpClient>,
        cache: Arc<Cache>,
        public_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            http,
            cache,
            public_endpoint: public_endpoint.into(),
        }
    }

    /// `hydrate(record, actorDID) -> event`. Never fails catastrophically:
    /// reference lookup errors become null-valued subtrees with
    /// warning-level diagnostics.
    #[tracing::instrument(skip(self, record))]
    pub async fn hydrate(
        &self,
        lexicon_type: &str,
        record: &Record,
        raw_value: &Value,
        actor_did: &str,
    ) -> HydratedEvent {
        let pulled_timestamp = Utc::now();
        let created_at = extract_created_at(raw_value).unwrap_or(pulled_timestamp);

        let mut full = Full::new(as_object(raw_value));
        full.actor_did = Some(actor_did.to_owned());

        let mut projection = Projection::default();

        let identifier = match Identifier::parse(actor_did) {
            Ok(identifier) => Some(identifier),
            Err(err) => {
                warn!(%err, actor_did, "actor DID failed to parse; skipping identity/profile");
                None
            }
        };

        let identity = match &identifier {
            Some(identifier) => match self.identity.lookup(identifier).await {
                Ok(identity) => {
                    full.actor_identity = serde_json::to_value(&identity).ok();
                    projection.actor = Some(to_projection_actor(&identity));
                    Some(identity)
                }
                Err(err) => {
                    warn!(%err, actor_did, "identity lookup failed");
                    None
                }
            },
            None => None,
        };

        if let Some(identity) = &identity {
            match self.fetch_profile(&identity.handle.to_string()).await {
                Ok(profile) => full.actor_profile = serde_json::to_value(&profile).ok(),
                Err(err) => warn!(%err, actor_did, "profile lookup failed"),
            }
        }

        match record {
            Record::Post(post) => {
                let (hashtags, urls) = facets::extract_facets(&post.facets);
                let embed = post.embed.as_ref().map(embed::flatten_embed);
                let reply_parent_cid = post.reply.as_ref().map(|r| r.parent.cid.clone());

                projection.post = Some(Post {
                    text: post.text.clone(),
                    created_at: post.created_at,
                    langs: post.langs.clone(),
                    reply_parent_cid,
                    embed,
                    hashtags,
                    urls,
                });
            }
            Record::Like(subject) => {
                let resolved = self.resolve_post(&subject.subject.uri).await;
                full.liked_post = resolved.as_ref().and_then(|p| serde_json::to_value(p).ok());
                projection.liked_post = resolved;
            }
            Record::Repost(subject) => {
                let resolved = self.resolve_post(&subject.subject.uri).await;
                full.reposted_post = resolved.as_ref().and_then(|p| serde_json::to_value(p).ok());
                projection.reposted_post = resolved;
            }
            Record::Block(subject) => {
                let resolved = self.resolve_subject_profile(&subject.subject).await;
                full.blocked_profile = resolved.as_ref().and_then(|p| serde_json::to_value(p).ok());
                projection.blocked_profile = resolved;
            }
            Record::Follow(subject) => {
                let resolved = self.resolve_subject_profile(&subject.subject).await;
                full.followed_profile =
                    resolved.as_ref().and_then(|p| serde_json::to_value(p).ok());
                projection.followed_profile = resolved;
            }
            Record::Profile(profile_record) => {
                projection.profile = Some(Profile {
                    display_name: profile_record.display_name.clone(),
                    description: profile_record.description.clone(),
                });
            }
            Record::Other(_) => {}
        }

        HydratedEvent {
            event_type: lexicon_type.to_owned(),
            created_at,
            pulled_timestamp,
            action: None,
            seq: None,
            full,
            projection,
        }
    }

    async fn fetch_profile(
        &self,
        handle: &str,
    ) -> Result<crate::model::identity::Profile, crate::error::LookupError> {
        let key = Cache::key("profile", handle);
        if let Some(cached) = self.cache.get(&key).await {
            return match cached {
                CachedValue::Ok(value) => serde_json::from_value(value)
                    .map_err(|e| crate::error::LookupError::NonNetwork(e.to_string())),
                CachedValue::Err(message) => Err(crate::error::LookupError::NonNetwork(message)),
            };
        }

        let url = format!(
            "{}/xrpc/app.bsky.actor.getProfile?actor={handle}",
            self.public_endpoint
        );
        let result: Result<crate::model::identity::Profile, crate::error::LookupError> =
            self.http.get_json(&url).await;
        let cached_value = match &result {
            Ok(profile) => {
                CachedValue::Ok(serde_json::to_value(profile).unwrap_or(Value::Null))
            }
            Err(err) => CachedValue::Err(err.to_string()),
        };
        self.cache.put(key, cached_value).await;
        result
    }

    /// Resolve a liked/reposted post by URI into its projected shape.
    /// A null/failed subject resolves to `None`, never an error; the
    /// hydration continues regardless.
    async fn resolve_post(&self, uri: &str) -> Option<LikedOrRepostedPost> {
        let key = Cache::key("post", uri);

        let cached = self.cache.get(&key).await;
        let value = match cached {
            Some(CachedValue::Ok(value)) => Some(value),
            Some(CachedValue::Err(cached_error)) => {
                warn!(uri, %cached_error, "post lookup previously failed (negative cache hit)");
                return None;
            }
            None => {
                let url = format!("{}/xrpc/app.bsky.feed.getPosts?uris={uri}", self.public_endpoint);
                match self.http.get_json::<Value>(&url).await {
                    Ok(value) => {
                        self.cache
                            .put(key, CachedValue::Ok(value.clone()))
                            .await;
                        Some(value)
                    }
                    Err(err) => {
                        warn!(%err, uri, "post lookup failed");
                        self.cache.put(key, CachedValue::Err(err.to_string())).await;
                        None
                    }
                }
            }
        };

        value.and_then(|v| post_from_api_value(&v))
    }

    async fn resolve_subject_profile(&self, did: &str) -> Option<BlockedOrFollowedProfile> {
        let identifier = match Identifier::parse(did) {
            Ok(identifier) => identifier,
            Err(err) => {
                warn!(%err, did, "subject DID failed to parse");
                return None;
            }
        };

        let identity = match self.identity.lookup(&identifier).await {
            Ok(identity) => identity,
            Err(err) => {
                warn!(%err, did, "subject identity lookup failed");
                return None;
            }
        };

        match self.fetch_profile(identity.handle.as_str()).await {
            Ok(profile) => Some(BlockedOrFollowedProfile {
                did: identity.did.to_string(),
                handle: identity.handle.to_string(),
                display_name: profile.display_name,
                avatar: profile.avatar,
                description: profile.description,
                followers_count: profile.followers_count,
                follows_count: profile.follows_count,
                posts_count: profile.posts_count,
                indexed_at: profile.indexed_at,
            }),
            Err(err) => {
                warn!(%err, did, "subject profile lookup failed");
                Some(BlockedOrFollowedProfile {
                    did: identity.did.to_string(),
                    handle: identity.handle.to_string(),
                    display_name: None,
                    avatar: None,
                    description: None,
                    followers_count: None,
                    follows_count: None,
                    posts_count: None,
                    indexed_at: None,
                })
            }
        }
    }
}

fn to_projection_actor(identity: &Identity) -> Actor {
    Actor {
        did: identity.did.to_string(),
        handle: identity.handle.to_string(),
        did_key: identity.did_key.clone(),
        pds: identity.pds.clone(),
    }
}

fn extract_created_at(value: &Value) -> Option<chrono::DateTime<Utc>> {
    value
        .get("createdAt")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn as_object(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn post_from_api_value(value: &Value) -> Option<LikedOrRepostedPost> {
    let post = value.get("posts").and_then(|p| p.as_array()).and_then(|a| a.first())?;

    let author = post.get("author")?;
    let record = post.get("record")?;
    let parsed: Option<crate::model::record::PostRecord> =
        serde_json::from_value(record.clone()).ok();

    let (hashtags, urls) = parsed
        .as_ref()
        .map(|p| facets::extract_facets(&p.facets))
        .unwrap_or_default();
    let embed = parsed
        .as_ref()
        .and_then(|p| p.embed.as_ref())
        .map(embed::flatten_embed);
    let langs = parsed.as_ref().map(|p| p.langs.clone()).unwrap_or_default();

    Some(LikedOrRepostedPost {
        author: Actor {
            did: author.get("did")?.as_str()?.to_owned(),
            handle: author.get("handle")?.as_str()?.to_owned(),
            did_key: None,
            pds: String::new(),
        },
        cid: post.get("cid")?.as_str()?.to_owned(),
        uri: post.get("uri")?.as_str()?.to_owned(),
        created_at: parsed
            .as_ref()
            .map(|p| p.created_at)
            .or_else(|| {
                record
                    .get("createdAt")
                    .and_then(|v| v.as_str())
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
            })
            .unwrap_or_else(Utc::now),
        text: parsed.as_ref().map(|p| p.text.clone()).unwrap_or_else(|| {
            record
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_owned()
        }),
        langs,
        like_count: post.get("likeCount").and_then(serde_json::Value::as_i64),
        repost_count: post.get("repostCount").and_then(serde_json::Value::as_i64),
        hashtags,
        urls,
        embed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_created_at_parses_rfc3339() {
        let value = json!({"createdAt": "2024-01-02T03:04:05Z"});
        let created_at = extract_created_at(&value).unwrap();
        assert_eq!(created_at.to_rfc3339(), "2024-01-02T03:04:05+00:00");
    }

    #[test]
    fn missing_created_at_falls_back_to_none() {
        let value = json!({});
        assert!(extract_created_at(&value).is_none());
    }
}
