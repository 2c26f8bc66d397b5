//! Actor identity and profile.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LookupError;

/// A decentralized identifier, e.g. `did:plc:abc123`.
///
/// Validated on construction (must contain a `method:identifier` shape
/// after the `did:` prefix) rather than passed around as a bare `String`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Parse a DID, rejecting strings that don't look like `did:<method>:<id>`.
    pub fn parse(raw: impl Into<String>) -> Result<Self, LookupError> {
        let raw = raw.into();
        let mut parts = raw.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("did"), Some(_method), Some(id)) if !id.is_empty() => Ok(Self(raw)),
            _ => Err(LookupError::InvalidIdentifier(raw)),
        }
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A human-readable handle, e.g. `alice.example.social`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    /// Parse a handle, rejecting strings without at least one `.` label
    /// separator.
    pub fn parse(raw: impl Into<String>) -> Result<Self, LookupError> {
        let raw = raw.into();
        if raw.contains('.') && !raw.starts_with('.') && !raw.ends_with('.') {
            Ok(Self(raw))
        } else {
            Err(LookupError::InvalidIdentifier(raw))
        }
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Either a handle or a DID, the two forms `identity_resolver::lookup`
/// accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// A DID.
    Did(Did),
    /// A handle.
    Handle(Handle),
}

impl Identifier {
    /// Parse a bare string as a DID if it has the `did:` prefix, otherwise
    /// as a handle.
    pub fn parse(raw: &str) -> Result<Self, LookupError> {
        if raw.starts_with("did:") {
            Did::parse(raw).map(Identifier::Did)
        } else {
            Handle::parse(raw).map(Identifier::Handle)
        }
    }

    /// The cache key namespace segment for this identifier.
    #[must_use]
    pub fn cache_key(&self) -> String {
        match self {
            Identifier::Did(did) => format!("identity:{did}"),
            Identifier::Handle(handle) => format!("identity:{handle}"),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Did(did) => did.fmt(f),
            Identifier::Handle(handle) => handle.fmt(f),
        }
    }
}

/// A resolved actor identity: DID, handle, personal-data-server endpoint,
/// and optional public-key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The actor's DID.
    pub did: Did,
    /// The actor's current handle.
    pub handle: Handle,
    /// The personal data server hosting this actor's repository.
    pub pds: String,
    /// The actor's DID-document public key, if extraction succeeded.
    /// `None` rather than an error when extraction fails.
    pub did_key: Option<String>,
}

/// Display attributes for an actor, always fetched via the public indexed
/// endpoint rather than the actor's home server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name.
    pub display_name: Option<String>,
    /// Description ("bio").
    pub description: Option<String>,
    /// Avatar blob reference (a URL in the indexed view).
    pub avatar: Option<String>,
    /// Follower count.
    pub followers_count: Option<i64>,
    /// Following count.
    pub follows_count: Option<i64>,
    /// Post count.
    pub posts_count: Option<i64>,
    /// When the indexer last observed this actor.
    pub indexed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_requires_method_and_id() {
        assert!(Did::parse("did:plc:abc123").is_ok());
        assert!(Did::parse("did:plc:").is_err());
        assert!(Did::parse("not-a-did").is_err());
    }

    #[test]
    fn handle_requires_a_label_separator() {
        assert!(Handle::parse("alice.example.social").is_ok());
        assert!(Handle::parse("alice").is_err());
        assert!(Handle::parse(".alice.example.social").is_err());
    }

    #[test]
    fn identifier_dispatches_on_did_prefix() {
        assert!(matches!(
            Identifier::parse("did:plc:abc123").unwrap(),
            Identifier::Did(_)
        ));
        assert!(matches!(
            Identifier::parse("alice.example.social").unwrap(),
            Identifier::Handle(_)
        ));
    }
}
