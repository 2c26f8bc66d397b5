//! `extractIdentitiesInRepo`: walk
//! all records in a CAR-backed repository, regex-match every DID-form
//! substring across serialized record JSON, deduplicate, and resolve
//! each. Used by the bulk puller's DID-expansion discovery mode.

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use crate::identity_resolver::IdentityResolver;
use crate::model::identity::{Identifier, Identity};
use crate::repo::RepoView;

fn did_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"did:[a-z0-9]+:[a-zA-Z0-9._:%-]+").expect("static DID regex is well-formed")
    })
}

/// Walk every record in `repo`, find every DID-form substring in its
/// serialized JSON, deduplicate, and resolve each through `resolver`.
/// A single identity failing to resolve is a soft failure: it's skipped
/// and logged, never aborts discovery for the rest of the repository.
pub async fn extract_identities_in_repo(
    repo: &RepoView,
    resolver: &Arc<IdentityResolver>,
) -> Vec<Identity> {
    let mut dids = BTreeSet::new();
    for record in repo.for_each() {
        let serialized = record.value.to_string();
        for found in did_pattern().find_iter(&serialized) {
            dids.insert(found.as_str().to_owned());
        }
    }

    let mut identities = Vec::with_capacity(dids.len());
    for did in dids {
        let identifier = match Identifier::parse(&did) {
            Ok(identifier) => identifier,
            Err(err) => {
                warn!(%err, did, "skipping malformed DID substring");
                continue;
            }
        };
        match resolver.lookup(&identifier).await {
            Ok(identity) => identities.push(identity),
            Err(err) => warn!(%err, did, "identity discovery lookup failed"),
        }
    }

    identities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matches_plc_and_web_dids() {
        let text = r#"{"subject":"did:plc:abc123","other":"did:web:example.com"}"#;
        let found: Vec<_> = did_pattern()
            .find_iter(text)
            .map(|m| m.as_str().to_owned())
            .collect();
        assert_eq!(found, vec!["did:plc:abc123", "did:web:example.com"]);
    }
}
