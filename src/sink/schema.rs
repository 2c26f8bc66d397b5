//! The exact expected column-store schema, field-for-field.

use gcp_bigquery_client::model::table_field_schema::TableFieldSchema;
use gcp_bigquery_client::model::table_schema::TableSchema;

fn actor_like_fields() -> Vec<TableFieldSchema> {
    vec![
        TableFieldSchema::string("Avatar"),
        TableFieldSchema::string("Description"),
        TableFieldSchema::string("DID"),
        TableFieldSchema::string("DisplayName"),
        TableFieldSchema::integer("FollowersCount"),
        TableFieldSchema::integer("FollowsCount"),
        TableFieldSchema::string("Handle"),
        TableFieldSchema::integer("PostsCount"),
        TableFieldSchema::timestamp("IndexedAt"),
    ]
}

fn embed_image_fields() -> Vec<TableFieldSchema> {
    vec![
        TableFieldSchema::string("Alt"),
        TableFieldSchema::string("BlobLink"),
        TableFieldSchema::integer("Height"),
        TableFieldSchema::string("MimeType"),
        TableFieldSchema::integer("Width"),
    ]
}

fn embed_field() -> TableFieldSchema {
    TableFieldSchema::record(
        "Embed",
        vec![
            TableFieldSchema::record("EmbedRecordMedia", embed_image_fields())
                .with_mode("REPEATED"),
            TableFieldSchema::record(
                "External",
                vec![
                    TableFieldSchema::string("Description"),
                    TableFieldSchema::string("Title"),
                    TableFieldSchema::string("URI"),
                ],
            ),
            TableFieldSchema::record("Images", embed_image_fields()).with_mode("REPEATED"),
            TableFieldSchema::record(
                "Record",
                vec![
                    TableFieldSchema::string("CID"),
                    TableFieldSchema::string("Type"),
                    TableFieldSchema::string("URI"),
                ],
            ),
        ],
    )
}

fn author_field() -> TableFieldSchema {
    TableFieldSchema::record(
        "Author",
        vec![
            TableFieldSchema::string("Avatar"),
            TableFieldSchema::string("DID"),
            TableFieldSchema::string("DisplayName"),
            TableFieldSchema::string("Handle"),
            TableFieldSchema::timestamp("IndexedAt"),
        ],
    )
}

fn liked_or_reposted_post_fields() -> Vec<TableFieldSchema> {
    vec![
        author_field(),
        TableFieldSchema::string("CID"),
        TableFieldSchema::timestamp("CreatedAt"),
        embed_field(),
        TableFieldSchema::string("Langs").with_mode("REPEATED"),
        TableFieldSchema::integer("LikeCount"),
        TableFieldSchema::integer("RepostCount"),
        TableFieldSchema::string("Hashtags").with_mode("REPEATED"),
        TableFieldSchema::string("URLs").with_mode("REPEATED"),
        TableFieldSchema::string("Text"),
        TableFieldSchema::string("URI"),
    ]
}

fn post_fields() -> Vec<TableFieldSchema> {
    vec![
        embed_field(),
        TableFieldSchema::string("Langs").with_mode("REPEATED"),
        TableFieldSchema::string("ReplyParentCID"),
        TableFieldSchema::string("Hashtags").with_mode("REPEATED"),
        TableFieldSchema::string("URLs").with_mode("REPEATED"),
        TableFieldSchema::string("Text"),
    ]
}

fn projection_field() -> TableFieldSchema {
    TableFieldSchema::record(
        "Projection",
        vec![
            TableFieldSchema::record(
                "Actor",
                vec![
                    TableFieldSchema::string("DID"),
                    TableFieldSchema::string("DIDKey"),
                    TableFieldSchema::string("Handle"),
                    TableFieldSchema::string("PDS"),
                ],
            ),
            TableFieldSchema::record("BlockedProfile", actor_like_fields()),
            TableFieldSchema::record("FollowedProfile", actor_like_fields()),
            TableFieldSchema::record("LikedPost", liked_or_reposted_post_fields()),
            TableFieldSchema::record("Post", post_fields()),
            TableFieldSchema::record(
                "Profile",
                vec![
                    TableFieldSchema::string("Description"),
                    TableFieldSchema::string("DisplayName"),
                ],
            ),
            TableFieldSchema::record("RepostedPost", liked_or_reposted_post_fields()),
        ],
    )
}

/// The expected BigQuery schema for the hydrated-event table: top-level
/// `Type, Action, CreatedAt, PulledTimestamp, Seq, Full (STRING),
/// Projection (RECORD)` plus the projection's typed subrecords, with
/// field names matching [`crate::model::event::HydratedEvent`] exactly.
#[must_use]
pub fn expected_schema() -> TableSchema {
    TableSchema::new(vec![
        TableFieldSchema::string("Action"),
        TableFieldSchema::timestamp("CreatedAt"),
        TableFieldSchema::string("Full"),
        projection_field(),
        TableFieldSchema::timestamp("PulledTimestamp"),
        TableFieldSchema::integer("Seq"),
        TableFieldSchema::string("Type"),
    ])
}

/// Recursively sort a schema's fields by name, so two schemas built in a
/// different field order still compare equal.
pub fn sort_fields(schema: &mut TableSchema) {
    if let Some(fields) = schema.fields.as_mut() {
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        for field in fields.iter_mut() {
            if let Some(nested) = field.fields.as_mut() {
                nested.sort_by(|a, b| a.name.cmp(&b.name));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_has_seven_fields() {
        let schema = expected_schema();
        assert_eq!(schema.fields.as_ref().map(Vec::len), Some(7));
    }

    #[test]
    fn projection_carries_all_seven_subrecords() {
        let schema = expected_schema();
        let projection = schema
            .fields
            .as_ref()
            .unwrap()
            .iter()
            .find(|f| f.name == "Projection")
            .unwrap();
        let names: Vec<_> = projection
            .fields
            .as_ref()
            .unwrap()
            .iter()
            .map(|f| f.name.clone())
            .collect();
        for expected in [
            "Actor",
            "BlockedProfile",
            "FollowedProfile",
            "LikedPost",
            "Post",
            "Profile",
            "RepostedPost",
        ] {
            assert!(names.contains(&expected.to_owned()), "missing {expected}");
        }
    }
}
