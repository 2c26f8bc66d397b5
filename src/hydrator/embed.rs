//! Embed flattening.

use crate::model::event::{Embed, EmbedExternal, EmbedImage, EmbedRecord};
use crate::model::record::{RawEmbed, RawEmbedImage};

/// Flatten a raw, wire-shaped embed into the flat projection shape.
/// `RawEmbed::Unknown` (and any future variant not yet recognized)
/// yields a fully empty [`Embed`] rather than propagating a decode
/// failure.
#[must_use]
pub fn flatten_embed(raw: &RawEmbed) -> Embed {
    match raw {
        RawEmbed::External {
            uri,
            title,
            description,
        } => Embed {
            external: Some(EmbedExternal {
                uri: uri.clone(),
                title: title.clone(),
                description: description.clone(),
            }),
            ..Embed::default()
        },
        RawEmbed::Images { images } => Embed {
            images: Some(images.iter().map(flatten_image).collect()),
            ..Embed::default()
        },
        RawEmbed::Record { record } => Embed {
            record: Some(EmbedRecord {
                cid: record.cid.clone(),
                uri: record.uri.clone(),
                record_type: None,
            }),
            ..Embed::default()
        },
        RawEmbed::RecordWithMedia { record, media } => Embed {
            record: Some(EmbedRecord {
                cid: record.cid.clone(),
                uri: record.uri.clone(),
                record_type: None,
            }),
            embed_record_media: Some(media.iter().map(flatten_image).collect()),
            ..Embed::default()
        },
        RawEmbed::Unknown => Embed::default(),
    }
}

fn flatten_image(image: &RawEmbedImage) -> EmbedImage {
    EmbedImage {
        alt: image.alt.clone(),
        blob_link: image.blob_link.clone(),
        mime_type: image.mime_type.clone(),
        width: image.width,
        height: image.height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::StrongRef;

    #[test]
    fn unknown_variant_yields_empty_embed() {
        let embed = flatten_embed(&RawEmbed::Unknown);
        assert!(embed.external.is_none());
        assert!(embed.images.is_none());
        assert!(embed.record.is_none());
        assert!(embed.embed_record_media.is_none());
    }

    #[test]
    fn external_flattens_its_three_fields() {
        let raw = RawEmbed::External {
            uri: "https://x.test".to_owned(),
            title: Some("X".to_owned()),
            description: None,
        };
        let embed = flatten_embed(&raw);
        let external = embed.external.expect("external embed present");
        assert_eq!(external.uri, "https://x.test");
        assert_eq!(external.title.as_deref(), Some("X"));
    }

    #[test]
    fn record_with_media_populates_both_subtrees() {
        let raw = RawEmbed::RecordWithMedia {
            record: StrongRef {
                uri: "at://did:plc:x/app.bsky.feed.post/1".to_owned(),
                cid: "bafy...".to_owned(),
            },
            media: vec![RawEmbedImage {
                alt: None,
                blob_link: Some("blob://1".to_owned()),
                mime_type: Some("image/png".to_owned()),
                width: Some(100),
                height: Some(100),
            }],
        };
        let embed = flatten_embed(&raw);
        assert!(embed.record.is_some());
        assert_eq!(embed.embed_record_media.unwrap().len(), 1);
    }
}
