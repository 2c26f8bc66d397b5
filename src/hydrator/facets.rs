//! Hashtag/URL extraction from post facets.

use crate::model::record::{Facet, FacetFeature};

/// Split a post's facets into ordered hashtag and URL lists.
#[must_use]
pub fn extract_facets(facets: &[Facet]) -> (Vec<String>, Vec<String>) {
    let mut hashtags = Vec::new();
    let mut urls = Vec::new();

    for facet in facets {
        for feature in &facet.features {
            match feature {
                FacetFeature::Tag { tag } => hashtags.push(tag.clone()),
                FacetFeature::Link { uri } => urls.push(uri.clone()),
            }
        }
    }

    (hashtags, urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_order_of_appearance() {
        let facets = vec![
            Facet {
                features: vec![FacetFeature::Tag {
                    tag: "world".to_owned(),
                }],
            },
            Facet {
                features: vec![FacetFeature::Link {
                    uri: "https://x.test".to_owned(),
                }],
            },
        ];
        let (hashtags, urls) = extract_facets(&facets);
        assert_eq!(hashtags, vec!["world"]);
        assert_eq!(urls, vec!["https://x.test"]);
    }

    #[test]
    fn multiple_features_in_one_facet_all_accumulate() {
        let facets = vec![Facet {
            features: vec![
                FacetFeature::Tag {
                    tag: "a".to_owned(),
                },
                FacetFeature::Tag {
                    tag: "b".to_owned(),
                },
            ],
        }];
        let (hashtags, _urls) = extract_facets(&facets);
        assert_eq!(hashtags, vec!["a", "b"]);
    }

    #[test]
    fn empty_facets_yield_empty_lists() {
        let (hashtags, urls) = extract_facets(&[]);
        assert!(hashtags.is_empty());
        assert!(urls.is_empty());
    }
}
