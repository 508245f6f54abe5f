//! Search filters and ordering for parcel listings.

use crate::store::{Filter, SortSpec};

/// Historical field names that all carry an email address on a parcel.
pub const ALIAS_FIELDS: [&str; 5] = [
    "email",
    "userEmail",
    "senderEmail",
    "recipientEmail",
    "creatorEmail",
];

/// Recency keys, most significant first. `_id` embeds the creation time.
pub const RECENCY_FIELDS: [&str; 4] = ["createdAt", "date", "timestamp", "_id"];

/// Filter for an optional email search term.
///
/// A missing or blank term matches every parcel. Otherwise a parcel matches
/// when any alias field contains the term, ignoring case. The term is matched
/// literally; pattern metacharacters carry no meaning.
pub fn build_email_filter(term: Option<&str>) -> Filter {
    match term.map(str::trim).filter(|term| !term.is_empty()) {
        None => Filter::All,
        Some(term) => Filter::Any(
            ALIAS_FIELDS
                .iter()
                .map(|field| Filter::contains_ignore_case(*field, term))
                .collect(),
        ),
    }
}

/// Newest-first ordering used for every listing.
///
/// This is one compound sort over all four keys, not a per-parcel fallback
/// to the first field that is present. A parcel lacking `createdAt` sorts
/// after every parcel that has one, whatever its `date` says.
pub fn default_sort() -> SortSpec {
    RECENCY_FIELDS
        .iter()
        .fold(SortSpec::new(), |sort, field| sort.descending(*field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{Document, doc};

    fn matches(term: Option<&str>, document: Document) -> bool {
        build_email_filter(term).matches(&document)
    }

    #[test]
    fn absent_or_blank_term_matches_everything() {
        assert_eq!(build_email_filter(None), Filter::All);
        assert_eq!(build_email_filter(Some("")), Filter::All);
        assert_eq!(build_email_filter(Some("   ")), Filter::All);
    }

    #[test]
    fn every_alias_field_is_searched() {
        for field in ALIAS_FIELDS {
            let mut document = Document::new();
            document.insert(field, "Someone@Example.com");
            assert!(matches(Some("someone@example"), document), "{field}");
        }
    }

    #[test]
    fn unrelated_fields_are_ignored() {
        assert!(!matches(
            Some("a@x.com"),
            doc! { "contactEmail": "a@x.com", "note": "a@x.com" }
        ));
    }

    #[test]
    fn match_is_case_insensitive_substring() {
        let parcel = doc! { "senderEmail": "a@x.com" };
        assert!(matches(Some("A@X.COM"), parcel.clone()));
        assert!(matches(Some("@X."), parcel.clone()));
        assert!(!matches(Some("b@x.com"), parcel));
    }

    #[test]
    fn metacharacters_are_literal() {
        let parcel = doc! { "email": "axb@x.com" };
        assert!(!matches(Some("a.b"), parcel));
        assert!(matches(Some("(a)"), doc! { "email": "note (a) here" }));
        assert!(matches(Some("*"), doc! { "email": "x*y" }));
    }

    #[test]
    fn rendered_filter_is_an_or_over_aliases() {
        let rendered = build_email_filter(Some("a@x.com")).to_document();
        let branches = rendered.get_array("$or").unwrap();
        assert_eq!(branches.len(), ALIAS_FIELDS.len());
        assert_eq!(
            branches[0].as_document().unwrap(),
            &doc! { "email": { "$regex": "a@x\\.com", "$options": "i" } }
        );
    }

    #[test]
    fn default_sort_is_compound_descending() {
        assert_eq!(
            default_sort().to_document(),
            doc! { "createdAt": -1, "date": -1, "timestamp": -1, "_id": -1 }
        );
    }

    #[test]
    fn default_sort_does_not_fall_back_per_record() {
        let sort = default_sort();
        let dated_only = doc! { "date": 2_000_000 };
        let created = doc! { "createdAt": 1 };

        // `created` wins on the first key even though `dated_only` is newer
        // by its own field.
        assert_eq!(sort.compare(&created, &dated_only), std::cmp::Ordering::Less);
    }
}
