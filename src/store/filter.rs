//! Store-neutral filter and sort values.
//!
//! A [`Filter`] renders to the document store's query language through
//! [`Filter::to_document`] and can also be evaluated in-process with
//! [`Filter::matches`]; both paths follow the same semantics so the in-memory
//! backend behaves like the real store.

use mongodb::bson::{Bson, Document, doc};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document (empty conjunction).
    All,
    /// Type-sensitive equality on one field.
    Eq { field: String, value: Bson },
    /// Case-insensitive substring match on a string field.
    ///
    /// `term` is kept raw; pattern metacharacters are escaped on rendering.
    ContainsIgnoreCase { field: String, term: String },
    /// Logical OR. An empty list matches nothing.
    Any(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn contains_ignore_case(field: impl Into<String>, term: impl Into<String>) -> Self {
        Self::ContainsIgnoreCase {
            field: field.into(),
            term: term.into(),
        }
    }

    /// Query document for the store driver.
    pub fn to_document(&self) -> Document {
        match self {
            Filter::All => Document::new(),
            Filter::Eq { field, value } => {
                let mut document = Document::new();
                document.insert(field.clone(), value.clone());
                document
            }
            Filter::ContainsIgnoreCase { field, term } => {
                let mut document = Document::new();
                document.insert(
                    field.clone(),
                    doc! { "$regex": regex::escape(term), "$options": "i" },
                );
                document
            }
            // `$or` rejects an empty array; `$nor` over match-all selects nothing.
            Filter::Any(filters) if filters.is_empty() => doc! { "$nor": [ {} ] },
            Filter::Any(filters) => {
                let branches: Vec<Bson> = filters
                    .iter()
                    .map(|filter| Bson::Document(filter.to_document()))
                    .collect();
                doc! { "$or": branches }
            }
        }
    }

    /// Evaluates the filter against one document held in memory.
    ///
    /// Scans over many documents should build a [`FilterMatcher`] once.
    pub fn matches(&self, document: &Document) -> bool {
        self.matcher().matches(document)
    }

    /// Compiles every pattern in the filter for repeated evaluation.
    pub fn matcher(&self) -> FilterMatcher<'_> {
        match self {
            Filter::All => FilterMatcher::All,
            Filter::Eq { field, value } => FilterMatcher::Eq { field, value },
            Filter::ContainsIgnoreCase { field, term } => FilterMatcher::Contains {
                field,
                term,
                pattern: compile_contains(term),
            },
            Filter::Any(filters) => {
                FilterMatcher::Any(filters.iter().map(Filter::matcher).collect())
            }
        }
    }
}

/// A [`Filter`] ready for in-memory evaluation.
#[derive(Debug)]
pub enum FilterMatcher<'a> {
    All,
    Eq { field: &'a str, value: &'a Bson },
    Contains {
        field: &'a str,
        term: &'a str,
        /// `None` only when the escaped term exceeds the regex size limit.
        pattern: Option<Regex>,
    },
    Any(Vec<FilterMatcher<'a>>),
}

impl FilterMatcher<'_> {
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            FilterMatcher::All => true,
            FilterMatcher::Eq { field, value } => document.get(*field) == Some(*value),
            FilterMatcher::Contains {
                field,
                term,
                pattern,
            } => match document.get(*field) {
                Some(Bson::String(text)) => match pattern {
                    Some(pattern) => pattern.is_match(text),
                    None => text.to_lowercase().contains(&term.to_lowercase()),
                },
                _ => false,
            },
            FilterMatcher::Any(matchers) => {
                matchers.iter().any(|matcher| matcher.matches(document))
            }
        }
    }
}

// Same escaped pattern the store receives, so both backends agree on
// Unicode case folding.
fn compile_contains(term: &str) -> Option<Regex> {
    RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
        .ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn as_i32(self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// Compound multi-key ordering. Later keys only break ties left by earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descending(mut self, field: impl Into<String>) -> Self {
        self.keys.push(SortKey {
            field: field.into(),
            direction: SortDirection::Descending,
        });
        self
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        for key in &self.keys {
            document.insert(key.field.clone(), key.direction.as_i32());
        }
        document
    }

    /// Orders two documents the way the store would for these keys.
    pub fn compare(&self, left: &Document, right: &Document) -> Ordering {
        for key in &self.keys {
            let ordering = compare_values(left.get(&key.field), right.get(&key.field));
            let ordering = match key.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Cross-type rank used by the store when values of different types meet.
/// A missing field sorts as null.
fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => 1,
        Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) => 2,
        Some(Bson::Decimal128(_)) => 2,
        Some(Bson::String(_)) | Some(Bson::Symbol(_)) => 3,
        Some(Bson::Document(_)) => 4,
        Some(Bson::Array(_)) => 5,
        Some(Bson::Binary(_)) => 6,
        Some(Bson::ObjectId(_)) => 7,
        Some(Bson::Boolean(_)) => 8,
        Some(Bson::DateTime(_)) => 9,
        Some(Bson::Timestamp(_)) => 10,
        Some(Bson::RegularExpression(_)) => 11,
        Some(Bson::MinKey) => 0,
        Some(Bson::MaxKey) => 255,
        Some(_) => 12,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

pub(crate) fn compare_values(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let rank = type_rank(left).cmp(&type_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }

    match (left, right) {
        (Some(Bson::String(a)), Some(Bson::String(b))) => a.cmp(b),
        (Some(Bson::ObjectId(a)), Some(Bson::ObjectId(b))) => a.bytes().cmp(&b.bytes()),
        (Some(Bson::Boolean(a)), Some(Bson::Boolean(b))) => a.cmp(b),
        (Some(Bson::DateTime(a)), Some(Bson::DateTime(b))) => {
            a.timestamp_millis().cmp(&b.timestamp_millis())
        }
        (Some(Bson::Timestamp(a)), Some(Bson::Timestamp(b))) => {
            (a.time, a.increment).cmp(&(b.time, b.increment))
        }
        (Some(a), Some(b)) => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    #[test]
    fn all_renders_as_empty_document() {
        assert_eq!(Filter::All.to_document(), Document::new());
        assert!(Filter::All.matches(&doc! { "anything": 1 }));
    }

    #[test]
    fn contains_escapes_metacharacters_when_rendered() {
        let filter = Filter::contains_ignore_case("email", "a+b@x.com");
        assert_eq!(
            filter.to_document(),
            doc! { "email": { "$regex": "a\\+b@x\\.com", "$options": "i" } }
        );
    }

    #[test]
    fn contains_treats_dot_literally() {
        let filter = Filter::contains_ignore_case("email", "a.c");
        assert!(filter.matches(&doc! { "email": "xA.Cy" }));
        assert!(!filter.matches(&doc! { "email": "abc" }));
    }

    #[test]
    fn one_matcher_serves_a_whole_scan() {
        let filter = Filter::Any(vec![
            Filter::contains_ignore_case("senderEmail", "OPS@"),
            Filter::eq("id", "legacy-1"),
        ]);
        let matcher = filter.matcher();

        let documents = [
            doc! { "senderEmail": "ops@parcels.io" },
            doc! { "id": "legacy-1" },
            doc! { "senderEmail": "someone@else.io" },
            doc! { "id": 1 },
        ];
        let hits: Vec<bool> = documents.iter().map(|d| matcher.matches(d)).collect();

        assert_eq!(hits, [true, true, false, false]);
        assert!(matches!(
            &matcher,
            FilterMatcher::Any(branches)
                if matches!(branches[0], FilterMatcher::Contains { pattern: Some(_), .. })
        ));
    }

    #[test]
    fn contains_ignores_non_string_values() {
        let filter = Filter::contains_ignore_case("email", "1");
        assert!(!filter.matches(&doc! { "email": 1 }));
        assert!(!filter.matches(&doc! { "other": "1" }));
    }

    #[test]
    fn equality_is_type_sensitive() {
        let oid = ObjectId::new();
        let by_text = Filter::eq("_id", oid.to_hex());
        let by_oid = Filter::eq("_id", oid);

        let native = doc! { "_id": oid };
        assert!(by_oid.matches(&native));
        assert!(!by_text.matches(&native));
    }

    #[test]
    fn empty_any_matches_nothing() {
        let filter = Filter::Any(Vec::new());
        assert!(!filter.matches(&doc! { "email": "a@x.com" }));
        assert_eq!(filter.to_document(), doc! { "$nor": [ {} ] });
    }

    #[test]
    fn compound_sort_uses_later_keys_only_for_ties() {
        let sort = SortSpec::new().descending("createdAt").descending("date");
        let older_but_later_date = doc! { "createdAt": 1, "date": 50 };
        let newer = doc! { "createdAt": 2, "date": 1 };

        assert_eq!(sort.compare(&newer, &older_but_later_date), Ordering::Less);
        assert_eq!(
            sort.to_document(),
            doc! { "createdAt": -1, "date": -1 }
        );
    }

    #[test]
    fn missing_fields_sort_last_when_descending() {
        let sort = SortSpec::new().descending("createdAt");
        let missing = doc! { "date": 99 };
        let present = doc! { "createdAt": 1 };

        assert_eq!(sort.compare(&present, &missing), Ordering::Less);
    }

    #[test]
    fn numbers_compare_across_widths() {
        assert_eq!(
            compare_values(Some(&Bson::Int32(3)), Some(&Bson::Double(2.5))),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(Some(&Bson::Int64(7)), Some(&Bson::String("1".into()))),
            Ordering::Less
        );
    }
}
