//! Resolves caller-supplied parcel identifiers.
//!
//! Parcels written over the years carry their identity in different shapes:
//! a native object id in `_id`, the same id persisted as plain text in `_id`,
//! or a separate scalar `id` field. An identifier is tried against each shape
//! in that order and the first one that hits wins.

use crate::core::{StoreError, StoreResult};
use crate::store::{Filter, ParcelCollection};
use mongodb::bson::Document;
use mongodb::bson::oid::ObjectId;
use serde_json::Value as JsonValue;
use std::fmt;
use tracing::debug;

/// One way of interpreting an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchStrategy {
    /// `_id` holds a native object id.
    NativeLocator(ObjectId),
    /// `_id` holds the identifier as plain text.
    LocatorText(String),
    /// A separate `id` field holds the identifier.
    IdField(String),
}

impl MatchStrategy {
    pub fn filter(&self) -> Filter {
        match self {
            MatchStrategy::NativeLocator(oid) => Filter::eq("_id", *oid),
            MatchStrategy::LocatorText(text) => Filter::eq("_id", text.as_str()),
            MatchStrategy::IdField(text) => Filter::eq("id", text.as_str()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MatchStrategy::NativeLocator(_) => "native_locator",
            MatchStrategy::LocatorText(_) => "locator_text",
            MatchStrategy::IdField(_) => "id_field",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of running an identifier through every strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Found { value: T, strategy: MatchStrategy },
    /// Every applicable strategy missed. `locator_formatted` records whether
    /// the identifier could have been a native locator at all.
    NotFound { locator_formatted: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierResolver {
    identifier: String,
    locator: Option<ObjectId>,
}

impl IdentifierResolver {
    /// Accept any non-blank identifier.
    ///
    /// Locator format is checked here but a malformed locator is not an
    /// error: it only disables the native strategy.
    pub fn new(identifier: &str) -> StoreResult<Self> {
        if identifier.trim().is_empty() {
            return Err(StoreError::Validation(
                "parcel id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            identifier: identifier.to_string(),
            locator: ObjectId::parse_str(identifier).ok(),
        })
    }

    /// Accept an identifier taken from a JSON body, which must be a string.
    pub fn from_json(value: &JsonValue) -> StoreResult<Self> {
        match value {
            JsonValue::String(identifier) => Self::new(identifier),
            other => Err(StoreError::Validation(format!(
                "parcel id must be a string, got {other}"
            ))),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// True for 24 hexadecimal characters.
    pub fn is_locator_formatted(&self) -> bool {
        self.locator.is_some()
    }

    /// Strategies to try, in priority order.
    pub fn strategies(&self) -> Vec<MatchStrategy> {
        let mut strategies = Vec::with_capacity(3);
        if let Some(oid) = self.locator {
            strategies.push(MatchStrategy::NativeLocator(oid));
        }
        strategies.push(MatchStrategy::LocatorText(self.identifier.clone()));
        strategies.push(MatchStrategy::IdField(self.identifier.clone()));
        strategies
    }

    fn not_found<T>(&self) -> Resolution<T> {
        Resolution::NotFound {
            locator_formatted: self.is_locator_formatted(),
        }
    }

    /// Fetch the first parcel matched by any strategy
    pub async fn find(&self, parcels: &dyn ParcelCollection) -> StoreResult<Resolution<Document>> {
        for strategy in self.strategies() {
            if let Some(document) = parcels.find_one(&strategy.filter()).await? {
                debug!(id = %self.identifier, %strategy, "parcel resolved");
                return Ok(Resolution::Found {
                    value: document,
                    strategy,
                });
            }
        }
        Ok(self.not_found())
    }

    /// Delete through the first strategy that removes something
    pub async fn delete(&self, parcels: &dyn ParcelCollection) -> StoreResult<Resolution<u64>> {
        for strategy in self.strategies() {
            let deleted = parcels.delete_one(&strategy.filter()).await?;
            if deleted > 0 {
                debug!(id = %self.identifier, %strategy, deleted, "parcel deleted");
                return Ok(Resolution::Found {
                    value: deleted,
                    strategy,
                });
            }
        }
        Ok(self.not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_identifier_is_rejected() {
        assert!(matches!(
            IdentifierResolver::new(""),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            IdentifierResolver::new("  "),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn non_string_json_is_rejected() {
        assert!(IdentifierResolver::from_json(&json!(42)).is_err());
        assert!(IdentifierResolver::from_json(&json!(null)).is_err());
        assert!(IdentifierResolver::from_json(&json!("abc")).is_ok());
    }

    #[test]
    fn locator_formatted_identifier_tries_all_three() {
        let resolver = IdentifierResolver::new("65a1f0c2e4b0a1b2c3d4e5f6").unwrap();
        let names: Vec<_> = resolver.strategies().iter().map(MatchStrategy::name).collect();
        assert_eq!(names, ["native_locator", "locator_text", "id_field"]);
    }

    #[test]
    fn malformed_identifier_skips_native_strategy() {
        let resolver = IdentifierResolver::new("not-a-valid-id").unwrap();
        assert!(!resolver.is_locator_formatted());
        assert_eq!(
            resolver.strategies(),
            vec![
                MatchStrategy::LocatorText("not-a-valid-id".into()),
                MatchStrategy::IdField("not-a-valid-id".into()),
            ]
        );
    }

    #[test]
    fn wrong_length_hex_is_not_a_locator() {
        assert!(!IdentifierResolver::new("65a1f0c2e4b0").unwrap().is_locator_formatted());
        assert!(!IdentifierResolver::new("zza1f0c2e4b0a1b2c3d4e5f6").unwrap().is_locator_formatted());
    }
}
