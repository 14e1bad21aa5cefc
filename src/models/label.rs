//! Entity labels and their natural keys.
//!
//! Every node carries exactly one [`Label`]. Each label names the property
//! that uniquely identifies a node of that kind:
//!
//! | Label | Natural key |
//! |-------|-------------|
//! | `Company` | `ticker` |
//! | `Instrument` | `symbol` |
//! | `Concept` | `name` |
//! | `Location` | `country` |
//! | everything else | `id` (caller-generated, opaque) |

use super::Properties;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Property keys managed by the store; caller values for them are dropped.
pub const RESERVED_PROPERTIES: &[&str] = &["created_at", "updated_at"];

/// Field used as natural key by labels without a domain identifier.
pub const OPAQUE_KEY_FIELD: &str = "id";

/// Kind of entity in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    /// Listed company.
    Company,
    /// Tradable instrument (equity, future, option, FX pair).
    Instrument,
    /// Abstract idea or theme ("AI capex", "reshoring").
    Concept,
    /// Country or region.
    Location,
    /// Real-world event.
    Event,
    /// Notable price move of an instrument.
    PriceEvent,
    /// Observation recorded by an agent.
    Observation,
    /// News item.
    News,
    /// Recurring pattern.
    Pattern,
    /// Hypothesis under evaluation.
    Hypothesis,
    /// Market regime.
    Regime,
}

impl Label {
    /// Returns all label variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Company,
            Self::Instrument,
            Self::Concept,
            Self::Location,
            Self::Event,
            Self::PriceEvent,
            Self::Observation,
            Self::News,
            Self::Pattern,
            Self::Hypothesis,
            Self::Regime,
        ]
    }

    /// Returns the label as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "Company",
            Self::Instrument => "Instrument",
            Self::Concept => "Concept",
            Self::Location => "Location",
            Self::Event => "Event",
            Self::PriceEvent => "PriceEvent",
            Self::Observation => "Observation",
            Self::News => "News",
            Self::Pattern => "Pattern",
            Self::Hypothesis => "Hypothesis",
            Self::Regime => "Regime",
        }
    }

    /// Parses a label, ignoring case and `_`/`-` separators.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "company" => Some(Self::Company),
            "instrument" => Some(Self::Instrument),
            "concept" => Some(Self::Concept),
            "location" => Some(Self::Location),
            "event" => Some(Self::Event),
            "priceevent" => Some(Self::PriceEvent),
            "observation" => Some(Self::Observation),
            "news" => Some(Self::News),
            "pattern" => Some(Self::Pattern),
            "hypothesis" => Some(Self::Hypothesis),
            "regime" => Some(Self::Regime),
            _ => None,
        }
    }

    /// Returns the property that holds this label's natural key.
    #[must_use]
    pub const fn natural_key_field(&self) -> &'static str {
        match self {
            Self::Company => "ticker",
            Self::Instrument => "symbol",
            Self::Concept => "name",
            Self::Location => "country",
            Self::Event
            | Self::PriceEvent
            | Self::Observation
            | Self::News
            | Self::Pattern
            | Self::Hypothesis
            | Self::Regime => OPAQUE_KEY_FIELD,
        }
    }

    /// Returns true if the natural key is a caller-generated identifier.
    #[must_use]
    pub const fn has_opaque_key(&self) -> bool {
        matches!(
            self,
            Self::Event
                | Self::PriceEvent
                | Self::Observation
                | Self::News
                | Self::Pattern
                | Self::Hypothesis
                | Self::Regime
        )
    }

    /// Labels whose nodes survive orphan pruning unless told otherwise.
    #[must_use]
    pub const fn default_orphan_exclusions() -> &'static [Self] {
        &[Self::Pattern, Self::Regime]
    }

    /// Extracts the natural key from a property map.
    ///
    /// Strings must be non-blank; numbers are keyed by their JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingKey`] if the field is absent, null or blank,
    /// and [`Error::InvalidInput`] if it holds an object, array or boolean.
    pub fn natural_key(&self, properties: &Properties) -> Result<String> {
        let field = self.natural_key_field();
        let missing = || Error::MissingKey {
            label: self.as_str().to_string(),
            field: field.to_string(),
        };

        match properties.get(field) {
            None | Some(Value::Null) => Err(missing()),
            Some(Value::String(s)) if s.trim().is_empty() => Err(missing()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(Error::InvalidInput(format!(
                "natural key '{field}' for {self} must be a string or number, got {other}"
            ))),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Label {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::InvalidLabel(s.to_string()))
    }
}

/// Parses a comma-separated label list such as `"Pattern,Regime"`.
///
/// # Errors
///
/// Returns [`Error::InvalidLabel`] for the first unknown entry.
pub fn parse_label_list(s: &str) -> Result<Vec<Label>> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}

/// Removes store-managed keys from caller-supplied properties.
#[must_use]
pub fn strip_reserved(mut properties: Properties) -> Properties {
    for key in RESERVED_PROPERTIES {
        properties.remove(*key);
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn props(value: Value) -> Properties {
        serde_json::from_value(value).unwrap()
    }

    #[test_case("Company", Label::Company ; "exact")]
    #[test_case("company", Label::Company ; "lowercase")]
    #[test_case("PRICE_EVENT", Label::PriceEvent ; "upper snake")]
    #[test_case("price-event", Label::PriceEvent ; "kebab")]
    #[test_case(" Regime ", Label::Regime ; "padded")]
    fn test_label_parse(input: &str, expected: Label) {
        assert_eq!(Label::parse(input), Some(expected));
    }

    #[test]
    fn test_label_parse_unknown() {
        assert!(Label::parse("Widget").is_none());
        let err = "Widget".parse::<Label>().unwrap_err();
        assert!(matches!(err, Error::InvalidLabel(ref l) if l == "Widget"));
    }

    #[test]
    fn test_label_roundtrip_all() {
        for label in Label::all() {
            assert_eq!(Label::parse(label.as_str()), Some(*label));
        }
    }

    #[test_case(Label::Company, "ticker")]
    #[test_case(Label::Instrument, "symbol")]
    #[test_case(Label::Concept, "name")]
    #[test_case(Label::Location, "country")]
    #[test_case(Label::Hypothesis, "id")]
    #[test_case(Label::News, "id")]
    fn test_natural_key_field(label: Label, field: &str) {
        assert_eq!(label.natural_key_field(), field);
        assert_eq!(label.has_opaque_key(), field == OPAQUE_KEY_FIELD);
    }

    #[test]
    fn test_natural_key_extraction() {
        let p = props(json!({"ticker": "NVDA", "name": "NVIDIA"}));
        assert_eq!(Label::Company.natural_key(&p).unwrap(), "NVDA");

        let p = props(json!({"id": 42}));
        assert_eq!(Label::Event.natural_key(&p).unwrap(), "42");

        // A number and its decimal string name the same node.
        let as_string = props(json!({"id": "42"}));
        assert_eq!(
            Label::Event.natural_key(&as_string).unwrap(),
            Label::Event.natural_key(&p).unwrap()
        );
        assert_ne!(Label::Event.natural_key(&props(json!({"id": 42.0}))).unwrap(), "42");
    }

    #[test]
    fn test_natural_key_missing() {
        for value in [json!({"name": "NVIDIA"}), json!({"ticker": null}), json!({"ticker": "  "})] {
            let err = Label::Company.natural_key(&props(value)).unwrap_err();
            assert!(
                matches!(err, Error::MissingKey { ref field, .. } if field == "ticker"),
                "unexpected error: {err}"
            );
        }
    }

    #[test]
    fn test_natural_key_wrong_type() {
        let err = Label::Company
            .natural_key(&props(json!({"ticker": ["NVDA"]})))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_parse_label_list() {
        assert_eq!(
            parse_label_list("Pattern, regime,").unwrap(),
            vec![Label::Pattern, Label::Regime]
        );
        assert!(parse_label_list("Pattern,Bogus").is_err());
        assert!(parse_label_list("").unwrap().is_empty());
    }

    #[test]
    fn test_strip_reserved() {
        let p = strip_reserved(props(json!({"ticker": "NVDA", "created_at": 1, "updated_at": 2})));
        assert_eq!(p.len(), 1);
        assert!(p.contains_key("ticker"));
    }
}
