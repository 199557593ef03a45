//! Static community topology: members, their producers and consumers.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// A shared producer with peak instantaneous production `max-pi` (kW).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProducerSpec {
    #[serde(rename = "max-pi")]
    pub max_pi_kw: f32,
}

/// A flexible consumer drawing `cons` kW while active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsumerSpec {
    #[serde(rename = "cons")]
    pub cons_kw: f32,
}

/// One community member owning producers and consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberSpec {
    #[serde(default)]
    pub producers: BTreeMap<String, ProducerSpec>,
    #[serde(default)]
    pub consumers: BTreeMap<String, ConsumerSpec>,
}

/// Immutable community layout, loaded once at startup.
///
/// Ordered maps keep iteration (and so seeded sampling) reproducible.
///
/// # Examples
///
/// ```
/// use rec_sim::topology::Topology;
///
/// let json = r#"{"members": {"m1": {
///     "producers": {"p1": {"max-pi": 3.0}},
///     "consumers": {"c1": {"cons": 1.5}}
/// }}}"#;
/// let topology = Topology::from_json_str(json).unwrap();
/// assert_eq!(topology.consumer_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Topology {
    pub members: BTreeMap<String, MemberSpec>,
}

impl Topology {
    /// Three-member demo community.
    pub fn demo() -> Self {
        let mut members = BTreeMap::new();
        members.insert(
            "m1".to_string(),
            member(&[("p1", 4.0)], &[("c1", 2.0), ("c2", 1.2)]),
        );
        members.insert(
            "m2".to_string(),
            member(&[("p2", 3.0), ("p3", 1.5)], &[("c3", 3.5), ("c4", 0.8)]),
        );
        members.insert("m3".to_string(), member(&[], &[("c5", 2.4)]));
        Self { members }
    }

    /// Parses and validates a topology JSON file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file is unreadable, malformed, or invalid.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "simulation.topology".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_json_str(&content)
    }

    /// Parses and validates a topology JSON document.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure as a `ConfigError`.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let topology: Self = serde_json::from_str(s).map_err(|e| ConfigError {
            field: "topology".to_string(),
            message: e.to_string(),
        })?;
        match topology.validate().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(topology),
        }
    }

    /// Returns every violation found in the topology.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.members.is_empty() {
            errors.push(ConfigError {
                field: "topology.members".into(),
                message: "must contain at least one member".into(),
            });
        }
        if self.consumer_count() == 0 && !self.members.is_empty() {
            errors.push(ConfigError {
                field: "topology.members".into(),
                message: "must contain at least one consumer".into(),
            });
        }
        for (member_id, m) in &self.members {
            for (id, p) in &m.producers {
                if !p.max_pi_kw.is_finite() || p.max_pi_kw < 0.0 {
                    errors.push(ConfigError {
                        field: format!("topology.{member_id}.producers.{id}.max-pi"),
                        message: "must be finite and >= 0".into(),
                    });
                }
            }
            for (id, c) in &m.consumers {
                if !c.cons_kw.is_finite() || c.cons_kw <= 0.0 {
                    errors.push(ConfigError {
                        field: format!("topology.{member_id}.consumers.{id}.cons"),
                        message: "must be finite and > 0".into(),
                    });
                }
            }
        }
        errors
    }

    /// Total number of consumers across all members.
    pub fn consumer_count(&self) -> usize {
        self.members.values().map(|m| m.consumers.len()).sum()
    }

    /// Total number of producers across all members.
    pub fn producer_count(&self) -> usize {
        self.members.values().map(|m| m.producers.len()).sum()
    }

    /// Member id → consumer ids, in topology order.
    pub fn consumer_ids(&self) -> BTreeMap<String, Vec<String>> {
        self.members
            .iter()
            .map(|(id, m)| (id.clone(), m.consumers.keys().cloned().collect()))
            .collect()
    }
}

fn member(producers: &[(&str, f32)], consumers: &[(&str, f32)]) -> MemberSpec {
    MemberSpec {
        producers: producers
            .iter()
            .map(|(id, kw)| (id.to_string(), ProducerSpec { max_pi_kw: *kw }))
            .collect(),
        consumers: consumers
            .iter()
            .map(|(id, kw)| (id.to_string(), ConsumerSpec { cons_kw: *kw }))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_topology_is_valid() {
        let t = Topology::demo();
        assert!(t.validate().is_empty());
        assert_eq!(t.members.len(), 3);
        assert_eq!(t.consumer_count(), 5);
        assert_eq!(t.producer_count(), 3);
    }

    #[test]
    fn parses_max_pi_and_cons_keys() {
        let json = r#"{"members": {"a": {
            "producers": {"p": {"max-pi": 2.5}},
            "consumers": {"c": {"cons": 1.0}}
        }}}"#;
        let t = Topology::from_json_str(json).expect("topology should parse");
        assert_eq!(t.members["a"].producers["p"].max_pi_kw, 2.5);
        assert_eq!(t.members["a"].consumers["c"].cons_kw, 1.0);
    }

    #[test]
    fn rejects_non_positive_cons() {
        let json = r#"{"members": {"a": {"consumers": {"c": {"cons": 0.0}}}}}"#;
        let err = Topology::from_json_str(json).expect_err("zero cons must be rejected");
        assert_eq!(err.field, "topology.a.consumers.c.cons");
    }

    #[test]
    fn rejects_empty_community() {
        let err = Topology::from_json_str(r#"{"members": {}}"#).expect_err("empty");
        assert_eq!(err.field, "topology.members");
    }

    #[test]
    fn rejects_unknown_keys() {
        let json = r#"{"members": {"a": {"consumers": {"c": {"cons": 1.0, "x": 1}}}}}"#;
        assert!(Topology::from_json_str(json).is_err());
    }

    #[test]
    fn consumer_ids_follow_member_order() {
        let ids = Topology::demo().consumer_ids();
        assert_eq!(ids["m1"], vec!["c1".to_string(), "c2".to_string()]);
        assert_eq!(ids["m3"], vec!["c5".to_string()]);
    }
}
