//! Ordered path labels addressing a chunk's position in its document tree.
//!
//! A path is a non-empty sequence of labels rendered as `doc.chapter1.para3`.
//! Labels are restricted to `[A-Za-z0-9_]+` so the dotted form round-trips
//! unambiguously. Tree relationships are defined over label sequences:
//! ancestry is strict prefixing, siblings share the parent sequence at the
//! same depth.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Position of a chunk in its document's ordered label tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPath {
    labels: Vec<String>,
}

impl ChunkPath {
    /// Build a path from owned labels, validating each one.
    pub fn new<I, S>(labels: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(Error::InvalidInput("path must not be empty".into()));
        }
        for label in &labels {
            if !is_valid_label(label) {
                return Err(Error::InvalidInput(format!(
                    "invalid path label: {label:?} (allowed: [A-Za-z0-9_]+)"
                )));
            }
        }
        Ok(Self { labels })
    }

    /// Single-label root path.
    pub fn root(label: impl Into<String>) -> Result<Self, Error> {
        Self::new([label.into()])
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of labels in the path.
    pub fn depth(&self) -> usize {
        self.labels.len()
    }

    /// The path with the last label removed, or `None` at depth 1.
    pub fn parent(&self) -> Option<ChunkPath> {
        if self.labels.len() <= 1 {
            return None;
        }
        Some(ChunkPath {
            labels: self.labels[..self.labels.len() - 1].to_vec(),
        })
    }

    /// Extend the path by one label.
    pub fn child(&self, label: impl Into<String>) -> Result<ChunkPath, Error> {
        let label = label.into();
        if !is_valid_label(&label) {
            return Err(Error::InvalidInput(format!(
                "invalid path label: {label:?} (allowed: [A-Za-z0-9_]+)"
            )));
        }
        let mut labels = self.labels.clone();
        labels.push(label);
        Ok(ChunkPath { labels })
    }

    /// True if `self` is an ancestor of `other` (strict prefix).
    pub fn is_ancestor_of(&self, other: &ChunkPath) -> bool {
        self.labels.len() < other.labels.len()
            && other.labels[..self.labels.len()] == self.labels[..]
    }

    /// True if `self` is a descendant of `other` (other is a strict prefix).
    pub fn is_descendant_of(&self, other: &ChunkPath) -> bool {
        other.is_ancestor_of(self)
    }

    /// True if both paths share a parent at the same depth and differ.
    ///
    /// Depth-1 paths have no parent and therefore no siblings.
    pub fn is_sibling_of(&self, other: &ChunkPath) -> bool {
        if self == other {
            return false;
        }
        match (self.parent(), other.parent()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for ChunkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.labels.join("."))
    }
}

impl FromStr for ChunkPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChunkPath::new(s.split('.'))
    }
}

impl Serialize for ChunkPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChunkPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
