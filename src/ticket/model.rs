//! Core ticket (issue) data model.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Canonical lifecycle status. Legacy aliases are normalized on read by
/// [`CanonicalStatus::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    Deferred,
    Open,
    InProgress,
    Blocked,
    Closed,
}

impl CanonicalStatus {
    /// Normalize a raw status string, accepting legacy aliases
    /// (`ready`→open, `planned`→deferred, `hooked`→in_progress, `done`→closed).
    pub fn normalize(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "deferred" | "planned" => Some(Self::Deferred),
            "open" | "ready" => Some(Self::Open),
            "in_progress" | "hooked" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "closed" | "done" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deferred => "deferred",
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Epic,
    Task,
    Bug,
    Feature,
    Message,
    Agent,
    Policy,
}

impl IssueType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "epic" => Some(Self::Epic),
            "task" => Some(Self::Task),
            "bug" => Some(Self::Bug),
            "feature" => Some(Self::Feature),
            "message" => Some(Self::Message),
            "agent" => Some(Self::Agent),
            "policy" => Some(Self::Policy),
            _ => None,
        }
    }

    /// Non-work types: message, agent, policy.
    pub fn is_work_type(&self) -> bool {
        !matches!(self, Self::Message | Self::Agent | Self::Policy)
    }
}

/// A dependency edge. `relation` carries an optional marker string; a
/// `parent-child` marker excludes this edge from ordinary dependency
/// satisfaction checks (see [`crate::lineage`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,
    pub relation: Option<String>,
}

impl Dependency {
    pub fn is_parent_child(&self) -> bool {
        self.relation
            .as_deref()
            .map(is_parent_child_marker)
            .unwrap_or(false)
    }
}

fn is_parent_child_marker(value: &str) -> bool {
    let cleaned = value.trim().to_ascii_lowercase();
    let mut normalized = String::with_capacity(cleaned.len());
    for ch in cleaned.chars() {
        if ch == '_' || ch == '-' || ch.is_whitespace() {
            continue;
        }
        normalized.push(ch);
    }
    normalized.contains("parentchild")
}

/// Raw ticket payload as read from the store, with description metadata
/// already split out. See [`crate::ticket::description`] for the parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status_raw: String,
    pub issue_type_raw: Option<String>,
    pub labels: HashSet<String>,
    pub assignee: Option<String>,
    pub parent_id: Option<String>,
    pub dependencies: Vec<Dependency>,
}

impl Issue {
    pub fn canonical_status(&self) -> Option<CanonicalStatus> {
        CanonicalStatus::normalize(&self.status_raw)
    }

    pub fn issue_type(&self) -> Option<IssueType> {
        self.issue_type_raw.as_deref().and_then(IssueType::parse)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn description_fields(&self) -> std::collections::HashMap<String, String> {
        super::description::parse_description_fields(&self.description)
    }

    pub fn dependency_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for dep in &self.dependencies {
            if dep.is_parent_child() {
                continue;
            }
            if dep.id.is_empty() || seen.contains(&dep.id) {
                continue;
            }
            seen.insert(dep.id.clone());
            resolved.push(dep.id.clone());
        }
        resolved
    }

    pub fn parent_child_hint(&self) -> Option<String> {
        self.dependencies
            .iter()
            .find(|dep| dep.is_parent_child())
            .map(|dep| dep.id.clone())
    }
}

pub const RESERVED_LABELS: &[&str] = &[
    "at:epic",
    "at:changeset",
    "at:agent",
    "at:message",
    "at:policy",
    "at:unread",
    "at:hooked",
    "at:draft",
    "at:ready",
    "at:subtask",
    "cs:planned",
    "cs:ready",
    "cs:in_progress",
    "cs:blocked",
    "cs:merged",
    "cs:abandoned",
];
