//! Per-entity-category merge actions.
//!
//! A [`MergePolicy`] is built once from raw `(category, action)` strings and
//! is immutable afterwards. Each category only accepts a subset of
//! [`Action`]s; anything outside that subset is rejected before the pipeline
//! touches a database.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// How the transform combines incoming records of one category with the
/// template's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Skip,
    Merge,
    Overwrite,
    Replace,
}

impl Action {
    pub const ALL: [Action; 4] = [Self::Skip, Self::Merge, Self::Overwrite, Self::Replace];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Merge => "merge",
            Self::Overwrite => "overwrite",
            Self::Replace => "replace",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "skip" => Ok(Self::Skip),
            "merge" => Ok(Self::Merge),
            "overwrite" => Ok(Self::Overwrite),
            "replace" => Ok(Self::Replace),
            _ => Err(ConfigError::UnknownAction(s.to_string())),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EntityCategory
// ---------------------------------------------------------------------------

/// A class of project data with its own merge rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityCategory {
    User,
    Project,
    NodeCategory,
    Node,
    NodeAttribute,
    SourceCategory,
    Source,
    SourceAttribute,
    Tagging,
    Annotation,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 10] = [
        Self::User,
        Self::Project,
        Self::NodeCategory,
        Self::Node,
        Self::NodeAttribute,
        Self::SourceCategory,
        Self::Source,
        Self::SourceAttribute,
        Self::Tagging,
        Self::Annotation,
    ];

    /// Wire name, also used as the command-line option name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Project => "project",
            Self::NodeCategory => "node_categories",
            Self::Node => "nodes",
            Self::NodeAttribute => "node_attributes",
            Self::SourceCategory => "source_categories",
            Self::Source => "sources",
            Self::SourceAttribute => "source_attributes",
            Self::Tagging => "taggings",
            Self::Annotation => "annotations",
        }
    }

    /// Parse a wire name. Hyphens are accepted in place of underscores.
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let normalized = s.replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownCategory(s.to_string()))
    }

    pub fn allowed_actions(&self) -> &'static [Action] {
        use Action::*;
        match self {
            Self::User => &[Skip, Merge, Overwrite, Replace],
            Self::Project => &[Skip, Overwrite],
            Self::Node | Self::Tagging | Self::Annotation => &[Skip, Merge],
            Self::NodeCategory
            | Self::NodeAttribute
            | Self::SourceCategory
            | Self::Source
            | Self::SourceAttribute => &[Skip, Merge, Overwrite],
        }
    }

    pub fn default_action(&self) -> Action {
        match self {
            Self::Project => Action::Overwrite,
            _ => Action::Merge,
        }
    }

    pub fn permits(&self, action: Action) -> bool {
        self.allowed_actions().contains(&action)
    }
}

impl std::fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// MergePolicy
// ---------------------------------------------------------------------------

/// Validated action for every [`EntityCategory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePolicy {
    actions: BTreeMap<EntityCategory, Action>,
}

impl MergePolicy {
    /// Validate raw `(category, action)` choices.
    ///
    /// Categories not mentioned take their default action. A later choice
    /// for the same category replaces an earlier one.
    pub fn build<I, C, A>(raw: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (C, A)>,
        C: AsRef<str>,
        A: AsRef<str>,
    {
        let mut actions: BTreeMap<EntityCategory, Action> = EntityCategory::ALL
            .into_iter()
            .map(|category| (category, category.default_action()))
            .collect();

        for (category, action) in raw {
            let category = EntityCategory::from_str(category.as_ref())?;
            let action = Action::from_str(action.as_ref())?;
            if !category.permits(action) {
                return Err(ConfigError::DisallowedAction {
                    category: category.as_str(),
                    action: action.as_str(),
                    allowed: category
                        .allowed_actions()
                        .iter()
                        .map(Action::as_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
            actions.insert(category, action);
        }

        Ok(Self { actions })
    }

    pub fn action(&self, category: EntityCategory) -> Action {
        self.actions
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_action())
    }

    /// Entries in category declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityCategory, Action)> + '_ {
        self.actions.iter().map(|(category, action)| (*category, *action))
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            actions: EntityCategory::ALL
                .into_iter()
                .map(|category| (category, category.default_action()))
                .collect(),
        }
    }
}

impl Serialize for MergePolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.actions.len()))?;
        for (category, action) in self.iter() {
            map.serialize_entry(category.as_str(), &action)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
