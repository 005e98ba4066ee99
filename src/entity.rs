//! Entity declarations.
//!
//! An entity is the type of a countable simulation unit. Exactly one entity
//! of a tax-benefit system is the person entity; every other entity is a
//! group whose members are persons holding named roles.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A role persons may hold inside a group entity.
///
/// # Examples
///
/// ```
/// use microsim::Role;
///
/// let parent = Role::new("parent").with_max(2).with_subroles(["first_parent", "second_parent"]);
/// assert!(parent.matches("second_parent"));
/// assert!(parent.matches("parent"));
/// assert!(!parent.matches("child"));
/// ```
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub key: String,
    pub plural: Option<String>,
    pub label: Option<String>,
    /// Maximum number of persons holding this role in one group.
    pub max: Option<usize>,
    pub subroles: Vec<String>,
}

impl Role {
    /// Declares a role with no cardinality limit.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            plural: None,
            label: None,
            max: None,
            subroles: Vec::new(),
        }
    }

    /// Plural key, used when a formula refers to all holders of the role.
    #[must_use]
    pub fn with_plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = Some(plural.into());
        self
    }

    /// Human-readable label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Caps the number of persons holding the role in one group.
    #[must_use]
    pub const fn with_max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    /// Declares subroles. A subrole holds at most one person.
    #[must_use]
    pub fn with_subroles<I, S>(mut self, subroles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subroles = subroles.into_iter().map(Into::into).collect();
        self
    }

    /// True when a member holding `held` counts as holding this role.
    #[must_use]
    pub fn matches(&self, held: &str) -> bool {
        self.key == held || self.subroles.iter().any(|s| s == held)
    }
}

/// The type of a countable simulation unit.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub key: String,
    pub plural: String,
    pub label: Option<String>,
    pub doc: Option<String>,
    pub is_person: bool,
    /// Empty for the person entity.
    pub roles: Vec<Role>,
    /// Group entities every group of this entity is nested within.
    pub containing_entities: Vec<String>,
}

impl Entity {
    /// Declares the person entity.
    #[must_use]
    pub fn person(key: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            plural: plural.into(),
            label: None,
            doc: None,
            is_person: true,
            roles: Vec::new(),
            containing_entities: Vec::new(),
        }
    }

    /// Declares a group entity with its roles.
    #[must_use]
    pub fn group(key: impl Into<String>, plural: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            key: key.into(),
            plural: plural.into(),
            label: None,
            doc: None,
            is_person: false,
            roles,
            containing_entities: Vec::new(),
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Free-form documentation.
    #[must_use]
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Declares group entities this entity is always nested within.
    #[must_use]
    pub fn with_containing_entities<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.containing_entities = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Looks up a role by key.
    #[must_use]
    pub fn role(&self, key: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.key == key)
    }

    /// True when `held` is a role or subrole key of this entity.
    #[must_use]
    pub fn knows_role(&self, held: &str) -> bool {
        self.roles.iter().any(|r| r.matches(held))
    }

    /// Validates the declaration.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidEntity` when keys are empty, a person
    /// entity declares roles, or role keys collide.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidEntity {
            key: self.key.clone(),
            reason: reason.to_string(),
        };
        if self.key.trim().is_empty() || self.plural.trim().is_empty() {
            return Err(invalid("key and plural must not be empty"));
        }
        if self.is_person && (!self.roles.is_empty() || !self.containing_entities.is_empty()) {
            return Err(invalid("a person entity has no roles nor containing entities"));
        }
        if !self.is_person && self.roles.is_empty() {
            return Err(invalid("a group entity needs at least one role"));
        }
        let mut seen = std::collections::HashSet::new();
        for key in self
            .roles
            .iter()
            .flat_map(|r| std::iter::once(&r.key).chain(r.subroles.iter()))
        {
            if !seen.insert(key.as_str()) {
                return Err(invalid(&format!("role '{key}' is declared twice")));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
