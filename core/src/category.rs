//! Intake category definitions and the registry they are loaded into.
//!
//! Categories are validated once when the registry is built. Lookups afterwards are by the
//! closed [`CategoryKey`] or, for the move command, by display name.

use crate::ids::{CategoryKey, LocationId, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Most questions a single intake form can carry.
pub const MAX_QUESTIONS: usize = 5;

/// Longest answer accepted by a multi-line question.
pub const PARAGRAPH_MAX_LENGTH: u16 = 1000;

/// Single-line or multi-line input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStyle {
    /// Single line.
    #[default]
    Short,
    /// Multi-line, capped at [`PARAGRAPH_MAX_LENGTH`].
    Paragraph,
}

/// One field of an intake form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Field label, also used as the field title in the intake message.
    pub label: String,
    /// Hint shown in the empty input.
    #[serde(default)]
    pub placeholder: String,
    /// Input style.
    #[serde(default)]
    pub style: QuestionStyle,
    /// Whether an answer is mandatory.
    #[serde(default = "default_required")]
    pub required: bool,
    /// Minimum answer length.
    #[serde(default)]
    pub min_length: u16,
}

const fn default_required() -> bool {
    true
}

impl Question {
    /// Maximum answer length, if the style imposes one.
    #[must_use]
    pub const fn max_length(&self) -> Option<u16> {
        match self.style {
            QuestionStyle::Short => None,
            QuestionStyle::Paragraph => Some(PARAGRAPH_MAX_LENGTH),
        }
    }
}

/// How new contexts of a category are named.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingStrategy {
    /// `<category>-<username>`
    #[default]
    Username,
    /// `<category>-<totalTickets before increment>`
    Sequence,
}

/// A category users can open tickets in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    /// Closed identifier; doubles as the picker button id.
    pub key: CategoryKey,
    /// Display label, stored on records as `ticket_type`.
    pub name: String,
    /// Location new contexts are created under.
    pub location_id: LocationId,
    /// Location closed contexts are moved to, if any.
    #[serde(default)]
    pub closed_location_id: Option<LocationId>,
    /// Groups that staff this category.
    #[serde(default)]
    pub staff_role_ids: Vec<RoleId>,
    /// Groups mentioned in the intake message.
    #[serde(default)]
    pub ping_role_ids: Vec<RoleId>,
    /// Groups allowed to open tickets here. Empty means everybody.
    #[serde(default)]
    pub creator_role_ids: Vec<RoleId>,
    /// Title of the intake form.
    #[serde(default)]
    pub form_title: Option<String>,
    /// Title of the intake message.
    #[serde(default)]
    pub embed_title: Option<String>,
    /// Description of the intake message.
    #[serde(default)]
    pub description: Option<String>,
    /// Accent color of the intake message.
    #[serde(default)]
    pub color: Option<String>,
    /// Context naming strategy.
    #[serde(default)]
    pub naming: NamingStrategy,
    /// Ordered intake questions.
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl CategoryDefinition {
    /// Whether `name` refers to this category, ignoring case.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }

    /// Title to show on the intake form.
    #[must_use]
    pub fn form_title(&self) -> &str {
        self.form_title.as_deref().unwrap_or(&self.name)
    }
}

/// Problems found while building a [`CategoryRegistry`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CategoryError {
    /// No categories were configured.
    #[error("at least one ticket category must be configured")]
    Empty,

    /// Two categories share a key.
    #[error("duplicate category key '{0}'")]
    DuplicateKey(CategoryKey),

    /// Two categories share a display name (names are compared case-insensitively).
    #[error("duplicate category name '{0}'")]
    DuplicateName(String),

    /// A form has more questions than the platform accepts.
    #[error("category '{key}' has {count} questions, at most {MAX_QUESTIONS} are allowed")]
    TooManyQuestions {
        /// Offending category.
        key: CategoryKey,
        /// Number of questions configured.
        count: usize,
    },

    /// A key collides with a reserved action id.
    #[error("category key '{0}' is reserved")]
    ReservedKey(CategoryKey),
}

/// Indexed, validated table of category definitions.
#[derive(Clone, Debug)]
pub struct CategoryRegistry {
    categories: Vec<CategoryDefinition>,
    by_key: HashMap<CategoryKey, usize>,
}

impl CategoryRegistry {
    /// Validate and index `categories`, keeping their configured order.
    ///
    /// # Errors
    ///
    /// Returns [`CategoryError`] when the list is empty, a key or name repeats, a key shadows
    /// a fixed action id, or a form is too long.
    pub fn new(categories: Vec<CategoryDefinition>) -> Result<Self, CategoryError> {
        if categories.is_empty() {
            return Err(CategoryError::Empty);
        }

        let mut by_key = HashMap::with_capacity(categories.len());
        let mut names: Vec<String> = Vec::with_capacity(categories.len());

        for (index, category) in categories.iter().enumerate() {
            if crate::catalog::is_reserved(category.key.as_str()) {
                return Err(CategoryError::ReservedKey(category.key.clone()));
            }
            if by_key.insert(category.key.clone(), index).is_some() {
                return Err(CategoryError::DuplicateKey(category.key.clone()));
            }
            let lowered = category.name.to_lowercase();
            if names.contains(&lowered) {
                return Err(CategoryError::DuplicateName(category.name.clone()));
            }
            names.push(lowered);
            if category.questions.len() > MAX_QUESTIONS {
                return Err(CategoryError::TooManyQuestions {
                    key: category.key.clone(),
                    count: category.questions.len(),
                });
            }
        }

        Ok(Self { categories, by_key })
    }

    /// Definition for `key`.
    #[must_use]
    pub fn by_key(&self, key: &CategoryKey) -> Option<&CategoryDefinition> {
        self.by_key.get(key).map(|&index| &self.categories[index])
    }

    /// Definition whose display name matches `name`, ignoring case.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&CategoryDefinition> {
        self.categories.iter().find(|category| category.matches_name(name))
    }

    /// Display names in configured order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    /// Iterate in configured order.
    pub fn iter(&self) -> impl Iterator<Item = &CategoryDefinition> {
        self.categories.iter()
    }

    /// Number of categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Always false for a successfully built registry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
