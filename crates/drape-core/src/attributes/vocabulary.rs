//! Fixed attribute vocabularies and the category gates for conditional attributes.
//!
//! Every vocabulary is a process-wide constant. Labels are templated into
//! natural-language prompts; the label travels alongside the prompt text so
//! the winning label is recovered exactly after scoring.

use serde::{Deserialize, Serialize};

/// An attribute dimension extracted from a product image.
///
/// Declaration order is the order attributes appear in serialized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Attribute {
    Category,
    Color,
    Pattern,
    Gender,
    SleeveLength,
    Neckline,
    Length,
}

impl Attribute {
    /// Wire name of the attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Category => "category",
            Attribute::Color => "color",
            Attribute::Pattern => "pattern",
            Attribute::Gender => "gender",
            Attribute::SleeveLength => "sleeveLength",
            Attribute::Neckline => "neckline",
            Attribute::Length => "length",
        }
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which images an attribute applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Extracted for every image
    Always,
    /// Extracted only for images whose category is in the set
    Categories(&'static [&'static str]),
}

impl Gate {
    /// Whether an image with this category should get the attribute.
    pub fn admits(&self, category: &str) -> bool {
        match self {
            Gate::Always => true,
            Gate::Categories(valid) => valid.contains(&category),
        }
    }
}

/// A candidate prompt and the vocabulary label embedded in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub label: String,
    pub text: String,
}

impl Prompt {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Ordered label set for one attribute plus the template that phrases each label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeVocabulary {
    pub attribute: Attribute,
    pub labels: &'static [&'static str],
    /// Template with a single `{label}` placeholder
    pub template: &'static str,
    pub gate: Gate,
}

impl AttributeVocabulary {
    /// Expand every label through the template, in vocabulary order.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.labels
            .iter()
            .map(|label| Prompt::new(*label, self.template.replace("{label}", label)))
            .collect()
    }

    /// Number of candidate labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the vocabulary has no labels.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Whether the attribute depends on the category result.
    pub fn is_conditional(&self) -> bool {
        !matches!(self.gate, Gate::Always)
    }
}

pub const CATEGORY_LABELS: &[&str] = &[
    "dress", "top", "shirt", "blouse", "t-shirt", "sweater", "hoodie", "jacket", "coat", "pants",
    "jeans", "shorts", "skirt", "shoes", "sneakers", "boots", "sandals", "heels", "bag",
    "backpack", "hat", "scarf", "belt", "sunglasses",
];

pub const COLOR_LABELS: &[&str] = &[
    "black", "white", "gray", "red", "blue", "green", "yellow", "orange", "pink", "purple",
    "brown", "beige", "navy", "burgundy", "cream",
];

pub const PATTERN_LABELS: &[&str] = &[
    "solid",
    "striped",
    "plaid",
    "floral",
    "geometric",
    "dots",
    "animal",
];

pub const GENDER_LABELS: &[&str] = &["men", "women", "boys", "girls", "unisex", "kids"];

pub const SLEEVE_LENGTH_LABELS: &[&str] = &["sleeveless", "short", "long", "three-quarter"];

pub const NECKLINE_LABELS: &[&str] = &[
    "round",
    "v-neck",
    "collar",
    "turtleneck",
    "scoop",
    "square",
    "off-shoulder",
];

pub const LENGTH_LABELS: &[&str] = &["mini", "knee", "midi", "maxi", "ankle"];

/// Categories that have sleeves.
pub const SLEEVE_CATEGORIES: &[&str] = &[
    "dress", "top", "shirt", "blouse", "t-shirt", "sweater", "hoodie", "jacket", "coat",
];

/// Categories with a visible neckline.
pub const NECKLINE_CATEGORIES: &[&str] =
    &["dress", "top", "shirt", "blouse", "t-shirt", "sweater"];

/// Categories with a hem length.
pub const LENGTH_CATEGORIES: &[&str] = &["dress", "skirt"];

pub const CATEGORY: AttributeVocabulary = AttributeVocabulary {
    attribute: Attribute::Category,
    labels: CATEGORY_LABELS,
    template: "a photo of a {label}",
    gate: Gate::Always,
};

pub const COLOR: AttributeVocabulary = AttributeVocabulary {
    attribute: Attribute::Color,
    labels: COLOR_LABELS,
    template: "{label} clothing",
    gate: Gate::Always,
};

pub const PATTERN: AttributeVocabulary = AttributeVocabulary {
    attribute: Attribute::Pattern,
    labels: PATTERN_LABELS,
    template: "{label} pattern clothing",
    gate: Gate::Always,
};

pub const GENDER: AttributeVocabulary = AttributeVocabulary {
    attribute: Attribute::Gender,
    labels: GENDER_LABELS,
    template: "{label} fashion",
    gate: Gate::Always,
};

pub const SLEEVE_LENGTH: AttributeVocabulary = AttributeVocabulary {
    attribute: Attribute::SleeveLength,
    labels: SLEEVE_LENGTH_LABELS,
    template: "{label} sleeve clothing",
    gate: Gate::Categories(SLEEVE_CATEGORIES),
};

pub const NECKLINE: AttributeVocabulary = AttributeVocabulary {
    attribute: Attribute::Neckline,
    labels: NECKLINE_LABELS,
    template: "{label} neckline",
    gate: Gate::Categories(NECKLINE_CATEGORIES),
};

pub const LENGTH: AttributeVocabulary = AttributeVocabulary {
    attribute: Attribute::Length,
    labels: LENGTH_LABELS,
    template: "{label} length dress",
    gate: Gate::Categories(LENGTH_CATEGORIES),
};

/// Unconditional attributes that do not depend on the category result.
pub const INDEPENDENT: &[AttributeVocabulary] = &[COLOR, PATTERN, GENDER];

/// Attributes gated on the category result.
pub const CONDITIONAL: &[AttributeVocabulary] = &[SLEEVE_LENGTH, NECKLINE, LENGTH];

/// Every vocabulary, category first.
pub const ALL: &[AttributeVocabulary] = &[
    CATEGORY,
    COLOR,
    PATTERN,
    GENDER,
    SLEEVE_LENGTH,
    NECKLINE,
    LENGTH,
];
