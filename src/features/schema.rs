//! Column layouts: the declared categorical mapping table and the ordered
//! schema a trained model expects.

use super::record::{FeatureRecord, MAKE_VOCABULARY};
use crate::error::{PriceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Which indicator column, if any, is left implicit for a categorical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPolicy {
    /// Every level gets an explicit column.
    KeepAll,
    /// The named reference level has no column; it is the all-zero block.
    Reference(&'static str),
}

/// What happens when a record carries a level the target schema has no column for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnseenPolicy {
    /// Encode the whole block as zeros. Accuracy degrades, the request succeeds.
    ZeroBlock,
    /// Fail the encode with a schema mismatch.
    Reject,
}

/// Declared encoding rules for one categorical field.
///
/// The same table drives training-time and serving-time encoding, so the two
/// paths cannot diverge on reference levels or legacy codes.
#[derive(Debug, Clone, Copy)]
pub struct CategoricalSpec {
    /// Field name, also the indicator column prefix.
    pub field: &'static str,
    /// Known levels in column order.
    pub levels: &'static [&'static str],
    pub drop: DropPolicy,
    pub unseen: UnseenPolicy,
    /// Legacy raw values folded into a canonical level before encoding.
    pub aliases: &'static [(&'static str, &'static str)],
}

impl CategoricalSpec {
    /// Indicator column name for `level`.
    pub fn column(&self, level: &str) -> String {
        format!("{}_{}", self.field, level)
    }

    /// Map a raw value to its canonical level, applying aliases.
    pub fn canonical_level(&self, raw: &str) -> Option<&'static str> {
        let raw = self
            .aliases
            .iter()
            .find(|(alias, _)| *alias == raw)
            .map(|(_, level)| *level)
            .unwrap_or(raw);
        self.levels.iter().copied().find(|level| *level == raw)
    }

    /// Whether `level` is the implicit reference category.
    pub fn is_reference(&self, level: &str) -> bool {
        matches!(self.drop, DropPolicy::Reference(reference) if reference == level)
    }

    /// Levels that get an explicit column.
    pub fn indicator_levels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.levels
            .iter()
            .copied()
            .filter(move |level| !self.is_reference(level))
    }

    /// Whether every vocabulary entry must be present in a schema.
    pub fn requires_full_block(&self) -> bool {
        self.drop == DropPolicy::KeepAll
    }
}

/// Transmission: `A` is the reference level; legacy VIN codes `6`/`7` fold to `M`/`A`.
pub const TRANSMISSION: CategoricalSpec = CategoricalSpec {
    field: "transmission_from_vin",
    levels: &["A", "M"],
    drop: DropPolicy::Reference("A"),
    unseen: UnseenPolicy::Reject,
    aliases: &[("6", "M"), ("7", "A")],
};

/// Stock type: `NEW` is the reference level.
pub const STOCK_TYPE: CategoricalSpec = CategoricalSpec {
    field: "stock_type",
    levels: &["NEW", "USED"],
    drop: DropPolicy::Reference("NEW"),
    unseen: UnseenPolicy::Reject,
    aliases: &[],
};

/// Make: full block over the closed vocabulary, unseen makes encode as zeros.
pub const MAKE: CategoricalSpec = CategoricalSpec {
    field: "make",
    levels: &MAKE_VOCABULARY,
    drop: DropPolicy::KeepAll,
    unseen: UnseenPolicy::ZeroBlock,
    aliases: &[],
};

const STANDARD_NUMERIC: [&str; 3] = ["mileage", "model_year", "msrp"];
const STANDARD_CATEGORICAL: [CategoricalSpec; 3] = [TRANSMISSION, STOCK_TYPE, MAKE];

/// Numeric columns followed by categorical blocks, in column order.
#[derive(Debug, Clone, Copy)]
pub struct FeatureLayout {
    pub numeric: &'static [&'static str],
    pub categorical: &'static [CategoricalSpec],
}

impl FeatureLayout {
    /// The layout the price models are trained with.
    pub fn standard() -> Self {
        Self {
            numeric: &STANDARD_NUMERIC,
            categorical: &STANDARD_CATEGORICAL,
        }
    }

    /// Spec for a categorical field.
    pub fn spec(&self, field: &str) -> Option<&CategoricalSpec> {
        self.categorical.iter().find(|spec| spec.field == field)
    }

    /// Every column the layout can produce: numeric columns, then each
    /// categorical block without its reference level.
    pub fn canonical_schema(&self) -> Schema {
        let mut columns: Vec<String> = self.numeric.iter().map(|c| c.to_string()).collect();
        for spec in self.categorical {
            columns.extend(spec.indicator_levels().map(|level| spec.column(level)));
        }
        Schema::from_unique(columns)
    }

    /// Derive the schema a model trained on `records` is fit against.
    ///
    /// Reference-drop fields only get columns for levels that occur in the
    /// data; full-block fields always get the whole vocabulary.
    pub fn fit_schema(&self, records: &[FeatureRecord]) -> Schema {
        let mut columns: Vec<String> = self.numeric.iter().map(|c| c.to_string()).collect();
        for spec in self.categorical {
            if spec.requires_full_block() {
                columns.extend(spec.levels.iter().map(|level| spec.column(level)));
                continue;
            }

            let observed: BTreeSet<&str> = records
                .iter()
                .filter_map(|record| record.level_for(spec))
                .filter_map(|raw| spec.canonical_level(raw))
                .collect();
            columns.extend(
                spec.indicator_levels()
                    .filter(|level| observed.contains(level))
                    .map(|level| spec.column(level)),
            );
        }
        Schema::from_unique(columns)
    }
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self::standard()
    }
}

/// Ordered, duplicate-free list of column names a model was trained with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Schema {
    columns: Arc<[String]>,
}

impl Schema {
    /// Build a schema, rejecting duplicate column names.
    pub fn new(columns: Vec<String>) -> Result<Self> {
        let mut seen = std::collections::HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(PriceError::SchemaMismatch {
                    expected: seen.len(),
                    actual: columns.len(),
                    detail: format!("duplicate column '{}'", column),
                });
            }
        }
        Ok(Self::from_unique(columns))
    }

    fn from_unique(columns: Vec<String>) -> Self {
        Self {
            columns: columns.into(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    /// Column-name lookup table for repeated probes.
    pub(crate) fn index(&self) -> HashMap<&str, usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect()
    }
}

impl TryFrom<Vec<String>> for Schema {
    type Error = PriceError;

    fn try_from(columns: Vec<String>) -> Result<Self> {
        Schema::new(columns)
    }
}

impl From<Schema> for Vec<String> {
    fn from(schema: Schema) -> Self {
        schema.columns.to_vec()
    }
}
