//! Feature codec: raw record to the exact numeric layout a model expects.
//!
//! Serving encodes one record at a time and training/evaluation encode whole
//! tables. Both go through the same per-record routine, so a record encodes
//! to the same vector regardless of which rows accompany it.

use super::record::FeatureRecord;
use super::schema::{FeatureLayout, Schema, UnseenPolicy};
use crate::error::{PriceError, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashSet;
use tracing::{debug, error};

/// Ordered column → value mapping produced by the codec.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVector {
    schema: Schema,
    values: Vec<f64>,
}

impl EncodedVector {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn columns(&self) -> &[String] {
        self.schema.columns()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a named column.
    pub fn get(&self, column: &str) -> Option<f64> {
        self.schema.position(column).map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.columns()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

impl Serialize for EncodedVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, &value)?;
        }
        map.end()
    }
}

/// Encodes [`FeatureRecord`]s against a target [`Schema`] using a [`FeatureLayout`].
#[derive(Debug, Clone)]
pub struct FeatureCodec {
    layout: FeatureLayout,
}

impl FeatureCodec {
    pub fn new(layout: FeatureLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    /// Encode a single record into `target`'s exact column order.
    pub fn encode(&self, record: &FeatureRecord, target: &Schema) -> Result<EncodedVector> {
        self.check_schema(target)?;
        self.encode_checked(record, target)
    }

    /// Encode a table of records. The schema is checked once.
    pub fn encode_batch(
        &self,
        records: &[FeatureRecord],
        target: &Schema,
    ) -> Result<Vec<EncodedVector>> {
        self.check_schema(target)?;
        records
            .iter()
            .map(|record| self.encode_checked(record, target))
            .collect()
    }

    /// Verify that every column of `target` is one this layout can produce and
    /// that full-block fields carry their whole vocabulary.
    pub fn check_schema(&self, target: &Schema) -> Result<()> {
        let mut known: HashSet<String> = HashSet::new();
        let mut missing: Vec<String> = Vec::new();

        for column in self.layout.numeric {
            if !target.contains(column) {
                missing.push(column.to_string());
            }
            known.insert(column.to_string());
        }

        for spec in self.layout.categorical {
            for level in spec.indicator_levels() {
                let column = spec.column(level);
                if spec.requires_full_block() && !target.contains(&column) {
                    missing.push(column.clone());
                }
                known.insert(column);
            }
        }

        let unknown: Vec<&String> = target
            .columns()
            .iter()
            .filter(|c| !known.contains(*c))
            .collect();

        let detail = match (missing.first(), unknown.first()) {
            (Some(column), _) => format!("required column '{}' missing from target schema", column),
            (None, Some(column)) => {
                format!("column '{}' is not produced by the feature layout", column)
            }
            (None, None) => return Ok(()),
        };

        // Width the layout would produce for this schema.
        let produced = target.len() - unknown.len() + missing.len();
        let err = PriceError::SchemaMismatch {
            expected: target.len(),
            actual: produced,
            detail,
        };
        error!(error = %err, "Target schema is incompatible with the feature layout");
        Err(err)
    }

    /// Encode assuming `target` already passed [`check_schema`](Self::check_schema).
    pub(crate) fn encode_checked(
        &self,
        record: &FeatureRecord,
        target: &Schema,
    ) -> Result<EncodedVector> {
        let index = target.index();
        let mut values = vec![0.0; target.len()];

        for column in self.layout.numeric {
            let value = record.numeric(column).ok_or_else(|| {
                PriceError::Internal(format!("record has no numeric column '{}'", column))
            })?;
            if let Some(&i) = index.get(column) {
                values[i] = value;
            }
        }

        for spec in self.layout.categorical {
            let Some(level) = record.level_for(spec) else {
                continue;
            };
            if spec.is_reference(level) {
                continue;
            }

            let column = spec.column(level);
            match (index.get(column.as_str()), spec.unseen) {
                (Some(&i), _) => values[i] = 1.0,
                (None, UnseenPolicy::ZeroBlock) => {
                    debug!(field = spec.field, level = %level, "Unseen level, encoding zero block");
                }
                (None, UnseenPolicy::Reject) => {
                    let err = PriceError::SchemaMismatch {
                        expected: target.len(),
                        actual: target.len() + 1,
                        detail: format!("indicator '{}' has no column in target schema", column),
                    };
                    error!(error = %err, "Encoded record does not fit model schema");
                    return Err(err);
                }
            }
        }

        Ok(EncodedVector {
            schema: target.clone(),
            values,
        })
    }
}

impl Default for FeatureCodec {
    fn default() -> Self {
        Self::new(FeatureLayout::standard())
    }
}
