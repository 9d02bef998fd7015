//! Spacing and spacing-unit normalization
//!
//! Backends and callers hand over spacing in one of two shapes: a positional
//! sequence aligned (from the right) with the `t`, `z`, `y`, `x` axes of the image, or
//! an explicit per-axis map. [`merge_spacing`] turns either into the canonical
//! [`SpacingRecord`] / [`UnitsRecord`] pair.

use crate::axes::{Axes, AxisKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Known physical spacing per axis. Only `t`, `z`, `y`, `x` ever appear.
pub type SpacingRecord = BTreeMap<AxisKind, f64>;

/// Physical unit per axis. Only axes with a spacing ever appear.
pub type UnitsRecord = BTreeMap<AxisKind, String>;

/// Unit strings that mean "no unit known".
///
/// `"sec"` is in this set for compatibility with older files that wrote it as a
/// placeholder; it is not a real time unit here.
pub const NO_UNIT_ALIASES: [&str; 6] = ["", " ", "pixel", "pix", "px", "sec"];

pub fn is_no_unit(unit: &str) -> bool {
    NO_UNIT_ALIASES.contains(&unit)
}

/// Spacing as supplied by a backend or caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpacingInput {
    Positional(Vec<Option<f64>>),
    Keyed(BTreeMap<AxisKind, Option<f64>>),
}

/// Spacing units as supplied by a backend or caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitsInput {
    Positional(Vec<Option<String>>),
    Keyed(BTreeMap<AxisKind, Option<String>>),
}

/// Pair a positional sequence with the spacing-capable axes of `axes`, aligned on
/// the right: `(0.5,)` on `zyx` sets only `x`. A sequence longer than those axes
/// contributes its leading values.
fn right_align<T: Clone>(axes: &Axes, values: &[Option<T>]) -> BTreeMap<AxisKind, Option<T>> {
    let spaced: Vec<AxisKind> = axes.iter().filter(|k| k.has_spacing()).collect();
    let n = spaced.len().min(values.len());
    spaced[spaced.len() - n..]
        .iter()
        .copied()
        .zip(values.iter().cloned())
        .collect()
}

impl SpacingInput {
    pub fn keyed(&self, axes: &Axes) -> BTreeMap<AxisKind, Option<f64>> {
        match self {
            SpacingInput::Positional(values) => right_align(axes, values),
            SpacingInput::Keyed(map) => map.clone(),
        }
    }

    /// Relabel keys through `mapping`, dropping keys it does not cover.
    pub fn relabel(&self, axes: &Axes, mapping: &BTreeMap<AxisKind, AxisKind>) -> SpacingInput {
        SpacingInput::Keyed(
            self.keyed(axes)
                .into_iter()
                .filter_map(|(k, v)| mapping.get(&k).map(|&to| (to, v)))
                .collect(),
        )
    }
}

impl UnitsInput {
    pub fn keyed(&self, axes: &Axes) -> BTreeMap<AxisKind, Option<String>> {
        match self {
            UnitsInput::Positional(values) => right_align(axes, values),
            UnitsInput::Keyed(map) => map.clone(),
        }
    }

    pub fn relabel(&self, axes: &Axes, mapping: &BTreeMap<AxisKind, AxisKind>) -> UnitsInput {
        UnitsInput::Keyed(
            self.keyed(axes)
                .into_iter()
                .filter_map(|(k, v)| mapping.get(&k).map(|&to| (to, v)))
                .collect(),
        )
    }
}

impl From<SpacingRecord> for SpacingInput {
    fn from(record: SpacingRecord) -> Self {
        SpacingInput::Keyed(record.into_iter().map(|(k, v)| (k, Some(v))).collect())
    }
}

impl From<UnitsRecord> for UnitsInput {
    fn from(record: UnitsRecord) -> Self {
        UnitsInput::Keyed(record.into_iter().map(|(k, v)| (k, Some(v))).collect())
    }
}

/// Normalize spacing and units for an image with the given `axes`.
///
/// - spacing that is missing, NaN, or on an axis absent from `axes` (or on `i`/`c`) is dropped
/// - units from [`NO_UNIT_ALIASES`] are dropped
/// - a `z`/`y`/`x` spacing of exactly 0 or 1 whose unit was just dropped is dropped too
/// - units on axes without spacing are dropped
/// - when every `z`/`y`/`x` unit present agrees, spaced `z`/`y`/`x` axes without a unit inherit it
pub fn merge_spacing(
    axes: &Axes,
    spacing: Option<&SpacingInput>,
    units: Option<&UnitsInput>,
) -> (SpacingRecord, UnitsRecord) {
    let eligible = |k: &AxisKind| axes.contains(*k) && k.has_spacing();

    let mut merged_spacing: SpacingRecord = spacing
        .map(|s| s.keyed(axes))
        .unwrap_or_default()
        .into_iter()
        .filter(|(k, _)| eligible(k))
        .filter_map(|(k, v)| v.filter(|v| !v.is_nan()).map(|v| (k, v)))
        .collect();

    let mut merged_units = UnitsRecord::new();
    let mut meaningless = BTreeSet::new();
    for (k, unit) in units.map(|u| u.keyed(axes)).unwrap_or_default() {
        if !eligible(&k) {
            continue;
        }
        match unit {
            Some(unit) if is_no_unit(&unit) => {
                meaningless.insert(k);
            }
            Some(unit) => {
                merged_units.insert(k, unit);
            }
            None => {}
        }
    }

    merged_spacing.retain(|k, v| {
        !(k.is_spatial() && meaningless.contains(k) && (*v == 0.0 || *v == 1.0))
    });
    merged_units.retain(|k, _| merged_spacing.contains_key(k));

    let spatial_units: BTreeSet<String> = merged_units
        .iter()
        .filter(|(k, _)| k.is_spatial())
        .map(|(_, u)| u.clone())
        .collect();
    if let [common] = Vec::from_iter(spatial_units).as_slice() {
        for k in merged_spacing.keys().filter(|k| k.is_spatial()) {
            merged_units.entry(*k).or_insert_with(|| common.clone());
        }
    }

    (merged_spacing, merged_units)
}
