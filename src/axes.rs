//! Canonical axis vocabulary and axis reordering
//!
//! Every image handled by this crate labels its dimensions with single-character
//! axis tags drawn from the canonical order `itczyx`:
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `i` | image / series index |
//! | `t` | time |
//! | `c` | channel |
//! | `z` | depth |
//! | `y` | row |
//! | `x` | column |
//!
//! An [`Axes`] value is an ordered, duplicate-free sequence of these tags. It is
//! validated on construction, so any `Axes` in hand is known to be well formed.

use crate::errors::{NdImageError, Result};
use crate::pixel::DType;
use ndarray::{ArrayD, ArrayViewD, CowArray, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical axis order.
pub const CANONICAL_AXES: &str = "itczyx";

/// One dimension label of the canonical vocabulary.
///
/// The derived ordering follows the canonical precedence `itczyx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AxisKind {
    #[serde(rename = "i")]
    Index,
    #[serde(rename = "t")]
    Time,
    #[serde(rename = "c")]
    Channel,
    #[serde(rename = "z")]
    Z,
    #[serde(rename = "y")]
    Y,
    #[serde(rename = "x")]
    X,
}

impl AxisKind {
    pub const ALL: [AxisKind; 6] = [
        AxisKind::Index,
        AxisKind::Time,
        AxisKind::Channel,
        AxisKind::Z,
        AxisKind::Y,
        AxisKind::X,
    ];

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'i' => Some(Self::Index),
            't' => Some(Self::Time),
            'c' => Some(Self::Channel),
            'z' => Some(Self::Z),
            'y' => Some(Self::Y),
            'x' => Some(Self::X),
            _ => None,
        }
    }

    pub const fn as_char(self) -> char {
        match self {
            Self::Index => 'i',
            Self::Time => 't',
            Self::Channel => 'c',
            Self::Z => 'z',
            Self::Y => 'y',
            Self::X => 'x',
        }
    }

    /// Upper-case tag, as used in partition file names.
    pub fn upper(self) -> char {
        self.as_char().to_ascii_uppercase()
    }

    /// `z`, `y` or `x`.
    pub const fn is_spatial(self) -> bool {
        matches!(self, Self::Z | Self::Y | Self::X)
    }

    /// Axes that are physically continuous and may carry a spacing (`t`, `z`, `y`, `x`).
    pub const fn has_spacing(self) -> bool {
        !matches!(self, Self::Index | Self::Channel)
    }

    /// Axes whose coordinates may be arbitrary labels rather than integers (`i`, `c`).
    pub const fn allows_labels(self) -> bool {
        matches!(self, Self::Index | Self::Channel)
    }
}

impl fmt::Display for AxisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// An ordered, duplicate-free axis string such as `"tzyx"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Axes(Vec<AxisKind>);

impl Axes {
    /// The full canonical order `itczyx`.
    pub fn canonical() -> Self {
        Self(AxisKind::ALL.to_vec())
    }

    /// Build from kinds, rejecting duplicates.
    pub fn from_kinds(kinds: impl IntoIterator<Item = AxisKind>) -> Result<Self> {
        let kinds: Vec<AxisKind> = kinds.into_iter().collect();
        for (i, kind) in kinds.iter().enumerate() {
            if kinds[..i].contains(kind) {
                let text: String = kinds.iter().map(|k| k.as_char()).collect();
                return Err(NdImageError::vocabulary(
                    text,
                    format!("duplicate axis '{}'", kind),
                ));
            }
        }
        Ok(Self(kinds))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = AxisKind> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[AxisKind] {
        &self.0
    }

    pub fn contains(&self, kind: AxisKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn position(&self, kind: AxisKind) -> Option<usize> {
        self.0.iter().position(|&k| k == kind)
    }

    pub fn first(&self) -> Option<AxisKind> {
        self.0.first().copied()
    }

    /// Keep only the axes also present in `other`, in `self`'s order.
    pub fn filter_to(&self, other: &Axes) -> Axes {
        Axes(self.iter().filter(|&k| other.contains(k)).collect())
    }

    /// Drop the axes present in `other`, keeping `self`'s order.
    pub fn without(&self, other: &Axes) -> Axes {
        Axes(self.iter().filter(|&k| !other.contains(k)).collect())
    }

    /// Drop a single axis.
    pub fn without_axis(&self, kind: AxisKind) -> Axes {
        Axes(self.iter().filter(|&k| k != kind).collect())
    }

    /// The last `n` axes (or all of them when `n` exceeds the length).
    pub fn suffix(&self, n: usize) -> Axes {
        let start = self.0.len().saturating_sub(n);
        Axes(self.0[start..].to_vec())
    }

    /// `self` followed by `other`; fails when they share an axis.
    pub fn concat(&self, other: &Axes) -> Result<Axes> {
        Axes::from_kinds(self.iter().chain(other.iter()))
    }

    /// True when both contain the same set of axes, in any order.
    pub fn same_set(&self, other: &Axes) -> bool {
        self.len() == other.len() && self.iter().all(|k| other.contains(k))
    }
}

impl FromStr for Axes {
    type Err = NdImageError;

    fn from_str(s: &str) -> Result<Self> {
        let mut kinds = Vec::with_capacity(s.len());
        for c in s.chars() {
            let kind = AxisKind::from_char(c).ok_or_else(|| {
                NdImageError::vocabulary(
                    s,
                    format!("unknown axis '{}', supported axes are '{}'", c, CANONICAL_AXES),
                )
            })?;
            if kinds.contains(&kind) {
                return Err(NdImageError::vocabulary(s, format!("duplicate axis '{}'", c)));
            }
            kinds.push(kind);
        }
        Ok(Axes(kinds))
    }
}

impl TryFrom<String> for Axes {
    type Error = NdImageError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Axes> for String {
    fn from(axes: Axes) -> Self {
        axes.to_string()
    }
}

impl fmt::Display for Axes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for kind in &self.0 {
            write!(f, "{}", kind.as_char())?;
        }
        Ok(())
    }
}

/// Validate an axis string: every character in `itczyx`, none repeated.
pub fn validate_axes(axes: &str) -> Result<Axes> {
    axes.parse()
}

/// Default axes for an image of `ndim` dimensions: the last `ndim` canonical axes.
///
/// `3` gives `zyx`, `6` gives `itczyx`.
pub fn infer_axes(ndim: usize) -> Result<Axes> {
    if ndim == 0 || ndim > AxisKind::ALL.len() {
        return Err(NdImageError::vocabulary(
            "",
            format!(
                "found {} axes, supports 1-{} axes",
                ndim,
                AxisKind::ALL.len()
            ),
        ));
    }
    Ok(Axes::canonical().suffix(ndim))
}

/// Default axes for a shape, recognising 2D RGB images.
///
/// A 3-dimensional shape whose first extent is 3 is read as `cyx`, otherwise one whose
/// last extent is 3 as `yxc`. The RGB rule applies when no dtype is known, or when the
/// dtype is `uint8` or `float32`; everything else falls back to [`infer_axes`].
pub fn infer_axes_for_shape(shape: &[usize], dtype: Option<DType>) -> Result<Axes> {
    let rgb_dtype = matches!(dtype, None | Some(DType::Uint8) | Some(DType::Float32));
    if shape.len() == 3 && rgb_dtype {
        if shape[0] == 3 {
            return "cyx".parse();
        } else if shape[2] == 3 {
            return "yxc".parse();
        }
    }
    infer_axes(shape.len())
}

/// Output axes for a given preferred order: `order` filtered down to the axes in
/// `present`. `None` keeps `present` unchanged.
pub fn output_axes(order: Option<&Axes>, present: &Axes) -> Axes {
    match order {
        Some(order) => order.filter_to(present),
        None => present.clone(),
    }
}

/// Resolve the effective reorder target and its permutation relative to `from`.
///
/// Returns `None` for the permutation when no reorder is needed.
fn plan_reorder(from: &Axes, to: &Axes) -> Result<Option<Vec<usize>>> {
    let target = if to.len() > from.len() {
        to.filter_to(from)
    } else {
        to.clone()
    };

    if let Some(missing) = target.iter().find(|&k| !from.contains(k)) {
        return Err(NdImageError::reorder(
            from.to_string(),
            to.to_string(),
            format!("axis '{}' is not available in the source", missing),
        ));
    }
    if let Some(lost) = from.iter().find(|&k| !target.contains(k)) {
        return Err(NdImageError::reorder(
            from.to_string(),
            to.to_string(),
            format!("axis '{}' would be dropped, slice it out first", lost),
        ));
    }

    if &target == from {
        return Ok(None);
    }

    let permutation = target
        .iter()
        .filter_map(|k| from.position(k))
        .collect::<Vec<_>>();
    Ok(Some(permutation))
}

fn check_rank(ndim: usize, from: &Axes) -> Result<()> {
    if ndim != from.len() {
        return Err(NdImageError::vocabulary(
            from.to_string(),
            format!("axes describe {} dimensions, array has {}", from.len(), ndim),
        ));
    }
    Ok(())
}

/// Transpose an owned array from one axis order to another.
///
/// `to` may be longer than `from`, in which case it is filtered to the axes of
/// `from`. When the orders already agree the input array is returned as is, without
/// copying. Otherwise the result is a freshly allocated standard-layout array.
pub fn reorder<A: Clone>(array: ArrayD<A>, from: &Axes, to: &Axes) -> Result<ArrayD<A>> {
    check_rank(array.ndim(), from)?;
    match plan_reorder(from, to)? {
        None => Ok(array),
        Some(permutation) => {
            let permuted = array.permuted_axes(IxDyn(&permutation));
            if permuted.is_standard_layout() {
                Ok(permuted)
            } else {
                Ok(permuted.as_standard_layout().into_owned())
            }
        }
    }
}

/// Borrowing variant of [`reorder`]: borrows when no reorder is needed, copies otherwise.
pub fn reorder_view<'a, A: Clone>(
    view: ArrayViewD<'a, A>,
    from: &Axes,
    to: &Axes,
) -> Result<CowArray<'a, A, IxDyn>> {
    check_rank(view.ndim(), from)?;
    match plan_reorder(from, to)? {
        None => Ok(CowArray::from(view)),
        Some(permutation) => {
            let permuted = view.permuted_axes(IxDyn(&permutation));
            Ok(CowArray::from(permuted.as_standard_layout().into_owned()))
        }
    }
}
