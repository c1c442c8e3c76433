//! Per-domain arrays handed to and returned from an exchange.
//!
//! Arrays are laid out i-fastest over the domain's native (input) or
//! ghosted (output) extents for their centering. A [`Field`] stores
//! `ncomps` values per tuple; [`MixedCells`] stores a variable-length list
//! of `(material, value)` pairs per cell.

use crate::data::ghost_flags::GhostFlags;
use crate::mesh_error::HaloError;
use crate::topology::DomainId;
use crate::topology::extents::IndexBox;

/// Interleaved tuples of `ncomps` values each.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Field<T> {
    ncomps: usize,
    values: Vec<T>,
}

impl<T: Copy> Field<T> {
    /// One value per tuple.
    pub fn scalar(values: Vec<T>) -> Self {
        Self { ncomps: 1, values }
    }

    /// `values.len()` must be a multiple of `ncomps` (and `ncomps >= 1`).
    pub fn new(ncomps: usize, values: Vec<T>) -> Result<Self, HaloError> {
        if ncomps == 0 || values.len() % ncomps != 0 {
            return Err(HaloError::InvalidComponentCount {
                ncomps,
                len: values.len(),
            });
        }
        Ok(Self { ncomps, values })
    }

    pub(crate) fn from_parts(ncomps: usize, values: Vec<T>) -> Self {
        debug_assert!(ncomps > 0 && values.len() % ncomps == 0);
        Self { ncomps, values }
    }

    #[inline]
    pub fn ncomps(&self) -> usize {
        self.ncomps
    }

    /// Number of tuples.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len() / self.ncomps
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn tuple(&self, i: usize) -> &[T] {
        &self.values[i * self.ncomps..(i + 1) * self.ncomps]
    }

    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn into_values(self) -> Vec<T> {
        self.values
    }
}

/// Material composition per cell: `counts[c]` pairs of
/// `(materials, values)` belong to cell `c`, stored back to back.
///
/// For a material array `values` are volume fractions; for a mixed
/// variable they are the per-material values of that variable.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MixedCells {
    counts: Vec<u32>,
    materials: Vec<i32>,
    values: Vec<f64>,
}

impl MixedCells {
    pub fn new(counts: Vec<u32>, materials: Vec<i32>, values: Vec<f64>) -> Result<Self, HaloError> {
        let total: usize = counts.iter().map(|&c| c as usize).sum();
        if total != materials.len() || materials.len() != values.len() {
            return Err(HaloError::InvalidMaterialCounts {
                counted: total,
                materials: materials.len(),
                values: values.len(),
            });
        }
        Ok(Self {
            counts,
            materials,
            values,
        })
    }

    /// Build from one `(material, value)` list per cell.
    pub fn from_cells<I, C>(cells: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: IntoIterator<Item = (i32, f64)>,
    {
        let mut out = Self::default();
        for cell in cells {
            out.push_cell(cell);
        }
        out
    }

    /// Cells made of a single material with value `1.0`.
    pub fn pure(materials: &[i32]) -> Self {
        Self::from_cells(materials.iter().map(|&m| [(m, 1.0)]))
    }

    pub(crate) fn push_cell(&mut self, pairs: impl IntoIterator<Item = (i32, f64)>) {
        let before = self.materials.len();
        for (m, v) in pairs {
            self.materials.push(m);
            self.values.push(v);
        }
        self.counts.push((self.materials.len() - before) as u32);
    }

    pub(crate) fn push_empty(&mut self) {
        self.counts.push(0);
    }

    /// Number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn materials(&self) -> &[i32] {
        &self.materials
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Start of each cell's pairs, plus the total at the end.
    pub fn offsets(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.counts.len() + 1);
        let mut acc = 0usize;
        out.push(0);
        for &c in &self.counts {
            acc += c as usize;
            out.push(acc);
        }
        out
    }

    /// Pairs of cell `c`, given precomputed [`offsets`](Self::offsets).
    #[inline]
    pub fn cell<'a>(
        &'a self,
        offsets: &[usize],
        c: usize,
    ) -> impl Iterator<Item = (i32, f64)> + 'a {
        let (lo, hi) = (offsets[c], offsets[c + 1]);
        self.materials[lo..hi]
            .iter()
            .copied()
            .zip(self.values[lo..hi].iter().copied())
    }
}

/// One domain's exchange result.
#[derive(Clone, Debug, PartialEq)]
pub struct Ghosted<F> {
    pub domain: DomainId,
    /// Ghosted extents the data is laid out over.
    pub extents: IndexBox,
    pub data: F,
    /// One entry per tuple (cell or node) of `extents`.
    pub flags: Vec<GhostFlags>,
    /// Non-fatal problems that left part of the ghost layer unfilled.
    pub issues: Vec<HaloError>,
}

impl<F> Ghosted<F> {
    /// Flag of the entity at global index `p`, if inside the ghosted extents.
    pub fn flag_at(&self, p: [i64; 3]) -> Option<GhostFlags> {
        self.extents
            .contains(p)
            .then(|| self.flags[self.extents.offset_of(p)])
    }

    /// Number of entities flagged as ghosts of any kind.
    pub fn ghost_count(&self) -> usize {
        self.flags.iter().filter(|f| !f.is_real()).count()
    }
}

impl<T: Copy> Ghosted<Field<T>> {
    /// Tuple at global index `p`, if inside the ghosted extents.
    pub fn at(&self, p: [i64; 3]) -> Option<&[T]> {
        self.extents
            .contains(p)
            .then(|| self.data.tuple(self.extents.offset_of(p)))
    }
}
