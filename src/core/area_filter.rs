//! Raster-space post filter for flood extents.
//!
//! Predicted extents are grown by a circular focal maximum and then cleared
//! of connected regions whose ground area is below a minimum. Working on the
//! raster directly replaces a vectorize / filter / rasterize round trip.

use crate::config::FloodConfig;
use crate::types::{ClassificationRaster, Raster, WaterClass};
use ndarray::Array2;
use std::collections::VecDeque;

const NEIGHBORS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Dilation and minimum-area filter
#[derive(Debug, Clone, PartialEq)]
pub struct FloodExtentFilter {
    pub dilation_radius_m: f64,
    pub min_area_sqm: f64,
}

impl Default for FloodExtentFilter {
    fn default() -> Self {
        Self {
            dilation_radius_m: 25.0,
            min_area_sqm: 50_000.0,
        }
    }
}

impl From<&FloodConfig> for FloodExtentFilter {
    fn from(config: &FloodConfig) -> Self {
        Self {
            dilation_radius_m: config.dilation_radius_m,
            min_area_sqm: config.min_area_sqm,
        }
    }
}

impl FloodExtentFilter {
    /// Dilate, then drop regions below the minimum area
    pub fn apply(&self, mask: &Raster<bool>) -> Raster<bool> {
        let dilated = dilate(mask, self.dilation_radius_m);
        remove_small_regions(&dilated, self.min_area_sqm)
    }

    /// Filtered extent of the given classes of a classification raster
    pub fn flood_extent(&self, classification: &ClassificationRaster, classes: &[WaterClass]) -> Raster<bool> {
        self.apply(&extent_mask(classification, classes))
    }
}

/// Pixels whose code is one of `classes`
pub fn extent_mask(classification: &ClassificationRaster, classes: &[WaterClass]) -> Raster<bool> {
    classification.map(|&code| classes.iter().any(|c| c.code() == code))
}

/// Focal maximum over a circular kernel of `radius_m` ground distance
pub fn dilate(mask: &Raster<bool>, radius_m: f64) -> Raster<bool> {
    let (pixel_w, pixel_h) = mask.grid().pixel_size_m();
    let pixel_size = pixel_w.max(pixel_h);
    if !(radius_m > 0.0) || !(pixel_size > 0.0) {
        return mask.clone();
    }

    let radius_px = radius_m / pixel_size;
    let reach = radius_px.floor() as isize;
    if reach == 0 {
        return mask.clone();
    }

    let offsets: Vec<(isize, isize)> = (-reach..=reach)
        .flat_map(|di| (-reach..=reach).map(move |dj| (di, dj)))
        .filter(|&(di, dj)| ((di * di + dj * dj) as f64).sqrt() <= radius_px)
        .collect();

    let data = mask.data();
    let (rows, cols) = data.dim();
    let mut out = Array2::from_elem((rows, cols), false);

    for ((i, j), &set) in data.indexed_iter() {
        if !set {
            continue;
        }
        for &(di, dj) in &offsets {
            if let Some((ni, nj)) = offset_index(i, j, di, dj, rows, cols) {
                out[[ni, nj]] = true;
            }
        }
    }

    Raster::from_parts(*mask.grid(), out)
}

/// Clear 8-connected regions whose ground area is below `min_area_sqm`
pub fn remove_small_regions(mask: &Raster<bool>, min_area_sqm: f64) -> Raster<bool> {
    let cell_area = mask.grid().pixel_area_sqm();
    let (labels, sizes) = label_components(mask.data());

    let mut removed = 0usize;
    let keep: Vec<bool> = sizes
        .iter()
        .map(|&size| {
            let kept = size as f64 * cell_area >= min_area_sqm;
            if !kept {
                removed += 1;
            }
            kept
        })
        .collect();

    if removed > 0 {
        log::debug!(
            "Removed {} of {} regions smaller than {} m²",
            removed,
            sizes.len(),
            min_area_sqm
        );
    }

    Raster::from_parts(
        *mask.grid(),
        labels.mapv(|label| label > 0 && keep[label - 1]),
    )
}

/// 8-connected component labels (0 = background, 1.. = region) and region sizes
pub fn label_components(mask: &Array2<bool>) -> (Array2<usize>, Vec<usize>) {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::<usize>::zeros((rows, cols));
    let mut sizes = Vec::new();
    let mut queue = VecDeque::new();

    for ((i, j), &set) in mask.indexed_iter() {
        if !set || labels[[i, j]] != 0 {
            continue;
        }

        let label = sizes.len() + 1;
        let mut size = 0;
        labels[[i, j]] = label;
        queue.push_back((i, j));

        while let Some((ci, cj)) = queue.pop_front() {
            size += 1;
            for &(di, dj) in &NEIGHBORS {
                if let Some((ni, nj)) = offset_index(ci, cj, di, dj, rows, cols) {
                    if mask[[ni, nj]] && labels[[ni, nj]] == 0 {
                        labels[[ni, nj]] = label;
                        queue.push_back((ni, nj));
                    }
                }
            }
        }
        sizes.push(size);
    }

    (labels, sizes)
}

fn offset_index(
    i: usize,
    j: usize,
    di: isize,
    dj: isize,
    rows: usize,
    cols: usize,
) -> Option<(usize, usize)> {
    let ni = i.checked_add_signed(di)?;
    let nj = j.checked_add_signed(dj)?;
    (ni < rows && nj < cols).then_some((ni, nj))
}
