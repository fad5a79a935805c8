//! Outer contour extraction and sheet counting.
//!
//! Uses Suzuki-Abe border following via
//! [`imageproc::contours::find_contours`] and keeps only the outermost
//! borders: outer borders with no enclosing parent. Hole borders and
//! anything nested inside a hole are discarded, since a sheet edge shows
//! up as a single closed loop.
//!
//! No area or length filter is applied. Every external boundary counts
//! as one sheet, including ones caused by noise.

use imageproc::contours::BorderType;

use crate::types::{Contour, EdgeMask, Point, SheetCount};

/// Trace the outermost contours of the mask's foreground.
///
/// Each contour's point chain is compressed: runs of steps in the same
/// direction keep only their end points, so an axis-aligned rectangle
/// is described by its four corners.
#[must_use = "returns the traced contours"]
pub fn find_external_contours(mask: &EdgeMask) -> Vec<Contour> {
    imageproc::contours::find_contours::<u32>(mask.as_image())
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            let points: Vec<Point> = c.points.iter().map(|p| Point::new(p.x, p.y)).collect();
            Contour::new(compress_chain(&points))
        })
        .collect()
}

/// Count the outermost contours in the mask.
///
/// An all-zero mask yields 0. Never fails.
#[must_use]
pub fn count_contours(mask: &EdgeMask) -> SheetCount {
    SheetCount::new(find_external_contours(mask).len())
}

/// Drop points in the middle of straight horizontal, vertical or
/// diagonal runs of a closed chain.
fn compress_chain(points: &[Point]) -> Vec<Point> {
    let mut chain = points.to_vec();
    chain.dedup();
    if chain.len() > 1 && chain.first() == chain.last() {
        chain.pop();
    }
    let points = chain.as_slice();
    let n = points.len();
    if n <= 2 {
        return chain;
    }

    let step = |from: Point, to: Point| {
        (
            i64::from(to.x) - i64::from(from.x),
            i64::from(to.y) - i64::from(from.y),
        )
    };

    points
        .iter()
        .enumerate()
        .filter(|&(i, &p)| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, p) != step(p, next)
        })
        .map(|(_, &p)| p)
        .collect()
}
