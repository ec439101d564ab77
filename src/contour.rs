//! Contour location over binary masks
//!
//! Every 8-connected foreground component contributes one candidate: its outer
//! boundary, traced with Moore-neighbour tracing from the component's first
//! pixel in raster order. The subject is the candidate with the largest
//! enclosed area; equal areas fall back to the topmost-leftmost anchor point.

use std::cmp::Ordering;

use tracing::{instrument, trace};

use crate::frame::{Mask, Point};

/// Neighbour offsets in clockwise order (image coordinates, y grows down),
/// starting east.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Default minimum subject area as a fraction of the frame area
pub const DEFAULT_MIN_AREA_FRACTION: f64 = 0.001;

fn direction_of(dx: i32, dy: i32) -> Option<usize> {
    DIRECTIONS.iter().position(|&d| d == (dx, dy))
}

/// Closed boundary polyline of one connected foreground region
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    points: Vec<Point>,
    area: f64,
}

impl Contour {
    /// Build a contour from an ordered boundary; area is computed with the
    /// shoelace formula over pixel centres.
    pub fn from_points(points: Vec<Point>) -> Self {
        let area = shoelace_area(&points);
        Self { points, area }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    /// Topmost-leftmost boundary point
    pub fn anchor(&self) -> Option<Point> {
        self.points.iter().copied().min_by_key(|p| p.raster_key())
    }

    /// Inclusive bounding box as (min, max) corners
    pub fn bounds(&self) -> Option<(Point, Point)> {
        let first = *self.points.first()?;
        let (mut min, mut max) = (first, first);
        for p in &self.points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Some((min, max))
    }
}

fn shoelace_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let twice: i64 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
        })
        .sum();
    twice.abs() as f64 / 2.0
}

/// Trace the outer boundary of the component containing `start`.
///
/// `start` must be the component's first pixel in raster order, so its west
/// neighbour is background. Stops when the trace re-enters `start` with the
/// same first move (Jacob's criterion).
fn trace_boundary(mask: &Mask, start: Point) -> Vec<Point> {
    let mut boundary = vec![start];
    let mut current = start;
    let mut backtrack = Point::new(start.x - 1, start.y);
    let mut first_move: Option<Point> = None;

    // Each boundary pixel is entered at most once per side
    let max_steps = 4 * (mask.width() as usize * mask.height() as usize) + 8;

    for _ in 0..max_steps {
        let Some(from) = direction_of(backtrack.x - current.x, backtrack.y - current.y) else {
            break;
        };

        let mut found = None;
        let mut last_background = backtrack;
        for k in 1..=8 {
            let (dx, dy) = DIRECTIONS[(from + k) % 8];
            let candidate = Point::new(current.x + dx, current.y + dy);
            if mask.is_foreground(candidate.x, candidate.y) {
                found = Some(candidate);
                break;
            }
            last_background = candidate;
        }

        // Isolated pixel
        let Some(next) = found else { break };

        match first_move {
            None => first_move = Some(next),
            Some(first) if current == start && next == first => break,
            Some(_) => {}
        }

        boundary.push(next);
        backtrack = last_background;
        current = next;
    }

    // The trace closes back onto the start pixel
    if boundary.len() > 1 && boundary.last() == Some(&start) {
        boundary.pop();
    }
    boundary
}

/// Mark every pixel of the 8-connected component containing `seed`
fn flood_component(mask: &Mask, seed: Point, visited: &mut [bool]) {
    let width = mask.width() as usize;
    let mut stack = vec![seed];
    visited[seed.y as usize * width + seed.x as usize] = true;

    while let Some(p) = stack.pop() {
        for (dx, dy) in DIRECTIONS {
            let (nx, ny) = (p.x + dx, p.y + dy);
            if !mask.is_foreground(nx, ny) {
                continue;
            }
            let index = ny as usize * width + nx as usize;
            if !visited[index] {
                visited[index] = true;
                stack.push(Point::new(nx, ny));
            }
        }
    }
}

/// Outer boundaries of every 8-connected foreground component, in raster
/// order of their anchors
pub fn find_contours(mask: &Mask) -> Vec<Contour> {
    let (width, height) = (mask.width() as i32, mask.height() as i32);
    let mut visited = vec![false; mask.width() as usize * mask.height() as usize];
    let mut contours = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let index = y as usize * width as usize + x as usize;
            if visited[index] || !mask.is_foreground(x, y) {
                continue;
            }
            let start = Point::new(x, y);
            contours.push(Contour::from_points(trace_boundary(mask, start)));
            flood_component(mask, start, &mut visited);
        }
    }

    contours
}

/// Largest area first, then topmost-leftmost anchor
fn subject_order(a: &Contour, b: &Contour) -> Ordering {
    b.area
        .total_cmp(&a.area)
        .then_with(|| a.anchor().map(|p| p.raster_key()).cmp(&b.anchor().map(|p| p.raster_key())))
}

/// Picks the subject's contour out of a mask
#[derive(Debug, Clone, PartialEq)]
pub struct ContourLocator {
    min_area_fraction: f64,
}

impl Default for ContourLocator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_AREA_FRACTION)
    }
}

impl ContourLocator {
    /// # Panics
    /// Panics if `min_area_fraction` is negative or not finite
    pub fn new(min_area_fraction: f64) -> Self {
        assert!(
            min_area_fraction.is_finite() && min_area_fraction >= 0.0,
            "Minimum area fraction must be a non-negative number, got: {}",
            min_area_fraction
        );
        Self { min_area_fraction }
    }

    pub fn min_area_fraction(&self) -> f64 {
        self.min_area_fraction
    }

    /// Smallest area a subject may have in a mask of this size
    pub fn min_area_for(&self, mask: &Mask) -> f64 {
        self.min_area_fraction * mask.shape().area() as f64
    }

    /// The subject's boundary, or `None` when no candidate reaches the floor
    #[instrument(skip(self, mask))]
    pub fn locate(&self, mask: &Mask) -> Option<Contour> {
        let floor = self.min_area_for(mask);
        self.select(find_contours(mask), floor)
    }

    /// Apply the selection policy to an arbitrary candidate set
    pub fn select(&self, mut candidates: Vec<Contour>, floor: f64) -> Option<Contour> {
        candidates.sort_by(subject_order);
        let best = candidates.into_iter().next()?;

        if best.area < floor {
            trace!("Largest contour area {:.1} below floor {:.1}", best.area, floor);
            return None;
        }
        trace!("Selected contour with area {:.1}, {} points", best.area, best.points.len());
        Some(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with_rects(width: u32, height: u32, rects: &[(i32, i32, i32, i32)]) -> Mask {
        Mask::from_fn(width, height, |x, y| {
            let (x, y) = (x as i32, y as i32);
            rects
                .iter()
                .any(|&(rx, ry, rw, rh)| x >= rx && x < rx + rw && y >= ry && y < ry + rh)
        })
    }

    #[test]
    fn test_square_boundary() {
        let mask = mask_with_rects(64, 64, &[(22, 22, 20, 20)]);
        let contours = find_contours(&mask);
        assert_eq!(contours.len(), 1);

        let contour = &contours[0];
        assert_eq!(contour.points().len(), 76);
        assert_eq!(contour.area(), 361.0);
        assert_eq!(contour.anchor(), Some(Point::new(22, 22)));
        assert_eq!(contour.bounds(), Some((Point::new(22, 22), Point::new(41, 41))));

        // Every boundary point lies on the square's edge
        for p in contour.points() {
            assert!(p.x == 22 || p.x == 41 || p.y == 22 || p.y == 41, "{:?}", p);
        }
    }

    #[test]
    fn test_single_pixel_and_line() {
        let mask = mask_with_rects(8, 8, &[(3, 3, 1, 1)]);
        let contours = find_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].points(), &[Point::new(3, 3)]);
        assert_eq!(contours[0].area(), 0.0);

        let mask = mask_with_rects(8, 8, &[(1, 2, 4, 1)]);
        let contours = find_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].area(), 0.0);
        assert!(contours[0].points().contains(&Point::new(4, 2)));
    }

    #[test]
    fn test_component_touching_frame_border() {
        let mask = mask_with_rects(10, 10, &[(0, 0, 4, 3)]);
        let contours = find_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].area(), 6.0);
        assert_eq!(contours[0].anchor(), Some(Point::new(0, 0)));
    }

    #[test]
    fn test_diagonal_pixels_form_one_component() {
        let mut mask = Mask::empty(6, 6);
        mask.set(1, 1, true);
        mask.set(2, 2, true);
        mask.set(3, 3, true);
        let contours = find_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert!(contours[0].points().contains(&Point::new(3, 3)));
    }

    #[test]
    fn test_ring_reports_outer_boundary_only() {
        let mut mask = mask_with_rects(20, 20, &[(2, 2, 10, 10)]);
        for y in 4..10 {
            for x in 4..10 {
                mask.set(x, y, false);
            }
        }
        let contours = find_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].area(), 81.0);
    }

    #[test]
    fn test_largest_component_selected() {
        let mask = mask_with_rects(64, 64, &[(2, 2, 5, 5), (30, 30, 12, 12), (50, 5, 8, 8)]);
        let locator = ContourLocator::new(0.0);
        let contour = locator.locate(&mask).unwrap();
        assert_eq!(contour.anchor(), Some(Point::new(30, 30)));
        assert_eq!(contour.area(), 121.0);
    }

    #[test]
    fn test_equal_area_tie_breaks_on_anchor() {
        let mask = mask_with_rects(64, 64, &[(40, 10, 6, 6), (10, 40, 6, 6), (5, 10, 6, 6)]);
        let locator = ContourLocator::new(0.0);
        let contour = locator.locate(&mask).unwrap();
        assert_eq!(contour.anchor(), Some(Point::new(5, 10)));
    }

    #[test]
    fn test_floor_rejects_noise() {
        let mask = mask_with_rects(100, 100, &[(10, 10, 3, 3)]);
        // Floor = 0.001 * 10000 = 10, area of a 3x3 block is 4
        assert!(ContourLocator::default().locate(&mask).is_none());
        assert!(ContourLocator::new(0.0).locate(&mask).is_some());
    }

    #[test]
    fn test_empty_mask_has_no_contour() {
        let mask = Mask::empty(16, 16);
        assert!(find_contours(&mask).is_empty());
        assert!(ContourLocator::default().locate(&mask).is_none());
    }

    #[test]
    fn test_locate_is_idempotent() {
        let mask = mask_with_rects(64, 64, &[(5, 5, 10, 7), (30, 20, 9, 9), (20, 40, 3, 12)]);
        let locator = ContourLocator::default();
        assert_eq!(locator.locate(&mask), locator.locate(&mask));
    }

    #[test]
    fn test_select_ignores_candidate_order() {
        let a = Contour::from_points(vec![Point::new(0, 0), Point::new(4, 0), Point::new(4, 4), Point::new(0, 4)]);
        let b = Contour::from_points(vec![Point::new(10, 0), Point::new(14, 0), Point::new(14, 4), Point::new(10, 4)]);
        let locator = ContourLocator::new(0.0);

        let forward = locator.select(vec![a.clone(), b.clone()], 0.0);
        let reverse = locator.select(vec![b, a.clone()], 0.0);
        assert_eq!(forward, Some(a));
        assert_eq!(forward, reverse);
    }

    #[test]
    #[should_panic(expected = "Minimum area fraction must be a non-negative number")]
    fn test_negative_floor_panics() {
        ContourLocator::new(-0.5);
    }
}
