//! Detection geometry: points and closed polygons (hulls)

use serde::{Deserialize, Serialize};

/// Image-space point in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Closed polygon outline of a detected object, vertices in order.
///
/// Deserializes from `[[x, y], ...]` so replay files stay compact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "Vec<(f32, f32)>", into = "Vec<(f32, f32)>")]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    /// Axis-aligned rectangle with top-left corner at `(x, y)`.
    pub fn rect(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::new(vec![
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ])
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Signed shoelace sum (twice the signed area).
    fn signed_double_area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }
        (0..n)
            .map(|i| {
                let a = self.vertices[i];
                let b = self.vertices[(i + 1) % n];
                f64::from(a.x) * f64::from(b.y) - f64::from(b.x) * f64::from(a.y)
            })
            .sum()
    }

    /// Enclosed area in square pixels.
    pub fn area(&self) -> f32 {
        (self.signed_double_area().abs() / 2.0) as f32
    }

    /// Area-weighted centroid (first-order moments over zeroth moment).
    ///
    /// Degenerate outlines with no enclosed area fall back to the vertex mean;
    /// an empty polygon has its centroid at the origin.
    pub fn centroid(&self) -> Point {
        if self.vertices.is_empty() {
            return Point::default();
        }

        let a2 = self.signed_double_area();
        if a2.abs() < f64::EPSILON {
            let n = self.vertices.len() as f32;
            let (sx, sy) = self
                .vertices
                .iter()
                .fold((0.0_f32, 0.0_f32), |(sx, sy), p| (sx + p.x, sy + p.y));
            return Point::new(sx / n, sy / n);
        }

        let n = self.vertices.len();
        let (mut cx, mut cy) = (0.0_f64, 0.0_f64);
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            let (ax, ay, bx, by) = (
                f64::from(a.x),
                f64::from(a.y),
                f64::from(b.x),
                f64::from(b.y),
            );
            let cross = ax * by - bx * ay;
            cx += (ax + bx) * cross;
            cy += (ay + by) * cross;
        }
        let scale = 1.0 / (3.0 * a2);
        Point::new((cx * scale) as f32, (cy * scale) as f32)
    }
}

impl From<Vec<(f32, f32)>> for Polygon {
    fn from(points: Vec<(f32, f32)>) -> Self {
        Self::new(points.into_iter().map(Point::from).collect())
    }
}

impl From<Polygon> for Vec<(f32, f32)> {
    fn from(poly: Polygon) -> Self {
        poly.vertices.into_iter().map(|p| (p.x, p.y)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_area_and_centroid() {
        let r = Polygon::rect(10.0, 20.0, 30.0, 40.0);
        assert!((r.area() - 1200.0).abs() < 1e-3);
        let c = r.centroid();
        assert!((c.x - 25.0).abs() < 1e-4);
        assert!((c.y - 40.0).abs() < 1e-4);
    }

    #[test]
    fn winding_order_does_not_change_area() {
        let cw = Polygon::from(vec![(0.0, 0.0), (0.0, 2.0), (2.0, 2.0), (2.0, 0.0)]);
        let ccw = Polygon::from(vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]);
        assert_eq!(cw.area(), ccw.area());
        assert_eq!(cw.centroid(), ccw.centroid());
    }

    #[test]
    fn degenerate_outline_uses_vertex_mean() {
        let line = Polygon::from(vec![(0.0, 0.0), (4.0, 0.0)]);
        assert_eq!(line.area(), 0.0);
        assert_eq!(line.centroid(), Point::new(2.0, 0.0));
        assert_eq!(Polygon::default().centroid(), Point::default());
    }

    #[test]
    fn polygon_reads_from_pair_list() {
        let poly: Polygon = serde_json::from_str("[[0,0],[3,0],[3,3],[0,3]]").unwrap();
        assert_eq!(poly.vertices().len(), 4);
        assert!((poly.area() - 9.0).abs() < 1e-4);
    }
}
