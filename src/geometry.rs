#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Point2d {
    pub x_coord: f64,
    pub y_coord: f64,
}

impl Point2d {
    pub fn new(x_coord: f64, y_coord: f64) -> Point2d {
        Point2d{x_coord, y_coord}
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.x_coord, self.y_coord]
    }

    pub fn plus(&self, other: &Point2d) -> Point2d {
        Point2d::new(self.x_coord + other.x_coord, self.y_coord + other.y_coord)
    }

    pub fn minus(&self, other: &Point2d) -> Point2d {
        Point2d::new(self.x_coord - other.x_coord, self.y_coord - other.y_coord)
    }

    pub fn times(&self, factor: f64) -> Point2d {
        Point2d::new(self.x_coord * factor, self.y_coord * factor)
    }

    /// z component of the cross product of the two position vectors.
    pub fn cross(&self, other: &Point2d) -> f64 {
        self.x_coord * other.y_coord - self.y_coord * other.x_coord
    }

    pub fn euclidean_distance(&self, other: &Point2d) -> f64 {
        let diff = self.minus(other);
        (diff.x_coord.powi(2) + diff.y_coord.powi(2)).sqrt()
    }
}


/// Returns the area centroid of the polygon whose ring is given by `vertices`.  The ring may or
/// may not repeat the first vertex at the end.  Degenerate (zero-area) rings fall back to the
/// mean of the vertices, and a single vertex is its own centroid.
pub fn polygon_centroid(vertices: &[Point2d]) -> Option<Point2d> {
    if vertices.is_empty() {
        return None;
    }
    let mean = vertices.iter().fold(Point2d::new(0., 0.), |acc, pp| acc.plus(pp))
        .times(1. / vertices.len() as f64);
    if vertices.len() < 3 {
        return Some(mean);
    }

    // shift the ring to its mean to limit cancellation on large projected coordinates
    let mut twice_area = 0.;
    let mut weighted = Point2d::new(0., 0.);
    for (ii, vi) in vertices.iter().enumerate() {
        let vj = &vertices[(ii + 1) % vertices.len()];
        let pi = vi.minus(&mean);
        let pj = vj.minus(&mean);
        let cross = pi.cross(&pj);
        twice_area += cross;
        weighted = weighted.plus(&pi.plus(&pj).times(cross));
    }

    if twice_area.abs() < 1e-9 {
        return Some(mean);
    }
    Some(weighted.times(1. / (3. * twice_area)).plus(&mean))
}
