use crate::geometry::Point;

/// Accumulates sampled pointer positions into one freehand path.
///
/// Every sample is kept; no deduplication or simplification.
#[derive(Debug, Clone, Default)]
pub struct PathRecorder {
    points: Vec<Point>,
}

impl PathRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, point: Point) {
        self.points.clear();
        self.points.push(point);
    }

    pub fn extend(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Hands back the buffer and leaves the recorder empty.
    pub fn finish(&mut self) -> Vec<Point> {
        std::mem::take(&mut self.points)
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_resets_to_single_point() {
        let mut rec = PathRecorder::new();
        rec.start(Point::new(1.0, 1.0));
        rec.extend(Point::new(2.0, 2.0));
        rec.start(Point::new(9.0, 9.0));
        assert_eq!(rec.points(), &[Point::new(9.0, 9.0)]);
    }

    #[test]
    fn extend_keeps_duplicate_samples() {
        let mut rec = PathRecorder::new();
        rec.start(Point::new(0.0, 0.0));
        rec.extend(Point::new(0.0, 0.0));
        rec.extend(Point::new(0.0, 0.0));
        assert_eq!(rec.points().len(), 3);
    }

    #[test]
    fn finish_drains_buffer() {
        let mut rec = PathRecorder::new();
        rec.start(Point::new(10.0, 10.0));
        rec.extend(Point::new(10.0, 50.0));
        let path = rec.finish();
        assert_eq!(path, vec![Point::new(10.0, 10.0), Point::new(10.0, 50.0)]);
        assert!(rec.is_empty());
        assert!(rec.finish().is_empty());
    }
}
