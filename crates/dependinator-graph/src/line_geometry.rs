use crate::model_db::{Line, ModelDb};
use dependinator_core::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Rendered shape of a line, in the child coordinates of the line owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineGeometry {
    pub start: Point,
    pub end: Point,
    /// Manually placed interior points between `start` and `end`.
    pub points: Vec<Point>,
}

impl LineGeometry {
    /// Compute where a line starts and ends.
    ///
    /// A line between siblings runs between the facing borders of both nodes.
    /// A line from a container down into one of its children starts on the
    /// container's inner top edge; a line from a child up to its container
    /// ends on the container's inner bottom edge.
    pub fn endpoints(db: &ModelDb, line: &Line) -> Self {
        let source = &db[&line.source];
        let target = &db[&line.target];
        let points = line.points.clone();

        if target.parent.as_ref() == Some(&source.id) {
            let area = source.child_area();
            let toward = points.first().copied().unwrap_or(target.boundary.center());
            let start = Point::new(clamp_x(toward.x, &area), area.y);
            let end = calculate_anchor(target.boundary, points.first().copied().unwrap_or(start));
            return Self { start, end, points };
        }

        if source.parent.as_ref() == Some(&target.id) {
            let area = target.child_area();
            let toward = points.last().copied().unwrap_or(source.boundary.center());
            let end = Point::new(clamp_x(toward.x, &area), area.bottom());
            let start = calculate_anchor(source.boundary, points.first().copied().unwrap_or(end));
            return Self { start, end, points };
        }

        let start_toward = points.first().copied().unwrap_or(target.boundary.center());
        let end_toward = points.last().copied().unwrap_or(source.boundary.center());
        Self {
            start: calculate_anchor(source.boundary, start_toward),
            end: calculate_anchor(target.boundary, end_toward),
            points,
        }
    }

    /// All points of the line in drawing order.
    pub fn polyline(&self) -> Vec<Point> {
        let mut polyline = Vec::with_capacity(self.points.len() + 2);
        polyline.push(self.start);
        polyline.extend(self.points.iter().copied());
        polyline.push(self.end);
        polyline
    }

    /// Smallest rectangle containing the whole line.
    pub fn bounds(&self) -> Rect {
        let polyline = self.polyline();
        let min_x = polyline.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let min_y = polyline.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_x = polyline.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let max_y = polyline.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

fn clamp_x(x: f64, area: &Rect) -> f64 {
    x.clamp(area.x, area.right().max(area.x))
}

/// Point where a ray from the center of `rect` toward `toward` leaves the
/// rectangle. Returns the center when `toward` is (almost) the center.
pub fn calculate_anchor(rect: Rect, toward: Point) -> Point {
    let center = rect.center();
    let dx = toward.x - center.x;
    let dy = toward.y - center.y;
    if dx * dx + dy * dy < 1e-6 {
        return center;
    }

    let mut t_min = f64::INFINITY;
    let hits = |t: f64, start: f64, dir: f64, min: f64, max: f64| {
        let pos = start + t * dir;
        t > 0.0 && pos >= min - 1e-9 && pos <= max + 1e-9
    };

    // Left and right sides
    if dx.abs() > 1e-9 {
        for side in [rect.x, rect.right()] {
            let t = (side - center.x) / dx;
            if hits(t, center.y, dy, rect.y, rect.bottom()) {
                t_min = t_min.min(t);
            }
        }
    }
    // Top and bottom sides
    if dy.abs() > 1e-9 {
        for side in [rect.y, rect.bottom()] {
            let t = (side - center.y) / dy;
            if hits(t, center.x, dx, rect.x, rect.right()) {
                t_min = t_min.min(t);
            }
        }
    }

    if t_min.is_finite() {
        Point::new(center.x + t_min * dx, center.y + t_min * dy)
    } else {
        center
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dependinator_core::{LineId, NodeKind, ParsedLink, ParsedNode};
    use proptest::prelude::*;

    fn line<'a>(db: &'a ModelDb, source: &str, target: &str) -> &'a Line {
        db.line_between(source, target).unwrap()
    }

    fn assert_close(actual: Point, expected: Point) {
        assert!(
            actual.distance(expected) < 1e-9,
            "expected {expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn test_anchor_on_facing_side() {
        let rect = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert_close(calculate_anchor(rect, Point::new(500.0, 25.0)), Point::new(100.0, 25.0));
        assert_close(calculate_anchor(rect, Point::new(50.0, -100.0)), Point::new(50.0, 0.0));
        assert_close(calculate_anchor(rect, Point::new(50.0, 25.0)), Point::new(50.0, 25.0));
    }

    #[test]
    fn test_sibling_line_uses_facing_borders() {
        let mut db = ModelDb::default();
        db.add_or_update_node(
            &ParsedNode::new("A", NodeKind::Type).with_boundary(Rect::new(0.0, 0.0, 100.0, 100.0)),
        );
        db.add_or_update_node(
            &ParsedNode::new("B", NodeKind::Type).with_boundary(Rect::new(300.0, 0.0, 100.0, 100.0)),
        );
        db.add_or_update_link(&ParsedLink::new("A", "B"));

        let geometry = LineGeometry::endpoints(&db, line(&db, "A", "B"));
        assert_close(geometry.start, Point::new(100.0, 50.0));
        assert_close(geometry.end, Point::new(300.0, 50.0));
        assert!(geometry.points.is_empty());
    }

    #[test]
    fn test_parent_to_child_starts_on_inner_top_edge() {
        let mut db = ModelDb::default();
        db.add_or_update_node(
            &ParsedNode::new("P", NodeKind::Namespace)
                .with_boundary(Rect::new(0.0, 0.0, 100.0, 100.0))
                .with_zoom(0.25),
        );
        db.add_or_update_node(
            &ParsedNode::new("P.C", NodeKind::Type).with_boundary(Rect::new(100.0, 200.0, 100.0, 50.0)),
        );
        db.add_or_update_link(&ParsedLink::new("P", "P.C"));

        let geometry = LineGeometry::endpoints(&db, line(&db, "P", "P.C"));
        assert_close(geometry.start, Point::new(150.0, 0.0));
        assert_close(geometry.end, Point::new(150.0, 200.0));
    }

    #[test]
    fn test_child_to_parent_ends_on_inner_bottom_edge() {
        let mut db = ModelDb::default();
        db.add_or_update_node(
            &ParsedNode::new("P", NodeKind::Namespace)
                .with_boundary(Rect::new(0.0, 0.0, 100.0, 100.0))
                .with_zoom(0.25),
        );
        db.add_or_update_node(
            &ParsedNode::new("P.C", NodeKind::Type).with_boundary(Rect::new(100.0, 200.0, 100.0, 50.0)),
        );
        db.add_or_update_link(&ParsedLink::new("P.C", "P"));

        let geometry = LineGeometry::endpoints(&db, line(&db, "P.C", "P"));
        assert_close(geometry.end, Point::new(150.0, 400.0));
        assert_close(geometry.start, Point::new(150.0, 250.0));
    }

    #[test]
    fn test_interior_points_steer_anchors() {
        let mut db = ModelDb::default();
        db.add_or_update_node(
            &ParsedNode::new("A", NodeKind::Type).with_boundary(Rect::new(0.0, 0.0, 100.0, 100.0)),
        );
        db.add_or_update_node(
            &ParsedNode::new("B", NodeKind::Type).with_boundary(Rect::new(300.0, 0.0, 100.0, 100.0)),
        );
        db.add_or_update_link(&ParsedLink::new("A", "B"));
        let bend = Point::new(200.0, 400.0);
        db.set_line_points(&LineId::from_names("A", "B"), vec![bend]);

        let geometry = LineGeometry::endpoints(&db, line(&db, "A", "B"));
        assert_eq!(geometry.polyline().len(), 3);
        // Both anchors leave through the bottom side, toward the bend.
        assert!((geometry.start.y - 100.0).abs() < 1e-9);
        assert!((geometry.end.y - 100.0).abs() < 1e-9);
        let bounds = geometry.bounds();
        assert!((bounds.bottom() - 400.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_anchor_lies_on_border(
            x in -500.0f64..500.0,
            y in -500.0f64..500.0,
            w in 1.0f64..300.0,
            h in 1.0f64..300.0,
            tx in -1000.0f64..1000.0,
            ty in -1000.0f64..1000.0,
        ) {
            let rect = Rect::new(x, y, w, h);
            let toward = Point::new(tx, ty);
            prop_assume!(toward.distance(rect.center()) > 0.01);
            let anchor = calculate_anchor(rect, toward);
            let eps = 1e-6;
            let on_vertical = (anchor.x - rect.x).abs() < eps || (anchor.x - rect.right()).abs() < eps;
            let on_horizontal = (anchor.y - rect.y).abs() < eps || (anchor.y - rect.bottom()).abs() < eps;
            prop_assert!(on_vertical || on_horizontal);
            prop_assert!(anchor.x >= rect.x - eps && anchor.x <= rect.right() + eps);
            prop_assert!(anchor.y >= rect.y - eps && anchor.y <= rect.bottom() + eps);
        }
    }
}
