use std::hash::{Hash, Hasher};

/// Geo types are wire-level aliases: a `Point` is `Tuple(Float64, Float64)`,
/// a `Ring` is `Array(Point)`, and so on up the nesting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Point(pub [f64; 2]);

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.0[0].to_bits() == other.0[0].to_bits() && self.0[1].to_bits() == other.0[1].to_bits()
    }
}

impl Eq for Point {}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0[0].to_bits().hash(state);
        self.0[1].to_bits().hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Ring(pub Vec<Point>);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Polygon(pub Vec<Ring>);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MultiPolygon(pub Vec<Polygon>);
