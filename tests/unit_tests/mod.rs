use kurant::geometry::{MappedPoint, MappedRule};

mod algebra;
mod autodiff;
mod coefficient;
mod structural;

/// A rule whose points run along the x axis at the given coordinates.
pub fn rule_along_x(xs: &[f64]) -> MappedRule {
    MappedRule::from_points(xs.iter().map(|&x| MappedPoint::from_coords(&[x])).collect())
}

/// A single point on the x axis.
pub fn point_at(x: f64) -> MappedPoint {
    MappedPoint::from_coords(&[x])
}
