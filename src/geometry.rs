//! Evaluation context types consumed by coefficient functions.
//!
//! A [`MappedPoint`] carries the geometric state of a single integration point
//! after it has been mapped to physical space by an element transformation:
//! physical coordinates, the Jacobian measure, and the element/region/facet
//! indices a piecewise coefficient may branch on. A [`MappedRule`] is an
//! ordered batch of points sharing one element transformation, which enables
//! amortized batched evaluation.
//!
//! These types are *consumed* by the coefficient engine; producing them from a
//! mesh and a quadrature rule is the job of the surrounding finite element
//! machinery.

use nalgebra::Vector3;
use std::ops::Index;

/// A single integration point mapped to physical space.
///
/// Coordinates are stored padded to three components; only the first
/// [`dim`](MappedPoint::dim) entries are meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedPoint {
    coords: Vector3<f64>,
    dim: usize,
    measure: f64,
    element_index: usize,
    region_index: usize,
    point_index: usize,
    facet_index: Option<usize>,
    complex_mapping: bool,
}

impl MappedPoint {
    /// A point at the given physical coordinates in an embedding space of
    /// dimension `dim`. All indices default to zero, the measure to one.
    pub fn new(coords: Vector3<f64>, dim: usize) -> Self {
        assert!(dim <= 3, "embedding dimension must be at most 3");
        Self {
            coords,
            dim,
            measure: 1.0,
            element_index: 0,
            region_index: 0,
            point_index: 0,
            facet_index: None,
            complex_mapping: false,
        }
    }

    /// A point from a coordinate slice of length at most 3, whose length
    /// determines the embedding dimension.
    pub fn from_coords(coords: &[f64]) -> Self {
        assert!(coords.len() <= 3, "embedding dimension must be at most 3");
        let mut padded = Vector3::zeros();
        padded.rows_mut(0, coords.len()).copy_from_slice(coords);
        Self::new(padded, coords.len())
    }

    pub fn with_measure(mut self, measure: f64) -> Self {
        self.measure = measure;
        self
    }

    pub fn with_element(mut self, element_index: usize) -> Self {
        self.element_index = element_index;
        self
    }

    pub fn with_region(mut self, region_index: usize) -> Self {
        self.region_index = region_index;
        self
    }

    pub fn with_point_index(mut self, point_index: usize) -> Self {
        self.point_index = point_index;
        self
    }

    pub fn with_facet(mut self, facet_index: usize) -> Self {
        self.facet_index = Some(facet_index);
        self
    }

    pub fn with_complex_mapping(mut self, complex_mapping: bool) -> Self {
        self.complex_mapping = complex_mapping;
        self
    }

    /// Physical coordinates, padded to three components.
    pub fn coords(&self) -> &Vector3<f64> {
        &self.coords
    }

    /// The embedding dimension of the geometric mapping.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn x(&self) -> f64 {
        self.coords.x
    }

    pub fn y(&self) -> f64 {
        self.coords.y
    }

    pub fn z(&self) -> f64 {
        self.coords.z
    }

    /// The absolute Jacobian determinant of the element transformation at
    /// this point.
    pub fn measure(&self) -> f64 {
        self.measure
    }

    pub fn element_index(&self) -> usize {
        self.element_index
    }

    /// Index of the mesh region (material/sub-domain) the point belongs to.
    pub fn region_index(&self) -> usize {
        self.region_index
    }

    /// Index of this point within its integration rule.
    pub fn point_index(&self) -> usize {
        self.point_index
    }

    pub fn facet_index(&self) -> Option<usize> {
        self.facet_index
    }

    /// Whether the geometric mapping itself is complex-valued
    /// (e.g. a complex coordinate stretching).
    pub fn has_complex_mapping(&self) -> bool {
        self.complex_mapping
    }
}

/// An ordered batch of mapped integration points sharing one element
/// transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRule {
    points: Vec<MappedPoint>,
}

impl MappedRule {
    /// Batches the given points into a rule.
    ///
    /// Point indices are (re-)assigned according to the order of the points.
    ///
    /// # Panics
    ///
    /// Panics if the points do not all share the same element and region
    /// index: a rule represents a single element transformation.
    pub fn from_points(points: Vec<MappedPoint>) -> Self {
        if let Some(first) = points.first() {
            let (el, reg) = (first.element_index, first.region_index);
            assert!(
                points.iter().all(|p| p.element_index == el && p.region_index == reg),
                "all points of a rule must belong to the same element"
            );
        }
        let mut points = points;
        for (i, p) in points.iter_mut().enumerate() {
            p.point_index = i;
        }
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[MappedPoint] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappedPoint> {
        self.points.iter()
    }

    /// The element index shared by all points of the rule.
    pub fn element_index(&self) -> usize {
        self.points.first().map(|p| p.element_index).unwrap_or(0)
    }

    /// The region index shared by all points of the rule.
    pub fn region_index(&self) -> usize {
        self.points.first().map(|p| p.region_index).unwrap_or(0)
    }
}

impl Index<usize> for MappedRule {
    type Output = MappedPoint;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}
