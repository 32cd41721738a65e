//! Leaf coefficient functions: constants, mutable parameters, closures over
//! mapped points, per-point tabulated data and piecewise polynomials.

use crate::autodiff::{Dual, Dual2};
use crate::coefficient::{CoefficientFunction, CoeffRef};
use crate::error::{CoefficientError, Result};
use crate::geometry::{MappedPoint, MappedRule};
use crate::serialize::{AuxValue, NodeKind};
use nalgebra::{DMatrix, DMatrixViewMut};
use num::complex::Complex64;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A real scalar constant.
#[derive(Debug, Clone)]
pub struct ConstantCf {
    value: f64,
}

impl ConstantCf {
    pub fn new(value: f64) -> Self {
        Self { value }
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl CoefficientFunction for ConstantCf {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn elementwise_constant(&self) -> bool {
        true
    }

    fn evaluate_const(&self) -> Result<f64> {
        Ok(self.value)
    }

    fn evaluate_scalar(&self, _point: &MappedPoint) -> Result<f64> {
        Ok(self.value)
    }

    fn evaluate_rule(&self, _rule: &MappedRule, mut values: DMatrixViewMut<f64>) -> Result<()> {
        values.fill(self.value);
        Ok(())
    }

    fn nonzero_pattern(&self, nonzero: &mut [bool]) {
        nonzero[0] = self.value != 0.0;
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Constant
    }

    fn aux_data(&self) -> Vec<AuxValue> {
        vec![AuxValue::Real(self.value)]
    }
}

/// A complex scalar constant. Real evaluation is rejected.
#[derive(Debug, Clone)]
pub struct ConstantComplexCf {
    value: Complex64,
}

impl ConstantComplexCf {
    pub fn new(value: Complex64) -> Self {
        Self { value }
    }

    pub fn value(&self) -> Complex64 {
        self.value
    }
}

impl CoefficientFunction for ConstantComplexCf {
    fn name(&self) -> &'static str {
        "constant-complex"
    }

    fn is_complex(&self) -> bool {
        true
    }

    fn elementwise_constant(&self) -> bool {
        true
    }

    fn evaluate_scalar(&self, _point: &MappedPoint) -> Result<f64> {
        Err(CoefficientError::UnsupportedOperand(
            "no real evaluation of a complex constant".to_string(),
        ))
    }

    fn evaluate_scalar_complex(&self, _point: &MappedPoint) -> Result<Complex64> {
        Ok(self.value)
    }

    fn nonzero_pattern(&self, nonzero: &mut [bool]) {
        nonzero[0] = self.value != Complex64::from(0.0);
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::ConstantComplex
    }

    fn aux_data(&self) -> Vec<AuxValue> {
        vec![AuxValue::Real(self.value.re), AuxValue::Real(self.value.im)]
    }
}

/// A scalar that is constant on each region, with one value per region index.
/// Evaluation on a region beyond the table fails with an index error.
#[derive(Debug, Clone)]
pub struct DomainConstantCf {
    values: Vec<f64>,
}

impl DomainConstantCf {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }
}

impl CoefficientFunction for DomainConstantCf {
    fn name(&self) -> &'static str {
        "domain-constant"
    }

    fn elementwise_constant(&self) -> bool {
        true
    }

    fn num_regions(&self) -> usize {
        self.values.len()
    }

    // The value on the first region, matching the behavior of constant
    // folding over a coefficient whose regions have not been distinguished.
    fn evaluate_const(&self) -> Result<f64> {
        self.values.first().copied().ok_or(CoefficientError::IndexError { index: 0, len: 0 })
    }

    fn evaluate_scalar(&self, point: &MappedPoint) -> Result<f64> {
        let region = point.region_index();
        self.values
            .get(region)
            .copied()
            .ok_or(CoefficientError::IndexError { index: region, len: self.values.len() })
    }

    fn nonzero_pattern(&self, nonzero: &mut [bool]) {
        nonzero[0] = self.values.iter().any(|&v| v != 0.0);
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::DomainConstant
    }

    fn aux_data(&self) -> Vec<AuxValue> {
        vec![AuxValue::RealVec(self.values.clone())]
    }
}

/// A mutable scalar parameter, and the seed of derivative propagation: its
/// derivative is one and its second derivative zero, so derivatives of any
/// expression are taken with respect to this parameter.
///
/// The value is stored as an atomic bit pattern so the node can be shared
/// across threads. Updates and evaluations are not synchronized against each
/// other; callers are expected to update the parameter between evaluation
/// passes, not during one.
#[derive(Debug)]
pub struct ParameterCf {
    bits: AtomicU64,
}

impl ParameterCf {
    pub fn new(value: f64) -> Self {
        Self { bits: AtomicU64::new(value.to_bits()) }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl CoefficientFunction for ParameterCf {
    fn name(&self) -> &'static str {
        "parameter"
    }

    fn elementwise_constant(&self) -> bool {
        true
    }

    fn evaluate_const(&self) -> Result<f64> {
        Ok(self.get())
    }

    fn evaluate_scalar(&self, _point: &MappedPoint) -> Result<f64> {
        Ok(self.get())
    }

    fn evaluate_rule(&self, _rule: &MappedRule, mut values: DMatrixViewMut<f64>) -> Result<()> {
        values.fill(self.get());
        Ok(())
    }

    fn evaluate_deriv(
        &self,
        _rule: &MappedRule,
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        values.fill(self.get());
        deriv.fill(1.0);
        Ok(())
    }

    fn evaluate_dderiv(
        &self,
        _rule: &MappedRule,
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
        mut dderiv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        values.fill(self.get());
        deriv.fill(1.0);
        dderiv.fill(0.0);
        Ok(())
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Parameter
    }

    fn aux_data(&self) -> Vec<AuxValue> {
        vec![AuxValue::Real(self.get())]
    }
}

/// A scalar coefficient defined by an arbitrary closure over the mapped
/// point. Not serializable.
pub struct FunctionCf {
    f: Box<dyn Fn(&MappedPoint) -> f64 + Send + Sync>,
    // If set, evaluation checks the point's embedding dimension.
    embedding_dim: Option<usize>,
}

impl FunctionCf {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&MappedPoint) -> f64 + Send + Sync + 'static,
    {
        Self { f: Box::new(f), embedding_dim: None }
    }

    pub fn with_embedding_dim<F>(f: F, dim: usize) -> Self
    where
        F: Fn(&MappedPoint) -> f64 + Send + Sync + 'static,
    {
        Self { f: Box::new(f), embedding_dim: Some(dim) }
    }
}

impl fmt::Debug for FunctionCf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCf")
            .field("embedding_dim", &self.embedding_dim)
            .finish_non_exhaustive()
    }
}

impl CoefficientFunction for FunctionCf {
    fn name(&self) -> &'static str {
        "function"
    }

    fn evaluate_scalar(&self, point: &MappedPoint) -> Result<f64> {
        if let Some(expected) = self.embedding_dim {
            if point.dim() != expected {
                return Err(CoefficientError::DimensionMismatch {
                    expected,
                    actual: point.dim(),
                });
            }
        }
        Ok((self.f)(point))
    }
}

/// A scalar coefficient tabulated per integration point: one value for each
/// point of each element, indexed by the point's element and point indices.
#[derive(Debug, Clone)]
pub struct IntegrationPointCf {
    elements: usize,
    points_per_element: usize,
    values: Vec<f64>,
}

impl IntegrationPointCf {
    /// A table shorter or longer than `elements * points_per_element` is
    /// logged and resized, missing entries filling with zero.
    pub fn new(elements: usize, points_per_element: usize, mut values: Vec<f64>) -> Self {
        let expected = elements * points_per_element;
        if values.len() != expected {
            log::warn!(
                "integration point table has {} entries, expected {}; resizing",
                values.len(),
                expected
            );
            values.resize(expected, 0.0);
        }
        Self { elements, points_per_element, values }
    }

    fn slot(&self, element: usize, point: usize) -> Result<usize> {
        if element >= self.elements {
            return Err(CoefficientError::IndexError { index: element, len: self.elements });
        }
        if point >= self.points_per_element {
            return Err(CoefficientError::IndexError { index: point, len: self.points_per_element });
        }
        Ok(element * self.points_per_element + point)
    }

    pub fn get(&self, element: usize, point: usize) -> Result<f64> {
        Ok(self.values[self.slot(element, point)?])
    }

    pub fn set(&mut self, element: usize, point: usize, value: f64) -> Result<()> {
        let slot = self.slot(element, point)?;
        self.values[slot] = value;
        Ok(())
    }

    pub fn reset_values(&mut self, value: f64) {
        self.values.fill(value);
    }
}

impl CoefficientFunction for IntegrationPointCf {
    fn name(&self) -> &'static str {
        "integration-point"
    }

    fn evaluate_scalar(&self, point: &MappedPoint) -> Result<f64> {
        self.get(point.element_index(), point.point_index())
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::IntegrationPoint
    }

    fn aux_data(&self) -> Vec<AuxValue> {
        vec![
            AuxValue::Int(self.elements as i64),
            AuxValue::Int(self.points_per_element as i64),
            AuxValue::RealVec(self.values.clone()),
        ]
    }
}

/// A piecewise polynomial of a scalar child coefficient.
///
/// `pieces` holds one coefficient list per piece in ascending order of
/// degree, and `bounds` the interior breakpoints between consecutive pieces:
/// the first piece whose upper bound exceeds the argument is used, the last
/// piece for arguments beyond all bounds.
#[derive(Debug)]
pub struct PolynomialCf {
    child: CoeffRef,
    pieces: Vec<Vec<f64>>,
    bounds: Vec<f64>,
}

impl PolynomialCf {
    pub fn new(child: CoeffRef, pieces: Vec<Vec<f64>>, bounds: Vec<f64>) -> Result<Self> {
        if child.dimension() != 1 {
            return Err(CoefficientError::UnsupportedOperand(
                "polynomial argument must be scalar".to_string(),
            ));
        }
        if pieces.is_empty() {
            return Err(CoefficientError::UnsupportedOperand(
                "polynomial needs at least one piece".to_string(),
            ));
        }
        if bounds.len() + 1 != pieces.len() {
            return Err(CoefficientError::UnsupportedOperand(format!(
                "{} polynomial pieces require {} breakpoints, got {}",
                pieces.len(),
                pieces.len() - 1,
                bounds.len()
            )));
        }
        Ok(Self { child, pieces, bounds })
    }

    fn piece(&self, t: f64) -> &[f64] {
        let i = self.bounds.iter().position(|&b| t < b).unwrap_or(self.pieces.len() - 1);
        &self.pieces[i]
    }
}

fn horner(coeffs: &[f64], t: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * t + c)
}

fn horner_dual(coeffs: &[f64], t: Dual) -> Dual {
    coeffs
        .iter()
        .rev()
        .fold(Dual::constant(0.0), |acc, &c| acc * t + Dual::constant(c))
}

fn horner_dual2(coeffs: &[f64], t: Dual2) -> Dual2 {
    coeffs
        .iter()
        .rev()
        .fold(Dual2::constant(0.0), |acc, &c| acc * t + Dual2::constant(c))
}

impl CoefficientFunction for PolynomialCf {
    fn name(&self) -> &'static str {
        "polynomial"
    }

    fn inputs(&self) -> Vec<CoeffRef> {
        vec![self.child.clone()]
    }

    fn evaluate_const(&self) -> Result<f64> {
        let t = self.child.evaluate_const()?;
        Ok(horner(self.piece(t), t))
    }

    fn evaluate_scalar(&self, point: &MappedPoint) -> Result<f64> {
        let t = self.child.evaluate_scalar(point)?;
        Ok(horner(self.piece(t), t))
    }

    fn evaluate_deriv(
        &self,
        rule: &MappedRule,
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let n = rule.len();
        let mut u = DMatrix::zeros(n, 1);
        let mut du = DMatrix::zeros(n, 1);
        self.child
            .evaluate_deriv(rule, DMatrixViewMut::from(&mut u), DMatrixViewMut::from(&mut du))?;
        for k in 0..n {
            let t = u[(k, 0)];
            let out = horner_dual(self.piece(t), Dual::new(t, du[(k, 0)]));
            values[(k, 0)] = out.value;
            deriv[(k, 0)] = out.deriv;
        }
        Ok(())
    }

    fn evaluate_dderiv(
        &self,
        rule: &MappedRule,
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
        mut dderiv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let n = rule.len();
        let mut u = DMatrix::zeros(n, 1);
        let mut du = DMatrix::zeros(n, 1);
        let mut ddu = DMatrix::zeros(n, 1);
        self.child.evaluate_dderiv(
            rule,
            DMatrixViewMut::from(&mut u),
            DMatrixViewMut::from(&mut du),
            DMatrixViewMut::from(&mut ddu),
        )?;
        for k in 0..n {
            let t = u[(k, 0)];
            let out = horner_dual2(self.piece(t), Dual2::new(t, du[(k, 0)], ddu[(k, 0)]));
            values[(k, 0)] = out.value;
            deriv[(k, 0)] = out.deriv;
            dderiv[(k, 0)] = out.dderiv;
        }
        Ok(())
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Polynomial
    }

    fn aux_data(&self) -> Vec<AuxValue> {
        let mut aux = vec![AuxValue::RealVec(self.bounds.clone())];
        aux.extend(self.pieces.iter().map(|p| AuxValue::RealVec(p.clone())));
        aux
    }
}

/// A real scalar constant coefficient.
pub fn constant(value: f64) -> CoeffRef {
    Arc::new(ConstantCf::new(value))
}

/// A complex scalar constant coefficient.
pub fn constant_complex(value: Complex64) -> CoeffRef {
    Arc::new(ConstantComplexCf::new(value))
}

/// A region-wise constant coefficient, one value per region index.
pub fn domain_constant(values: Vec<f64>) -> CoeffRef {
    Arc::new(DomainConstantCf::new(values))
}

/// A mutable parameter coefficient. The concrete handle is returned so the
/// value can be updated after the parameter has been embedded in expressions.
pub fn parameter(value: f64) -> Arc<ParameterCf> {
    Arc::new(ParameterCf::new(value))
}

/// A scalar coefficient computed by the given closure.
pub fn function<F>(f: F) -> CoeffRef
where
    F: Fn(&MappedPoint) -> f64 + Send + Sync + 'static,
{
    Arc::new(FunctionCf::new(f))
}

/// A piecewise polynomial of a scalar coefficient.
pub fn polynomial(child: CoeffRef, pieces: Vec<Vec<f64>>, bounds: Vec<f64>) -> Result<CoeffRef> {
    Ok(Arc::new(PolynomialCf::new(child, pieces, bounds)?))
}
