//! Structural operators: component extraction, concatenation into vectors
//! and tensors, and region-wise composition.

use crate::coefficient::{CoefficientFunction, CoeffRef, Shape};
use crate::error::{CoefficientError, Result};
use crate::geometry::{MappedPoint, MappedRule};
use crate::serialize::{AuxValue, NodeKind};
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, DVector, DVectorViewMut};
use num::complex::Complex64;
use std::sync::Arc;

/// Extracts a single component of a child coefficient as a scalar.
#[derive(Debug)]
pub struct ComponentCf {
    child: CoeffRef,
    component: usize,
}

impl ComponentCf {
    pub fn new(child: CoeffRef, component: usize) -> Result<Self> {
        if component >= child.dimension() {
            return Err(CoefficientError::IndexError {
                index: component,
                len: child.dimension(),
            });
        }
        Ok(Self { child, component })
    }
}

impl CoefficientFunction for ComponentCf {
    fn name(&self) -> &'static str {
        "component"
    }

    fn is_complex(&self) -> bool {
        self.child.is_complex()
    }

    fn elementwise_constant(&self) -> bool {
        self.child.elementwise_constant()
    }

    fn inputs(&self) -> Vec<CoeffRef> {
        vec![self.child.clone()]
    }

    fn evaluate_scalar(&self, point: &MappedPoint) -> Result<f64> {
        let mut u = DVector::zeros(self.child.dimension());
        self.child.evaluate(point, DVectorViewMut::from(&mut u))?;
        Ok(u[self.component])
    }

    fn evaluate_scalar_complex(&self, point: &MappedPoint) -> Result<Complex64> {
        let mut u = DVector::from_element(self.child.dimension(), Complex64::from(0.0));
        self.child.evaluate_complex(point, DVectorViewMut::from(&mut u))?;
        Ok(u[self.component])
    }

    fn evaluate_rule(&self, rule: &MappedRule, mut values: DMatrixViewMut<f64>) -> Result<()> {
        let n = rule.len();
        let mut u = DMatrix::zeros(n, self.child.dimension());
        self.child.evaluate_rule(rule, DMatrixViewMut::from(&mut u))?;
        for k in 0..n {
            values[(k, 0)] = u[(k, self.component)];
        }
        Ok(())
    }

    fn evaluate_rule_complex(&self, rule: &MappedRule, mut values: DMatrixViewMut<Complex64>) -> Result<()> {
        let n = rule.len();
        let mut u = DMatrix::from_element(n, self.child.dimension(), Complex64::from(0.0));
        self.child.evaluate_rule_complex(rule, DMatrixViewMut::from(&mut u))?;
        for k in 0..n {
            values[(k, 0)] = u[(k, self.component)];
        }
        Ok(())
    }

    fn evaluate_deriv(
        &self,
        rule: &MappedRule,
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let (n, dim) = (rule.len(), self.child.dimension());
        let mut u = DMatrix::zeros(n, dim);
        let mut du = DMatrix::zeros(n, dim);
        self.child
            .evaluate_deriv(rule, DMatrixViewMut::from(&mut u), DMatrixViewMut::from(&mut du))?;
        for k in 0..n {
            values[(k, 0)] = u[(k, self.component)];
            deriv[(k, 0)] = du[(k, self.component)];
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
        let (n, dim) = (rule.len(), self.child.dimension());
        let mut u = DMatrix::zeros(n, dim);
        let mut du = DMatrix::zeros(n, dim);
        let mut ddu = DMatrix::zeros(n, dim);
        self.child.evaluate_dderiv(
            rule,
            DMatrixViewMut::from(&mut u),
            DMatrixViewMut::from(&mut du),
            DMatrixViewMut::from(&mut ddu),
        )?;
        for k in 0..n {
            values[(k, 0)] = u[(k, self.component)];
            deriv[(k, 0)] = du[(k, self.component)];
            dderiv[(k, 0)] = ddu[(k, self.component)];
        }
        Ok(())
    }

    fn evaluate_rule_cached(
        &self,
        rule: &MappedRule,
        inputs: &[DMatrixView<f64>],
        mut values: DMatrixViewMut<f64>,
    ) -> Result<()> {
        for k in 0..rule.len() {
            values[(k, 0)] = inputs[0][(k, self.component)];
        }
        Ok(())
    }

    fn evaluate_deriv_cached(
        &self,
        rule: &MappedRule,
        inputs: &[DMatrixView<f64>],
        dinputs: &[DMatrixView<f64>],
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        for k in 0..rule.len() {
            values[(k, 0)] = inputs[0][(k, self.component)];
            deriv[(k, 0)] = dinputs[0][(k, self.component)];
        }
        Ok(())
    }

    fn evaluate_dderiv_cached(
        &self,
        rule: &MappedRule,
        inputs: &[DMatrixView<f64>],
        dinputs: &[DMatrixView<f64>],
        ddinputs: &[DMatrixView<f64>],
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
        mut dderiv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        for k in 0..rule.len() {
            values[(k, 0)] = inputs[0][(k, self.component)];
            deriv[(k, 0)] = dinputs[0][(k, self.component)];
            dderiv[(k, 0)] = ddinputs[0][(k, self.component)];
        }
        Ok(())
    }

    fn nonzero_pattern(&self, nonzero: &mut [bool]) {
        let mut child_pattern = vec![false; self.child.dimension()];
        self.child.nonzero_pattern(&mut child_pattern);
        nonzero[0] = child_pattern[self.component];
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Component
    }

    fn aux_data(&self) -> Vec<AuxValue> {
        vec![AuxValue::Int(self.component as i64)]
    }
}

/// Concatenates the components of its children into a single vector (or,
/// with an explicit shape, a tensor) coefficient. Children keep their own
/// shapes; their components are laid out consecutively.
#[derive(Debug)]
pub struct VectorialCf {
    children: Vec<CoeffRef>,
    shape: Shape,
}

impl VectorialCf {
    /// Concatenation into a flat vector of the combined component count.
    pub fn new(children: Vec<CoeffRef>) -> Self {
        let dim = children.iter().map(|c| c.dimension()).sum();
        Self { children, shape: Shape::vector(dim) }
    }

    /// Concatenation reinterpreted with an explicit shape, whose component
    /// count must match the combined count of the children.
    pub fn with_shape(children: Vec<CoeffRef>, shape: Shape) -> Result<Self> {
        let dim: usize = children.iter().map(|c| c.dimension()).sum();
        if shape.dimension() != dim {
            return Err(CoefficientError::UnsupportedOperand(format!(
                "shape {} does not hold {} components",
                shape, dim
            )));
        }
        Ok(Self { children, shape })
    }
}

impl CoefficientFunction for VectorialCf {
    fn name(&self) -> &'static str {
        "vectorial"
    }

    fn shape(&self) -> Shape {
        self.shape.clone()
    }

    fn is_complex(&self) -> bool {
        self.children.iter().any(|c| c.is_complex())
    }

    fn elementwise_constant(&self) -> bool {
        self.children.iter().all(|c| c.elementwise_constant())
    }

    fn inputs(&self) -> Vec<CoeffRef> {
        self.children.clone()
    }

    fn evaluate_scalar(&self, point: &MappedPoint) -> Result<f64> {
        if self.dimension() != 1 {
            return Err(CoefficientError::UnsupportedOperand(format!(
                "scalar evaluation of a coefficient with {} components",
                self.dimension()
            )));
        }
        self.children[0].evaluate_scalar(point)
    }

    fn evaluate(&self, point: &MappedPoint, mut result: DVectorViewMut<f64>) -> Result<()> {
        let mut base = 0;
        for child in &self.children {
            let dim = child.dimension();
            child.evaluate(point, result.rows_mut(base, dim))?;
            base += dim;
        }
        Ok(())
    }

    fn evaluate_complex(&self, point: &MappedPoint, mut result: DVectorViewMut<Complex64>) -> Result<()> {
        let mut base = 0;
        for child in &self.children {
            let dim = child.dimension();
            child.evaluate_complex(point, result.rows_mut(base, dim))?;
            base += dim;
        }
        Ok(())
    }

    fn evaluate_rule(&self, rule: &MappedRule, mut values: DMatrixViewMut<f64>) -> Result<()> {
        let mut base = 0;
        for child in &self.children {
            let dim = child.dimension();
            child.evaluate_rule(rule, values.columns_mut(base, dim))?;
            base += dim;
        }
        Ok(())
    }

    fn evaluate_rule_complex(&self, rule: &MappedRule, mut values: DMatrixViewMut<Complex64>) -> Result<()> {
        let mut base = 0;
        for child in &self.children {
            let dim = child.dimension();
            child.evaluate_rule_complex(rule, values.columns_mut(base, dim))?;
            base += dim;
        }
        Ok(())
    }

    fn evaluate_deriv(
        &self,
        rule: &MappedRule,
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let mut base = 0;
        for child in &self.children {
            let dim = child.dimension();
            child.evaluate_deriv(rule, values.columns_mut(base, dim), deriv.columns_mut(base, dim))?;
            base += dim;
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
        let mut base = 0;
        for child in &self.children {
            let dim = child.dimension();
            child.evaluate_dderiv(
                rule,
                values.columns_mut(base, dim),
                deriv.columns_mut(base, dim),
                dderiv.columns_mut(base, dim),
            )?;
            base += dim;
        }
        Ok(())
    }

    fn evaluate_rule_cached(
        &self,
        _rule: &MappedRule,
        inputs: &[DMatrixView<f64>],
        mut values: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let mut base = 0;
        for (child, input) in self.children.iter().zip(inputs) {
            let dim = child.dimension();
            values.columns_mut(base, dim).copy_from(input);
            base += dim;
        }
        Ok(())
    }

    fn evaluate_deriv_cached(
        &self,
        _rule: &MappedRule,
        inputs: &[DMatrixView<f64>],
        dinputs: &[DMatrixView<f64>],
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let mut base = 0;
        for (i, child) in self.children.iter().enumerate() {
            let dim = child.dimension();
            values.columns_mut(base, dim).copy_from(&inputs[i]);
            deriv.columns_mut(base, dim).copy_from(&dinputs[i]);
            base += dim;
        }
        Ok(())
    }

    fn evaluate_dderiv_cached(
        &self,
        _rule: &MappedRule,
        inputs: &[DMatrixView<f64>],
        dinputs: &[DMatrixView<f64>],
        ddinputs: &[DMatrixView<f64>],
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
        mut dderiv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let mut base = 0;
        for (i, child) in self.children.iter().enumerate() {
            let dim = child.dimension();
            values.columns_mut(base, dim).copy_from(&inputs[i]);
            deriv.columns_mut(base, dim).copy_from(&dinputs[i]);
            dderiv.columns_mut(base, dim).copy_from(&ddinputs[i]);
            base += dim;
        }
        Ok(())
    }

    fn nonzero_pattern(&self, nonzero: &mut [bool]) {
        let mut base = 0;
        for child in &self.children {
            let dim = child.dimension();
            child.nonzero_pattern(&mut nonzero[base..base + dim]);
            base += dim;
        }
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Vectorial
    }

    fn aux_data(&self) -> Vec<AuxValue> {
        vec![AuxValue::IntVec(self.shape.dims().to_vec())]
    }
}

/// Composes one coefficient per region, with regions that carry no
/// coefficient (or lie beyond the table) evaluating to zero.
///
/// Unlike [`DomainConstantCf`](crate::primitives::DomainConstantCf), an
/// out-of-range region here is not an error: region-wise composition is
/// routinely evaluated over the whole mesh, including regions the caller
/// never assigned anything to.
#[derive(Debug)]
pub struct DomainWiseCf {
    children: Vec<Option<CoeffRef>>,
    shape: Shape,
}

impl DomainWiseCf {
    /// Fails if the coefficients that are present disagree in shape.
    pub fn new(children: Vec<Option<CoeffRef>>) -> Result<Self> {
        let mut shape = None;
        for child in children.iter().flatten() {
            match &shape {
                None => shape = Some(child.shape()),
                Some(s) if *s != child.shape() => {
                    return Err(CoefficientError::UnsupportedOperand(format!(
                        "region-wise coefficients differ in shape: {} vs {}",
                        s,
                        child.shape()
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(Self { children, shape: shape.unwrap_or_else(|| Shape::vector(0)) })
    }

    fn child_for(&self, region: usize) -> Option<&CoeffRef> {
        self.children.get(region).and_then(|c| c.as_ref())
    }
}

impl CoefficientFunction for DomainWiseCf {
    fn name(&self) -> &'static str {
        "domain-wise"
    }

    fn shape(&self) -> Shape {
        self.shape.clone()
    }

    fn is_complex(&self) -> bool {
        self.children.iter().flatten().any(|c| c.is_complex())
    }

    fn num_regions(&self) -> usize {
        self.children.len()
    }

    fn inputs(&self) -> Vec<CoeffRef> {
        self.children.iter().flatten().cloned().collect()
    }

    fn evaluate_scalar(&self, point: &MappedPoint) -> Result<f64> {
        match self.child_for(point.region_index()) {
            Some(child) => child.evaluate_scalar(point),
            None => Ok(0.0),
        }
    }

    fn evaluate_scalar_complex(&self, point: &MappedPoint) -> Result<Complex64> {
        match self.child_for(point.region_index()) {
            Some(child) => child.evaluate_scalar_complex(point),
            None => Ok(Complex64::from(0.0)),
        }
    }

    fn evaluate(&self, point: &MappedPoint, mut result: DVectorViewMut<f64>) -> Result<()> {
        result.fill(0.0);
        match self.child_for(point.region_index()) {
            Some(child) => child.evaluate(point, result),
            None => Ok(()),
        }
    }

    fn evaluate_complex(&self, point: &MappedPoint, mut result: DVectorViewMut<Complex64>) -> Result<()> {
        result.fill(Complex64::from(0.0));
        match self.child_for(point.region_index()) {
            Some(child) => child.evaluate_complex(point, result),
            None => Ok(()),
        }
    }

    fn evaluate_rule(&self, rule: &MappedRule, mut values: DMatrixViewMut<f64>) -> Result<()> {
        values.fill(0.0);
        match self.child_for(rule.region_index()) {
            Some(child) => child.evaluate_rule(rule, values),
            None => Ok(()),
        }
    }

    fn evaluate_rule_complex(&self, rule: &MappedRule, mut values: DMatrixViewMut<Complex64>) -> Result<()> {
        values.fill(Complex64::from(0.0));
        match self.child_for(rule.region_index()) {
            Some(child) => child.evaluate_rule_complex(rule, values),
            None => Ok(()),
        }
    }

    fn evaluate_deriv(
        &self,
        rule: &MappedRule,
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        values.fill(0.0);
        deriv.fill(0.0);
        match self.child_for(rule.region_index()) {
            Some(child) => child.evaluate_deriv(rule, values, deriv),
            None => Ok(()),
        }
    }

    fn evaluate_dderiv(
        &self,
        rule: &MappedRule,
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
        mut dderiv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        values.fill(0.0);
        deriv.fill(0.0);
        dderiv.fill(0.0);
        match self.child_for(rule.region_index()) {
            Some(child) => child.evaluate_dderiv(rule, values, deriv, dderiv),
            None => Ok(()),
        }
    }

    fn nonzero_pattern(&self, nonzero: &mut [bool]) {
        nonzero.fill(false);
        let mut child_pattern = vec![false; self.dimension()];
        for child in self.children.iter().flatten() {
            child_pattern.fill(false);
            child.nonzero_pattern(&mut child_pattern);
            for (out, &bit) in nonzero.iter_mut().zip(&child_pattern) {
                *out |= bit;
            }
        }
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::DomainWise
    }

    fn aux_data(&self) -> Vec<AuxValue> {
        let present = self
            .children
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|_| i))
            .collect();
        vec![AuxValue::Int(self.children.len() as i64), AuxValue::IntVec(present)]
    }
}

/// Extracts one component of a coefficient as a scalar.
pub fn component(child: CoeffRef, component: usize) -> Result<CoeffRef> {
    Ok(Arc::new(ComponentCf::new(child, component)?))
}

/// Concatenates coefficients into a flat vector coefficient.
pub fn vectorial(children: Vec<CoeffRef>) -> CoeffRef {
    Arc::new(VectorialCf::new(children))
}

/// Concatenates coefficients and reinterprets the result with the given
/// shape.
pub fn vectorial_with_shape(children: Vec<CoeffRef>, shape: Shape) -> Result<CoeffRef> {
    Ok(Arc::new(VectorialCf::with_shape(children, shape)?))
}

/// Composes one coefficient per region; absent regions evaluate to zero.
pub fn domain_wise(children: Vec<Option<CoeffRef>>) -> Result<CoeffRef> {
    Ok(Arc::new(DomainWiseCf::new(children)?))
}
