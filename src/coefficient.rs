//! The coefficient function contract.
//!
//! A coefficient function is a node in a directed acyclic expression graph of
//! (possibly tensor-valued) functions defined over a mesh. Every node honors a
//! common protocol: it declares its output [`Shape`] and complex-ness, it can
//! be evaluated at a single [`MappedPoint`] or batched over a [`MappedRule`],
//! and it can propagate first and second forward derivatives with respect to
//! an external scalar parameter (see
//! [`ParameterCf`](crate::primitives::ParameterCf)).
//!
//! Most operations have defaults so that a new node only needs to supply
//! `evaluate_scalar` and its metadata:
//!
//! - batched evaluation defaults to a loop over the per-point form, so
//!   batching is a pure optimization and never a semantic change;
//! - complex evaluation defaults to widening the real result;
//! - derivative evaluation defaults to zero derivatives, i.e. a node without
//!   an explicit derivative rule is treated as constant with respect to the
//!   parameter;
//! - cached-input evaluation defaults to recomputing from scratch.
//!
//! Nodes hold no per-call state: evaluation is a pure function of the node,
//! the context and (for the cached variants) the supplied child outputs, so a
//! node may be shared read-only across threads.

use crate::error::{CoefficientError, Result};
use crate::geometry::{MappedPoint, MappedRule};
use crate::serialize::{AuxValue, NodeKind};
use itertools::Itertools;
use nalgebra::{DMatrixView, DMatrixViewMut, DVector, DVectorViewMut};
use num::complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write;
use std::sync::Arc;

/// Shared handle to a node of a coefficient expression DAG.
///
/// A child may be referenced by several parents; the graph is acyclic by
/// construction since children are always fully built before a parent takes a
/// reference, and nodes hold no back-pointers.
pub type CoeffRef = Arc<dyn CoefficientFunction>;

/// The tensor shape of a coefficient value.
///
/// An empty shape denotes a scalar, one entry a vector, two entries a
/// (row-major) matrix. The total component count is the product of the
/// entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self { dims: vec![rows, cols] }
    }

    pub fn from_dims(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Number of scalar components, i.e. the product of the dimensions.
    pub fn dimension(&self) -> usize {
        self.dims.iter().product()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_scalar() {
            write!(f, "scalar")
        } else {
            write!(f, "{}", self.dims.iter().format("x"))
        }
    }
}

/// The contract every coefficient function node satisfies.
///
/// Output buffers for batched evaluation have one row per point and one column
/// per component. Passing buffers of the wrong size is a programmer error and
/// is caught by debug assertions; the failure modes that are part of the
/// protocol (non-constant nodes, dimension mismatches, unsupported operands,
/// domain violations, bad indices) are reported through
/// [`CoefficientError`].
pub trait CoefficientFunction: fmt::Debug + Send + Sync {
    /// A short tag naming the node kind, used in textual reports.
    fn name(&self) -> &'static str;

    /// The tensor shape of the output. Defaults to scalar.
    fn shape(&self) -> Shape {
        Shape::scalar()
    }

    /// Number of scalar components of the output.
    fn dimension(&self) -> usize {
        self.shape().dimension()
    }

    /// Whether the value type of this node is complex. Composite nodes derive
    /// this from their children.
    fn is_complex(&self) -> bool {
        false
    }

    /// Whether the node is constant within every single element, so that its
    /// value may be sampled at one point per element.
    fn elementwise_constant(&self) -> bool {
        false
    }

    /// Number of regions for which the node is defined. Unbounded for
    /// region-independent nodes.
    fn num_regions(&self) -> usize {
        usize::MAX
    }

    /// The value of the node under the assumption that it is constant
    /// everywhere. Fails with [`CoefficientError::NotConstant`] otherwise;
    /// callers are expected to check constancy beforehand.
    fn evaluate_const(&self) -> Result<f64> {
        Err(CoefficientError::NotConstant(self.name()))
    }

    /// Evaluates a scalar-shaped node at a single point.
    fn evaluate_scalar(&self, point: &MappedPoint) -> Result<f64>;

    /// Complex counterpart of [`evaluate_scalar`](Self::evaluate_scalar);
    /// defaults to widening the real result.
    fn evaluate_scalar_complex(&self, point: &MappedPoint) -> Result<Complex64> {
        Ok(Complex64::from(self.evaluate_scalar(point)?))
    }

    /// Evaluates the node at a single point into a buffer of length
    /// [`dimension`](Self::dimension).
    fn evaluate(&self, point: &MappedPoint, mut result: DVectorViewMut<f64>) -> Result<()> {
        debug_assert_eq!(result.len(), self.dimension());
        result[0] = self.evaluate_scalar(point)?;
        Ok(())
    }

    /// Complex counterpart of [`evaluate`](Self::evaluate). The default
    /// widens the real result with a zero imaginary part.
    fn evaluate_complex(&self, point: &MappedPoint, mut result: DVectorViewMut<Complex64>) -> Result<()> {
        let dim = self.dimension();
        debug_assert_eq!(result.len(), dim);
        if dim == 1 {
            result[0] = self.evaluate_scalar_complex(point)?;
            return Ok(());
        }
        let mut tmp = DVector::zeros(dim);
        self.evaluate(point, DVectorViewMut::from(&mut tmp))?;
        for i in 0..dim {
            result[i] = Complex64::from(tmp[i]);
        }
        Ok(())
    }

    /// Batched evaluation over all points of a rule. The default loops over
    /// the per-point form; overriding it is purely a performance optimization.
    fn evaluate_rule(&self, rule: &MappedRule, mut values: DMatrixViewMut<f64>) -> Result<()> {
        let dim = self.dimension();
        debug_assert_eq!(values.nrows(), rule.len());
        debug_assert_eq!(values.ncols(), dim);
        let mut tmp = DVector::zeros(dim);
        for (k, point) in rule.iter().enumerate() {
            self.evaluate(point, DVectorViewMut::from(&mut tmp))?;
            values.row_mut(k).tr_copy_from(&tmp);
        }
        Ok(())
    }

    /// Complex counterpart of [`evaluate_rule`](Self::evaluate_rule).
    fn evaluate_rule_complex(&self, rule: &MappedRule, mut values: DMatrixViewMut<Complex64>) -> Result<()> {
        let dim = self.dimension();
        debug_assert_eq!(values.nrows(), rule.len());
        debug_assert_eq!(values.ncols(), dim);
        let mut tmp = DVector::zeros(dim);
        for (k, point) in rule.iter().enumerate() {
            self.evaluate_complex(point, DVectorViewMut::from(&mut tmp))?;
            values.row_mut(k).tr_copy_from(&tmp);
        }
        Ok(())
    }

    /// Evaluates values and first derivatives with respect to the external
    /// scalar parameter. The default treats the node as constant with respect
    /// to the parameter and fills the derivative with zeros.
    fn evaluate_deriv(
        &self,
        rule: &MappedRule,
        values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        self.evaluate_rule(rule, values)?;
        deriv.fill(0.0);
        Ok(())
    }

    /// Evaluates values and first and second derivatives with respect to the
    /// external scalar parameter. The default delegates to
    /// [`evaluate_deriv`](Self::evaluate_deriv) and zeroes the second
    /// derivative.
    fn evaluate_dderiv(
        &self,
        rule: &MappedRule,
        values: DMatrixViewMut<f64>,
        deriv: DMatrixViewMut<f64>,
        mut dderiv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        self.evaluate_deriv(rule, values, deriv)?;
        dderiv.fill(0.0);
        Ok(())
    }

    /// Complex counterpart of [`evaluate_deriv`](Self::evaluate_deriv).
    fn evaluate_deriv_complex(
        &self,
        rule: &MappedRule,
        values: DMatrixViewMut<Complex64>,
        mut deriv: DMatrixViewMut<Complex64>,
    ) -> Result<()> {
        self.evaluate_rule_complex(rule, values)?;
        deriv.fill(Complex64::from(0.0));
        Ok(())
    }

    /// Complex counterpart of [`evaluate_dderiv`](Self::evaluate_dderiv).
    fn evaluate_dderiv_complex(
        &self,
        rule: &MappedRule,
        values: DMatrixViewMut<Complex64>,
        deriv: DMatrixViewMut<Complex64>,
        mut dderiv: DMatrixViewMut<Complex64>,
    ) -> Result<()> {
        self.evaluate_deriv_complex(rule, values, deriv)?;
        dderiv.fill(Complex64::from(0.0));
        Ok(())
    }

    /// Batched evaluation given the already-computed outputs of this node's
    /// direct children, indexed positionally as in [`inputs`](Self::inputs).
    ///
    /// This is used by DAG-aware compiled evaluation to avoid recomputing
    /// shared sub-expressions. An override must produce results bit-identical
    /// to recomputing from scratch; the default simply recomputes.
    fn evaluate_rule_cached(
        &self,
        rule: &MappedRule,
        _inputs: &[DMatrixView<f64>],
        values: DMatrixViewMut<f64>,
    ) -> Result<()> {
        self.evaluate_rule(rule, values)
    }

    /// Cached-input counterpart of [`evaluate_deriv`](Self::evaluate_deriv).
    fn evaluate_deriv_cached(
        &self,
        rule: &MappedRule,
        _inputs: &[DMatrixView<f64>],
        _dinputs: &[DMatrixView<f64>],
        values: DMatrixViewMut<f64>,
        deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        self.evaluate_deriv(rule, values, deriv)
    }

    /// Cached-input counterpart of [`evaluate_dderiv`](Self::evaluate_dderiv).
    fn evaluate_dderiv_cached(
        &self,
        rule: &MappedRule,
        _inputs: &[DMatrixView<f64>],
        _dinputs: &[DMatrixView<f64>],
        _ddinputs: &[DMatrixView<f64>],
        values: DMatrixViewMut<f64>,
        deriv: DMatrixViewMut<f64>,
        dderiv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        self.evaluate_dderiv(rule, values, deriv, dderiv)
    }

    /// Marks for every output component whether it can be structurally
    /// nonzero. `true` means "maybe nonzero", `false` means "provably always
    /// zero"; the default conservatively marks every component.
    fn nonzero_pattern(&self, nonzero: &mut [bool]) {
        debug_assert_eq!(nonzero.len(), self.dimension());
        nonzero.fill(true);
    }

    /// The direct children of this node, in positional order. Leaves return
    /// an empty vector.
    fn inputs(&self) -> Vec<CoeffRef> {
        Vec::new()
    }

    /// The node-kind tag of the wire format. [`NodeKind::Undefined`] marks a
    /// node that cannot be serialized.
    fn node_kind(&self) -> NodeKind {
        NodeKind::Undefined
    }

    /// Kind-specific auxiliary values of the wire format.
    fn aux_data(&self) -> Vec<AuxValue> {
        Vec::new()
    }
}

/// Post-order traversal of an expression tree: each child's subtree is visited
/// fully before the visitor is invoked on the node itself.
///
/// There is no memoization: a node reachable through `k` distinct parent paths
/// is visited `k` times. Visitors that must run once per distinct node have to
/// deduplicate externally (e.g. by `Arc` pointer identity).
pub fn traverse_tree(cf: &dyn CoefficientFunction, visitor: &mut dyn FnMut(&dyn CoefficientFunction)) {
    for child in cf.inputs() {
        traverse_tree(child.as_ref(), visitor);
    }
    visitor(cf);
}

/// An indented textual report of an expression tree, for diagnostics.
pub fn tree_report(cf: &dyn CoefficientFunction) -> String {
    let mut out = String::new();
    report_rec(cf, 0, &mut out);
    out
}

fn report_rec(cf: &dyn CoefficientFunction, level: usize, out: &mut String) {
    let complex = if cf.is_complex() { ", complex" } else { "" };
    let _ = writeln!(out, "{:indent$}{} ({}{})", "", cf.name(), cf.shape(), complex, indent = 2 * level);
    for child in cf.inputs() {
        report_rec(child.as_ref(), level + 1, out);
    }
}
