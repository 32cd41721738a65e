//! The combinator algebra: elementwise unary and binary operations on
//! coefficient functions, with forward-mode derivative propagation.
//!
//! The two node families [`UnaryOpCf`] and [`BinaryOpCf`] are parameterized by
//! plain operator descriptors ([`UnaryOp`], [`BinaryOp`]) holding the value
//! functions together with their derivative and sparsity rules. All arithmetic
//! operators and named math functions are instances of these families; see the
//! constructors at the bottom of the module.
//!
//! Unary derivative propagation always evaluates the operator on a dual
//! number (see [`crate::autodiff`]) rather than on a hand-derived chain rule,
//! so each math function is written exactly once. Binary combinators carry
//! explicit partial-derivative rules.

use crate::autodiff::{Dual, Dual2};
use crate::coefficient::{CoefficientFunction, CoeffRef, Shape};
use crate::error::{CoefficientError, Result};
use crate::geometry::{MappedPoint, MappedRule};
use crate::serialize::{AuxValue, NodeKind};
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, DVector, DVectorViewMut};
use num::complex::Complex64;
use std::sync::Arc;

/// Descriptor of an elementwise unary operation.
///
/// The same operation is carried in four representations: plain real, complex
/// (absent for real-only functions such as `floor`), and first-/second-order
/// dual numbers for derivative propagation. An optional domain predicate
/// guards the real evaluation path; arguments outside the domain fail with
/// [`CoefficientError::DomainError`].
#[derive(Debug, Clone, Copy)]
pub struct UnaryOp {
    pub name: &'static str,
    pub real: fn(f64) -> f64,
    pub complex: Option<fn(Complex64) -> Complex64>,
    pub dual: fn(Dual) -> Dual,
    pub dual2: fn(Dual2) -> Dual2,
    pub domain: Option<fn(f64) -> bool>,
}

macro_rules! elementwise_op {
    ($name:literal, |$x:ident| $body:expr) => {
        UnaryOp {
            name: $name,
            real: |$x: f64| $body,
            complex: Some(|$x: Complex64| $body),
            dual: |$x: Dual| $body,
            dual2: |$x: Dual2| $body,
            domain: None,
        }
    };
    ($name:literal, real only, |$x:ident| $body:expr) => {
        UnaryOp {
            name: $name,
            real: |$x: f64| $body,
            complex: None,
            dual: |$x: Dual| $body,
            dual2: |$x: Dual2| $body,
            domain: None,
        }
    };
}

pub const SIN: UnaryOp = elementwise_op!("sin", |x| x.sin());
pub const COS: UnaryOp = elementwise_op!("cos", |x| x.cos());
pub const TAN: UnaryOp = elementwise_op!("tan", |x| x.tan());
pub const EXP: UnaryOp = elementwise_op!("exp", |x| x.exp());
pub const ATAN: UnaryOp = elementwise_op!("atan", |x| x.atan());
pub const ASIN: UnaryOp = elementwise_op!("asin", |x| x.asin());
pub const ACOS: UnaryOp = elementwise_op!("acos", |x| x.acos());
pub const SQRT: UnaryOp = elementwise_op!("sqrt", |x| x.sqrt());
pub const FLOOR: UnaryOp = elementwise_op!("floor", real only, |x| x.floor());
pub const CEIL: UnaryOp = elementwise_op!("ceil", real only, |x| x.ceil());

pub const LOG: UnaryOp = UnaryOp {
    name: "log",
    real: |x| x.ln(),
    complex: Some(|x| x.ln()),
    dual: |x| x.ln(),
    dual2: |x| x.ln(),
    domain: Some(|x| x > 0.0),
};

/// Complex conjugation. The identity on real values; not complex
/// differentiable, so the dual representations pass the (real) argument
/// through unchanged.
pub const CONJ: UnaryOp = UnaryOp {
    name: "conj",
    real: |x| x,
    complex: Some(|x| x.conj()),
    dual: |x| x,
    dual2: |x| x,
    domain: None,
};

/// Looks up a built-in unary operation by name, as used by the wire format.
pub fn unary_op_by_name(name: &str) -> Option<UnaryOp> {
    match name {
        "sin" => Some(SIN),
        "cos" => Some(COS),
        "tan" => Some(TAN),
        "exp" => Some(EXP),
        "log" => Some(LOG),
        "atan" => Some(ATAN),
        "asin" => Some(ASIN),
        "acos" => Some(ACOS),
        "sqrt" => Some(SQRT),
        "floor" => Some(FLOOR),
        "ceil" => Some(CEIL),
        "conj" => Some(CONJ),
        _ => None,
    }
}

/// Descriptor of an elementwise binary operation.
///
/// `deriv` returns the partial derivatives `(d/da, d/db)` and `dderiv` the
/// second partials `(d2/da2, d2/dadb, d2/db2)` at the given argument pair.
/// `nonzero` combines the children's sparsity bits; the correct rule depends
/// on the operator (OR for addition, AND for multiplication, and so on) and
/// is supplied per operator rather than hard-coded.
#[derive(Debug, Clone, Copy)]
pub struct BinaryOp {
    pub name: &'static str,
    pub real: fn(f64, f64) -> f64,
    pub complex: Option<fn(Complex64, Complex64) -> Complex64>,
    pub deriv: fn(f64, f64) -> (f64, f64),
    pub dderiv: fn(f64, f64) -> (f64, f64, f64),
    pub nonzero: fn(bool, bool) -> bool,
    pub domain: Option<fn(f64, f64) -> bool>,
}

pub const ADD: BinaryOp = BinaryOp {
    name: "add",
    real: |a, b| a + b,
    complex: Some(|a, b| a + b),
    deriv: |_, _| (1.0, 1.0),
    dderiv: |_, _| (0.0, 0.0, 0.0),
    nonzero: |a, b| a || b,
    domain: None,
};

pub const SUB: BinaryOp = BinaryOp {
    name: "sub",
    real: |a, b| a - b,
    complex: Some(|a, b| a - b),
    deriv: |_, _| (1.0, -1.0),
    dderiv: |_, _| (0.0, 0.0, 0.0),
    nonzero: |a, b| a || b,
    domain: None,
};

pub const MUL: BinaryOp = BinaryOp {
    name: "mult",
    real: |a, b| a * b,
    complex: Some(|a, b| a * b),
    deriv: |a, b| (b, a),
    dderiv: |_, _| (0.0, 1.0, 0.0),
    // A product with a structurally zero factor is structurally zero.
    nonzero: |a, b| a && b,
    domain: None,
};

pub const DIV: BinaryOp = BinaryOp {
    name: "div",
    real: |a, b| a / b,
    complex: Some(|a, b| a / b),
    deriv: |a, b| (1.0 / b, -a / (b * b)),
    dderiv: |a, b| (0.0, -1.0 / (b * b), 2.0 * a / (b * b * b)),
    // A quotient vanishes exactly where the numerator does.
    nonzero: |a, _| a,
    domain: None,
};

pub const ATAN2: BinaryOp = BinaryOp {
    name: "atan2",
    real: |a, b| a.atan2(b),
    complex: None,
    deriv: |a, b| {
        let r2 = a * a + b * b;
        (b / r2, -a / r2)
    },
    dderiv: |a, b| {
        let r2 = a * a + b * b;
        let r4 = r2 * r2;
        (-2.0 * a * b / r4, (a * a - b * b) / r4, 2.0 * a * b / r4)
    },
    nonzero: |a, b| a || b,
    domain: None,
};

pub const POW: BinaryOp = BinaryOp {
    name: "pow",
    real: |a, b| a.powf(b),
    complex: Some(|a, b| a.powc(b)),
    // For a <= 0 the domain predicate only admits exponents that cannot vary
    // (integers, or a positive constant at a = 0), so the exponent partials
    // are zero there rather than the NaN of a^b ln(a).
    deriv: |a, b| {
        let d_da = b * a.powf(b - 1.0);
        let d_db = if a > 0.0 { a.powf(b) * a.ln() } else { 0.0 };
        (d_da, d_db)
    },
    dderiv: |a, b| {
        let d_dada = b * (b - 1.0) * a.powf(b - 2.0);
        if a > 0.0 {
            (
                d_dada,
                a.powf(b - 1.0) * (1.0 + b * a.ln()),
                a.powf(b) * a.ln() * a.ln(),
            )
        } else {
            (d_dada, 0.0, 0.0)
        }
    },
    nonzero: |a, b| a || b,
    // Matches the log semantics of the exp(log(a) * b) fallback: negative
    // bases are only admitted for integer exponents, where powf is exact.
    domain: Some(|a, b| a > 0.0 || (a == 0.0 && b > 0.0) || (a < 0.0 && b.fract() == 0.0)),
};

/// Looks up a built-in binary operation by name, as used by the wire format.
pub fn binary_op_by_name(name: &str) -> Option<BinaryOp> {
    match name {
        "add" => Some(ADD),
        "sub" => Some(SUB),
        "mult" => Some(MUL),
        "div" => Some(DIV),
        "atan2" => Some(ATAN2),
        "pow" => Some(POW),
        _ => None,
    }
}

fn check_unary_domain(op: &UnaryOp, x: f64) -> Result<()> {
    match op.domain {
        Some(domain) if !domain(x) => Err(CoefficientError::DomainError {
            function: op.name,
            argument: x,
        }),
        _ => Ok(()),
    }
}

fn check_binary_domain(op: &BinaryOp, a: f64, b: f64) -> Result<()> {
    match op.domain {
        Some(domain) if !domain(a, b) => Err(CoefficientError::DomainError {
            function: op.name,
            argument: a,
        }),
        _ => Ok(()),
    }
}

fn real_only_operand(name: &'static str) -> CoefficientError {
    CoefficientError::UnsupportedOperand(format!("'{}' is not defined for complex operands", name))
}

/// Elementwise application of a [`UnaryOp`] to every component of a child
/// coefficient. Inherits the child's shape.
#[derive(Debug)]
pub struct UnaryOpCf {
    child: CoeffRef,
    op: UnaryOp,
}

impl UnaryOpCf {
    pub fn new(child: CoeffRef, op: UnaryOp) -> Self {
        Self { child, op }
    }
}

impl CoefficientFunction for UnaryOpCf {
    fn name(&self) -> &'static str {
        self.op.name
    }

    fn shape(&self) -> Shape {
        self.child.shape()
    }

    fn dimension(&self) -> usize {
        self.child.dimension()
    }

    // Complex only if the child is complex and the operation actually has a
    // complex-valued variant.
    fn is_complex(&self) -> bool {
        self.child.is_complex() && self.op.complex.is_some()
    }

    fn elementwise_constant(&self) -> bool {
        self.child.elementwise_constant()
    }

    fn inputs(&self) -> Vec<CoeffRef> {
        vec![self.child.clone()]
    }

    fn evaluate_const(&self) -> Result<f64> {
        let u = self.child.evaluate_const()?;
        check_unary_domain(&self.op, u)?;
        Ok((self.op.real)(u))
    }

    fn evaluate_scalar(&self, point: &MappedPoint) -> Result<f64> {
        let u = self.child.evaluate_scalar(point)?;
        check_unary_domain(&self.op, u)?;
        Ok((self.op.real)(u))
    }

    fn evaluate_scalar_complex(&self, point: &MappedPoint) -> Result<Complex64> {
        match self.op.complex {
            Some(fc) => Ok(fc(self.child.evaluate_scalar_complex(point)?)),
            None if !self.child.is_complex() => Ok(Complex64::from(self.evaluate_scalar(point)?)),
            None => Err(real_only_operand(self.op.name)),
        }
    }

    fn evaluate(&self, point: &MappedPoint, mut result: DVectorViewMut<f64>) -> Result<()> {
        let dim = self.dimension();
        let mut u = DVector::zeros(dim);
        self.child.evaluate(point, DVectorViewMut::from(&mut u))?;
        for i in 0..dim {
            check_unary_domain(&self.op, u[i])?;
            result[i] = (self.op.real)(u[i]);
        }
        Ok(())
    }

    fn evaluate_complex(&self, point: &MappedPoint, mut result: DVectorViewMut<Complex64>) -> Result<()> {
        let dim = self.dimension();
        match self.op.complex {
            Some(fc) => {
                let mut u = DVector::from_element(dim, Complex64::from(0.0));
                self.child.evaluate_complex(point, DVectorViewMut::from(&mut u))?;
                for i in 0..dim {
                    result[i] = fc(u[i]);
                }
                Ok(())
            }
            None if !self.child.is_complex() => {
                let mut u = DVector::zeros(dim);
                self.evaluate(point, DVectorViewMut::from(&mut u))?;
                for i in 0..dim {
                    result[i] = Complex64::from(u[i]);
                }
                Ok(())
            }
            None => Err(real_only_operand(self.op.name)),
        }
    }

    fn evaluate_rule(&self, rule: &MappedRule, mut values: DMatrixViewMut<f64>) -> Result<()> {
        let (n, dim) = (rule.len(), self.dimension());
        let mut u = DMatrix::zeros(n, dim);
        self.child.evaluate_rule(rule, DMatrixViewMut::from(&mut u))?;
        for k in 0..n {
            for i in 0..dim {
                check_unary_domain(&self.op, u[(k, i)])?;
                values[(k, i)] = (self.op.real)(u[(k, i)]);
            }
        }
        Ok(())
    }

    fn evaluate_rule_complex(&self, rule: &MappedRule, mut values: DMatrixViewMut<Complex64>) -> Result<()> {
        let (n, dim) = (rule.len(), self.dimension());
        match self.op.complex {
            Some(fc) => {
                let mut u = DMatrix::from_element(n, dim, Complex64::from(0.0));
                self.child.evaluate_rule_complex(rule, DMatrixViewMut::from(&mut u))?;
                for k in 0..n {
                    for i in 0..dim {
                        values[(k, i)] = fc(u[(k, i)]);
                    }
                }
                Ok(())
            }
            None if !self.child.is_complex() => {
                let mut u = DMatrix::zeros(n, dim);
                self.evaluate_rule(rule, DMatrixViewMut::from(&mut u))?;
                for k in 0..n {
                    for i in 0..dim {
                        values[(k, i)] = Complex64::from(u[(k, i)]);
                    }
                }
                Ok(())
            }
            None => Err(real_only_operand(self.op.name)),
        }
    }

    fn evaluate_deriv(
        &self,
        rule: &MappedRule,
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let (n, dim) = (rule.len(), self.dimension());
        let mut u = DMatrix::zeros(n, dim);
        let mut du = DMatrix::zeros(n, dim);
        self.child
            .evaluate_deriv(rule, DMatrixViewMut::from(&mut u), DMatrixViewMut::from(&mut du))?;
        for k in 0..n {
            for i in 0..dim {
                check_unary_domain(&self.op, u[(k, i)])?;
                let out = (self.op.dual)(Dual::new(u[(k, i)], du[(k, i)]));
                values[(k, i)] = out.value;
                deriv[(k, i)] = out.deriv;
            }
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
        let (n, dim) = (rule.len(), self.dimension());
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
            for i in 0..dim {
                check_unary_domain(&self.op, u[(k, i)])?;
                let out = (self.op.dual2)(Dual2::new(u[(k, i)], du[(k, i)], ddu[(k, i)]));
                values[(k, i)] = out.value;
                deriv[(k, i)] = out.deriv;
                dderiv[(k, i)] = out.dderiv;
            }
        }
        Ok(())
    }

    fn evaluate_rule_cached(
        &self,
        rule: &MappedRule,
        inputs: &[DMatrixView<f64>],
        mut values: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let (n, dim) = (rule.len(), self.dimension());
        let u = &inputs[0];
        for k in 0..n {
            for i in 0..dim {
                check_unary_domain(&self.op, u[(k, i)])?;
                values[(k, i)] = (self.op.real)(u[(k, i)]);
            }
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
        let (n, dim) = (rule.len(), self.dimension());
        let (u, du) = (&inputs[0], &dinputs[0]);
        for k in 0..n {
            for i in 0..dim {
                check_unary_domain(&self.op, u[(k, i)])?;
                let out = (self.op.dual)(Dual::new(u[(k, i)], du[(k, i)]));
                values[(k, i)] = out.value;
                deriv[(k, i)] = out.deriv;
            }
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
        let (n, dim) = (rule.len(), self.dimension());
        let (u, du, ddu) = (&inputs[0], &dinputs[0], &ddinputs[0]);
        for k in 0..n {
            for i in 0..dim {
                check_unary_domain(&self.op, u[(k, i)])?;
                let out = (self.op.dual2)(Dual2::new(u[(k, i)], du[(k, i)], ddu[(k, i)]));
                values[(k, i)] = out.value;
                deriv[(k, i)] = out.deriv;
                dderiv[(k, i)] = out.dderiv;
            }
        }
        Ok(())
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::UnaryOp
    }

    fn aux_data(&self) -> Vec<AuxValue> {
        vec![AuxValue::Str(self.op.name.to_string())]
    }
}

/// Elementwise application of a [`BinaryOp`] to two children of identical
/// shape.
#[derive(Debug)]
pub struct BinaryOpCf {
    c1: CoeffRef,
    c2: CoeffRef,
    op: BinaryOp,
}

impl BinaryOpCf {
    /// Fails with [`CoefficientError::UnsupportedOperand`] if the children do
    /// not share the same shape.
    pub fn new(c1: CoeffRef, c2: CoeffRef, op: BinaryOp) -> Result<Self> {
        if c1.shape() != c2.shape() {
            return Err(CoefficientError::UnsupportedOperand(format!(
                "shape mismatch in '{}': {} vs {}",
                op.name,
                c1.shape(),
                c2.shape()
            )));
        }
        Ok(Self { c1, c2, op })
    }
}

impl CoefficientFunction for BinaryOpCf {
    fn name(&self) -> &'static str {
        self.op.name
    }

    fn shape(&self) -> Shape {
        self.c1.shape()
    }

    fn dimension(&self) -> usize {
        self.c1.dimension()
    }

    fn is_complex(&self) -> bool {
        self.c1.is_complex() || self.c2.is_complex()
    }

    fn elementwise_constant(&self) -> bool {
        self.c1.elementwise_constant() && self.c2.elementwise_constant()
    }

    fn inputs(&self) -> Vec<CoeffRef> {
        vec![self.c1.clone(), self.c2.clone()]
    }

    fn evaluate_const(&self) -> Result<f64> {
        let (a, b) = (self.c1.evaluate_const()?, self.c2.evaluate_const()?);
        check_binary_domain(&self.op, a, b)?;
        Ok((self.op.real)(a, b))
    }

    fn evaluate_scalar(&self, point: &MappedPoint) -> Result<f64> {
        let (a, b) = (self.c1.evaluate_scalar(point)?, self.c2.evaluate_scalar(point)?);
        check_binary_domain(&self.op, a, b)?;
        Ok((self.op.real)(a, b))
    }

    fn evaluate_scalar_complex(&self, point: &MappedPoint) -> Result<Complex64> {
        match self.op.complex {
            Some(fc) => Ok(fc(
                self.c1.evaluate_scalar_complex(point)?,
                self.c2.evaluate_scalar_complex(point)?,
            )),
            None if !self.is_complex() => Ok(Complex64::from(self.evaluate_scalar(point)?)),
            None => Err(real_only_operand(self.op.name)),
        }
    }

    fn evaluate(&self, point: &MappedPoint, mut result: DVectorViewMut<f64>) -> Result<()> {
        let dim = self.dimension();
        let mut a = DVector::zeros(dim);
        let mut b = DVector::zeros(dim);
        self.c1.evaluate(point, DVectorViewMut::from(&mut a))?;
        self.c2.evaluate(point, DVectorViewMut::from(&mut b))?;
        for i in 0..dim {
            check_binary_domain(&self.op, a[i], b[i])?;
            result[i] = (self.op.real)(a[i], b[i]);
        }
        Ok(())
    }

    fn evaluate_complex(&self, point: &MappedPoint, mut result: DVectorViewMut<Complex64>) -> Result<()> {
        let dim = self.dimension();
        match self.op.complex {
            Some(fc) => {
                let mut a = DVector::from_element(dim, Complex64::from(0.0));
                let mut b = DVector::from_element(dim, Complex64::from(0.0));
                self.c1.evaluate_complex(point, DVectorViewMut::from(&mut a))?;
                self.c2.evaluate_complex(point, DVectorViewMut::from(&mut b))?;
                for i in 0..dim {
                    result[i] = fc(a[i], b[i]);
                }
                Ok(())
            }
            None if !self.is_complex() => {
                let mut tmp = DVector::zeros(dim);
                self.evaluate(point, DVectorViewMut::from(&mut tmp))?;
                for i in 0..dim {
                    result[i] = Complex64::from(tmp[i]);
                }
                Ok(())
            }
            None => Err(real_only_operand(self.op.name)),
        }
    }

    fn evaluate_rule(&self, rule: &MappedRule, mut values: DMatrixViewMut<f64>) -> Result<()> {
        let (n, dim) = (rule.len(), self.dimension());
        let mut a = DMatrix::zeros(n, dim);
        let mut b = DMatrix::zeros(n, dim);
        self.c1.evaluate_rule(rule, DMatrixViewMut::from(&mut a))?;
        self.c2.evaluate_rule(rule, DMatrixViewMut::from(&mut b))?;
        for k in 0..n {
            for i in 0..dim {
                check_binary_domain(&self.op, a[(k, i)], b[(k, i)])?;
                values[(k, i)] = (self.op.real)(a[(k, i)], b[(k, i)]);
            }
        }
        Ok(())
    }

    fn evaluate_rule_complex(&self, rule: &MappedRule, mut values: DMatrixViewMut<Complex64>) -> Result<()> {
        let (n, dim) = (rule.len(), self.dimension());
        match self.op.complex {
            Some(fc) => {
                let mut a = DMatrix::from_element(n, dim, Complex64::from(0.0));
                let mut b = DMatrix::from_element(n, dim, Complex64::from(0.0));
                self.c1.evaluate_rule_complex(rule, DMatrixViewMut::from(&mut a))?;
                self.c2.evaluate_rule_complex(rule, DMatrixViewMut::from(&mut b))?;
                for k in 0..n {
                    for i in 0..dim {
                        values[(k, i)] = fc(a[(k, i)], b[(k, i)]);
                    }
                }
                Ok(())
            }
            None if !self.is_complex() => {
                let mut tmp = DMatrix::zeros(n, dim);
                self.evaluate_rule(rule, DMatrixViewMut::from(&mut tmp))?;
                for k in 0..n {
                    for i in 0..dim {
                        values[(k, i)] = Complex64::from(tmp[(k, i)]);
                    }
                }
                Ok(())
            }
            None => Err(real_only_operand(self.op.name)),
        }
    }

    fn evaluate_deriv(
        &self,
        rule: &MappedRule,
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let (n, dim) = (rule.len(), self.dimension());
        let mut ra = DMatrix::zeros(n, dim);
        let mut rb = DMatrix::zeros(n, dim);
        let mut da = DMatrix::zeros(n, dim);
        let mut db = DMatrix::zeros(n, dim);
        self.c1
            .evaluate_deriv(rule, DMatrixViewMut::from(&mut ra), DMatrixViewMut::from(&mut da))?;
        self.c2
            .evaluate_deriv(rule, DMatrixViewMut::from(&mut rb), DMatrixViewMut::from(&mut db))?;
        for k in 0..n {
            for i in 0..dim {
                let (a, b) = (ra[(k, i)], rb[(k, i)]);
                check_binary_domain(&self.op, a, b)?;
                values[(k, i)] = (self.op.real)(a, b);
                let (d_da, d_db) = (self.op.deriv)(a, b);
                deriv[(k, i)] = d_da * da[(k, i)] + d_db * db[(k, i)];
            }
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
        let (n, dim) = (rule.len(), self.dimension());
        let mut ra = DMatrix::zeros(n, dim);
        let mut rb = DMatrix::zeros(n, dim);
        let mut da = DMatrix::zeros(n, dim);
        let mut db = DMatrix::zeros(n, dim);
        let mut dda = DMatrix::zeros(n, dim);
        let mut ddb = DMatrix::zeros(n, dim);
        self.c1.evaluate_dderiv(
            rule,
            DMatrixViewMut::from(&mut ra),
            DMatrixViewMut::from(&mut da),
            DMatrixViewMut::from(&mut dda),
        )?;
        self.c2.evaluate_dderiv(
            rule,
            DMatrixViewMut::from(&mut rb),
            DMatrixViewMut::from(&mut db),
            DMatrixViewMut::from(&mut ddb),
        )?;
        for k in 0..n {
            for i in 0..dim {
                let (a, b) = (ra[(k, i)], rb[(k, i)]);
                check_binary_domain(&self.op, a, b)?;
                values[(k, i)] = (self.op.real)(a, b);
                let (d_da, d_db) = (self.op.deriv)(a, b);
                deriv[(k, i)] = d_da * da[(k, i)] + d_db * db[(k, i)];
                let (d_dada, d_dadb, d_dbdb) = (self.op.dderiv)(a, b);
                dderiv[(k, i)] = d_da * dda[(k, i)]
                    + d_db * ddb[(k, i)]
                    + d_dada * da[(k, i)] * da[(k, i)]
                    + 2.0 * d_dadb * da[(k, i)] * db[(k, i)]
                    + d_dbdb * db[(k, i)] * db[(k, i)];
            }
        }
        Ok(())
    }

    fn evaluate_rule_cached(
        &self,
        rule: &MappedRule,
        inputs: &[DMatrixView<f64>],
        mut values: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let (n, dim) = (rule.len(), self.dimension());
        let (ra, rb) = (&inputs[0], &inputs[1]);
        for k in 0..n {
            for i in 0..dim {
                check_binary_domain(&self.op, ra[(k, i)], rb[(k, i)])?;
                values[(k, i)] = (self.op.real)(ra[(k, i)], rb[(k, i)]);
            }
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
        let (n, dim) = (rule.len(), self.dimension());
        let (ra, rb) = (&inputs[0], &inputs[1]);
        let (da, db) = (&dinputs[0], &dinputs[1]);
        for k in 0..n {
            for i in 0..dim {
                let (a, b) = (ra[(k, i)], rb[(k, i)]);
                check_binary_domain(&self.op, a, b)?;
                values[(k, i)] = (self.op.real)(a, b);
                let (d_da, d_db) = (self.op.deriv)(a, b);
                deriv[(k, i)] = d_da * da[(k, i)] + d_db * db[(k, i)];
            }
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
        let (n, dim) = (rule.len(), self.dimension());
        let (ra, rb) = (&inputs[0], &inputs[1]);
        let (da, db) = (&dinputs[0], &dinputs[1]);
        let (dda, ddb) = (&ddinputs[0], &ddinputs[1]);
        for k in 0..n {
            for i in 0..dim {
                let (a, b) = (ra[(k, i)], rb[(k, i)]);
                check_binary_domain(&self.op, a, b)?;
                values[(k, i)] = (self.op.real)(a, b);
                let (d_da, d_db) = (self.op.deriv)(a, b);
                deriv[(k, i)] = d_da * da[(k, i)] + d_db * db[(k, i)];
                let (d_dada, d_dadb, d_dbdb) = (self.op.dderiv)(a, b);
                dderiv[(k, i)] = d_da * dda[(k, i)]
                    + d_db * ddb[(k, i)]
                    + d_dada * da[(k, i)] * da[(k, i)]
                    + 2.0 * d_dadb * da[(k, i)] * db[(k, i)]
                    + d_dbdb * db[(k, i)] * db[(k, i)];
            }
        }
        Ok(())
    }

    fn nonzero_pattern(&self, nonzero: &mut [bool]) {
        let dim = self.dimension();
        let mut v1 = vec![false; dim];
        let mut v2 = vec![false; dim];
        self.c1.nonzero_pattern(&mut v1);
        self.c2.nonzero_pattern(&mut v2);
        for i in 0..dim {
            nonzero[i] = (self.op.nonzero)(v1[i], v2[i]);
        }
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::BinaryOp
    }

    fn aux_data(&self) -> Vec<AuxValue> {
        vec![AuxValue::Str(self.op.name.to_string())]
    }
}

/// A coefficient scaled by a real factor.
#[derive(Debug)]
pub struct ScaleCf {
    factor: f64,
    child: CoeffRef,
}

impl ScaleCf {
    pub fn new(factor: f64, child: CoeffRef) -> Self {
        Self { factor, child }
    }
}

impl CoefficientFunction for ScaleCf {
    fn name(&self) -> &'static str {
        "scale"
    }

    fn shape(&self) -> Shape {
        self.child.shape()
    }

    fn dimension(&self) -> usize {
        self.child.dimension()
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

    fn evaluate_const(&self) -> Result<f64> {
        Ok(self.factor * self.child.evaluate_const()?)
    }

    fn evaluate_scalar(&self, point: &MappedPoint) -> Result<f64> {
        Ok(self.factor * self.child.evaluate_scalar(point)?)
    }

    fn evaluate_scalar_complex(&self, point: &MappedPoint) -> Result<Complex64> {
        Ok(self.factor * self.child.evaluate_scalar_complex(point)?)
    }

    fn evaluate(&self, point: &MappedPoint, mut result: DVectorViewMut<f64>) -> Result<()> {
        let dim = self.dimension();
        let mut u = DVector::zeros(dim);
        self.child.evaluate(point, DVectorViewMut::from(&mut u))?;
        for i in 0..dim {
            result[i] = self.factor * u[i];
        }
        Ok(())
    }

    fn evaluate_complex(&self, point: &MappedPoint, mut result: DVectorViewMut<Complex64>) -> Result<()> {
        let dim = self.dimension();
        let mut u = DVector::from_element(dim, Complex64::from(0.0));
        self.child.evaluate_complex(point, DVectorViewMut::from(&mut u))?;
        for i in 0..dim {
            result[i] = self.factor * u[i];
        }
        Ok(())
    }

    fn evaluate_rule(&self, rule: &MappedRule, mut values: DMatrixViewMut<f64>) -> Result<()> {
        let (n, dim) = (rule.len(), self.dimension());
        let mut u = DMatrix::zeros(n, dim);
        self.child.evaluate_rule(rule, DMatrixViewMut::from(&mut u))?;
        for k in 0..n {
            for i in 0..dim {
                values[(k, i)] = self.factor * u[(k, i)];
            }
        }
        Ok(())
    }

    fn evaluate_rule_complex(&self, rule: &MappedRule, mut values: DMatrixViewMut<Complex64>) -> Result<()> {
        let (n, dim) = (rule.len(), self.dimension());
        let mut u = DMatrix::from_element(n, dim, Complex64::from(0.0));
        self.child.evaluate_rule_complex(rule, DMatrixViewMut::from(&mut u))?;
        for k in 0..n {
            for i in 0..dim {
                values[(k, i)] = self.factor * u[(k, i)];
            }
        }
        Ok(())
    }

    fn evaluate_deriv(
        &self,
        rule: &MappedRule,
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let (n, dim) = (rule.len(), self.dimension());
        let mut u = DMatrix::zeros(n, dim);
        let mut du = DMatrix::zeros(n, dim);
        self.child
            .evaluate_deriv(rule, DMatrixViewMut::from(&mut u), DMatrixViewMut::from(&mut du))?;
        for k in 0..n {
            for i in 0..dim {
                values[(k, i)] = self.factor * u[(k, i)];
                deriv[(k, i)] = self.factor * du[(k, i)];
            }
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
        let (n, dim) = (rule.len(), self.dimension());
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
            for i in 0..dim {
                values[(k, i)] = self.factor * u[(k, i)];
                deriv[(k, i)] = self.factor * du[(k, i)];
                dderiv[(k, i)] = self.factor * ddu[(k, i)];
            }
        }
        Ok(())
    }

    fn nonzero_pattern(&self, nonzero: &mut [bool]) {
        self.child.nonzero_pattern(nonzero);
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Scale
    }

    fn aux_data(&self) -> Vec<AuxValue> {
        vec![AuxValue::Real(self.factor)]
    }
}

/// A coefficient scaled by a complex factor. Always complex-valued; real
/// evaluation is an unsupported operand.
#[derive(Debug)]
pub struct ScaleComplexCf {
    factor: Complex64,
    child: CoeffRef,
}

impl ScaleComplexCf {
    pub fn new(factor: Complex64, child: CoeffRef) -> Self {
        Self { factor, child }
    }
}

impl CoefficientFunction for ScaleComplexCf {
    fn name(&self) -> &'static str {
        "scale-complex"
    }

    fn shape(&self) -> Shape {
        self.child.shape()
    }

    fn dimension(&self) -> usize {
        self.child.dimension()
    }

    fn is_complex(&self) -> bool {
        true
    }

    fn elementwise_constant(&self) -> bool {
        self.child.elementwise_constant()
    }

    fn inputs(&self) -> Vec<CoeffRef> {
        vec![self.child.clone()]
    }

    fn evaluate_scalar(&self, _point: &MappedPoint) -> Result<f64> {
        Err(CoefficientError::UnsupportedOperand(
            "no real evaluation for complex-scaled coefficient".to_string(),
        ))
    }

    fn evaluate_scalar_complex(&self, point: &MappedPoint) -> Result<Complex64> {
        Ok(self.factor * self.child.evaluate_scalar_complex(point)?)
    }

    fn evaluate_complex(&self, point: &MappedPoint, mut result: DVectorViewMut<Complex64>) -> Result<()> {
        let dim = self.dimension();
        let mut u = DVector::from_element(dim, Complex64::from(0.0));
        self.child.evaluate_complex(point, DVectorViewMut::from(&mut u))?;
        for i in 0..dim {
            result[i] = self.factor * u[i];
        }
        Ok(())
    }

    fn evaluate_rule_complex(&self, rule: &MappedRule, mut values: DMatrixViewMut<Complex64>) -> Result<()> {
        let (n, dim) = (rule.len(), self.dimension());
        let mut u = DMatrix::from_element(n, dim, Complex64::from(0.0));
        self.child.evaluate_rule_complex(rule, DMatrixViewMut::from(&mut u))?;
        for k in 0..n {
            for i in 0..dim {
                values[(k, i)] = self.factor * u[(k, i)];
            }
        }
        Ok(())
    }

    fn nonzero_pattern(&self, nonzero: &mut [bool]) {
        self.child.nonzero_pattern(nonzero);
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::ScaleComplex
    }

    fn aux_data(&self) -> Vec<AuxValue> {
        vec![AuxValue::Real(self.factor.re), AuxValue::Real(self.factor.im)]
    }
}

/// The (bilinear) inner product of two equally-sized children, summing the
/// componentwise products into a scalar.
#[derive(Debug)]
pub struct InnerProductCf {
    c1: CoeffRef,
    c2: CoeffRef,
}

impl InnerProductCf {
    pub fn new(c1: CoeffRef, c2: CoeffRef) -> Result<Self> {
        if c1.dimension() != c2.dimension() {
            return Err(CoefficientError::UnsupportedOperand(format!(
                "inner product of coefficients with {} and {} components",
                c1.dimension(),
                c2.dimension()
            )));
        }
        Ok(Self { c1, c2 })
    }
}

impl CoefficientFunction for InnerProductCf {
    fn name(&self) -> &'static str {
        "inner-product"
    }

    fn is_complex(&self) -> bool {
        self.c1.is_complex() || self.c2.is_complex()
    }

    fn elementwise_constant(&self) -> bool {
        self.c1.elementwise_constant() && self.c2.elementwise_constant()
    }

    fn inputs(&self) -> Vec<CoeffRef> {
        vec![self.c1.clone(), self.c2.clone()]
    }

    fn evaluate_scalar(&self, point: &MappedPoint) -> Result<f64> {
        let dim = self.c1.dimension();
        let mut a = DVector::zeros(dim);
        let mut b = DVector::zeros(dim);
        self.c1.evaluate(point, DVectorViewMut::from(&mut a))?;
        self.c2.evaluate(point, DVectorViewMut::from(&mut b))?;
        Ok(a.dot(&b))
    }

    fn evaluate_scalar_complex(&self, point: &MappedPoint) -> Result<Complex64> {
        let dim = self.c1.dimension();
        let mut a = DVector::from_element(dim, Complex64::from(0.0));
        let mut b = DVector::from_element(dim, Complex64::from(0.0));
        self.c1.evaluate_complex(point, DVectorViewMut::from(&mut a))?;
        self.c2.evaluate_complex(point, DVectorViewMut::from(&mut b))?;
        let mut sum = Complex64::from(0.0);
        for i in 0..dim {
            sum += a[i] * b[i];
        }
        Ok(sum)
    }

    fn evaluate_deriv(
        &self,
        rule: &MappedRule,
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let (n, dim) = (rule.len(), self.c1.dimension());
        let mut ra = DMatrix::zeros(n, dim);
        let mut rb = DMatrix::zeros(n, dim);
        let mut da = DMatrix::zeros(n, dim);
        let mut db = DMatrix::zeros(n, dim);
        self.c1
            .evaluate_deriv(rule, DMatrixViewMut::from(&mut ra), DMatrixViewMut::from(&mut da))?;
        self.c2
            .evaluate_deriv(rule, DMatrixViewMut::from(&mut rb), DMatrixViewMut::from(&mut db))?;
        for k in 0..n {
            let mut value = 0.0;
            let mut dvalue = 0.0;
            for i in 0..dim {
                value += ra[(k, i)] * rb[(k, i)];
                dvalue += da[(k, i)] * rb[(k, i)] + ra[(k, i)] * db[(k, i)];
            }
            values[(k, 0)] = value;
            deriv[(k, 0)] = dvalue;
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
        let (n, dim) = (rule.len(), self.c1.dimension());
        let mut ra = DMatrix::zeros(n, dim);
        let mut rb = DMatrix::zeros(n, dim);
        let mut da = DMatrix::zeros(n, dim);
        let mut db = DMatrix::zeros(n, dim);
        let mut dda = DMatrix::zeros(n, dim);
        let mut ddb = DMatrix::zeros(n, dim);
        self.c1.evaluate_dderiv(
            rule,
            DMatrixViewMut::from(&mut ra),
            DMatrixViewMut::from(&mut da),
            DMatrixViewMut::from(&mut dda),
        )?;
        self.c2.evaluate_dderiv(
            rule,
            DMatrixViewMut::from(&mut rb),
            DMatrixViewMut::from(&mut db),
            DMatrixViewMut::from(&mut ddb),
        )?;
        for k in 0..n {
            let mut value = 0.0;
            let mut dvalue = 0.0;
            let mut ddvalue = 0.0;
            for i in 0..dim {
                value += ra[(k, i)] * rb[(k, i)];
                dvalue += da[(k, i)] * rb[(k, i)] + ra[(k, i)] * db[(k, i)];
                ddvalue += dda[(k, i)] * rb[(k, i)]
                    + 2.0 * da[(k, i)] * db[(k, i)]
                    + ra[(k, i)] * ddb[(k, i)];
            }
            values[(k, 0)] = value;
            deriv[(k, 0)] = dvalue;
            dderiv[(k, 0)] = ddvalue;
        }
        Ok(())
    }

    fn nonzero_pattern(&self, nonzero: &mut [bool]) {
        let dim = self.c1.dimension();
        let mut v1 = vec![false; dim];
        let mut v2 = vec![false; dim];
        self.c1.nonzero_pattern(&mut v1);
        self.c2.nonzero_pattern(&mut v2);
        nonzero[0] = (0..dim).any(|i| v1[i] && v2[i]);
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::InnerProduct
    }
}

/// Pointwise branch on the sign of a scalar test coefficient: where the test
/// is positive the `then` branch is evaluated, elsewhere the `else` branch.
/// Derivatives branch along with the value.
#[derive(Debug)]
pub struct IfPosCf {
    test: CoeffRef,
    then_cf: CoeffRef,
    else_cf: CoeffRef,
}

impl IfPosCf {
    pub fn new(test: CoeffRef, then_cf: CoeffRef, else_cf: CoeffRef) -> Result<Self> {
        if test.dimension() != 1 {
            return Err(CoefficientError::UnsupportedOperand(
                "if-pos test coefficient must be scalar".to_string(),
            ));
        }
        if then_cf.shape() != else_cf.shape() {
            return Err(CoefficientError::UnsupportedOperand(format!(
                "if-pos branches differ in shape: {} vs {}",
                then_cf.shape(),
                else_cf.shape()
            )));
        }
        Ok(Self { test, then_cf, else_cf })
    }

    fn branch(&self, point: &MappedPoint) -> Result<&CoeffRef> {
        if self.test.evaluate_scalar(point)? > 0.0 {
            Ok(&self.then_cf)
        } else {
            Ok(&self.else_cf)
        }
    }
}

impl CoefficientFunction for IfPosCf {
    fn name(&self) -> &'static str {
        "if-pos"
    }

    fn shape(&self) -> Shape {
        self.then_cf.shape()
    }

    fn dimension(&self) -> usize {
        self.then_cf.dimension()
    }

    fn is_complex(&self) -> bool {
        self.then_cf.is_complex() || self.else_cf.is_complex()
    }

    fn inputs(&self) -> Vec<CoeffRef> {
        vec![self.test.clone(), self.then_cf.clone(), self.else_cf.clone()]
    }

    fn evaluate_scalar(&self, point: &MappedPoint) -> Result<f64> {
        self.branch(point)?.evaluate_scalar(point)
    }

    fn evaluate_scalar_complex(&self, point: &MappedPoint) -> Result<Complex64> {
        self.branch(point)?.evaluate_scalar_complex(point)
    }

    fn evaluate(&self, point: &MappedPoint, result: DVectorViewMut<f64>) -> Result<()> {
        self.branch(point)?.evaluate(point, result)
    }

    fn evaluate_complex(&self, point: &MappedPoint, result: DVectorViewMut<Complex64>) -> Result<()> {
        self.branch(point)?.evaluate_complex(point, result)
    }

    fn evaluate_deriv(
        &self,
        rule: &MappedRule,
        mut values: DMatrixViewMut<f64>,
        mut deriv: DMatrixViewMut<f64>,
    ) -> Result<()> {
        let (n, dim) = (rule.len(), self.dimension());
        let mut test = DMatrix::zeros(n, 1);
        self.test.evaluate_rule(rule, DMatrixViewMut::from(&mut test))?;
        let mut rt = DMatrix::zeros(n, dim);
        let mut re = DMatrix::zeros(n, dim);
        let mut dt = DMatrix::zeros(n, dim);
        let mut de = DMatrix::zeros(n, dim);
        self.then_cf
            .evaluate_deriv(rule, DMatrixViewMut::from(&mut rt), DMatrixViewMut::from(&mut dt))?;
        self.else_cf
            .evaluate_deriv(rule, DMatrixViewMut::from(&mut re), DMatrixViewMut::from(&mut de))?;
        for k in 0..n {
            let take_then = test[(k, 0)] > 0.0;
            for i in 0..dim {
                values[(k, i)] = if take_then { rt[(k, i)] } else { re[(k, i)] };
                deriv[(k, i)] = if take_then { dt[(k, i)] } else { de[(k, i)] };
            }
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
        let (n, dim) = (rule.len(), self.dimension());
        let mut test = DMatrix::zeros(n, 1);
        self.test.evaluate_rule(rule, DMatrixViewMut::from(&mut test))?;
        let mut rt = DMatrix::zeros(n, dim);
        let mut re = DMatrix::zeros(n, dim);
        let mut dt = DMatrix::zeros(n, dim);
        let mut de = DMatrix::zeros(n, dim);
        let mut ddt = DMatrix::zeros(n, dim);
        let mut dde = DMatrix::zeros(n, dim);
        self.then_cf.evaluate_dderiv(
            rule,
            DMatrixViewMut::from(&mut rt),
            DMatrixViewMut::from(&mut dt),
            DMatrixViewMut::from(&mut ddt),
        )?;
        self.else_cf.evaluate_dderiv(
            rule,
            DMatrixViewMut::from(&mut re),
            DMatrixViewMut::from(&mut de),
            DMatrixViewMut::from(&mut dde),
        )?;
        for k in 0..n {
            let take_then = test[(k, 0)] > 0.0;
            for i in 0..dim {
                values[(k, i)] = if take_then { rt[(k, i)] } else { re[(k, i)] };
                deriv[(k, i)] = if take_then { dt[(k, i)] } else { de[(k, i)] };
                dderiv[(k, i)] = if take_then { ddt[(k, i)] } else { dde[(k, i)] };
            }
        }
        Ok(())
    }

    fn nonzero_pattern(&self, nonzero: &mut [bool]) {
        let dim = self.dimension();
        let mut v1 = vec![false; dim];
        let mut v2 = vec![false; dim];
        self.then_cf.nonzero_pattern(&mut v1);
        self.else_cf.nonzero_pattern(&mut v2);
        for i in 0..dim {
            nonzero[i] = v1[i] || v2[i];
        }
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::IfPos
    }
}

/// Wraps a child in an elementwise unary operation.
pub fn unary(child: CoeffRef, op: UnaryOp) -> CoeffRef {
    Arc::new(UnaryOpCf::new(child, op))
}

/// Combines two same-shape children with an elementwise binary operation.
pub fn binary(c1: CoeffRef, c2: CoeffRef, op: BinaryOp) -> Result<CoeffRef> {
    Ok(Arc::new(BinaryOpCf::new(c1, c2, op)?))
}

macro_rules! unary_constructor {
    ($(#[$meta:meta])* $fn_name:ident, $op:ident) => {
        $(#[$meta])*
        pub fn $fn_name(child: CoeffRef) -> CoeffRef {
            unary(child, $op)
        }
    };
}

unary_constructor!(sin, SIN);
unary_constructor!(cos, COS);
unary_constructor!(tan, TAN);
unary_constructor!(exp, EXP);
unary_constructor!(
    /// Natural logarithm; non-positive real arguments fail with a domain error.
    log,
    LOG
);
unary_constructor!(atan, ATAN);
unary_constructor!(asin, ASIN);
unary_constructor!(acos, ACOS);
unary_constructor!(sqrt, SQRT);
unary_constructor!(
    /// Real-only; complex children are rejected on evaluation.
    floor,
    FLOOR
);
unary_constructor!(
    /// Real-only; complex children are rejected on evaluation.
    ceil,
    CEIL
);
unary_constructor!(conj, CONJ);

pub fn add(c1: CoeffRef, c2: CoeffRef) -> Result<CoeffRef> {
    binary(c1, c2, ADD)
}

pub fn sub(c1: CoeffRef, c2: CoeffRef) -> Result<CoeffRef> {
    binary(c1, c2, SUB)
}

pub fn mul(c1: CoeffRef, c2: CoeffRef) -> Result<CoeffRef> {
    binary(c1, c2, MUL)
}

pub fn div(c1: CoeffRef, c2: CoeffRef) -> Result<CoeffRef> {
    binary(c1, c2, DIV)
}

/// Four-quadrant inverse tangent `atan2(y, x)`.
pub fn atan2(y: CoeffRef, x: CoeffRef) -> Result<CoeffRef> {
    binary(y, x, ATAN2)
}

pub fn pow(base: CoeffRef, exponent: CoeffRef) -> Result<CoeffRef> {
    binary(base, exponent, POW)
}

/// Scales a coefficient by a real factor.
pub fn scale(factor: f64, child: CoeffRef) -> CoeffRef {
    Arc::new(ScaleCf::new(factor, child))
}

/// Scales a coefficient by a complex factor; the result is complex-valued.
pub fn scale_complex(factor: Complex64, child: CoeffRef) -> CoeffRef {
    Arc::new(ScaleComplexCf::new(factor, child))
}

/// The inner product of two equally-sized coefficients.
pub fn inner_product(c1: CoeffRef, c2: CoeffRef) -> Result<CoeffRef> {
    Ok(Arc::new(InnerProductCf::new(c1, c2)?))
}

/// Pointwise selection between two branches on the sign of a scalar test.
pub fn if_pos(test: CoeffRef, then_cf: CoeffRef, else_cf: CoeffRef) -> Result<CoeffRef> {
    Ok(Arc::new(IfPosCf::new(test, then_cf, else_cf)?))
}
