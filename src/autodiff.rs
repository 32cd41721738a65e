//! First- and second-order dual numbers for forward-mode differentiation.
//!
//! The combinator algebra never hand-derives chain rules for unary math
//! functions. Instead every function is written once as a generic expression
//! (`|x| x.sin()` and friends) and instantiated for `f64`, `Complex64`,
//! [`Dual`] and [`Dual2`]; evaluating the expression on a dual number yields
//! the value together with its derivative(s) mechanically.
//!
//! The elementary functions carry the same names as their `f64` counterparts
//! so the same expression is valid for every representation.

use std::ops::{Add, Div, Mul, Neg, Sub};

/// A first-order dual number `(value, deriv)`.
///
/// Arithmetic and elementary functions propagate the derivative through the
/// chain rule: evaluating `f` on `(u, u')` yields `(f(u), f'(u) u')`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dual {
    pub value: f64,
    pub deriv: f64,
}

/// A second-order dual number `(value, deriv, dderiv)`.
///
/// Evaluating `f` on `(u, u', u'')` yields
/// `(f(u), f'(u) u', f'(u) u'' + f''(u) u'^2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dual2 {
    pub value: f64,
    pub deriv: f64,
    pub dderiv: f64,
}

impl Dual {
    pub fn new(value: f64, deriv: f64) -> Self {
        Self { value, deriv }
    }

    /// A value with zero derivative.
    pub fn constant(value: f64) -> Self {
        Self::new(value, 0.0)
    }

    /// The seed `(x, 1)` for differentiation with respect to `x` itself.
    pub fn variable(value: f64) -> Self {
        Self::new(value, 1.0)
    }

    /// Applies a scalar function with known value and derivative at
    /// `self.value`.
    #[inline]
    fn chain(self, f: f64, df: f64) -> Self {
        Self::new(f, df * self.deriv)
    }

    pub fn sin(self) -> Self {
        self.chain(self.value.sin(), self.value.cos())
    }

    pub fn cos(self) -> Self {
        self.chain(self.value.cos(), -self.value.sin())
    }

    pub fn tan(self) -> Self {
        let c = self.value.cos();
        self.chain(self.value.tan(), 1.0 / (c * c))
    }

    pub fn exp(self) -> Self {
        let e = self.value.exp();
        self.chain(e, e)
    }

    pub fn ln(self) -> Self {
        self.chain(self.value.ln(), 1.0 / self.value)
    }

    pub fn sqrt(self) -> Self {
        let s = self.value.sqrt();
        self.chain(s, 0.5 / s)
    }

    pub fn atan(self) -> Self {
        self.chain(self.value.atan(), 1.0 / (1.0 + self.value * self.value))
    }

    pub fn asin(self) -> Self {
        self.chain(self.value.asin(), 1.0 / (1.0 - self.value * self.value).sqrt())
    }

    pub fn acos(self) -> Self {
        self.chain(self.value.acos(), -1.0 / (1.0 - self.value * self.value).sqrt())
    }

    // floor and ceil are differentiable with zero slope away from the jumps;
    // the jumps themselves are ignored, as in the scalar convention.
    pub fn floor(self) -> Self {
        Self::constant(self.value.floor())
    }

    pub fn ceil(self) -> Self {
        Self::constant(self.value.ceil())
    }

    fn recip(self) -> Self {
        let v = self.value;
        self.chain(1.0 / v, -1.0 / (v * v))
    }

    /// Generic power through the `exp(ln a * b)` fallback, valid for positive
    /// bases.
    pub fn powf(self, exponent: Self) -> Self {
        (self.ln() * exponent).exp()
    }
}

impl Dual2 {
    pub fn new(value: f64, deriv: f64, dderiv: f64) -> Self {
        Self { value, deriv, dderiv }
    }

    pub fn constant(value: f64) -> Self {
        Self::new(value, 0.0, 0.0)
    }

    pub fn variable(value: f64) -> Self {
        Self::new(value, 1.0, 0.0)
    }

    /// Applies a scalar function with known first and second derivative at
    /// `self.value`.
    #[inline]
    fn chain(self, f: f64, df: f64, ddf: f64) -> Self {
        Self::new(f, df * self.deriv, df * self.dderiv + ddf * self.deriv * self.deriv)
    }

    pub fn sin(self) -> Self {
        let (s, c) = (self.value.sin(), self.value.cos());
        self.chain(s, c, -s)
    }

    pub fn cos(self) -> Self {
        let (s, c) = (self.value.sin(), self.value.cos());
        self.chain(c, -s, -c)
    }

    pub fn tan(self) -> Self {
        let t = self.value.tan();
        let sec2 = 1.0 + t * t;
        self.chain(t, sec2, 2.0 * t * sec2)
    }

    pub fn exp(self) -> Self {
        let e = self.value.exp();
        self.chain(e, e, e)
    }

    pub fn ln(self) -> Self {
        let v = self.value;
        self.chain(v.ln(), 1.0 / v, -1.0 / (v * v))
    }

    pub fn sqrt(self) -> Self {
        let s = self.value.sqrt();
        self.chain(s, 0.5 / s, -0.25 / (s * s * s))
    }

    pub fn atan(self) -> Self {
        let v = self.value;
        let denom = 1.0 + v * v;
        self.chain(v.atan(), 1.0 / denom, -2.0 * v / (denom * denom))
    }

    pub fn asin(self) -> Self {
        let v = self.value;
        let w = 1.0 - v * v;
        self.chain(v.asin(), 1.0 / w.sqrt(), v / (w * w.sqrt()))
    }

    pub fn acos(self) -> Self {
        let v = self.value;
        let w = 1.0 - v * v;
        self.chain(v.acos(), -1.0 / w.sqrt(), -v / (w * w.sqrt()))
    }

    pub fn floor(self) -> Self {
        Self::constant(self.value.floor())
    }

    pub fn ceil(self) -> Self {
        Self::constant(self.value.ceil())
    }

    fn recip(self) -> Self {
        let v = self.value;
        self.chain(1.0 / v, -1.0 / (v * v), 2.0 / (v * v * v))
    }

    pub fn powf(self, exponent: Self) -> Self {
        (self.ln() * exponent).exp()
    }
}

impl Add for Dual {
    type Output = Dual;
    fn add(self, rhs: Dual) -> Dual {
        Dual::new(self.value + rhs.value, self.deriv + rhs.deriv)
    }
}

impl Sub for Dual {
    type Output = Dual;
    fn sub(self, rhs: Dual) -> Dual {
        Dual::new(self.value - rhs.value, self.deriv - rhs.deriv)
    }
}

impl Mul for Dual {
    type Output = Dual;
    fn mul(self, rhs: Dual) -> Dual {
        Dual::new(self.value * rhs.value, self.value * rhs.deriv + self.deriv * rhs.value)
    }
}

impl Div for Dual {
    type Output = Dual;
    fn div(self, rhs: Dual) -> Dual {
        self * rhs.recip()
    }
}

impl Neg for Dual {
    type Output = Dual;
    fn neg(self) -> Dual {
        Dual::new(-self.value, -self.deriv)
    }
}

impl Add for Dual2 {
    type Output = Dual2;
    fn add(self, rhs: Dual2) -> Dual2 {
        Dual2::new(self.value + rhs.value, self.deriv + rhs.deriv, self.dderiv + rhs.dderiv)
    }
}

impl Sub for Dual2 {
    type Output = Dual2;
    fn sub(self, rhs: Dual2) -> Dual2 {
        Dual2::new(self.value - rhs.value, self.deriv - rhs.deriv, self.dderiv - rhs.dderiv)
    }
}

impl Mul for Dual2 {
    type Output = Dual2;
    fn mul(self, rhs: Dual2) -> Dual2 {
        Dual2::new(
            self.value * rhs.value,
            self.value * rhs.deriv + self.deriv * rhs.value,
            self.value * rhs.dderiv + 2.0 * self.deriv * rhs.deriv + self.dderiv * rhs.value,
        )
    }
}

impl Div for Dual2 {
    type Output = Dual2;
    fn div(self, rhs: Dual2) -> Dual2 {
        self * rhs.recip()
    }
}

impl Neg for Dual2 {
    type Output = Dual2;
    fn neg(self) -> Dual2 {
        Dual2::new(-self.value, -self.deriv, -self.dderiv)
    }
}
