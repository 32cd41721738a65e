use kurant::autodiff::{Dual, Dual2};
use matrixcompare::assert_scalar_eq;
use proptest::prelude::*;

fn central_diff(f: impl Fn(f64) -> f64, x: f64) -> f64 {
    let h = 1e-6;
    (f(x + h) - f(x - h)) / (2.0 * h)
}

fn central_diff2(f: impl Fn(f64) -> f64, x: f64) -> f64 {
    let h = 1e-4;
    (f(x + h) - 2.0 * f(x) + f(x - h)) / (h * h)
}

/// Checks the first derivative of a function at the given sample points
/// against a central finite difference.
fn check_deriv(f_dual: impl Fn(Dual) -> Dual, f: impl Fn(f64) -> f64 + Copy, samples: &[f64]) {
    for &x in samples {
        let out = f_dual(Dual::variable(x));
        assert_scalar_eq!(out.value, f(x), comp = abs, tol = 1e-12);
        assert_scalar_eq!(out.deriv, central_diff(f, x), comp = abs, tol = 1e-6);
    }
}

/// Checks value, first and second derivative against finite differences.
fn check_dderiv(f_dual2: impl Fn(Dual2) -> Dual2, f: impl Fn(f64) -> f64 + Copy, samples: &[f64]) {
    for &x in samples {
        let out = f_dual2(Dual2::variable(x));
        assert_scalar_eq!(out.value, f(x), comp = abs, tol = 1e-12);
        assert_scalar_eq!(out.deriv, central_diff(f, x), comp = abs, tol = 1e-6);
        assert_scalar_eq!(out.dderiv, central_diff2(f, x), comp = abs, tol = 1e-4);
    }
}

#[test]
fn elementary_function_derivatives_match_finite_differences() {
    let generic = [-1.7, -0.3, 0.2, 0.9, 2.4];
    let positive = [0.2, 0.7, 1.3, 3.8];
    let unit = [-0.8, -0.3, 0.2, 0.7];

    check_deriv(|x| x.sin(), |x| x.sin(), &generic);
    check_deriv(|x| x.cos(), |x| x.cos(), &generic);
    check_deriv(|x| x.tan(), |x| x.tan(), &unit);
    check_deriv(|x| x.exp(), |x| x.exp(), &generic);
    check_deriv(|x| x.atan(), |x| x.atan(), &generic);
    check_deriv(|x| x.ln(), |x| x.ln(), &positive);
    check_deriv(|x| x.sqrt(), |x| x.sqrt(), &positive);
    check_deriv(|x| x.asin(), |x| x.asin(), &unit);
    check_deriv(|x| x.acos(), |x| x.acos(), &unit);
}

#[test]
fn elementary_function_second_derivatives_match_finite_differences() {
    let generic = [-1.7, -0.3, 0.2, 0.9, 2.4];
    let positive = [0.2, 0.7, 1.3, 3.8];
    let unit = [-0.8, -0.3, 0.2, 0.7];

    check_dderiv(|x| x.sin(), |x| x.sin(), &generic);
    check_dderiv(|x| x.cos(), |x| x.cos(), &generic);
    check_dderiv(|x| x.tan(), |x| x.tan(), &unit);
    check_dderiv(|x| x.exp(), |x| x.exp(), &generic);
    check_dderiv(|x| x.atan(), |x| x.atan(), &generic);
    check_dderiv(|x| x.ln(), |x| x.ln(), &positive);
    check_dderiv(|x| x.sqrt(), |x| x.sqrt(), &positive);
    check_dderiv(|x| x.asin(), |x| x.asin(), &unit);
    check_dderiv(|x| x.acos(), |x| x.acos(), &unit);
}

#[test]
fn floor_and_ceil_have_zero_derivatives() {
    let out = Dual::variable(1.7).floor();
    assert_eq!(out.value, 1.0);
    assert_eq!(out.deriv, 0.0);

    let out = Dual2::variable(-0.3).ceil();
    assert_eq!(out.value, 0.0);
    assert_eq!(out.deriv, 0.0);
    assert_eq!(out.dderiv, 0.0);
}

#[test]
fn arithmetic_follows_product_and_quotient_rules() {
    // f(x) = x^2 sin(x)
    check_dderiv(|x| x * x * x.sin(), |x| x * x * x.sin(), &[-1.2, 0.4, 1.9]);
    // f(x) = sin(x) / (2 + cos(x))
    check_dderiv(
        |x| x.sin() / (Dual2::constant(2.0) + x.cos()),
        |x| x.sin() / (2.0 + x.cos()),
        &[-1.2, 0.4, 1.9],
    );
    // f(x) = exp(x) - x
    check_deriv(|x| x.exp() - x, |x| x.exp() - x, &[-0.5, 0.0, 1.5]);
}

#[test]
fn powf_matches_analytic_derivatives() {
    // f(x) = x^2.5, f' = 2.5 x^1.5, f'' = 3.75 x^0.5
    let x = 1.44;
    let out = Dual2::variable(x).powf(Dual2::constant(2.5));
    assert_scalar_eq!(out.value, x.powf(2.5), comp = abs, tol = 1e-12);
    assert_scalar_eq!(out.deriv, 2.5 * x.powf(1.5), comp = abs, tol = 1e-12);
    assert_scalar_eq!(out.dderiv, 3.75 * x.powf(0.5), comp = abs, tol = 1e-12);

    // Exponent depending on the variable: f(x) = x^x,
    // f' = x^x (ln x + 1)
    let out = Dual::variable(x).powf(Dual::variable(x));
    assert_scalar_eq!(out.value, x.powf(x), comp = abs, tol = 1e-12);
    assert_scalar_eq!(out.deriv, x.powf(x) * (x.ln() + 1.0), comp = abs, tol = 1e-12);
}

proptest! {
    #[test]
    fn sin_derivative_is_cos(x in -10.0..10.0f64) {
        let out = Dual::variable(x).sin();
        prop_assert!((out.deriv - x.cos()).abs() <= 1e-14);
    }

    #[test]
    fn exp_second_derivative_is_exp(x in -5.0..5.0f64) {
        let out = Dual2::variable(x).exp();
        prop_assert!((out.dderiv - x.exp()).abs() <= 1e-12 * x.exp().max(1.0));
    }
}
