use crate::unit_tests::{point_at, rule_along_x};
use kurant::algebra::{
    add, atan2, conj, cos, div, exp, floor, if_pos, inner_product, log, mul, pow, scale,
    scale_complex, sin, BinaryOp, ADD, ATAN2, DIV, MUL, POW, SUB,
};
use kurant::error::CoefficientError;
use kurant::primitives::{constant, constant_complex, function, parameter};
use kurant::structural::vectorial;
use kurant::{CoeffRef, CoefficientFunction, Complex64, MappedRule};
use matrixcompare::assert_scalar_eq;
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut};

fn eval_rule(cf: &CoeffRef, rule: &MappedRule) -> DMatrix<f64> {
    let mut values = DMatrix::zeros(rule.len(), cf.dimension());
    cf.evaluate_rule(rule, DMatrixViewMut::from(&mut values)).unwrap();
    values
}

fn eval_dderiv(cf: &CoeffRef, rule: &MappedRule) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
    let n = rule.len();
    let dim = cf.dimension();
    let mut values = DMatrix::zeros(n, dim);
    let mut deriv = DMatrix::zeros(n, dim);
    let mut dderiv = DMatrix::zeros(n, dim);
    cf.evaluate_dderiv(
        rule,
        DMatrixViewMut::from(&mut values),
        DMatrixViewMut::from(&mut deriv),
        DMatrixViewMut::from(&mut dderiv),
    )
    .unwrap();
    (values, deriv, dderiv)
}

/// Checks an operator's partial-derivative rules against centered finite
/// differences of its value function.
fn check_binary_rules(op: &BinaryOp, samples: &[(f64, f64)]) {
    let f = op.real;
    for &(a, b) in samples {
        let h = 1e-6;
        let (d_da, d_db) = (op.deriv)(a, b);
        assert_scalar_eq!(d_da, (f(a + h, b) - f(a - h, b)) / (2.0 * h), comp = abs, tol = 1e-5);
        assert_scalar_eq!(d_db, (f(a, b + h) - f(a, b - h)) / (2.0 * h), comp = abs, tol = 1e-5);

        let h = 1e-4;
        let (d_dada, d_dadb, d_dbdb) = (op.dderiv)(a, b);
        assert_scalar_eq!(
            d_dada,
            (f(a + h, b) - 2.0 * f(a, b) + f(a - h, b)) / (h * h),
            comp = abs,
            tol = 1e-3
        );
        assert_scalar_eq!(
            d_dbdb,
            (f(a, b + h) - 2.0 * f(a, b) + f(a, b - h)) / (h * h),
            comp = abs,
            tol = 1e-3
        );
        assert_scalar_eq!(
            d_dadb,
            (f(a + h, b + h) - f(a + h, b - h) - f(a - h, b + h) + f(a - h, b - h)) / (4.0 * h * h),
            comp = abs,
            tol = 1e-3
        );
    }
}

#[test]
fn binary_rules_match_finite_differences() {
    // Positive argument pairs so every operator (pow in particular) is inside
    // its domain.
    let samples = [(0.7, 1.3), (1.9, 0.4), (2.2, 2.9)];
    for op in [&ADD, &SUB, &MUL, &DIV, &ATAN2, &POW] {
        check_binary_rules(op, &samples);
    }
}

#[test]
fn constant_expression_evaluates_with_zero_derivatives() {
    let k = constant(3.0);
    let expr = mul(add(k.clone(), k.clone()).unwrap(), k).unwrap();

    assert_eq!(expr.evaluate_const().unwrap(), 18.0);
    assert_eq!(expr.evaluate_scalar(&point_at(0.4)).unwrap(), 18.0);

    let rule = rule_along_x(&[0.0, 0.5, 1.0]);
    let (values, deriv, dderiv) = eval_dderiv(&expr, &rule);
    for k in 0..rule.len() {
        assert_eq!(values[(k, 0)], 18.0);
        assert_eq!(deriv[(k, 0)], 0.0);
        assert_eq!(dderiv[(k, 0)], 0.0);
    }
}

#[test]
fn parameter_seeds_the_derivative() {
    let p = parameter(0.0);
    let p_cf: CoeffRef = p.clone();
    let expr = sin(p_cf);
    let rule = rule_along_x(&[0.3]);

    let (values, deriv, dderiv) = eval_dderiv(&expr, &rule);
    assert_scalar_eq!(values[(0, 0)], 0.0, comp = abs, tol = 1e-15);
    assert_scalar_eq!(deriv[(0, 0)], 1.0, comp = abs, tol = 1e-15);
    assert_scalar_eq!(dderiv[(0, 0)], 0.0, comp = abs, tol = 1e-15);

    p.set(std::f64::consts::FRAC_PI_2);
    let (values, deriv, dderiv) = eval_dderiv(&expr, &rule);
    assert_scalar_eq!(values[(0, 0)], 1.0, comp = abs, tol = 1e-15);
    assert_scalar_eq!(deriv[(0, 0)], 0.0, comp = abs, tol = 1e-15);
    assert_scalar_eq!(dderiv[(0, 0)], -1.0, comp = abs, tol = 1e-15);
}

#[test]
fn binary_derivative_rules_match_analytic_derivatives() {
    let rule = rule_along_x(&[0.0]);
    let t = 0.7;
    let p = parameter(t);
    let p_cf: CoeffRef = p.clone();

    // t^3 with derivatives 3 t^2 and 6 t
    let cubed = pow(p_cf.clone(), constant(3.0)).unwrap();
    let (values, deriv, dderiv) = eval_dderiv(&cubed, &rule);
    assert_scalar_eq!(values[(0, 0)], t.powi(3), comp = abs, tol = 1e-14);
    assert_scalar_eq!(deriv[(0, 0)], 3.0 * t * t, comp = abs, tol = 1e-14);
    assert_scalar_eq!(dderiv[(0, 0)], 6.0 * t, comp = abs, tol = 1e-14);

    // 1/t with derivatives -1/t^2 and 2/t^3
    let inverse = div(constant(1.0), p_cf.clone()).unwrap();
    let (values, deriv, dderiv) = eval_dderiv(&inverse, &rule);
    assert_scalar_eq!(values[(0, 0)], 1.0 / t, comp = abs, tol = 1e-14);
    assert_scalar_eq!(deriv[(0, 0)], -1.0 / (t * t), comp = abs, tol = 1e-14);
    assert_scalar_eq!(dderiv[(0, 0)], 2.0 / (t * t * t), comp = abs, tol = 1e-14);

    // atan2(sin t, cos t) = t on (-pi, pi], so the derivative is one and the
    // second derivative vanishes.
    let angle = atan2(sin(p_cf.clone()), cos(p_cf.clone())).unwrap();
    let (values, deriv, dderiv) = eval_dderiv(&angle, &rule);
    assert_scalar_eq!(values[(0, 0)], t, comp = abs, tol = 1e-14);
    assert_scalar_eq!(deriv[(0, 0)], 1.0, comp = abs, tol = 1e-13);
    assert_scalar_eq!(dderiv[(0, 0)], 0.0, comp = abs, tol = 1e-13);
}

#[test]
fn pow_with_negative_base_and_integer_exponent_has_finite_derivatives() {
    // f(t) = (t - 2)^3 at t = 0: value -8, f' = 3 (t - 2)^2 = 12,
    // f'' = 6 (t - 2) = -12. The exponent is constant, so the a^b ln(a)
    // exponent partial must not poison the chain rule for the negative base.
    let p = parameter(0.0);
    let p_cf: CoeffRef = p.clone();
    let expr = pow(add(p_cf, constant(-2.0)).unwrap(), constant(3.0)).unwrap();

    let (values, deriv, dderiv) = eval_dderiv(&expr, &rule_along_x(&[0.0]));
    assert_scalar_eq!(values[(0, 0)], -8.0, comp = abs, tol = 1e-13);
    assert_scalar_eq!(deriv[(0, 0)], 12.0, comp = abs, tol = 1e-13);
    assert_scalar_eq!(dderiv[(0, 0)], -12.0, comp = abs, tol = 1e-13);
}

#[test]
fn composite_derivatives_match_analytic_derivatives() {
    // f(t) = exp(t^2), f' = 2 t exp(t^2), f'' = (2 + 4 t^2) exp(t^2)
    let t = 0.8;
    let p = parameter(t);
    let p_cf: CoeffRef = p.clone();
    let expr = exp(mul(p_cf.clone(), p_cf).unwrap());

    let rule = rule_along_x(&[0.0]);
    let (values, deriv, dderiv) = eval_dderiv(&expr, &rule);
    let f = (t * t).exp();
    assert_scalar_eq!(values[(0, 0)], f, comp = abs, tol = 1e-12);
    assert_scalar_eq!(deriv[(0, 0)], 2.0 * t * f, comp = abs, tol = 1e-12);
    assert_scalar_eq!(dderiv[(0, 0)], (2.0 + 4.0 * t * t) * f, comp = abs, tol = 1e-12);
}

#[test]
fn log_and_pow_report_domain_errors() {
    let point = point_at(0.0);

    let bad_log = log(constant(-2.0));
    assert!(matches!(
        bad_log.evaluate_scalar(&point),
        Err(CoefficientError::DomainError { function: "log", .. })
    ));
    assert!(matches!(
        bad_log.evaluate_const(),
        Err(CoefficientError::DomainError { function: "log", .. })
    ));

    let bad_pow = pow(constant(-1.0), constant(0.5)).unwrap();
    assert!(matches!(
        bad_pow.evaluate_scalar(&point),
        Err(CoefficientError::DomainError { function: "pow", .. })
    ));

    // Negative bases are fine for integer exponents.
    let cube = pow(constant(-2.0), constant(3.0)).unwrap();
    assert_scalar_eq!(cube.evaluate_scalar(&point).unwrap(), -8.0, comp = abs, tol = 1e-13);
}

#[test]
fn real_only_functions_reject_complex_operands() {
    let point = point_at(0.0);
    let complex_child = constant_complex(Complex64::new(1.3, 2.0));
    let floored = floor(complex_child);
    assert!(matches!(
        floored.evaluate_scalar_complex(&point),
        Err(CoefficientError::UnsupportedOperand(_))
    ));

    // A real child passes through the real path and widens.
    let floored = floor(constant(1.7));
    assert_eq!(floored.evaluate_scalar_complex(&point).unwrap(), Complex64::from(1.0));
}

#[test]
fn complex_values_propagate_through_the_algebra() {
    let point = point_at(0.0);

    let mixed = add(constant(1.0), constant_complex(Complex64::new(0.0, 1.0))).unwrap();
    assert!(mixed.is_complex());
    assert_eq!(mixed.evaluate_scalar_complex(&point).unwrap(), Complex64::new(1.0, 1.0));
    assert!(mixed.evaluate_scalar(&point).is_err());

    let scaled = scale_complex(Complex64::new(0.0, 2.0), constant(3.0));
    assert!(scaled.is_complex());
    assert_eq!(scaled.evaluate_scalar_complex(&point).unwrap(), Complex64::new(0.0, 6.0));
    assert!(scaled.evaluate_scalar(&point).is_err());

    let conjugated = conj(constant_complex(Complex64::new(1.0, 2.0)));
    assert_eq!(conjugated.evaluate_scalar_complex(&point).unwrap(), Complex64::new(1.0, -2.0));
    // On real values conjugation is the identity, with identity derivative.
    let p = parameter(0.4);
    let p_cf: CoeffRef = p.clone();
    let (values, deriv, _) = eval_dderiv(&conj(p_cf), &rule_along_x(&[0.0]));
    assert_eq!(values[(0, 0)], 0.4);
    assert_eq!(deriv[(0, 0)], 1.0);
}

#[test]
fn scaling_scales_values_and_derivatives() {
    let p = parameter(0.6);
    let p_cf: CoeffRef = p.clone();
    let expr = scale(2.5, p_cf);
    let (values, deriv, dderiv) = eval_dderiv(&expr, &rule_along_x(&[0.0, 1.0]));
    for k in 0..2 {
        assert_scalar_eq!(values[(k, 0)], 1.5, comp = abs, tol = 1e-15);
        assert_scalar_eq!(deriv[(k, 0)], 2.5, comp = abs, tol = 1e-15);
        assert_scalar_eq!(dderiv[(k, 0)], 0.0, comp = abs, tol = 1e-15);
    }
}

#[test]
fn if_pos_branches_pointwise() {
    let test = function(|p| p.x() - 0.5);
    let expr = if_pos(test.clone(), constant(1.0), constant(2.0)).unwrap();
    let rule = rule_along_x(&[0.25, 0.75]);

    let values = eval_rule(&expr, &rule);
    assert_eq!(values[(0, 0)], 2.0);
    assert_eq!(values[(1, 0)], 1.0);

    // Derivatives follow the branch taken at each point.
    let p = parameter(0.3);
    let p_cf: CoeffRef = p.clone();
    let expr = if_pos(test, p_cf.clone(), scale(2.0, p_cf)).unwrap();
    let (values, deriv, _) = eval_dderiv(&expr, &rule);
    assert_eq!(values[(0, 0)], 0.6);
    assert_eq!(deriv[(0, 0)], 2.0);
    assert_eq!(values[(1, 0)], 0.3);
    assert_eq!(deriv[(1, 0)], 1.0);
}

#[test]
fn inner_product_sums_componentwise_products() {
    let point = point_at(0.0);
    let v = vectorial(vec![constant(1.0), constant(2.0), constant(3.0)]);
    let w = vectorial(vec![constant(4.0), constant(5.0), constant(6.0)]);
    let dot = inner_product(v, w).unwrap();
    assert_eq!(dot.dimension(), 1);
    assert_eq!(dot.evaluate_scalar(&point).unwrap(), 32.0);

    // (t, 1) . (1, t) = 2 t
    let p = parameter(0.9);
    let p_cf: CoeffRef = p.clone();
    let v = vectorial(vec![p_cf.clone(), constant(1.0)]);
    let w = vectorial(vec![constant(1.0), p_cf]);
    let dot = inner_product(v, w).unwrap();
    let (values, deriv, dderiv) = eval_dderiv(&dot, &rule_along_x(&[0.0]));
    assert_scalar_eq!(values[(0, 0)], 1.8, comp = abs, tol = 1e-15);
    assert_scalar_eq!(deriv[(0, 0)], 2.0, comp = abs, tol = 1e-15);
    assert_scalar_eq!(dderiv[(0, 0)], 0.0, comp = abs, tol = 1e-15);

    let short = vectorial(vec![constant(1.0)]);
    let long = vectorial(vec![constant(1.0), constant(2.0)]);
    assert!(inner_product(short, long).is_err());
}

#[test]
fn sparsity_combination_follows_the_operator() {
    let zero = constant(0.0);
    let two = constant(2.0);
    let p = parameter(0.1);
    let p_cf: CoeffRef = p.clone();

    let mut pattern = [true];
    mul(zero.clone(), two.clone()).unwrap().nonzero_pattern(&mut pattern);
    assert_eq!(pattern, [false]);

    add(zero.clone(), two.clone()).unwrap().nonzero_pattern(&mut pattern);
    assert_eq!(pattern, [true]);

    // A quotient is zero wherever its numerator is.
    div(zero.clone(), p_cf.clone()).unwrap().nonzero_pattern(&mut pattern);
    assert_eq!(pattern, [false]);

    if_pos(p_cf, zero.clone(), zero).unwrap().nonzero_pattern(&mut pattern);
    assert_eq!(pattern, [false]);
}

#[test]
fn cached_evaluation_is_bit_identical_to_recomputation() {
    let p = parameter(0.37);
    let p_cf: CoeffRef = p.clone();
    let left = sin(p_cf.clone());
    let right = cos(p_cf);
    let expr = mul(left.clone(), right.clone()).unwrap();
    let rule = rule_along_x(&[0.0, 0.5, 1.0, 1.5]);

    let expected = eval_rule(&expr, &rule);
    let a = eval_rule(&left, &rule);
    let b = eval_rule(&right, &rule);
    let inputs = [DMatrixView::from(&a), DMatrixView::from(&b)];
    let mut cached = DMatrix::zeros(rule.len(), 1);
    expr.evaluate_rule_cached(&rule, &inputs, DMatrixViewMut::from(&mut cached)).unwrap();
    assert_eq!(cached, expected);

    let (_, expected_deriv, _) = eval_dderiv(&expr, &rule);
    let (ra, da, _) = eval_dderiv(&left, &rule);
    let (rb, db, _) = eval_dderiv(&right, &rule);
    let inputs = [DMatrixView::from(&ra), DMatrixView::from(&rb)];
    let dinputs = [DMatrixView::from(&da), DMatrixView::from(&db)];
    let mut values = DMatrix::zeros(rule.len(), 1);
    let mut deriv = DMatrix::zeros(rule.len(), 1);
    expr.evaluate_deriv_cached(
        &rule,
        &inputs,
        &dinputs,
        DMatrixViewMut::from(&mut values),
        DMatrixViewMut::from(&mut deriv),
    )
    .unwrap();
    assert_eq!(deriv, expected_deriv);
}

#[test]
fn binary_operands_must_agree_in_shape() {
    let vector = vectorial(vec![constant(1.0), constant(2.0)]);
    let result = add(vector, constant(3.0));
    assert!(matches!(result, Err(CoefficientError::UnsupportedOperand(_))));
}
