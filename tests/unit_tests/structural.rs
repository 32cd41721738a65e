use crate::unit_tests::{point_at, rule_along_x};
use kurant::algebra::scale;
use kurant::error::CoefficientError;
use kurant::geometry::{MappedPoint, MappedRule};
use kurant::primitives::{constant, function, parameter};
use kurant::structural::{component, domain_wise, vectorial, vectorial_with_shape};
use kurant::{CoeffRef, CoefficientFunction, Shape};
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut};

fn eval_rule(cf: &CoeffRef, rule: &kurant::MappedRule) -> DMatrix<f64> {
    let mut values = DMatrix::zeros(rule.len(), cf.dimension());
    cf.evaluate_rule(rule, DMatrixViewMut::from(&mut values)).unwrap();
    values
}

#[test]
fn component_extraction_recovers_the_child() {
    let x = function(|p| p.x());
    let vector = vectorial(vec![constant(7.0), x.clone()]);
    let second = component(vector.clone(), 1).unwrap();
    assert_eq!(second.dimension(), 1);

    let rule = rule_along_x(&[0.1, 0.8, 2.5]);
    assert_eq!(eval_rule(&second, &rule), eval_rule(&x, &rule));

    assert!(matches!(
        component(vector, 2),
        Err(CoefficientError::IndexError { index: 2, len: 2 })
    ));
}

#[test]
fn component_derivatives_follow_the_child() {
    let p = parameter(0.5);
    let p_cf: CoeffRef = p.clone();
    let vector = vectorial(vec![constant(1.0), scale(3.0, p_cf)]);
    let second = component(vector, 1).unwrap();

    let rule = rule_along_x(&[0.0, 1.0]);
    let mut values = DMatrix::zeros(2, 1);
    let mut deriv = DMatrix::zeros(2, 1);
    second
        .evaluate_deriv(&rule, DMatrixViewMut::from(&mut values), DMatrixViewMut::from(&mut deriv))
        .unwrap();
    for k in 0..2 {
        assert_eq!(values[(k, 0)], 1.5);
        assert_eq!(deriv[(k, 0)], 3.0);
    }
}

#[test]
fn vectorial_concatenates_components() {
    let x = function(|p| p.x());
    let pair = vectorial(vec![x, constant(-1.0)]);
    assert_eq!(pair.dimension(), 2);
    assert_eq!(pair.shape(), Shape::vector(2));

    let point = point_at(4.0);
    let mut result = DVector::zeros(2);
    pair.evaluate(&point, DVectorViewMut::from(&mut result)).unwrap();
    assert_eq!(result[0], 4.0);
    assert_eq!(result[1], -1.0);

    let rule = rule_along_x(&[1.0, 2.0]);
    let values = eval_rule(&pair, &rule);
    assert_eq!(values[(0, 0)], 1.0);
    assert_eq!(values[(1, 0)], 2.0);
    assert_eq!(values[(0, 1)], -1.0);
    assert_eq!(values[(1, 1)], -1.0);
}

#[test]
fn vectorial_supports_explicit_shapes() {
    let entries: Vec<CoeffRef> = (1..=4).map(|i| constant(i as f64)).collect();
    let matrix = vectorial_with_shape(entries.clone(), Shape::matrix(2, 2)).unwrap();
    assert_eq!(matrix.shape(), Shape::matrix(2, 2));
    assert_eq!(matrix.dimension(), 4);

    let mut result = DVector::zeros(4);
    matrix.evaluate(&point_at(0.0), DVectorViewMut::from(&mut result)).unwrap();
    assert_eq!(result.as_slice(), &[1.0, 2.0, 3.0, 4.0]);

    assert!(matches!(
        vectorial_with_shape(entries, Shape::matrix(2, 3)),
        Err(CoefficientError::UnsupportedOperand(_))
    ));
}

#[test]
fn vectorial_sparsity_is_per_child() {
    let pair = vectorial(vec![constant(0.0), constant(2.0)]);
    let mut pattern = [true, true];
    pair.nonzero_pattern(&mut pattern);
    assert_eq!(pattern, [false, true]);
}

#[test]
fn domain_wise_delegates_by_region() {
    let cf = domain_wise(vec![Some(constant(1.0)), None, Some(constant(3.0))]).unwrap();
    assert_eq!(cf.num_regions(), 3);

    let at_region = |r: usize| MappedPoint::from_coords(&[0.0]).with_region(r);
    assert_eq!(cf.evaluate_scalar(&at_region(0)).unwrap(), 1.0);
    assert_eq!(cf.evaluate_scalar(&at_region(2)).unwrap(), 3.0);
    // Regions without a coefficient, and regions beyond the table, are zero
    // rather than an error.
    assert_eq!(cf.evaluate_scalar(&at_region(1)).unwrap(), 0.0);
    assert_eq!(cf.evaluate_scalar(&at_region(9)).unwrap(), 0.0);
}

#[test]
fn domain_wise_zero_fills_absent_regions_in_batches() {
    let p = parameter(0.4);
    let p_cf: CoeffRef = p.clone();
    let cf = domain_wise(vec![Some(p_cf), None]).unwrap();

    let absent = MappedRule::from_points(vec![
        MappedPoint::from_coords(&[0.0]).with_region(1),
        MappedPoint::from_coords(&[1.0]).with_region(1),
    ]);
    let mut values = DMatrix::from_element(2, 1, 99.0);
    let mut deriv = DMatrix::from_element(2, 1, 99.0);
    cf.evaluate_deriv(&absent, DMatrixViewMut::from(&mut values), DMatrixViewMut::from(&mut deriv))
        .unwrap();
    assert_eq!(values, DMatrix::zeros(2, 1));
    assert_eq!(deriv, DMatrix::zeros(2, 1));

    let present = MappedRule::from_points(vec![MappedPoint::from_coords(&[0.0])]);
    let mut values = DMatrix::zeros(1, 1);
    let mut deriv = DMatrix::zeros(1, 1);
    cf.evaluate_deriv(&present, DMatrixViewMut::from(&mut values), DMatrixViewMut::from(&mut deriv))
        .unwrap();
    assert_eq!(values[(0, 0)], 0.4);
    assert_eq!(deriv[(0, 0)], 1.0);
}

#[test]
fn domain_wise_requires_matching_shapes() {
    let scalar = constant(1.0);
    let vector = vectorial(vec![constant(1.0), constant(2.0)]);
    assert!(matches!(
        domain_wise(vec![Some(scalar), Some(vector)]),
        Err(CoefficientError::UnsupportedOperand(_))
    ));
}

#[test]
fn domain_wise_sparsity_joins_present_regions() {
    let cf = domain_wise(vec![Some(constant(0.0)), None, Some(constant(2.0))]).unwrap();
    let mut pattern = [false];
    cf.nonzero_pattern(&mut pattern);
    assert_eq!(pattern, [true]);

    let all_zero = domain_wise(vec![Some(constant(0.0)), None]).unwrap();
    all_zero.nonzero_pattern(&mut pattern);
    assert_eq!(pattern, [false]);
}

#[test]
#[should_panic]
fn rules_reject_points_from_different_regions() {
    MappedRule::from_points(vec![
        MappedPoint::from_coords(&[0.0]).with_region(0),
        MappedPoint::from_coords(&[1.0]).with_region(1),
    ]);
}
