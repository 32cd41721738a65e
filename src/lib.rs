//! Differentiable coefficient functions for finite element computations.
//!
//! A coefficient function is a spatially varying quantity, such as a material
//! parameter or a source term, evaluated at points mapped onto mesh elements
//! during assembly. This crate represents coefficients as shared, immutable
//! expression trees built from leaf nodes (constants, parameters, tabulated
//! data) and combinators (arithmetic, named math functions, component
//! extraction, concatenation, region-wise composition).
//!
//! Every node supports single-point and batched evaluation, in both real and
//! complex arithmetic, together with first and second derivatives with
//! respect to a designated [`ParameterCf`](primitives::ParameterCf). Trees
//! expose a conservative sparsity pattern for assembly and can be archived to
//! a flat serde-compatible representation (see [`serialize`]).
//!
//! The crate is at an early, experimental stage. APIs are unstable and may
//! change at any time.

/// Elementwise unary and binary combinators with derivative propagation.
pub mod algebra;
/// First- and second-order forward-mode scalar dual numbers.
pub mod autodiff;
/// The coefficient function trait, shapes and tree traversal.
pub mod coefficient;
/// The error type shared by all evaluation and construction paths.
pub mod error;
/// Mapped points and batched evaluation rules.
pub mod geometry;
/// Leaf coefficients: constants, parameters, closures, tabulated data.
pub mod primitives;
/// Flat tag-based archives of expression trees.
pub mod serialize;
/// Component extraction, concatenation and region-wise composition.
pub mod structural;

pub use coefficient::{traverse_tree, tree_report, CoeffRef, CoefficientFunction, Shape};
pub use error::CoefficientError;
pub use geometry::{MappedPoint, MappedRule};

pub extern crate nalgebra;
pub use num::complex::Complex64;
