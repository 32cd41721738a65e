//! A flat, tag-based archive format for coefficient expression trees.
//!
//! Trees are encoded post-order into a list of [`EncodedNode`]s, each naming
//! its kind, the indices of its already-encoded children and a list of
//! auxiliary values. Shared subexpressions are encoded once and referenced by
//! index, so decoding reproduces the sharing structure of the original tree.
//! The archive types derive serde, so any serde format can carry them.

use crate::algebra::{self, binary_op_by_name, unary_op_by_name};
use crate::coefficient::{CoeffRef, Shape};
use crate::primitives::{ConstantComplexCf, ConstantCf, DomainConstantCf, IntegrationPointCf, ParameterCf, PolynomialCf};
use eyre::{bail, eyre, Result};
use num::complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// The kind tag of an encoded node. Tag values are part of the wire format
/// and must not be reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A node that has no archive representation. Encoding fails on it.
    Undefined = 0,
    Constant = 1,
    ConstantComplex = 2,
    DomainConstant = 3,
    Parameter = 4,
    IntegrationPoint = 5,
    Polynomial = 6,
    Scale = 7,
    ScaleComplex = 8,
    UnaryOp = 9,
    BinaryOp = 10,
    Component = 11,
    Vectorial = 12,
    DomainWise = 13,
    InnerProduct = 14,
    IfPos = 15,
}

/// Auxiliary payload carried by an encoded node, such as a constant's value
/// or an operator name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AuxValue {
    Int(i64),
    Real(f64),
    Str(String),
    RealVec(Vec<f64>),
    IntVec(Vec<usize>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedNode {
    pub kind: NodeKind,
    /// Indices into the archive's node list, all strictly smaller than this
    /// node's own index.
    pub children: Vec<usize>,
    pub aux: Vec<AuxValue>,
}

/// A post-order archive of an expression tree; the root is the last node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedTree {
    pub nodes: Vec<EncodedNode>,
}

/// Encodes an expression tree, deduplicating shared subtrees by node
/// identity. Fails if the tree contains a node without an archive
/// representation, such as a closure-backed coefficient.
pub fn encode(cf: &CoeffRef) -> Result<EncodedTree> {
    let mut nodes = Vec::new();
    let mut seen = HashMap::new();
    encode_rec(cf, &mut nodes, &mut seen)?;
    Ok(EncodedTree { nodes })
}

fn encode_rec(
    cf: &CoeffRef,
    nodes: &mut Vec<EncodedNode>,
    seen: &mut HashMap<*const (), usize>,
) -> Result<usize> {
    let key = Arc::as_ptr(cf).cast::<()>();
    if let Some(&index) = seen.get(&key) {
        return Ok(index);
    }
    let kind = cf.node_kind();
    if kind == NodeKind::Undefined {
        bail!("coefficient '{}' cannot be serialized", cf.name());
    }
    let mut children = Vec::new();
    for child in cf.inputs() {
        children.push(encode_rec(&child, nodes, seen)?);
    }
    let index = nodes.len();
    nodes.push(EncodedNode { kind, children, aux: cf.aux_data() });
    seen.insert(key, index);
    Ok(index)
}

fn aux_int(aux: &[AuxValue], i: usize) -> Result<i64> {
    match aux.get(i) {
        Some(AuxValue::Int(v)) => Ok(*v),
        other => Err(eyre!("expected integer at aux slot {}, found {:?}", i, other)),
    }
}

fn aux_real(aux: &[AuxValue], i: usize) -> Result<f64> {
    match aux.get(i) {
        Some(AuxValue::Real(v)) => Ok(*v),
        other => Err(eyre!("expected real at aux slot {}, found {:?}", i, other)),
    }
}

fn aux_str<'a>(aux: &'a [AuxValue], i: usize) -> Result<&'a str> {
    match aux.get(i) {
        Some(AuxValue::Str(v)) => Ok(v),
        other => Err(eyre!("expected string at aux slot {}, found {:?}", i, other)),
    }
}

fn aux_real_vec<'a>(aux: &'a [AuxValue], i: usize) -> Result<&'a [f64]> {
    match aux.get(i) {
        Some(AuxValue::RealVec(v)) => Ok(v),
        other => Err(eyre!("expected real vector at aux slot {}, found {:?}", i, other)),
    }
}

fn aux_int_vec<'a>(aux: &'a [AuxValue], i: usize) -> Result<&'a [usize]> {
    match aux.get(i) {
        Some(AuxValue::IntVec(v)) => Ok(v),
        other => Err(eyre!("expected integer vector at aux slot {}, found {:?}", i, other)),
    }
}

fn child<'a>(built: &'a [CoeffRef], node: &EncodedNode, i: usize) -> Result<&'a CoeffRef> {
    let index = *node
        .children
        .get(i)
        .ok_or_else(|| eyre!("node requires at least {} children, found {}", i + 1, node.children.len()))?;
    built
        .get(index)
        .ok_or_else(|| eyre!("child index {} refers to a node not yet decoded", index))
}

/// Decodes an archive back into a (shared) expression tree.
pub fn decode(tree: &EncodedTree) -> Result<CoeffRef> {
    let mut built: Vec<CoeffRef> = Vec::with_capacity(tree.nodes.len());
    for node in &tree.nodes {
        if let Some(&bad) = node.children.iter().find(|&&c| c >= built.len()) {
            bail!("forward child reference to node {} in archive of {} decoded nodes", bad, built.len());
        }
        let cf = decode_node(node, &built)?;
        built.push(cf);
    }
    built.pop().ok_or_else(|| eyre!("empty archive"))
}

fn decode_node(node: &EncodedNode, built: &[CoeffRef]) -> Result<CoeffRef> {
    let aux = &node.aux;
    let cf = match node.kind {
        NodeKind::Undefined => bail!("archive contains an undefined node"),
        NodeKind::Constant => Arc::new(ConstantCf::new(aux_real(aux, 0)?)) as CoeffRef,
        NodeKind::ConstantComplex => {
            let value = Complex64::new(aux_real(aux, 0)?, aux_real(aux, 1)?);
            Arc::new(ConstantComplexCf::new(value))
        }
        NodeKind::DomainConstant => Arc::new(DomainConstantCf::new(aux_real_vec(aux, 0)?.to_vec())),
        NodeKind::Parameter => Arc::new(ParameterCf::new(aux_real(aux, 0)?)),
        NodeKind::IntegrationPoint => {
            let elements = usize::try_from(aux_int(aux, 0)?)?;
            let points_per_element = usize::try_from(aux_int(aux, 1)?)?;
            let values = aux_real_vec(aux, 2)?.to_vec();
            Arc::new(IntegrationPointCf::new(elements, points_per_element, values))
        }
        NodeKind::Polynomial => {
            let bounds = aux_real_vec(aux, 0)?.to_vec();
            let pieces = (1..aux.len())
                .map(|i| aux_real_vec(aux, i).map(<[f64]>::to_vec))
                .collect::<Result<Vec<_>>>()?;
            Arc::new(PolynomialCf::new(child(built, node, 0)?.clone(), pieces, bounds)?)
        }
        NodeKind::Scale => algebra::scale(aux_real(aux, 0)?, child(built, node, 0)?.clone()),
        NodeKind::ScaleComplex => {
            let factor = Complex64::new(aux_real(aux, 0)?, aux_real(aux, 1)?);
            algebra::scale_complex(factor, child(built, node, 0)?.clone())
        }
        NodeKind::UnaryOp => {
            let name = aux_str(aux, 0)?;
            let op = unary_op_by_name(name).ok_or_else(|| eyre!("unknown unary operation '{}'", name))?;
            algebra::unary(child(built, node, 0)?.clone(), op)
        }
        NodeKind::BinaryOp => {
            let name = aux_str(aux, 0)?;
            let op = binary_op_by_name(name).ok_or_else(|| eyre!("unknown binary operation '{}'", name))?;
            algebra::binary(child(built, node, 0)?.clone(), child(built, node, 1)?.clone(), op)?
        }
        NodeKind::Component => {
            let index = usize::try_from(aux_int(aux, 0)?)?;
            crate::structural::component(child(built, node, 0)?.clone(), index)?
        }
        NodeKind::Vectorial => {
            let shape = Shape::from_dims(aux_int_vec(aux, 0)?.to_vec());
            let children = (0..node.children.len())
                .map(|i| child(built, node, i).cloned())
                .collect::<Result<Vec<_>>>()?;
            crate::structural::vectorial_with_shape(children, shape)?
        }
        NodeKind::DomainWise => {
            let total = usize::try_from(aux_int(aux, 0)?)?;
            let present = aux_int_vec(aux, 1)?;
            if present.len() != node.children.len() {
                bail!(
                    "region-wise node lists {} occupied regions but has {} children",
                    present.len(),
                    node.children.len()
                );
            }
            let mut regions: Vec<Option<CoeffRef>> = vec![None; total];
            for (i, &region) in present.iter().enumerate() {
                let slot = regions
                    .get_mut(region)
                    .ok_or_else(|| eyre!("occupied region {} beyond table of {} regions", region, total))?;
                *slot = Some(child(built, node, i)?.clone());
            }
            crate::structural::domain_wise(regions)?
        }
        NodeKind::InnerProduct => {
            algebra::inner_product(child(built, node, 0)?.clone(), child(built, node, 1)?.clone())?
        }
        NodeKind::IfPos => algebra::if_pos(
            child(built, node, 0)?.clone(),
            child(built, node, 1)?.clone(),
            child(built, node, 2)?.clone(),
        )?,
    };
    Ok(cf)
}
