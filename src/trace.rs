//! Call-tree classification.
//!
//! Every frame gets a path: the child indices taken from the root, so the
//! second child of the first child has path `[0, 1]`. Paths are built per
//! frame while walking an explicit stack, never through a shared buffer.

use alloy_primitives::{B256, U256};

use crate::chain::{CallKind, Trace};
use crate::codec::{CodecError, parse_hex_quantity};
use crate::repository::TransferCategory;

/// A frame of the call tree together with its position in it.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceNode<'a> {
    pub path: Vec<usize>,
    pub trace: &'a Trace,
}

impl TraceNode<'_> {
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }
}

/// A value-bearing frame, ready to become an asset transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedTrace<'a> {
    pub category: TransferCategory,
    pub unique_id: String,
    pub trace: &'a Trace,
}

pub fn external_id(tx_hash: &B256) -> String {
    format!("{tx_hash:#x}:external")
}

/// The root renders as a single `0` segment.
pub fn internal_id(tx_hash: &B256, path: &[usize]) -> String {
    let rendered = if path.is_empty() {
        "0".to_string()
    } else {
        path.iter()
            .map(|index| index.to_string())
            .collect::<Vec<_>>()
            .join("-")
    };
    format!("{tx_hash:#x}:internal:{rendered}")
}

/// All frames reachable from `root`, depth-first pre-order.
pub fn flatten(root: &Trace) -> Vec<TraceNode<'_>> {
    let mut nodes = Vec::new();
    let mut stack = vec![TraceNode {
        path: Vec::new(),
        trace: root,
    }];

    while let Some(node) = stack.pop() {
        // reversed so the first child is visited next
        for (index, child) in node.trace.calls.iter().enumerate().rev() {
            let mut path = node.path.clone();
            path.push(index);
            stack.push(TraceNode { path, trace: child });
        }
        nodes.push(node);
    }

    nodes
}

/// CALL, CREATE and DELEGATECALL frames moving a non-zero value.
///
/// CALLCODE and SELFDESTRUCT are never counted, even when they carry value.
pub fn is_value_transfer(trace: &Trace) -> Result<bool, CodecError> {
    if !matches!(
        trace.kind,
        CallKind::Call | CallKind::Create | CallKind::DelegateCall
    ) {
        return Ok(false);
    }

    match trace.value.as_deref() {
        Some(value) => Ok(parse_hex_quantity(value)? != U256::ZERO),
        None => Ok(false),
    }
}

/// Classify one transaction's call tree.
///
/// A qualifying root is the transaction's external transfer; every other
/// qualifying frame, at any depth, is an internal transfer identified by its
/// path. Each frame is checked against its own call kind.
pub fn classify<'a>(
    root: &'a Trace,
    tx_hash: &B256,
) -> Result<Vec<ClassifiedTrace<'a>>, CodecError> {
    let mut classified = Vec::new();

    for node in flatten(root) {
        if !is_value_transfer(node.trace)? {
            continue;
        }

        let (category, unique_id) = if node.is_root() {
            (TransferCategory::External, external_id(tx_hash))
        } else {
            (TransferCategory::Internal, internal_id(tx_hash, &node.path))
        };

        classified.push(ClassifiedTrace {
            category,
            unique_id,
            trace: node.trace,
        });
    }

    Ok(classified)
}
