//! Field alignment: rewriting two objects' field edges into pointwise
//! comparable form.
//!
//! This is a reinterpretation step on the *input* graphs: it changes how the
//! same memory is described, never what it contains. After alignment the two
//! objects carry the same set of (offset, width) fields, so the subgraph
//! joiner can pair edges one to one.

use log::debug;

use crate::bitset::BitSet;
use crate::edge::{HasValueEdge, HvFilter};
use crate::error::JoinError;
use crate::graph::Smg;
use crate::join::JoinEnv;
use crate::status::JoinStatus;
use crate::types::{ObjectId, ValueId};

/// Aligns the field edges of `obj1` (in graph 1) and `obj2` (in graph 2) and
/// returns the entailment the alignment revealed.
///
/// Alignment proceeds in three steps. First each side keeps its non-null
/// edges and re-derives its null edges: one shared null edge per maximal run
/// of bytes that are null on *both* sides, plus a null edge wherever the
/// other side holds a pointer over bytes this side has fully nulled. Then
/// each side is extended with a fresh-valued edge for every field the other
/// side has and it lacks, so the value joiner always finds a counterpart.
/// Finally, a side whose originally-null bytes are no longer covered by any
/// edge lost information the other side never had: the result is relaxed
/// toward the entailment naming that side as the more general one.
///
/// # Panics
///
/// If the objects differ in size or are missing from their graphs.
pub fn join_fields(env: &mut JoinEnv, obj1: ObjectId, obj2: ObjectId) -> JoinStatus {
    let size1 = env.smg1().object(obj1).size;
    let size2 = env.smg2().object(obj2).size;
    assert_eq!(size1, size2, "field alignment needs objects of identical size");

    debug!("join_fields: {} vs {} ({} bytes)", obj1, obj2, size1);

    let orig_null1 = env.smg1().null_bytes_for_object(obj1);
    let orig_null2 = env.smg2().null_bytes_for_object(obj2);
    let common_null = orig_null1.intersection(&orig_null2);

    let new1 = compatible_edges(env.smg1(), env.smg2(), obj1, obj2, &orig_null1, &common_null);
    let new2 = compatible_edges(env.smg2(), env.smg1(), obj2, obj1, &orig_null2, &common_null);
    env.smg1_mut().replace_object_edges(obj1, new1);
    env.smg2_mut().replace_object_edges(obj2, new2);

    // Both extension sets are computed against the rewritten edge sets before
    // either is applied.
    let ext1 = missing_field_extensions(env.smg2(), env.smg1(), obj2, obj1);
    let ext2 = missing_field_extensions(env.smg1(), env.smg2(), obj1, obj2);
    for (offset, width) in ext1 {
        let fresh = env.smg1_mut().fresh_value();
        env.smg1_mut().add_hv_edge(HasValueEdge::new(obj1, offset, width, fresh));
    }
    for (offset, width) in ext2 {
        let fresh = env.smg2_mut().fresh_value();
        env.smg2_mut().add_hv_edge(HasValueEdge::new(obj2, offset, width, fresh));
    }

    let mut status = JoinStatus::Equal;
    if lost_null_coverage(env.smg1(), obj1, &orig_null1) {
        status = status.combine(JoinStatus::RightEntail);
    }
    if lost_null_coverage(env.smg2(), obj2, &orig_null2) {
        status = status.combine(JoinStatus::LeftEntail);
    }

    debug!("join_fields: aligned, status {}", status);
    status
}

/// The rewritten edge set for `obj_a`: its non-null edges unchanged, a null
/// edge per maximal common null run, and a null edge per pointer field of
/// `obj_b` whose bytes `obj_a` had fully nulled.
fn compatible_edges(
    smg_a: &Smg,
    smg_b: &Smg,
    obj_a: ObjectId,
    obj_b: ObjectId,
    null_a: &BitSet,
    common_null: &BitSet,
) -> Vec<HasValueEdge> {
    let mut edges: Vec<HasValueEdge> = smg_a
        .hv_edges(HvFilter::object(obj_a))
        .filter(|e| !e.value.is_null())
        .collect();

    for (start, end) in common_null.runs() {
        edges.push(HasValueEdge::new(
            obj_a,
            start as u64,
            (end - start) as u64,
            ValueId::NULL,
        ));
    }

    for edge_b in smg_b.hv_edges(HvFilter::object(obj_b)) {
        if edge_b.value.is_null() || !smg_b.is_pointer(edge_b.value) {
            continue;
        }
        let covered_by_non_null = smg_a
            .hv_edges(HvFilter::object(obj_a).at_offset(edge_b.offset))
            .any(|e| !e.value.is_null());
        if covered_by_non_null {
            continue;
        }
        let start = edge_b.offset as usize;
        let end = (edge_b.offset + edge_b.width) as usize;
        if null_a.contains(start) && null_a.next_clear_bit(start) >= end {
            edges.push(HasValueEdge::new(obj_a, edge_b.offset, edge_b.width, ValueId::NULL));
        }
    }

    edges
}

/// Fields present (non-null) on `obj_a` with no edge at the same offset and
/// width on `obj_b`. Each gets a fresh-valued counterpart on `obj_b`.
fn missing_field_extensions(
    smg_a: &Smg,
    smg_b: &Smg,
    obj_a: ObjectId,
    obj_b: ObjectId,
) -> Vec<(u64, u64)> {
    let mut missing = Vec::new();
    for edge_a in smg_a.hv_edges(HvFilter::object(obj_a)) {
        if edge_a.value.is_null() {
            continue;
        }
        let present = smg_b
            .hv_edges(HvFilter::object(obj_b).at_offset(edge_a.offset).with_width(edge_a.width))
            .next()
            .is_some();
        if !present {
            missing.push((edge_a.offset, edge_a.width));
        }
    }
    missing
}

/// Whether any byte that was null before alignment is covered by no edge at
/// all afterwards.
fn lost_null_coverage(smg: &Smg, object: ObjectId, orig_null: &BitSet) -> bool {
    let size = smg.object(object).size as usize;
    let mut covered = BitSet::new(size);
    for edge in smg.hv_edges(HvFilter::object(object)) {
        covered.set_range(edge.offset as usize, (edge.offset + edge.width) as usize);
    }
    orig_null.iter().any(|byte| !covered.contains(byte))
}

/// Re-verifies the alignment postcondition: the two objects expose identical
/// field sets, and wherever one side is null the other is null-covered or a
/// pointer. Diagnostic only; the join itself never depends on this.
pub fn check_result_consistency(
    smg1: &Smg,
    smg2: &Smg,
    obj1: ObjectId,
    obj2: ObjectId,
) -> Result<(), JoinError> {
    let count1 = smg1.hv_edges(HvFilter::object(obj1)).count();
    let count2 = smg2.hv_edges(HvFilter::object(obj2)).count();
    if count1 != count2 {
        return Err(JoinError::InconsistentJoin(format!(
            "{} has {} fields but {} has {}",
            obj1, count1, obj2, count2
        )));
    }

    check_single_side(smg1, obj1, smg2, obj2)?;
    check_single_side(smg2, obj2, smg1, obj1)?;
    Ok(())
}

fn check_single_side(
    smg_a: &Smg,
    obj_a: ObjectId,
    smg_b: &Smg,
    obj_b: ObjectId,
) -> Result<(), JoinError> {
    let null_b = smg_b.null_bytes_for_object(obj_b);
    for edge_a in smg_a.hv_edges(HvFilter::object(obj_a).with_value(ValueId::NULL)) {
        let start = edge_a.offset as usize;
        let end = (edge_a.offset + edge_a.width) as usize;
        let counterpart = smg_b
            .hv_edges(HvFilter::object(obj_b).at_offset(edge_a.offset).with_width(edge_a.width))
            .next();
        let ok = match counterpart {
            None => false,
            Some(edge_b) => null_b.next_clear_bit(start) >= end || smg_b.is_pointer(edge_b.value),
        };
        if !ok {
            return Err(JoinError::InconsistentJoin(format!(
                "null field at offset {} of {} has no matching coverage on {}",
                edge_a.offset, obj_a, obj_b
            )));
        }
    }
    Ok(())
}
