//! Joining a pair of values: the central dispatcher of the merge.

use std::collections::BTreeSet;

use log::debug;

use crate::abstraction::AbstractionCandidate;
use crate::edge::{HasValueEdge, HvFilter, PointsToEdge, TargetSpecifier};
use crate::error::JoinError;
use crate::join::JoinEnv;
use crate::object::{DlsParams, Object};
use crate::status::JoinStatus;
use crate::targets::join_target_objects;
use crate::types::{ObjectId, ValueId};

/// Result of joining one value pair.
///
/// `recoverable` only matters when `defined` is false: it signals that the
/// join might succeed after the caller abstracts its input and retries one
/// layer up.
pub struct ValueJoin {
    pub defined: bool,
    pub recoverable: bool,
    pub status: JoinStatus,
    pub value: Option<ValueId>,
    pub candidates: Vec<AbstractionCandidate>,
}

impl ValueJoin {
    fn defined(status: JoinStatus, value: ValueId, candidates: Vec<AbstractionCandidate>) -> Self {
        ValueJoin {
            defined: true,
            recoverable: true,
            status,
            value: Some(value),
            candidates,
        }
    }

    fn undefined(status: JoinStatus, recoverable: bool) -> Self {
        ValueJoin {
            defined: false,
            recoverable,
            status,
            value: None,
            candidates: Vec::new(),
        }
    }
}

/// Outcome of one attempt to fold the other side into a list segment.
enum FoldOutcome {
    /// The fold went through; `value` addresses the segment in the
    /// destination graph.
    Folded { status: JoinStatus, value: ValueId },
    /// The fold does not apply here; the caller may try the other side.
    Infeasible,
    /// The join through the segment failed outright.
    Failed,
}

/// Joins `v1` (graph 1) with `v2` (graph 2) into one destination value.
///
/// `ldiff` is the expected nesting-level difference between the two sides at
/// this point of the recursion; `level1`/`level2` are the levels of the
/// objects the values were read from.
///
/// Pointer pairs delegate to the target joiner, and when that fails
/// recoverably with a list segment on either side, fall back to folding the
/// other side into the segment by joining on through the segment's next
/// field.
pub fn join_values(
    env: &mut JoinEnv,
    status: JoinStatus,
    v1: ValueId,
    v2: ValueId,
    ldiff: i32,
    increase_level: bool,
    level1: i32,
    level2: i32,
) -> Result<ValueJoin, JoinError> {
    debug!("join_values: {} vs {} (ldiff {})", v1, v2, ldiff);

    if env.cfg.identical_inputs && v1 == v2 {
        env.dest_mut().install_value(v1);
        env.mapping1.map_value(v1, v1);
        env.mapping2.map_value(v2, v1);
        install_identical_subgraph(env, v1);
        return Ok(ValueJoin::defined(status, v1, Vec::new()));
    }

    if let (Some(d1), Some(d2)) = (env.mapping1.get_value(v1), env.mapping2.get_value(v2)) {
        if d1 == d2 {
            return Ok(ValueJoin::defined(status, d1, Vec::new()));
        }
    }

    let pointer1 = env.smg1().is_pointer(v1);
    let pointer2 = env.smg2().is_pointer(v2);

    if !pointer1 && !pointer2 {
        // A side mapped elsewhere would have hit the consistent case above.
        if env.mapping1.contains_value(v1) || env.mapping2.contains_value(v2) {
            return Ok(ValueJoin::undefined(status, false));
        }

        let mut status = status;
        let level_diff = level1 - level2;
        if level_diff < ldiff {
            status = status.combine(JoinStatus::RightEntail);
        } else if level_diff > ldiff {
            status = status.combine(JoinStatus::LeftEntail);
        }

        let value = if v1 == v2 {
            env.dest_mut().install_value(v1);
            v1
        } else {
            env.dest_mut().fresh_value()
        };
        env.mapping1.map_value(v1, value);
        env.mapping2.map_value(v2, value);
        return Ok(ValueJoin::defined(status, value, Vec::new()));
    }

    if pointer1 != pointer2 {
        return Ok(ValueJoin::undefined(status, true));
    }

    let tj = join_target_objects(env, status, v1, v2, level1, level2, ldiff, increase_level)?;
    if tj.defined {
        let value = tj.value.unwrap_or(ValueId::NULL);
        return Ok(ValueJoin::defined(tj.status, value, tj.candidates));
    }
    if !tj.recoverable {
        return Ok(ValueJoin::undefined(status, false));
    }

    // Target join failed but might be saved by absorbing one side into a
    // list segment on the other.
    let target1 = env.smg1().pointer(v1).map(|pt| pt.target);
    let target2 = env.smg2().pointer(v2).map(|pt| pt.target);
    let abstract1 = target1.is_some_and(|t| env.smg1().object(t).is_abstract());
    let abstract2 = target2.is_some_and(|t| env.smg2().object(t).is_abstract());

    if !abstract1 && !abstract2 {
        return Ok(ValueJoin::undefined(status, false));
    }

    if abstract1 {
        match insert_list_and_join(env, status, v1, v2, ldiff, increase_level, level1, level2)? {
            FoldOutcome::Folded { status, value } => {
                return Ok(ValueJoin::defined(status, value, Vec::new()));
            }
            FoldOutcome::Failed => return Ok(ValueJoin::undefined(status, false)),
            FoldOutcome::Infeasible => {}
        }
    }

    if abstract2 {
        env.swap_sides();
        let outcome = insert_list_and_join(
            env,
            status.swapped(),
            v2,
            v1,
            -ldiff,
            increase_level,
            level2,
            level1,
        );
        env.swap_sides();
        match outcome? {
            FoldOutcome::Folded { status, value } => {
                return Ok(ValueJoin::defined(status.swapped(), value, Vec::new()));
            }
            FoldOutcome::Failed => return Ok(ValueJoin::undefined(status, false)),
            FoldOutcome::Infeasible => {}
        }
    }

    Ok(ValueJoin::undefined(status, true))
}

/// Carries the subgraph behind an identical pointer value over into the
/// destination under its original ids, mapping every node onto itself.
///
/// Shared-graph joins already see the subgraph through the destination alias,
/// so this reduces to a no-op there. Objects already present in the
/// destination are taken as carried over along with their subgraph.
fn install_identical_subgraph(env: &mut JoinEnv, root: ValueId) {
    let Some(pt) = env.smg1().pointer(root) else {
        return;
    };
    let mut pending_pt: Vec<PointsToEdge> = Vec::new();
    if env.dest().pointer(root).is_none() {
        pending_pt.push(pt);
    }

    let mut queue: Vec<ObjectId> = vec![pt.target];
    while let Some(object) = queue.pop() {
        if env.dest().has_object(object) {
            continue;
        }
        let src = env.smg1().object(object);
        env.dest_mut().install_object(object, src);
        env.mapping1.map_object(object, object);
        env.mapping2.map_object(object, object);

        let edges: Vec<_> = env.smg1().hv_edges(HvFilter::object(object)).collect();
        for edge in edges {
            env.dest_mut().install_value(edge.value);
            env.mapping1.map_value(edge.value, edge.value);
            env.mapping2.map_value(edge.value, edge.value);
            env.dest_mut().add_hv_edge(edge);
            if let Some(inner) = env.smg1().pointer(edge.value) {
                if env.dest().pointer(edge.value).is_none() {
                    pending_pt.push(inner);
                }
                queue.push(inner.target);
            }
        }
    }

    // Added last so every target is installed first.
    for edge in pending_pt {
        if env.dest().pointer(edge.value).is_none() {
            env.dest_mut().add_pt_edge(edge);
        }
    }
}

/// Absorbs the subgraph addressed by `pointer2` into the list segment
/// addressed by `pointer1`.
///
/// The segment is copied into the destination with minimum length zero (the
/// absorbed side may describe exactly the nodes the segment summarizes), its
/// off-list fields are copied along, and the join continues between the
/// segment's next value and `pointer2`. Runs with graph 1 as the segment
/// side; the caller swaps the environment for the symmetric case.
fn insert_list_and_join(
    env: &mut JoinEnv,
    status: JoinStatus,
    pointer1: ValueId,
    pointer2: ValueId,
    ldiff: i32,
    increase_level: bool,
    level1: i32,
    level2: i32,
) -> Result<FoldOutcome, JoinError> {
    let Some(pt) = env.smg1().pointer(pointer1) else {
        panic!("list fold needs a pointer value, {} has no points-to edge", pointer1);
    };
    let target1 = pt.target;
    let Some(params) = env.smg1().object(target1).dls_params() else {
        return Ok(FoldOutcome::Infeasible);
    };

    debug!("insert_list_and_join: folding through {} ({})", target1, pointer1);

    // Which link field continues the list depends on which end the pointer
    // addresses. An all-nodes pointer has no single continuation.
    let nf = match pt.specifier {
        TargetSpecifier::First => params.nfo,
        TargetSpecifier::Last => params.pfo,
        _ => return Ok(FoldOutcome::Infeasible),
    };

    let Some(next_edge) = env
        .smg1()
        .hv_edges(HvFilter::object(target1).at_offset(nf))
        .next()
    else {
        return Ok(FoldOutcome::Infeasible);
    };

    if let Some(joint) = env.mapping1.get_object(target1) {
        if env.mapping2.contains_object_target(joint) {
            return Ok(FoldOutcome::Infeasible);
        }
        if let Some(value) = env.mapping1.get_value(pointer1) {
            return Ok(FoldOutcome::Folded { status, value });
        }
    }

    if let (Some(next_dest), Some(p2_dest)) = (
        env.mapping1.get_value(next_edge.value),
        env.mapping2.get_value(pointer2),
    ) {
        if next_dest != p2_dest {
            return Ok(FoldOutcome::Infeasible);
        }
    }

    // The segment side covers the absorbed side, never the other way around.
    let status = status.combine(JoinStatus::RightEntail);

    copy_segment_subgraph(env, target1, nf);

    let Some(dls) = env.mapping1.get_object(target1) else {
        panic!("segment {} must be mapped after its subgraph copy", target1);
    };

    if env.mapping1.get_value(pointer1).is_none() {
        let address = env.dest_mut().fresh_value();
        env.dest_mut()
            .add_pt_edge(PointsToEdge::new(address, dls, pt.offset, pt.specifier));
        env.mapping1.map_value(pointer1, address);
    }

    let jv = join_values(
        env,
        status,
        next_edge.value,
        pointer2,
        ldiff,
        increase_level,
        level1,
        level2,
    )?;
    if !jv.defined {
        return Ok(FoldOutcome::Failed);
    }
    let status = jv.status;
    let next_dest = jv.value.unwrap_or(ValueId::NULL);

    env.dest_mut()
        .add_hv_edge(HasValueEdge::new(dls, nf, next_edge.width, next_dest));

    let Some(value) = env.mapping1.get_value(pointer1) else {
        panic!("fold address for {} must be mapped", pointer1);
    };
    Ok(FoldOutcome::Folded { status, value })
}

/// Copies the folded segment and everything reachable through its off-list
/// fields into the destination graph, mapping every copied node on side 1.
///
/// The copy keeps each object's data but drops the segment's minimum length
/// to zero: after absorbing the other side the summary must also cover the
/// absorbed run exactly.
fn copy_segment_subgraph(env: &mut JoinEnv, target1: ObjectId, nf: u64) {
    if env.mapping1.get_object(target1).is_none() {
        let src = env.smg1().object(target1);
        let params = match src.dls_params() {
            Some(params) => params,
            None => panic!("{} is not a list segment", target1),
        };
        let copy = Object::dls(src.size, DlsParams { min_length: 0, ..params }).with_level(src.level);
        let id = env.dest_mut().add_object(copy);
        env.mapping1.map_object(target1, id);
    }
    let dls = match env.mapping1.get_object(target1) {
        Some(dls) => dls,
        None => unreachable!(),
    };

    let mut reached: BTreeSet<ObjectId> = BTreeSet::new();
    reached.insert(target1);
    let mut queue: Vec<ObjectId> = Vec::new();

    let edges: Vec<_> = env
        .smg1()
        .hv_edges(HvFilter::object(target1))
        .filter(|e| e.offset != nf)
        .collect();
    for edge in edges {
        copy_field(env, edge, dls, &mut reached, &mut queue);
    }

    while let Some(object) = queue.pop() {
        let new_object = match env.mapping1.get_object(object) {
            Some(id) => id,
            None => unreachable!(),
        };
        let edges: Vec<_> = env.smg1().hv_edges(HvFilter::object(object)).collect();
        for edge in edges {
            copy_field(env, edge, new_object, &mut reached, &mut queue);
        }
    }
}

fn copy_field(
    env: &mut JoinEnv,
    edge: HasValueEdge,
    dest_object: ObjectId,
    reached: &mut BTreeSet<ObjectId>,
    queue: &mut Vec<ObjectId>,
) {
    let (dest_value, fresh) = match env.mapping1.get_value(edge.value) {
        Some(value) => (value, false),
        None => {
            let value = env.dest_mut().fresh_value();
            env.mapping1.map_value(edge.value, value);
            (value, true)
        }
    };
    env.dest_mut()
        .add_hv_edge(HasValueEdge::new(dest_object, edge.offset, edge.width, dest_value));

    if !fresh {
        return;
    }
    let Some(pt) = env.smg1().pointer(edge.value) else {
        return;
    };
    if reached.insert(pt.target) {
        if env.mapping1.get_object(pt.target).is_none() {
            let src = env.smg1().object(pt.target);
            let id = env.dest_mut().add_object(src);
            env.mapping1.map_object(pt.target, id);
        }
        queue.push(pt.target);
    }
    let Some(copied_target) = env.mapping1.get_object(pt.target) else {
        return;
    };
    env.dest_mut()
        .add_pt_edge(PointsToEdge::new(dest_value, copied_target, pt.offset, pt.specifier));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Smg;
    use crate::join::JoinConfig;
    use test_log::test;

    fn distinct_env() -> JoinEnv {
        JoinEnv::distinct(Smg::new(), Smg::new(), JoinConfig::default())
    }

    #[test]
    fn test_non_pointers_get_fresh_destination_value() {
        let mut env = distinct_env();
        let v1 = env.smg1_mut().fresh_value();
        let v2 = env.smg2_mut().fresh_value();

        let result = join_values(&mut env, JoinStatus::Equal, v1, v2, 0, false, 0, 0).unwrap();
        assert!(result.defined);
        assert_eq!(result.status, JoinStatus::Equal);
        let value = result.value.unwrap();
        assert!(env.dest().has_value(value) || value == v1);
        assert_eq!(env.mapping1.get_value(v1), Some(value));
        assert_eq!(env.mapping2.get_value(v2), Some(value));

        // Asking again resolves through the mapping
        let again = join_values(&mut env, JoinStatus::Equal, v1, v2, 0, false, 0, 0).unwrap();
        assert_eq!(again.value, Some(value));
    }

    #[test]
    fn test_identical_inputs_fast_path_reuses_value() {
        let mut smg = Smg::new();
        let v = smg.fresh_value();
        let cfg = JoinConfig { identical_inputs: true, ..JoinConfig::default() };
        let mut env = JoinEnv::distinct(smg.clone(), smg, cfg);

        let result = join_values(&mut env, JoinStatus::Equal, v, v, 0, false, 0, 0).unwrap();
        assert!(result.defined);
        assert_eq!(result.value, Some(v));
    }

    #[test]
    fn test_mixed_pointer_is_recoverable() {
        let mut env = distinct_env();
        let target = env.smg1_mut().add_object(Object::region(8));
        let v1 = env.smg1_mut().fresh_value();
        env.smg1_mut().add_pt_edge(PointsToEdge::new(v1, target, 0, TargetSpecifier::Region));
        let v2 = env.smg2_mut().fresh_value();

        let result = join_values(&mut env, JoinStatus::Equal, v1, v2, 0, false, 0, 0).unwrap();
        assert!(!result.defined);
        assert!(result.recoverable);
    }

    #[test]
    fn test_inconsistently_mapped_non_pointers_fail_hard() {
        let mut env = distinct_env();
        let v1 = env.smg1_mut().fresh_value();
        let v2 = env.smg2_mut().fresh_value();
        env.mapping1.map_value(v1, ValueId::new(80));

        let result = join_values(&mut env, JoinStatus::Equal, v1, v2, 0, false, 0, 0).unwrap();
        assert!(!result.defined);
        assert!(!result.recoverable);
    }

    #[test]
    fn test_level_deviation_relaxes_status() {
        let mut env = distinct_env();
        let v1 = env.smg1_mut().fresh_value();
        let v2 = env.smg2_mut().fresh_value();

        // Side 1 one level deeper than expected
        let result = join_values(&mut env, JoinStatus::Equal, v1, v2, 0, false, 1, 0).unwrap();
        assert!(result.defined);
        assert_eq!(result.status, JoinStatus::LeftEntail);
    }

    #[test]
    fn test_fold_absorbs_region_into_segment() {
        let mut env = distinct_env();

        // Graph 1: a1 -> [dls, 24 bytes, min 2] whose next field points to a
        // 16-byte region x1.
        let params = DlsParams { hfo: 0, nfo: 0, pfo: 8, min_length: 2 };
        let seg = env.smg1_mut().add_object(Object::dls(24, params));
        let x1 = env.smg1_mut().add_object(Object::region(16));
        let n1 = env.smg1_mut().fresh_value();
        env.smg1_mut().add_pt_edge(PointsToEdge::new(n1, x1, 0, TargetSpecifier::Region));
        env.smg1_mut().add_hv_edge(HasValueEdge::new(seg, 0, 8, n1));
        env.smg1_mut().add_hv_edge(HasValueEdge::new(seg, 8, 8, ValueId::NULL));
        env.smg1_mut().add_hv_edge(HasValueEdge::new(seg, 16, 8, ValueId::NULL));
        env.smg1_mut().add_hv_edge(HasValueEdge::new(x1, 0, 16, ValueId::NULL));
        let a1 = env.smg1_mut().fresh_value();
        env.smg1_mut().add_pt_edge(PointsToEdge::new(a1, seg, 0, TargetSpecifier::First));

        // Graph 2: a2 -> a plain 16-byte region.
        let r = env.smg2_mut().add_object(Object::region(16));
        env.smg2_mut().add_hv_edge(HasValueEdge::new(r, 0, 16, ValueId::NULL));
        let a2 = env.smg2_mut().fresh_value();
        env.smg2_mut().add_pt_edge(PointsToEdge::new(a2, r, 0, TargetSpecifier::Region));

        let result = join_values(&mut env, JoinStatus::Equal, a1, a2, 0, false, 0, 0).unwrap();
        assert!(result.defined);
        assert_eq!(result.status, JoinStatus::RightEntail);

        // The result addresses a possibly-empty copy of the segment whose
        // next field leads to the joined region.
        let value = result.value.unwrap();
        let pt = env.dest().pointer(value).unwrap();
        let copy = env.dest().object(pt.target);
        assert_eq!(copy.dls_params().unwrap().min_length, 0);
        let next = env
            .dest()
            .hv_edges(HvFilter::object(pt.target).at_offset(0))
            .next()
            .unwrap();
        let joined_region = env.dest().pointer(next.value).unwrap().target;
        assert!(!env.dest().object(joined_region).is_abstract());
        assert_eq!(env.mapping2.get_object(r), Some(joined_region));
    }
}
