//! Joining the objects two pointer values address.

use std::collections::BTreeSet;

use log::debug;

use crate::abstraction::AbstractionCandidate;
use crate::edge::{HvFilter, PointsToEdge};
use crate::error::JoinError;
use crate::join::JoinEnv;
use crate::match_objects::match_objects;
use crate::status::JoinStatus;
use crate::sub::join_sub_smgs;
use crate::types::{ObjectId, ValueId};

/// Result of a target join. An undefined, recoverable result lets the value
/// joiner fall back to the list-fold path; `recoverable` carries no meaning
/// when `defined` is true.
pub struct TargetJoin {
    pub defined: bool,
    pub recoverable: bool,
    pub status: JoinStatus,
    pub value: Option<ValueId>,
    pub candidates: Vec<AbstractionCandidate>,
}

impl TargetJoin {
    fn undefined(status: JoinStatus, recoverable: bool) -> Self {
        TargetJoin {
            defined: false,
            recoverable,
            status,
            value: None,
            candidates: Vec::new(),
        }
    }

    fn defined(status: JoinStatus, value: ValueId, candidates: Vec<AbstractionCandidate>) -> Self {
        TargetJoin {
            defined: true,
            recoverable: true,
            status,
            value: Some(value),
            candidates,
        }
    }
}

/// Joins the targets of two pointer values `addr1` (graph 1) and `addr2`
/// (graph 2), then unifies the two addresses into one destination value.
///
/// On a fresh target pair this allocates the joined destination object,
/// evicts any stale sub-merge it supersedes, and recurses into the subgraph
/// joiner on the pair.
///
/// # Panics
///
/// If either value carries no points-to edge.
pub fn join_target_objects(
    env: &mut JoinEnv,
    status: JoinStatus,
    addr1: ValueId,
    addr2: ValueId,
    level1: i32,
    level2: i32,
    ldiff: i32,
    increase_level: bool,
) -> Result<TargetJoin, JoinError> {
    let Some(pt1) = env.smg1().pointer(addr1) else {
        panic!("target join needs pointer values, {} has no points-to edge", addr1);
    };
    let Some(pt2) = env.smg2().pointer(addr2) else {
        panic!("target join needs pointer values, {} has no points-to edge", addr2);
    };

    debug!("join_target_objects: {} -> {} vs {} -> {}", addr1, pt1.target, addr2, pt2.target);

    if level1 - level2 != ldiff {
        return Ok(TargetJoin::undefined(status, true));
    }

    if pt1.offset != pt2.offset {
        return Ok(TargetJoin::undefined(status, true));
    }

    let target1 = pt1.target;
    let target2 = pt2.target;

    // Already joined: both null, or both consistently mapped. Only the
    // addresses remain to be unified.
    let both_null = target1.is_null() && target2.is_null();
    let consistently_mapped = match (env.mapping1.get_object(target1), env.mapping2.get_object(target2)) {
        (Some(d1), Some(d2)) => d1 == d2,
        _ => false,
    };
    if both_null || consistently_mapped {
        let value = map_target_address(env, addr1, addr2, increase_level);
        return Ok(TargetJoin::defined(status, value, Vec::new()));
    }

    let o1 = env.smg1().object(target1);
    let o2 = env.smg2().object(target2);

    // Divergently mapped targets of different kinds cannot be reconciled
    // here; the caller may still recover through the list fold.
    if o1.is_abstract() != o2.is_abstract()
        && env.mapping1.contains_value(addr1)
        && env.mapping2.contains_value(addr2)
        && env.mapping1.get_object(target1) != env.mapping2.get_object(target2)
    {
        return Ok(TargetJoin::undefined(status, true));
    }

    if o1.is_abstract() == o2.is_abstract() && pt1.specifier != pt2.specifier {
        return Ok(TargetJoin::undefined(status, true));
    }

    let Some(status) = match_objects(env, status, target1, target2) else {
        return Ok(TargetJoin::undefined(status, true));
    };

    let new_object = env.dest_mut().add_object(o1.join_with(o2, increase_level));

    // A target that was already merged along another path is being superseded
    // by this more specific pair; its partial sub-merge must go first.
    if let Some(stale) = env.mapping1.get_object(target1) {
        remove_stale_sub_smg(env, stale);
    }
    if let Some(stale) = env.mapping2.get_object(target2) {
        remove_stale_sub_smg(env, stale);
    }

    env.mapping1.map_object(target1, new_object);
    env.mapping2.map_object(target2, new_object);

    let value = map_target_address(env, addr1, addr2, increase_level);

    let sub = join_sub_smgs(env, status, target1, target2, new_object, 0, false)?;
    if !sub.defined {
        return Ok(TargetJoin::undefined(status, false));
    }

    Ok(TargetJoin::defined(sub.status, value, sub.candidates))
}

/// Unifies two source addresses into one destination value pointing at the
/// destination image of their (already mapped) target.
///
/// An existing destination pointer with the same target, offset and specifier
/// is reused, so every alias of an address collapses onto one value; the null
/// address in particular always unifies onto the destination null value.
/// With `relabel` set the address is re-labelled to address every summarized
/// node, which is what folding two concrete regions into a segment requires.
pub fn map_target_address(
    env: &mut JoinEnv,
    addr1: ValueId,
    addr2: ValueId,
    relabel: bool,
) -> ValueId {
    let Some(pt1) = env.smg1().pointer(addr1) else {
        panic!("address {} has no points-to edge", addr1);
    };
    let Some(target_dest) = env.mapping1.get_object(pt1.target) else {
        panic!("target {} must be mapped before its address is unified", pt1.target);
    };

    let specifier = if relabel {
        crate::edge::TargetSpecifier::All
    } else {
        pt1.specifier
    };

    let existing = env
        .dest()
        .pointers_to(target_dest)
        .find(|e| e.offset == pt1.offset && e.specifier == specifier)
        .map(|e| e.value);

    let value = match existing {
        Some(value) => value,
        None => {
            let value = env.dest_mut().fresh_value();
            env.dest_mut()
                .add_pt_edge(PointsToEdge::new(value, target_dest, pt1.offset, specifier));
            value
        }
    };

    env.mapping1.map_value(addr1, value);
    env.mapping2.map_value(addr2, value);
    value
}

/// Removes from the destination graph everything reachable from a superseded
/// destination object, and drops every mapping entry targeting the removed
/// nodes. Destination values stay; only objects and their edges go.
fn remove_stale_sub_smg(env: &mut JoinEnv, root: ObjectId) {
    let mut to_check: Vec<ObjectId> = vec![root];
    let mut reached: BTreeSet<ObjectId> = BTreeSet::new();
    reached.insert(root);

    while let Some(object) = to_check.pop() {
        if object.is_null() || !env.dest().has_object(object) {
            continue;
        }

        env.mapping1.remove_object_target(object);
        env.mapping2.remove_object_target(object);

        for edge in env.dest().hv_edges(HvFilter::object(object)).collect::<Vec<_>>() {
            env.mapping1.remove_value_target(edge.value);
            env.mapping2.remove_value_target(edge.value);

            if let Some(pt) = env.dest().pointer(edge.value) {
                if reached.insert(pt.target) {
                    to_check.push(pt.target);
                }
            }
        }

        env.dest_mut().remove_object_and_edges(object);
    }
}
