//! Feasibility check for merging a pair of objects.

use log::debug;

use crate::edge::HvFilter;
use crate::join::JoinEnv;
use crate::object::ObjectKind;
use crate::status::JoinStatus;
use crate::types::ObjectId;

/// Decides whether `obj1` (graph 1) and `obj2` (graph 2) may be merged.
///
/// Pure with respect to the environment: nothing is mutated. Returns `None`
/// when the pair is infeasible, otherwise the status refined by entailment
/// when one object is a strictly more general abstraction of the other.
///
/// Precondition: the pair has not been merged yet; an already-merged pair is
/// short-circuited by the callers before reaching this check.
///
/// # Panics
///
/// If either object is missing from its graph.
pub fn match_objects(
    env: &JoinEnv,
    status: JoinStatus,
    obj1: ObjectId,
    obj2: ObjectId,
) -> Option<JoinStatus> {
    let o1 = env.smg1().object(obj1);
    let o2 = env.smg2().object(obj2);

    debug!("match_objects: {} vs {}", obj1, obj2);

    // A null object only ever merges with the other null object, and that
    // pair never reaches this check.
    if obj1.is_null() || obj2.is_null() {
        return None;
    }

    // Both sides already merged, onto different destination nodes.
    if let (Some(d1), Some(d2)) = (env.mapping1.get_object(obj1), env.mapping2.get_object(obj2)) {
        if d1 != d2 {
            return None;
        }
    }

    // One side is merged onto a destination node the other mapping already
    // uses for a different source object. The precondition rules out the one
    // benign way this could happen.
    let clash1 = env
        .mapping1
        .get_object(obj1)
        .is_some_and(|d| env.mapping2.contains_object_target(d));
    let clash2 = env
        .mapping2
        .get_object(obj2)
        .is_some_and(|d| env.mapping1.contains_object_target(d));
    if clash1 || clash2 {
        return None;
    }

    if o1.size != o2.size || o1.valid != o2.valid {
        return None;
    }

    if let (ObjectKind::Dls(p1), ObjectKind::Dls(p2)) = (o1.kind, o2.kind) {
        if p1.hfo != p2.hfo || p1.nfo != p2.nfo || p1.pfo != p2.pfo {
            return None;
        }
    }

    if o1.is_abstract() && o2.is_abstract() {
        if !(o1.match_generic_shape(o2) && o1.match_specific_shape(o2)) {
            return None;
        }
    }

    if has_inconsistent_fields(env, obj1, obj2) {
        return None;
    }

    let refined = if o1.is_more_general(o2) {
        status.combine(JoinStatus::RightEntail)
    } else if o2.is_more_general(o1) {
        status.combine(JoinStatus::LeftEntail)
    } else {
        status
    };
    Some(refined)
}

/// Whether some field present on both objects carries values that the two
/// mappings have already merged onto *different* destination values.
fn has_inconsistent_fields(env: &JoinEnv, obj1: ObjectId, obj2: ObjectId) -> bool {
    for edge1 in env.smg1().hv_edges(HvFilter::object(obj1)) {
        let counterpart = env
            .smg2()
            .hv_edges(HvFilter::object(obj2))
            .find(|e2| edge1.same_field(e2));
        let Some(edge2) = counterpart else { continue };
        if let (Some(d1), Some(d2)) = (
            env.mapping1.get_value(edge1.value),
            env.mapping2.get_value(edge2.value),
        ) {
            if d1 != d2 {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::HasValueEdge;
    use crate::graph::Smg;
    use crate::join::JoinConfig;
    use crate::object::{DlsParams, Object};
    use crate::types::ValueId;

    fn params(nfo: u64, min_length: u64) -> DlsParams {
        DlsParams { hfo: 0, nfo, pfo: 8, min_length }
    }

    fn env_of(smg1: Smg, smg2: Smg) -> JoinEnv {
        JoinEnv::distinct(smg1, smg2, JoinConfig::default())
    }

    #[test]
    fn test_plain_regions_match() {
        let mut smg1 = Smg::new();
        let obj1 = smg1.add_object(Object::region(16));
        let mut smg2 = Smg::new();
        let obj2 = smg2.add_object(Object::region(16));
        let env = env_of(smg1, smg2);
        assert_eq!(match_objects(&env, JoinStatus::Equal, obj1, obj2), Some(JoinStatus::Equal));
    }

    #[test]
    fn test_null_object_never_matches() {
        let mut smg1 = Smg::new();
        let obj1 = smg1.add_object(Object::region(16));
        let smg2 = Smg::new();
        let null = smg2.null_object();
        let env = env_of(smg1, smg2);
        assert_eq!(match_objects(&env, JoinStatus::Equal, obj1, null), None);
    }

    #[test]
    fn test_size_or_validity_mismatch() {
        let mut smg1 = Smg::new();
        let obj1 = smg1.add_object(Object::region(16));
        let mut smg2 = Smg::new();
        let small = smg2.add_object(Object::region(8));
        let freed = smg2.add_object(Object::region(16));
        smg2.set_validity(freed, false);
        let env = env_of(smg1, smg2);
        assert_eq!(match_objects(&env, JoinStatus::Equal, obj1, small), None);
        assert_eq!(match_objects(&env, JoinStatus::Equal, obj1, freed), None);
    }

    #[test]
    fn test_divergent_mapping_is_infeasible() {
        let mut smg1 = Smg::new();
        let obj1 = smg1.add_object(Object::region(16));
        let mut smg2 = Smg::new();
        let obj2 = smg2.add_object(Object::region(16));
        let mut env = env_of(smg1, smg2);
        env.mapping1.map_object(obj1, ObjectId::new(40));
        env.mapping2.map_object(obj2, ObjectId::new(41));
        assert_eq!(match_objects(&env, JoinStatus::Equal, obj1, obj2), None);
    }

    #[test]
    fn test_destination_clash_is_infeasible() {
        let mut smg1 = Smg::new();
        let obj1 = smg1.add_object(Object::region(16));
        let mut smg2 = Smg::new();
        let obj2 = smg2.add_object(Object::region(16));
        let other2 = smg2.add_object(Object::region(16));
        let mut env = env_of(smg1, smg2);
        // obj1's destination is already taken on side 2 by a different object
        env.mapping1.map_object(obj1, ObjectId::new(40));
        env.mapping2.map_object(other2, ObjectId::new(40));
        assert_eq!(match_objects(&env, JoinStatus::Equal, obj1, obj2), None);
    }

    #[test]
    fn test_segment_layout_mismatch() {
        let mut smg1 = Smg::new();
        let obj1 = smg1.add_object(Object::dls(16, params(0, 2)));
        let mut smg2 = Smg::new();
        let obj2 = smg2.add_object(Object::dls(16, params(4, 2)));
        let env = env_of(smg1, smg2);
        assert_eq!(match_objects(&env, JoinStatus::Equal, obj1, obj2), None);
    }

    #[test]
    fn test_segment_vs_region_refines_status() {
        let mut smg1 = Smg::new();
        let seg = smg1.add_object(Object::dls(16, params(0, 2)));
        let mut smg2 = Smg::new();
        let region = smg2.add_object(Object::region(16));
        let env = env_of(smg1, smg2);
        // Segment on the first side: the second side is the entailed one
        assert_eq!(
            match_objects(&env, JoinStatus::Equal, seg, region),
            Some(JoinStatus::RightEntail)
        );
    }

    #[test]
    fn test_inconsistent_fields_are_infeasible() {
        let mut smg1 = Smg::new();
        let obj1 = smg1.add_object(Object::region(16));
        let v1 = smg1.fresh_value();
        smg1.add_hv_edge(HasValueEdge::new(obj1, 0, 8, v1));
        let mut smg2 = Smg::new();
        let obj2 = smg2.add_object(Object::region(16));
        let v2 = smg2.fresh_value();
        smg2.add_hv_edge(HasValueEdge::new(obj2, 0, 8, v2));

        let mut env = env_of(smg1, smg2);
        env.mapping1.map_value(v1, ValueId::new(90));
        env.mapping2.map_value(v2, ValueId::new(91));
        assert_eq!(match_objects(&env, JoinStatus::Equal, obj1, obj2), None);
    }
}
