//! Recursive join of all fields of a matched object pair.

use std::collections::BTreeMap;

use log::debug;

use crate::abstraction::AbstractionCandidate;
use crate::edge::{HasValueEdge, HvFilter};
use crate::error::JoinError;
use crate::fields::{check_result_consistency, join_fields};
use crate::graph::Smg;
use crate::join::JoinEnv;
use crate::status::JoinStatus;
use crate::types::{ObjectId, ValueId};
use crate::values::join_values;

/// Result of joining one matched object pair's subgraphs.
pub struct SubJoin {
    pub defined: bool,
    pub status: JoinStatus,
    pub candidates: Vec<AbstractionCandidate>,
}

impl SubJoin {
    fn undefined(status: JoinStatus) -> Self {
        SubJoin {
            defined: false,
            status,
            candidates: Vec::new(),
        }
    }
}

/// Joins the subgraphs hanging off `obj1` (graph 1) and `obj2` (graph 2),
/// writing the merged fields onto `new_object` in the destination.
///
/// Aligns the two field sets first, then joins the field values pairwise,
/// recursing through pointers. `ldiff` is adjusted per field: stepping through
/// a non-link field of a list segment descends one summarized nesting level
/// on that side.
///
/// Value joins may come back carrying abstraction candidates, meaning the
/// field only joins once some pair of destination objects is folded into a
/// segment. When every field joined and some were contingent, the most
/// specific candidate per value is executed against the destination before
/// the join is declared defined.
///
/// # Panics
///
/// If the objects' sizes differ, or either object is missing from its graph.
pub fn join_sub_smgs(
    env: &mut JoinEnv,
    status: JoinStatus,
    obj1: ObjectId,
    obj2: ObjectId,
    new_object: ObjectId,
    ldiff: i32,
    increase_level: bool,
) -> Result<SubJoin, JoinError> {
    debug!("join_sub_smgs: {} vs {} -> {}", obj1, obj2, new_object);

    let field_status = join_fields(env, obj1, obj2);
    if env.cfg.check_consistency {
        check_result_consistency(env.smg1(), env.smg2(), obj1, obj2)?;
    }
    let mut status = status.combine(field_status);

    let o1 = env.smg1().object(obj1);
    let o2 = env.smg2().object(obj2);
    let links1 = o1.dls_params().map(|p| (p.nfo, p.pfo));
    let links2 = o2.dls_params().map(|p| (p.nfo, p.pfo));

    let edges1: Vec<HasValueEdge> = env.smg1().hv_edges(HvFilter::object(obj1)).collect();

    let mut all_defined = true;
    let mut pending: BTreeMap<ValueId, Vec<AbstractionCandidate>> = BTreeMap::new();

    for e1 in edges1 {
        let counterpart = env
            .smg2()
            .hv_edges(HvFilter::object(obj2))
            .find(|e2| e1.same_field(e2));
        let Some(e2) = counterpart else {
            panic!("field sets of {} and {} are not aligned at offset {}", obj1, obj2, e1.offset);
        };

        // A non-link field of a segment lives one summarized level deeper
        // than the segment itself.
        let mut field_ldiff = ldiff;
        if let Some((nfo, pfo)) = links1 {
            if e1.offset != nfo && e1.offset != pfo {
                field_ldiff += 1;
            }
        }
        if let Some((nfo, pfo)) = links2 {
            if e1.offset != nfo && e1.offset != pfo {
                field_ldiff -= 1;
            }
        }

        let jv = join_values(
            env,
            status,
            e1.value,
            e2.value,
            field_ldiff,
            increase_level,
            o1.level,
            o2.level,
        )?;

        if jv.defined {
            status = jv.status;
            let value = jv.value.unwrap_or(ValueId::NULL);
            env.dest_mut()
                .add_hv_edge(HasValueEdge::new(new_object, e1.offset, e1.width, value));
            if !jv.candidates.is_empty() {
                pending.entry(value).or_default().extend(jv.candidates);
            }
        } else if jv.recoverable {
            all_defined = false;
        } else {
            debug!("field at offset {} failed to join", e1.offset);
            return Ok(SubJoin::undefined(status));
        }
    }

    if !all_defined {
        return Ok(SubJoin::undefined(status));
    }

    if !pending.is_empty() {
        execute_pending(pending, env.dest_mut())?;
    }
    Ok(SubJoin {
        defined: true,
        status,
        candidates: Vec::new(),
    })
}

/// Runs, per contingent value, the most specific of its collected candidates
/// against the destination graph. Smaller scope wins; the losers are dropped.
fn execute_pending(
    pending: BTreeMap<ValueId, Vec<AbstractionCandidate>>,
    dest: &mut Smg,
) -> Result<(), JoinError> {
    for (value, candidates) in pending {
        if let Some(best) = candidates.into_iter().min_by_key(AbstractionCandidate::scope) {
            debug!("executing abstraction candidate for {}", value);
            best.execute(dest)?;
        }
    }
    Ok(())
}
