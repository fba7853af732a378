//! Folding two objects of one graph into a single list-segment summary.

use std::collections::BTreeSet;

use log::debug;

use crate::edge::{HasValueEdge, HvFilter, PointsToEdge, TargetSpecifier};
use crate::error::JoinError;
use crate::graph::Smg;
use crate::join::{JoinConfig, JoinEnv};
use crate::object::{DlsParams, Object};
use crate::status::JoinStatus;
use crate::sub::join_sub_smgs;
use crate::types::{ObjectId, ValueId};

/// A deferred fold of two objects into one list segment.
///
/// Candidates are ranked by scope, the number of concrete nodes the fold
/// would summarize; a smaller scope is the more specific, preferred fold.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AbstractionCandidate {
    obj1: ObjectId,
    obj2: ObjectId,
    shape: DlsParams,
    scope: usize,
}

impl AbstractionCandidate {
    pub fn new(obj1: ObjectId, obj2: ObjectId, shape: DlsParams, scope: usize) -> Self {
        AbstractionCandidate { obj1, obj2, shape, scope }
    }

    pub fn scope(&self) -> usize {
        self.scope
    }

    /// Folds the candidate pair directly in `smg`. Returns whether the fold
    /// applied; an inapplicable fold leaves the graph untouched.
    ///
    /// On success the two source objects and every node reachable only
    /// through one of them are gone, incoming pointers are redirected onto
    /// the first/last end of the new segment, and the segment's link fields
    /// take over from the outer ends of the folded pair.
    pub fn execute(&self, smg: &mut Smg) -> Result<bool, JoinError> {
        let result = join_sub_smgs_for_abstraction(smg, self.obj1, self.obj2, self.shape)?;
        if !result.defined {
            return Ok(false);
        }
        let mut graph = match result.smg {
            Some(graph) => graph,
            None => unreachable!(),
        };
        let dls = match result.new_object {
            Some(dls) => dls,
            None => unreachable!(),
        };

        // The segment continues where the folded pair's outer ends did.
        let next = graph
            .hv_edges(HvFilter::object(self.obj2).at_offset(self.shape.nfo))
            .next();
        let prev = graph
            .hv_edges(HvFilter::object(self.obj1).at_offset(self.shape.pfo))
            .next();
        if let Some(edge) = next {
            let old = graph.hv_edges(HvFilter::object(dls).at_offset(self.shape.nfo)).next();
            if let Some(old) = old {
                graph.remove_hv_edge(&old);
            }
            graph.add_hv_edge(HasValueEdge::new(dls, self.shape.nfo, edge.width, edge.value));
        }
        if let Some(edge) = prev {
            let old = graph.hv_edges(HvFilter::object(dls).at_offset(self.shape.pfo)).next();
            if let Some(old) = old {
                graph.remove_hv_edge(&old);
            }
            graph.add_hv_edge(HasValueEdge::new(dls, self.shape.pfo, edge.width, edge.value));
        }

        let abstract1 = graph.object(self.obj1).is_abstract();
        let abstract2 = graph.object(self.obj2).is_abstract();
        for pt in graph.pointers_to(self.obj1).collect::<Vec<_>>() {
            let specifier = if abstract1 { pt.specifier } else { TargetSpecifier::First };
            graph.remove_pt_edge(pt.value);
            graph.add_pt_edge(PointsToEdge::new(pt.value, dls, pt.offset, specifier));
        }
        for pt in graph.pointers_to(self.obj2).collect::<Vec<_>>() {
            let specifier = if abstract2 { pt.specifier } else { TargetSpecifier::Last };
            graph.remove_pt_edge(pt.value);
            graph.add_pt_edge(PointsToEdge::new(pt.value, dls, pt.offset, specifier));
        }

        for &object in result.non_shared_objects1.iter().chain(&result.non_shared_objects2) {
            if graph.has_object(object) {
                graph.remove_object_and_edges(object);
            }
        }
        for &value in result.non_shared_values1.iter().chain(&result.non_shared_values2) {
            if graph.has_value(value) {
                graph.remove_value(value);
            }
        }

        *smg = graph;
        Ok(true)
    }
}

/// Result of joining two objects of one graph onto a fresh segment.
pub struct AbstractionJoin {
    pub defined: bool,
    pub status: JoinStatus,
    pub smg: Option<Smg>,
    pub new_object: Option<ObjectId>,
    pub non_shared_objects1: BTreeSet<ObjectId>,
    pub non_shared_objects2: BTreeSet<ObjectId>,
    pub non_shared_values1: BTreeSet<ValueId>,
    pub non_shared_values2: BTreeSet<ValueId>,
}

impl AbstractionJoin {
    fn undefined() -> Self {
        AbstractionJoin {
            defined: false,
            status: JoinStatus::Incomparable,
            smg: None,
            new_object: None,
            non_shared_objects1: BTreeSet::new(),
            non_shared_objects2: BTreeSet::new(),
            non_shared_values1: BTreeSet::new(),
            non_shared_values2: BTreeSet::new(),
        }
    }
}

/// Joins `obj1` and `obj2` of one graph onto a fresh list segment of the
/// given shape, reporting the merged graph and, per side, the nodes that did
/// not end up shared with the other side.
///
/// Both objects' link fields are nulled out for the duration of the join so
/// the list wiring itself is not treated as ordinary data, then restored on
/// the result. The segment's minimum length is the sum of the two inputs'
/// minimum lengths; a concrete region contributes zero.
///
/// The caller decides what to do with the result: [`AbstractionCandidate::execute`]
/// rewires pointers onto the segment and reclaims the non-shared nodes.
///
/// # Panics
///
/// If either object is missing, lacks a field at a link offset of `shape`,
/// or the objects' sizes differ.
pub fn join_sub_smgs_for_abstraction(
    smg: &Smg,
    obj1: ObjectId,
    obj2: ObjectId,
    shape: DlsParams,
) -> Result<AbstractionJoin, JoinError> {
    debug!("join_sub_smgs_for_abstraction: {} and {}", obj1, obj2);

    let o1 = smg.object(obj1);
    let o2 = smg.object(obj2);
    let mut working = smg.clone();

    let mut detached: Vec<HasValueEdge> = Vec::new();
    for object in [obj1, obj2] {
        for offset in [shape.nfo, shape.pfo] {
            let Some(edge) = working.hv_edges(HvFilter::object(object).at_offset(offset)).next()
            else {
                panic!("{} has no link field at offset {}", object, offset);
            };
            detached.push(edge);
            working.remove_hv_edge(&edge);
            working.add_hv_edge(HasValueEdge::new(object, offset, edge.width, ValueId::NULL));
        }
    }

    let length1 = o1.dls_params().map_or(0, |p| p.min_length);
    let length2 = o2.dls_params().map_or(0, |p| p.min_length);
    let segment = Object::dls(o1.size, DlsParams { min_length: length1 + length2, ..shape })
        .with_level(o1.level);

    let ldiff = match (o1.is_abstract(), o2.is_abstract()) {
        (true, false) => 1,
        (false, true) => -1,
        _ => 0,
    };
    let increase_level = !o1.is_abstract() && !o2.is_abstract();

    let cfg = JoinConfig { check_consistency: false, identical_inputs: true };
    let mut env = JoinEnv::shared(working, cfg);
    let dls = env.dest_mut().add_object(segment);
    env.mapping1.map_object(obj1, dls);
    env.mapping2.map_object(obj2, dls);

    let sub = join_sub_smgs(&mut env, JoinStatus::Equal, obj1, obj2, dls, ldiff, increase_level)?;
    let (mut result, mapping1, mapping2) = env.into_shared();
    if !sub.defined {
        return Ok(AbstractionJoin::undefined());
    }

    for edge in detached {
        let placeholder = HasValueEdge::new(edge.object, edge.offset, edge.width, ValueId::NULL);
        result.remove_hv_edge(&placeholder);
        result.add_hv_edge(edge);
    }

    let non_shared_objects1 = mapping1
        .object_entries()
        .filter(|&(from, to)| from != to && result.has_object(from))
        .map(|(from, _)| from)
        .collect();
    let non_shared_objects2 = mapping2
        .object_entries()
        .filter(|&(from, to)| from != to && result.has_object(from))
        .map(|(from, _)| from)
        .collect();
    let non_shared_values1 = mapping1
        .value_entries()
        .filter(|&(from, to)| from != to && result.has_value(from))
        .map(|(from, _)| from)
        .collect();
    let non_shared_values2 = mapping2
        .value_entries()
        .filter(|&(from, to)| from != to && result.has_value(from))
        .map(|(from, _)| from)
        .collect();

    Ok(AbstractionJoin {
        defined: true,
        status: sub.status,
        smg: Some(result),
        new_object: Some(dls),
        non_shared_objects1,
        non_shared_objects2,
        non_shared_values1,
        non_shared_values2,
    })
}
