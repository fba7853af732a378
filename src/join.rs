//! Top-level join of two program SMGs.

use std::collections::BTreeMap;
use std::mem;

use log::debug;

use crate::error::JoinError;
use crate::graph::Smg;
use crate::mapping::NodeMapping;
use crate::program::{ProgramSmg, StackFrame};
use crate::status::JoinStatus;
use crate::sub::join_sub_smgs;
use crate::types::ObjectId;

/// Options for one join invocation. No process-global state: every knob is an
/// explicit field here.
#[derive(Debug, Copy, Clone, Default)]
pub struct JoinConfig {
    /// Re-verify the field aligner's postcondition after every alignment and
    /// report violations as [`JoinError::InconsistentJoin`]. Diagnostic only;
    /// never changes the join result itself.
    pub check_consistency: bool,
    /// Hint that the two inputs are copies of the same graph, enabling the
    /// identical-value fast path.
    pub identical_inputs: bool,
}

/// The working graphs of one join invocation.
///
/// The list-abstraction joiner runs both "inputs" and the destination inside
/// a single graph, which plain `&mut` on three fields cannot express; this
/// enum makes the aliasing explicit instead.
enum Graphs {
    Distinct { smg1: Smg, smg2: Smg, dest: Smg },
    Shared(Smg),
}

/// Everything a recursive join step threads along: the working input graphs,
/// the destination graph, the two node mappings, and the configuration.
///
/// Mutated in place throughout a join; never shared across invocations.
pub struct JoinEnv {
    graphs: Graphs,
    pub mapping1: NodeMapping,
    pub mapping2: NodeMapping,
    pub cfg: JoinConfig,
}

impl JoinEnv {
    /// An environment over two separate input graphs and an empty destination.
    ///
    /// The destination's fresh-id counters start past both inputs' counters,
    /// so ids carried over from an input never clash with destination-fresh
    /// ones.
    pub fn distinct(smg1: Smg, smg2: Smg, cfg: JoinConfig) -> Self {
        let mut dest = Smg::new();
        dest.reserve_ids(&smg1);
        dest.reserve_ids(&smg2);
        JoinEnv {
            graphs: Graphs::Distinct { smg1, smg2, dest },
            mapping1: NodeMapping::new(),
            mapping2: NodeMapping::new(),
            cfg,
        }
    }

    /// An environment where both inputs and the destination are one graph,
    /// as used when folding two objects of a single graph into a segment.
    pub fn shared(smg: Smg, cfg: JoinConfig) -> Self {
        JoinEnv {
            graphs: Graphs::Shared(smg),
            mapping1: NodeMapping::new(),
            mapping2: NodeMapping::new(),
            cfg,
        }
    }

    pub fn smg1(&self) -> &Smg {
        match &self.graphs {
            Graphs::Distinct { smg1, .. } => smg1,
            Graphs::Shared(smg) => smg,
        }
    }

    pub fn smg2(&self) -> &Smg {
        match &self.graphs {
            Graphs::Distinct { smg2, .. } => smg2,
            Graphs::Shared(smg) => smg,
        }
    }

    pub fn dest(&self) -> &Smg {
        match &self.graphs {
            Graphs::Distinct { dest, .. } => dest,
            Graphs::Shared(smg) => smg,
        }
    }

    pub fn smg1_mut(&mut self) -> &mut Smg {
        match &mut self.graphs {
            Graphs::Distinct { smg1, .. } => smg1,
            Graphs::Shared(smg) => smg,
        }
    }

    pub fn smg2_mut(&mut self) -> &mut Smg {
        match &mut self.graphs {
            Graphs::Distinct { smg2, .. } => smg2,
            Graphs::Shared(smg) => smg,
        }
    }

    pub fn dest_mut(&mut self) -> &mut Smg {
        match &mut self.graphs {
            Graphs::Distinct { dest, .. } => dest,
            Graphs::Shared(smg) => smg,
        }
    }

    /// Exchanges the roles of the two sides: graph 1 becomes graph 2 and the
    /// mappings follow. Side-symmetric steps run once against the swapped
    /// environment instead of being written twice; callers flip any produced
    /// status with [`JoinStatus::swapped`] and swap back afterwards.
    pub fn swap_sides(&mut self) {
        if let Graphs::Distinct { smg1, smg2, .. } = &mut self.graphs {
            mem::swap(smg1, smg2);
        }
        mem::swap(&mut self.mapping1, &mut self.mapping2);
    }

    /// Consumes the environment, returning the destination graph.
    pub fn into_dest(self) -> Smg {
        match self.graphs {
            Graphs::Distinct { dest, .. } => dest,
            Graphs::Shared(smg) => smg,
        }
    }

    /// Consumes the environment, returning the shared graph and the mappings.
    ///
    /// # Panics
    ///
    /// If the environment was built with [`JoinEnv::distinct`].
    pub fn into_shared(self) -> (Smg, NodeMapping, NodeMapping) {
        match self.graphs {
            Graphs::Shared(smg) => (smg, self.mapping1, self.mapping2),
            Graphs::Distinct { .. } => panic!("environment does not share its graphs"),
        }
    }
}

/// Result of joining two whole program SMGs.
pub struct SmgJoin {
    defined: bool,
    status: JoinStatus,
    smg: Option<ProgramSmg>,
}

impl SmgJoin {
    /// Joins two program SMGs describing the same program location.
    ///
    /// Both inputs are cloned into working copies first; the field aligner
    /// rewrites edge sets as it goes, and the callers' graphs must stay
    /// untouched.
    ///
    /// An undefined result (`is_defined() == false`) means the two graphs are
    /// unjoinable, which is an expected outcome, not an error. `Err` is only
    /// possible with `check_consistency` enabled.
    pub fn perform(
        p1: &ProgramSmg,
        p2: &ProgramSmg,
        cfg: JoinConfig,
    ) -> Result<SmgJoin, JoinError> {
        debug!(
            "SmgJoin::perform: {} vs {} objects, {} globals",
            p1.smg().object_count(),
            p2.smg().object_count(),
            p1.globals.len()
        );

        let undefined = |status| SmgJoin {
            defined: false,
            status,
            smg: None,
        };

        let mut status = JoinStatus::Equal;

        // Variable tables must agree exactly. A name present on only one side
        // makes the whole pair unjoinable.
        if !p1.globals.keys().eq(p2.globals.keys()) {
            debug!("global variable sets differ, unjoinable");
            return Ok(undefined(status));
        }
        if p1.stack.len() != p2.stack.len() {
            debug!("stack depths differ, unjoinable");
            return Ok(undefined(status));
        }
        for (f1, f2) in p1.stack.iter().zip(&p2.stack) {
            if !f1.variables.keys().eq(f2.variables.keys())
                || f1.return_object.is_some() != f2.return_object.is_some()
            {
                debug!("frame variable sets differ, unjoinable");
                return Ok(undefined(status));
            }
        }

        let mut env = JoinEnv::distinct(p1.smg().clone(), p2.smg().clone(), cfg);

        // Install every named object under its side-1 identity. Name identity
        // already fixes the correspondence, so both sides map onto it.
        let mut globals = BTreeMap::new();
        for (name, &o1) in &p1.globals {
            let o2 = p2.globals[name];
            let object = env.smg1().object(o1);
            env.dest_mut().install_object(o1, object);
            env.mapping1.map_object(o1, o1);
            env.mapping2.map_object(o2, o1);
            globals.insert(name.clone(), o1);
        }

        let mut stack = Vec::with_capacity(p1.stack.len());
        for (f1, f2) in p1.stack.iter().zip(&p2.stack) {
            let mut frame = StackFrame::new(f1.function.clone());
            for (name, &o1) in &f1.variables {
                let o2 = f2.variables[name];
                let object = env.smg1().object(o1);
                env.dest_mut().install_object(o1, object);
                env.mapping1.map_object(o1, o1);
                env.mapping2.map_object(o2, o1);
                frame.variables.insert(name.clone(), o1);
            }
            if let (Some(r1), Some(r2)) = (f1.return_object, f2.return_object) {
                let object = env.smg1().object(r1);
                env.dest_mut().install_object(r1, object);
                env.mapping1.map_object(r1, r1);
                env.mapping2.map_object(r2, r1);
                frame.return_object = Some(r1);
            }
            stack.push(frame);
        }

        // Join each named pair's subgraph. Heap objects are never joined
        // directly; they are reached transitively through pointer values.
        let mut pairs: Vec<(ObjectId, ObjectId, ObjectId)> = Vec::new();
        for (name, &o1) in &p1.globals {
            pairs.push((o1, p2.globals[name], o1));
        }
        for (f1, f2) in p1.stack.iter().zip(&p2.stack) {
            for (name, &o1) in &f1.variables {
                pairs.push((o1, f2.variables[name], o1));
            }
            if let (Some(r1), Some(r2)) = (f1.return_object, f2.return_object) {
                pairs.push((r1, r2, r1));
            }
        }

        for (o1, o2, dest_obj) in pairs {
            let sub = join_sub_smgs(&mut env, status, o1, o2, dest_obj, 0, false)?;
            if !sub.defined {
                debug!("subgraph join of {} and {} failed, unjoinable", o1, o2);
                return Ok(undefined(status));
            }
            status = sub.status;
        }

        debug!("join defined, status {}", status);
        Ok(SmgJoin {
            defined: true,
            status,
            smg: Some(ProgramSmg::from_parts(env.into_dest(), globals, stack)),
        })
    }

    pub fn is_defined(&self) -> bool {
        self.defined
    }

    pub fn status(&self) -> JoinStatus {
        self.status
    }

    /// The joint graph.
    ///
    /// # Panics
    ///
    /// If the join was not defined.
    pub fn joint_smg(&self) -> &ProgramSmg {
        match &self.smg {
            Some(smg) => smg,
            None => panic!("join was not defined"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{HasValueEdge, HvFilter, PointsToEdge, TargetSpecifier};
    use crate::object::{DlsParams, Object};
    use crate::types::ValueId;
    use test_log::test;

    #[test]
    fn test_env_swap_sides() {
        let mut smg1 = Smg::new();
        let a = smg1.add_object(Object::region(8));
        let smg2 = Smg::new();

        let mut env = JoinEnv::distinct(smg1, smg2, JoinConfig::default());
        env.mapping1.map_object(a, a);
        assert!(env.smg1().has_object(a));
        assert!(!env.smg2().has_object(a));

        env.swap_sides();
        assert!(!env.smg1().has_object(a));
        assert!(env.smg2().has_object(a));
        assert!(env.mapping2.contains_object(a));
        assert!(!env.mapping1.contains_object(a));

        env.swap_sides();
        assert!(env.smg1().has_object(a));
        assert!(env.mapping1.contains_object(a));
    }

    #[test]
    fn test_shared_env_aliases() {
        let mut smg = Smg::new();
        let a = smg.add_object(Object::region(8));
        let mut env = JoinEnv::shared(smg, JoinConfig::default());
        assert!(env.smg1().has_object(a));
        assert!(env.smg2().has_object(a));
        assert!(env.dest().has_object(a));

        let b = env.dest_mut().add_object(Object::region(4));
        assert!(env.smg1().has_object(b));
    }

    #[test]
    fn test_distinct_dest_ids_do_not_collide() {
        let mut smg1 = Smg::new();
        smg1.add_object(Object::region(8));
        let v1 = smg1.fresh_value();
        let mut smg2 = Smg::new();
        smg2.add_object(Object::region(8));

        let mut env = JoinEnv::distinct(smg1, smg2, JoinConfig::default());
        let fresh = env.dest_mut().fresh_value();
        assert_ne!(fresh, v1);
    }

    /// A frame-local variable holding a pointer to a zeroed heap region.
    fn state_with_heap_pointer() -> (ProgramSmg, ObjectId, ValueId) {
        let mut p = ProgramSmg::new();
        p.push_frame("main");
        let x = p.add_local_object("x", Object::region(8));
        let heap = p.smg_mut().add_object(Object::region(16));
        p.smg_mut().add_hv_edge(HasValueEdge::new(heap, 0, 16, ValueId::NULL));
        let addr = p.smg_mut().fresh_value();
        p.smg_mut().add_pt_edge(PointsToEdge::new(addr, heap, 0, TargetSpecifier::Region));
        p.smg_mut().add_hv_edge(HasValueEdge::new(x, 0, 8, addr));
        (p, heap, addr)
    }

    #[test]
    fn test_join_with_identical_copy_is_equal() {
        let (a, heap, addr) = state_with_heap_pointer();
        let b = a.clone();
        let cfg = JoinConfig { identical_inputs: true, ..JoinConfig::default() };
        let join = SmgJoin::perform(&a, &b, cfg).unwrap();

        assert!(join.is_defined());
        assert_eq!(join.status(), JoinStatus::Equal);
        // The joint graph carries the heap subgraph under its original ids
        let joint = join.joint_smg();
        assert!(joint.smg().has_object(heap));
        assert_eq!(joint.smg().pointer(addr).map(|pt| pt.target), Some(heap));
        assert_eq!(joint.smg().hv_edges(HvFilter::object(heap)).count(), 1);
    }

    #[test]
    fn test_join_with_identical_copy_without_hint() {
        let (a, _, _) = state_with_heap_pointer();
        let b = a.clone();
        let join = SmgJoin::perform(&a, &b, JoinConfig::default()).unwrap();
        assert!(join.is_defined());
        assert_eq!(join.status(), JoinStatus::Equal);
    }

    #[test]
    fn test_null_field_against_unknown_value_is_equal() {
        let mut a = ProgramSmg::new();
        let g1 = a.add_global_object("g", Object::region(8));
        a.smg_mut().add_hv_edge(HasValueEdge::new(g1, 0, 8, ValueId::NULL));

        let mut b = ProgramSmg::new();
        let g2 = b.add_global_object("g", Object::region(8));
        let v = b.smg_mut().fresh_value();
        b.smg_mut().add_hv_edge(HasValueEdge::new(g2, 0, 8, v));

        let join = SmgJoin::perform(&a, &b, JoinConfig::default()).unwrap();
        assert!(join.is_defined());
        assert_eq!(join.status(), JoinStatus::Equal);
        let joint = join.joint_smg();
        let field = joint
            .smg()
            .hv_edges(HvFilter::object(joint.globals["g"]).at_offset(0))
            .next()
            .unwrap();
        assert!(!field.value.is_null());
    }

    #[test]
    fn test_entailment_direction_swaps_with_argument_order() {
        // Side with more zeroed bytes is the more general one.
        let mut a = ProgramSmg::new();
        let g1 = a.add_global_object("g", Object::region(16));
        a.smg_mut().add_hv_edge(HasValueEdge::new(g1, 0, 16, ValueId::NULL));

        let mut b = ProgramSmg::new();
        let g2 = b.add_global_object("g", Object::region(16));
        b.smg_mut().add_hv_edge(HasValueEdge::new(g2, 0, 8, ValueId::NULL));

        let ab = SmgJoin::perform(&a, &b, JoinConfig::default()).unwrap();
        assert!(ab.is_defined());
        assert_eq!(ab.status(), JoinStatus::RightEntail);

        let ba = SmgJoin::perform(&b, &a, JoinConfig::default()).unwrap();
        assert!(ba.is_defined());
        assert_eq!(ba.status(), JoinStatus::LeftEntail);
    }

    #[test]
    fn test_global_name_mismatch_is_unjoinable() {
        let mut a = ProgramSmg::new();
        a.add_global_object("g", Object::region(8));
        let b = ProgramSmg::new();

        let join = SmgJoin::perform(&a, &b, JoinConfig::default()).unwrap();
        assert!(!join.is_defined());
    }

    #[test]
    fn test_frame_variable_mismatch_is_unjoinable() {
        let mut a = ProgramSmg::new();
        a.push_frame("main");
        a.add_local_object("x", Object::region(8));
        let mut b = ProgramSmg::new();
        b.push_frame("main");
        b.add_local_object("y", Object::region(8));

        let join = SmgJoin::perform(&a, &b, JoinConfig::default()).unwrap();
        assert!(!join.is_defined());
    }

    #[test]
    fn test_stack_depth_mismatch_is_unjoinable() {
        let mut a = ProgramSmg::new();
        a.push_frame("main");
        let b = ProgramSmg::new();
        let join = SmgJoin::perform(&a, &b, JoinConfig::default()).unwrap();
        assert!(!join.is_defined());
    }

    #[test]
    fn test_self_cycle_terminates() {
        let build = || {
            let mut p = ProgramSmg::new();
            let g = p.add_global_object("g", Object::region(8));
            let o = p.smg_mut().add_object(Object::region(8));
            let addr = p.smg_mut().fresh_value();
            p.smg_mut().add_pt_edge(PointsToEdge::new(addr, o, 0, TargetSpecifier::Region));
            p.smg_mut().add_hv_edge(HasValueEdge::new(g, 0, 8, addr));
            let self_addr = p.smg_mut().fresh_value();
            p.smg_mut().add_pt_edge(PointsToEdge::new(self_addr, o, 0, TargetSpecifier::Region));
            p.smg_mut().add_hv_edge(HasValueEdge::new(o, 0, 8, self_addr));
            p
        };
        let a = build();
        let b = build();

        let join = SmgJoin::perform(&a, &b, JoinConfig::default()).unwrap();
        assert!(join.is_defined());
        assert_eq!(join.status(), JoinStatus::Equal);

        // The joined cycle closes back on itself.
        let joint = join.joint_smg();
        let g = joint.globals["g"];
        let field = joint.smg().hv_edges(HvFilter::object(g).at_offset(0)).next().unwrap();
        let o = joint.smg().pointer(field.value).unwrap().target;
        let inner = joint.smg().hv_edges(HvFilter::object(o).at_offset(0)).next().unwrap();
        assert_eq!(joint.smg().pointer(inner.value).map(|pt| pt.target), Some(o));
    }

    #[test]
    fn test_segment_absorbs_concrete_node_through_top_level() {
        // Graph 1 summarizes a list of at least two nodes; graph 2 holds one
        // concrete node of the same layout.
        let mut a = ProgramSmg::new();
        let g1 = a.add_global_object("g", Object::region(8));
        let params = DlsParams { hfo: 0, nfo: 0, pfo: 8, min_length: 2 };
        let seg = a.smg_mut().add_object(Object::dls(24, params));
        let x1 = a.smg_mut().add_object(Object::region(16));
        a.smg_mut().add_hv_edge(HasValueEdge::new(x1, 0, 16, ValueId::NULL));
        let n1 = a.smg_mut().fresh_value();
        a.smg_mut().add_pt_edge(PointsToEdge::new(n1, x1, 0, TargetSpecifier::Region));
        a.smg_mut().add_hv_edge(HasValueEdge::new(seg, 0, 8, n1));
        a.smg_mut().add_hv_edge(HasValueEdge::new(seg, 8, 8, ValueId::NULL));
        a.smg_mut().add_hv_edge(HasValueEdge::new(seg, 16, 8, ValueId::NULL));
        let a1 = a.smg_mut().fresh_value();
        a.smg_mut().add_pt_edge(PointsToEdge::new(a1, seg, 0, TargetSpecifier::First));
        a.smg_mut().add_hv_edge(HasValueEdge::new(g1, 0, 8, a1));

        let mut b = ProgramSmg::new();
        let g2 = b.add_global_object("g", Object::region(8));
        let r = b.smg_mut().add_object(Object::region(16));
        b.smg_mut().add_hv_edge(HasValueEdge::new(r, 0, 16, ValueId::NULL));
        let a2 = b.smg_mut().fresh_value();
        b.smg_mut().add_pt_edge(PointsToEdge::new(a2, r, 0, TargetSpecifier::Region));
        b.smg_mut().add_hv_edge(HasValueEdge::new(g2, 0, 8, a2));

        let join = SmgJoin::perform(&a, &b, JoinConfig::default()).unwrap();
        assert!(join.is_defined());
        assert_eq!(join.status(), JoinStatus::RightEntail);

        // The joint graph leads through a possibly-empty segment copy.
        let joint = join.joint_smg();
        let g = joint.globals["g"];
        let field = joint.smg().hv_edges(HvFilter::object(g).at_offset(0)).next().unwrap();
        let head = joint.smg().pointer(field.value).unwrap().target;
        assert_eq!(joint.smg().object(head).dls_params().map(|p| p.min_length), Some(0));
    }

    #[test]
    fn test_null_target_against_region_is_unjoinable() {
        let mut a = ProgramSmg::new();
        let g1 = a.add_global_object("g", Object::region(8));
        let null = a.smg().null_value();
        a.smg_mut().add_hv_edge(HasValueEdge::new(g1, 0, 8, null));

        let mut b = ProgramSmg::new();
        let g2 = b.add_global_object("g", Object::region(8));
        let target = b.smg_mut().add_object(Object::region(16));
        let addr = b.smg_mut().fresh_value();
        b.smg_mut().add_pt_edge(PointsToEdge::new(addr, target, 0, TargetSpecifier::Region));
        b.smg_mut().add_hv_edge(HasValueEdge::new(g2, 0, 8, addr));

        let join = SmgJoin::perform(&a, &b, JoinConfig::default()).unwrap();
        assert!(!join.is_defined());
    }

    #[test]
    fn test_consistency_check_accepts_aligned_join() {
        let (a, _, _) = state_with_heap_pointer();
        let b = a.clone();
        let cfg = JoinConfig { check_consistency: true, ..JoinConfig::default() };
        let join = SmgJoin::perform(&a, &b, cfg).unwrap();
        assert!(join.is_defined());
    }
}
