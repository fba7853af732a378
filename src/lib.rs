//! # smg-join: joining symbolic memory graphs
//!
//! **`smg-join`** implements the join operation over **symbolic memory graphs (SMGs)**:
//! heap/stack/global abstractions built by a program analysis along different paths.
//! Given two graphs describing the same program location, the join produces a single
//! over-approximating graph together with a precision verdict
//! ([`JoinStatus`][crate::status::JoinStatus]) describing which input, if either,
//! is entailed by the other.
//!
//! ## Key pieces
//!
//! - **Arena-indexed graphs**: objects and values are lightweight
//!   [`ObjectId`][crate::types::ObjectId] / [`ValueId`][crate::types::ValueId] handles
//!   into an [`Smg`][crate::graph::Smg]. Heap cycles are harmless; recursion is guarded
//!   by the monotonically growing [`NodeMapping`][crate::mapping::NodeMapping], not by
//!   a separate visited set.
//! - **Field alignment**: [`fields`] rewrites two objects' field edges into a pointwise
//!   comparable form before their values are merged.
//! - **List-segment abstraction**: doubly-linked list segments
//!   ([`ObjectKind::Dls`][crate::object::ObjectKind]) summarize runs of linked nodes;
//!   the value joiner can fold a concrete subgraph into a segment when a plain merge
//!   is infeasible.
//! - **Entry point**: [`SmgJoin::perform`][crate::join::SmgJoin] over two
//!   [`ProgramSmg`][crate::program::ProgramSmg]s.
//!
//! ## Basic usage
//!
//! ```rust
//! use smg_join::edge::HasValueEdge;
//! use smg_join::join::{JoinConfig, SmgJoin};
//! use smg_join::object::Object;
//! use smg_join::program::ProgramSmg;
//! use smg_join::status::JoinStatus;
//!
//! let mut a = ProgramSmg::new();
//! let g = a.add_global_object("g", Object::region(8));
//! let null = a.smg().null_value();
//! a.smg_mut().add_hv_edge(HasValueEdge::new(g, 0, 8, null));
//!
//! let b = a.clone();
//! let join = SmgJoin::perform(&a, &b, JoinConfig::default()).unwrap();
//! assert!(join.is_defined());
//! assert_eq!(join.status(), JoinStatus::Equal);
//! ```

pub mod abstraction;
pub mod bitset;
pub mod edge;
pub mod error;
pub mod fields;
pub mod graph;
pub mod join;
pub mod mapping;
pub mod match_objects;
pub mod object;
pub mod program;
pub mod status;
pub mod sub;
pub mod targets;
pub mod types;
pub mod values;
