//! Tree-directed C++ code emission for RAM programs.
//!
//! This subsystem translates a RAM evaluation plan into one standalone
//! C++ translation unit that, compiled against the runtime library,
//! evaluates the original Datalog workload.
//!
//! # Architecture
//!
//! ```text
//! RAM program ──► Synthesiser (generate.rs)
//!                  │  file-scope order: headers, functors, relation
//!                  │  types, program class, factory hooks, main
//!                  ▼
//!                 CodeEmitter (ops.rs)       one per statement tree
//!                  │  loop nests, query framing, preamble buffer,
//!                  │  parallel regions
//!                  ▼
//!                 expression emitter (expr.rs)
//!                     values and conditions, delegating naming to the
//!                     identifier mint (mint.rs) and index choices to
//!                     the index analysis (analysis.rs)
//! ```
//!
//! Relation container types are synthesised separately (reltype.rs) and
//! emitted once per distinct type name.

pub mod analysis;
mod expr;
pub mod generate;
pub mod mint;
mod ops;
pub mod reltype;

#[cfg(test)]
mod emitter_test;

pub use analysis::IndexAnalysis;
pub use generate::Synthesiser;
pub use mint::{index_template, referenced_relations, Mint};
pub use reltype::{make_synthesiser_relation, SynthesiserRelation};
