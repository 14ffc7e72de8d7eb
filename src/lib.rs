//! ram-synth: C++ synthesiser for RAM Datalog programs.
//!
//! This crate is the back-end of a Datalog compiler: it takes the
//! relational-algebra-machine (RAM) program produced by the front-end's
//! lowering and emits a standalone C++ source file which, compiled and
//! linked against the evaluation runtime, runs the original workload.
//!
//! - RAM IR (statements, operations, conditions, values)
//! - Relation descriptors and I/O directives
//! - Ordered symbol table
//! - Index analysis (search signatures and per-relation index sets)
//! - Tree-directed code emission with parallel-loop and profiling support

pub mod config;
pub mod program;
pub mod ram;
pub mod relation;
pub mod symbols;
pub mod synth;

// Re-exports for convenience
pub use config::{Config, ConfigError, Provenance};
pub use program::{Program, TranslationUnit};
pub use ram::{
    AggregateFunction, BinaryConstraintOp, Condition, Expression, FunctorOp, Operation,
    SearchSignature, Statement, TupleId,
};
pub use relation::{IoDirectives, Relation, RelationRepresentation};
pub use symbols::SymbolTable;
pub use synth::Synthesiser;
