//! Index analysis over RAM programs.
//!
//! Answers the synthesiser's index queries: which columns a lookup binds
//! (its search signature), whether a lookup is total, and which index
//! signatures each relation needs. Signatures are computed from range
//! patterns and existence-check value lists; unbound positions are
//! `Expression::Undef`.

use crate::program::Program;
use crate::ram::{Condition, Expression, Operation, SearchSignature};
use crate::relation::Relation;
use rustc_hash::FxHashMap;

/// Per-relation index requirements collected from one program.
#[derive(Debug, Default)]
pub struct IndexAnalysis {
    /// Relation name to the signatures used on it, in first-use order.
    indexes: FxHashMap<String, Vec<SearchSignature>>,
}

/// Bitmask of bound (non-undef) positions in a value list.
pub fn signature_of(values: &[Expression]) -> SearchSignature {
    let mut mask: SearchSignature = 0;
    for (i, value) in values.iter().enumerate() {
        if !value.is_undef() {
            mask |= 1 << i;
        }
    }
    mask
}

/// Full signature for a relation of the given arity.
pub fn total_signature(arity: usize) -> SearchSignature {
    if arity == 0 {
        0
    } else {
        (1u64 << arity) - 1
    }
}

impl IndexAnalysis {
    /// Collect the index signatures every relation of the program needs.
    pub fn analyze(program: &Program) -> Self {
        let mut analysis = IndexAnalysis::default();

        program.main().for_each_operation(&mut |op| analysis.collect_operation(op));
        program
            .main()
            .for_each_statement(&mut |s| {
                if let crate::ram::Statement::Exit(cond) = s {
                    analysis.collect_condition(cond);
                }
            });
        for (_, body) in program.subroutines() {
            body.for_each_operation(&mut |op| analysis.collect_operation(op));
        }

        analysis
    }

    fn collect_operation(&mut self, op: &Operation) {
        match op {
            Operation::IndexScan { relation, pattern, .. }
            | Operation::ParallelIndexScan { relation, pattern, .. }
            | Operation::IndexChoice { relation, pattern, .. }
            | Operation::ParallelIndexChoice { relation, pattern, .. }
            | Operation::IndexAggregate { relation, pattern, .. } => {
                self.register(relation, signature_of(pattern));
            }
            _ => {}
        }
        match op {
            Operation::Choice { condition, .. }
            | Operation::ParallelChoice { condition, .. }
            | Operation::IndexChoice { condition, .. }
            | Operation::ParallelIndexChoice { condition, .. }
            | Operation::Aggregate { condition, .. }
            | Operation::IndexAggregate { condition, .. }
            | Operation::Filter { condition, .. }
            | Operation::Break { condition, .. } => self.collect_condition(condition),
            _ => {}
        }
    }

    fn collect_condition(&mut self, cond: &Condition) {
        cond.for_each_condition(&mut |c| match c {
            Condition::ExistenceCheck { relation, values } => {
                self.register(relation, signature_of(values));
            }
            Condition::ProvenanceExistenceCheck { relation, values } => {
                self.register(relation, self.provenance_signature(relation, values));
            }
            _ => {}
        });
    }

    fn register(&mut self, relation: &Relation, signature: SearchSignature) {
        if signature == 0 {
            return;
        }
        let entry = self.indexes.entry(relation.name().to_string()).or_default();
        if !entry.contains(&signature) {
            entry.push(signature);
        }
    }

    /// Search signature of an index lookup's range pattern.
    pub fn search_signature(&self, pattern: &[Expression]) -> SearchSignature {
        signature_of(pattern)
    }

    /// Search signature of a provenance existence check: the bound data
    /// columns plus the rule-number column; height columns never
    /// participate in the range query.
    pub fn provenance_signature(
        &self,
        relation: &Relation,
        values: &[Expression],
    ) -> SearchSignature {
        let data_columns = relation.arity() - relation.auxiliary_arity() + 1;
        signature_of(values) & total_signature(data_columns)
    }

    /// Whether an existence check binds every attribute column.
    pub fn is_total_signature(&self, relation: &Relation, values: &[Expression]) -> bool {
        signature_of(values) == total_signature(relation.arity())
    }

    /// Index signatures required on a relation, in first-use order.
    pub fn indexes(&self, relation: &Relation) -> &[SearchSignature] {
        self.indexes
            .get(relation.name())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
