//! Identifier and index mint.
//!
//! Deterministic renaming of Datalog names into legal C++ identifiers,
//! rendering of search signatures as template arguments, and allocation
//! of dense profiling counter slots. All state lives on the [`Mint`]
//! value so two synthesis runs never interfere.

use crate::ram::{Condition, Operation, SearchSignature};
use crate::relation::Relation;
use rustc_hash::FxHashMap;
use std::fmt::Write;
use std::rc::Rc;

/// Identifier length cap; most compilers limit identifiers to 2048
/// characters, we stay at half of that.
const MAX_IDENT_LEN: usize = 1024;

/// Minting state for one synthesis run.
#[derive(Debug, Default)]
pub struct Mint {
    identifiers: FxHashMap<String, String>,
    freq_idx: FxHashMap<String, usize>,
    freq_order: Vec<String>,
    read_idx: FxHashMap<String, usize>,
    read_order: Vec<String>,
}

impl Mint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a Datalog name into a C++ identifier.
    ///
    /// The result is `"<n>_<tail>"` where `n` is one more than the number
    /// of names minted so far; the tail drops leading non-identifier
    /// characters, folds runs of non-alphanumerics into one underscore,
    /// and is capped at [`MAX_IDENT_LEN`]. Identical inputs always yield
    /// the identical identifier.
    pub fn convert_ram_ident(&mut self, name: &str) -> String {
        if let Some(id) = self.identifiers.get(name) {
            return id.clone();
        }

        // strip leading characters that cannot start an identifier tail
        let tail_start = name
            .find(|c: char| c.is_ascii_alphanumeric() || c == '_')
            .unwrap_or(name.len());

        let candidate = format!("{}_{}", self.identifiers.len() + 1, &name[tail_start..]);
        let mut id = String::new();
        for ch in candidate.chars() {
            if ch.is_ascii_alphanumeric() {
                id.push(ch);
            } else if id.is_empty() || !id.ends_with('_') {
                // double underscores are reserved identifiers in C++
                id.push('_');
            }
        }
        id.truncate(MAX_IDENT_LEN);

        self.identifiers.insert(name.to_string(), id.clone());
        id
    }

    /// Field name of a relation in the generated class.
    pub fn relation_name(&mut self, relation: &Relation) -> String {
        format!("rel_{}", self.convert_ram_ident(relation.name()))
    }

    /// Token keying the per-thread operation context of a relation.
    pub fn op_context_name(&mut self, relation: &Relation) -> String {
        format!("{}_op_ctxt", self.relation_name(relation))
    }

    /// Dense index of a frequency counter, allocated on first use.
    pub fn freq_index(&mut self, text: &str) -> usize {
        if let Some(&idx) = self.freq_idx.get(text) {
            return idx;
        }
        let idx = self.freq_order.len();
        self.freq_idx.insert(text.to_string(), idx);
        self.freq_order.push(text.to_string());
        idx
    }

    /// Dense index of a relation read counter; dashes in the relation
    /// name become dots in the profile key.
    pub fn read_index(&mut self, relation_name: &str) -> usize {
        let key = relation_name.replace('-', ".");
        if let Some(&idx) = self.read_idx.get(&key) {
            return idx;
        }
        let idx = self.read_order.len();
        self.read_idx.insert(key.clone(), idx);
        self.read_order.push(key);
        idx
    }

    /// Frequency counter entries in allocation order.
    pub fn freq_entries(&self) -> impl Iterator<Item = (&str, usize)> {
        self.freq_order.iter().enumerate().map(|(i, k)| (k.as_str(), i))
    }

    /// Read counter entries in allocation order.
    pub fn read_entries(&self) -> impl Iterator<Item = (&str, usize)> {
        self.read_order.iter().enumerate().map(|(i, k)| (k.as_str(), i))
    }

    pub fn freq_count(&self) -> usize {
        self.freq_order.len()
    }

    pub fn read_count(&self) -> usize {
        self.read_order.len()
    }
}

/// Render a search signature as template arguments: the set bit columns
/// in ascending order, e.g. `0b101` becomes `"<0,2>"`.
pub fn index_template(signature: SearchSignature) -> String {
    let mut out = String::from("<");
    let mut key = signature;
    let mut column = 0;
    let mut first = true;
    while key != 0 {
        if key & 1 != 0 {
            if !first {
                out.push(',');
            }
            write!(out, "{}", column).unwrap();
            first = false;
        }
        key >>= 1;
        column += 1;
    }
    out.push('>');
    out
}

/// Every relation an operation subtree can touch: scans, aggregates,
/// projections, and the existence checks of its conditions. One
/// operation context is allocated per entry. Order is first appearance.
pub fn referenced_relations(op: &Operation) -> Vec<Rc<Relation>> {
    let mut result: Vec<Rc<Relation>> = Vec::new();
    let mut add = |rel: &Rc<Relation>| {
        if !result.iter().any(|r| r.name() == rel.name()) {
            result.push(rel.clone());
        }
    };

    op.for_each_operation(&mut |op| match op {
        Operation::Scan { relation, .. }
        | Operation::ParallelScan { relation, .. }
        | Operation::IndexScan { relation, .. }
        | Operation::ParallelIndexScan { relation, .. }
        | Operation::Choice { relation, .. }
        | Operation::ParallelChoice { relation, .. }
        | Operation::IndexChoice { relation, .. }
        | Operation::ParallelIndexChoice { relation, .. }
        | Operation::Aggregate { relation, .. }
        | Operation::IndexAggregate { relation, .. }
        | Operation::Project { relation, .. } => add(relation),
        _ => {}
    });
    op.for_each_condition(&mut |cond| match cond {
        Condition::ExistenceCheck { relation, .. }
        | Condition::ProvenanceExistenceCheck { relation, .. } => add(relation),
        _ => {}
    });

    result
}
