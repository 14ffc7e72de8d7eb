//! RAM intermediate representation.
//!
//! The relational-algebra machine is the evaluation plan produced by the
//! Datalog-to-RAM lowering. Each node family is one tagged enum:
//! [`Statement`] for control flow and relation management, [`Operation`]
//! for nested-loop tuple processing, [`Condition`] for boolean terms, and
//! [`Expression`] for values. Abstract groupings of the node hierarchy
//! (nested operations, parallel operations) are accessors and predicates
//! on the enums instead of base classes.

use crate::relation::{IoDirectives, Relation};
use ordered_float::OrderedFloat;
use std::rc::Rc;

/// Loop variable index introduced by a tuple-introducing operation.
pub type TupleId = u32;

/// Bitmask over attribute columns bound by an index lookup.
pub type SearchSignature = u64;

/// Aggregation function of an (index-)aggregate operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFunction {
    Min,
    Max,
    Count,
    Sum,
}

/// Intrinsic value operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctorOp {
    // unary
    Ord,
    Strlen,
    Neg,
    Fneg,
    Bnot,
    Ubnot,
    Lnot,
    Ulnot,
    Tonumber,
    Tostring,
    // type conversions
    Itou,
    Itof,
    Utoi,
    Utof,
    Ftoi,
    Ftou,
    // binary arithmetic
    Add,
    Fadd,
    Uadd,
    Sub,
    Fsub,
    Usub,
    Mul,
    Fmul,
    Umul,
    Div,
    Fdiv,
    Udiv,
    Exp,
    Fexp,
    Uexp,
    Mod,
    Umod,
    Band,
    Uband,
    Bor,
    Ubor,
    Bxor,
    Ubxor,
    Land,
    Uland,
    Lor,
    Ulor,
    // variadic
    Max,
    Umax,
    Fmax,
    Min,
    Umin,
    Fmin,
    Cat,
    // ternary
    Substr,
}

/// Binary constraint operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryConstraintOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Ult,
    Ule,
    Ugt,
    Uge,
    Flt,
    Fle,
    Fgt,
    Fge,
    Match,
    NotMatch,
    Contains,
    NotContains,
}

/// A RAM value expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    SignedConstant(i64),
    UnsignedConstant(u64),
    FloatConstant(OrderedFloat<f64>),
    /// `env<tuple_id>[element]`
    TupleElement { tuple_id: TupleId, element: usize },
    AutoIncrement,
    Intrinsic { op: FunctorOp, args: Vec<Expression> },
    /// External operator; `type_sig` holds one kind character per
    /// argument followed by the return kind, each `N` or `S`.
    UserDefined {
        name: String,
        type_sig: String,
        args: Vec<Expression>,
    },
    PackRecord(Vec<Expression>),
    SubroutineArgument(usize),
    /// Unbound position of a range pattern. A synthesis-time error in any
    /// value position.
    Undef,
}

impl Expression {
    pub fn signed(value: i64) -> Self {
        Expression::SignedConstant(value)
    }

    pub fn float(value: f64) -> Self {
        Expression::FloatConstant(OrderedFloat(value))
    }

    pub fn tuple_element(tuple_id: TupleId, element: usize) -> Self {
        Expression::TupleElement { tuple_id, element }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Expression::Undef)
    }

    /// Pre-order walk over this expression tree.
    pub fn for_each(&self, f: &mut impl FnMut(&Expression)) {
        f(self);
        match self {
            Expression::Intrinsic { args, .. }
            | Expression::UserDefined { args, .. }
            | Expression::PackRecord(args) => {
                for arg in args {
                    arg.for_each(f);
                }
            }
            _ => {}
        }
    }
}

/// A RAM condition.
#[derive(Clone, Debug)]
pub enum Condition {
    True,
    False,
    Conjunction(Box<Condition>, Box<Condition>),
    Negation(Box<Condition>),
    Constraint {
        op: BinaryConstraintOp,
        lhs: Expression,
        rhs: Expression,
    },
    EmptinessCheck(Rc<Relation>),
    ExistenceCheck {
        relation: Rc<Relation>,
        values: Vec<Expression>,
    },
    ProvenanceExistenceCheck {
        relation: Rc<Relation>,
        values: Vec<Expression>,
    },
}

impl Condition {
    pub fn and(lhs: Condition, rhs: Condition) -> Self {
        Condition::Conjunction(Box::new(lhs), Box::new(rhs))
    }

    pub fn not(operand: Condition) -> Self {
        Condition::Negation(Box::new(operand))
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Condition::True)
    }

    /// Flatten nested conjunctions into a list of conjunct terms.
    pub fn conjuncts(&self) -> Vec<&Condition> {
        let mut terms = Vec::new();
        self.collect_conjuncts(&mut terms);
        terms
    }

    fn collect_conjuncts<'a>(&'a self, terms: &mut Vec<&'a Condition>) {
        if let Condition::Conjunction(lhs, rhs) = self {
            lhs.collect_conjuncts(terms);
            rhs.collect_conjuncts(terms);
        } else {
            terms.push(self);
        }
    }

    /// Whether any subterm is an existence check (and so needs an
    /// operation context to evaluate).
    pub fn mentions_existence_check(&self) -> bool {
        let mut found = false;
        self.for_each_condition(&mut |c| {
            if matches!(c, Condition::ExistenceCheck { .. }) {
                found = true;
            }
        });
        found
    }

    /// Pre-order walk over this condition tree.
    pub fn for_each_condition(&self, f: &mut impl FnMut(&Condition)) {
        f(self);
        match self {
            Condition::Conjunction(lhs, rhs) => {
                lhs.for_each_condition(f);
                rhs.for_each_condition(f);
            }
            Condition::Negation(operand) => operand.for_each_condition(f),
            _ => {}
        }
    }

    /// Walk every expression appearing in this condition.
    pub fn for_each_expression(&self, f: &mut impl FnMut(&Expression)) {
        self.for_each_condition(&mut |c| match c {
            Condition::Constraint { lhs, rhs, .. } => {
                lhs.for_each(f);
                rhs.for_each(f);
            }
            Condition::ExistenceCheck { values, .. }
            | Condition::ProvenanceExistenceCheck { values, .. } => {
                for v in values {
                    v.for_each(f);
                }
            }
            _ => {}
        });
    }
}

/// A RAM operation: one level of a nested-loop evaluation plan.
///
/// Tuple-introducing operations bind `env<tuple_id>`; their `nested`
/// field is the loop body. `profile_text` keys the frequency counter a
/// profiled build increments after the body.
#[derive(Clone, Debug)]
pub enum Operation {
    Scan {
        relation: Rc<Relation>,
        tuple_id: TupleId,
        nested: Box<Operation>,
        profile_text: String,
    },
    ParallelScan {
        relation: Rc<Relation>,
        tuple_id: TupleId,
        nested: Box<Operation>,
        profile_text: String,
    },
    IndexScan {
        relation: Rc<Relation>,
        tuple_id: TupleId,
        /// One entry per column; `Expression::Undef` marks unbound.
        pattern: Vec<Expression>,
        nested: Box<Operation>,
        profile_text: String,
    },
    ParallelIndexScan {
        relation: Rc<Relation>,
        tuple_id: TupleId,
        pattern: Vec<Expression>,
        nested: Box<Operation>,
        profile_text: String,
    },
    Choice {
        relation: Rc<Relation>,
        tuple_id: TupleId,
        condition: Condition,
        nested: Box<Operation>,
        profile_text: String,
    },
    ParallelChoice {
        relation: Rc<Relation>,
        tuple_id: TupleId,
        condition: Condition,
        nested: Box<Operation>,
        profile_text: String,
    },
    IndexChoice {
        relation: Rc<Relation>,
        tuple_id: TupleId,
        pattern: Vec<Expression>,
        condition: Condition,
        nested: Box<Operation>,
        profile_text: String,
    },
    ParallelIndexChoice {
        relation: Rc<Relation>,
        tuple_id: TupleId,
        pattern: Vec<Expression>,
        condition: Condition,
        nested: Box<Operation>,
        profile_text: String,
    },
    Aggregate {
        function: AggregateFunction,
        relation: Rc<Relation>,
        tuple_id: TupleId,
        condition: Condition,
        expression: Expression,
        nested: Box<Operation>,
        profile_text: String,
    },
    IndexAggregate {
        function: AggregateFunction,
        relation: Rc<Relation>,
        tuple_id: TupleId,
        pattern: Vec<Expression>,
        condition: Condition,
        expression: Expression,
        nested: Box<Operation>,
        profile_text: String,
    },
    UnpackRecord {
        expression: Expression,
        arity: usize,
        tuple_id: TupleId,
        nested: Box<Operation>,
        profile_text: String,
    },
    Filter {
        condition: Condition,
        nested: Box<Operation>,
        profile_text: String,
    },
    Break {
        condition: Condition,
        nested: Box<Operation>,
        profile_text: String,
    },
    Project {
        relation: Rc<Relation>,
        values: Vec<Expression>,
    },
    /// Leaf of a subroutine body: append values to the shared return
    /// vector under the subroutine's lock.
    SubroutineReturn { values: Vec<Expression> },
}

impl Operation {
    /// The nested operation of a non-leaf node.
    pub fn nested(&self) -> Option<&Operation> {
        match self {
            Operation::Scan { nested, .. }
            | Operation::ParallelScan { nested, .. }
            | Operation::IndexScan { nested, .. }
            | Operation::ParallelIndexScan { nested, .. }
            | Operation::Choice { nested, .. }
            | Operation::ParallelChoice { nested, .. }
            | Operation::IndexChoice { nested, .. }
            | Operation::ParallelIndexChoice { nested, .. }
            | Operation::Aggregate { nested, .. }
            | Operation::IndexAggregate { nested, .. }
            | Operation::UnpackRecord { nested, .. }
            | Operation::Filter { nested, .. }
            | Operation::Break { nested, .. } => Some(nested),
            Operation::Project { .. } | Operation::SubroutineReturn { .. } => None,
        }
    }

    /// Profile counter key of a nested operation, if non-empty.
    pub fn profile_text(&self) -> Option<&str> {
        let text = match self {
            Operation::Scan { profile_text, .. }
            | Operation::ParallelScan { profile_text, .. }
            | Operation::IndexScan { profile_text, .. }
            | Operation::ParallelIndexScan { profile_text, .. }
            | Operation::Choice { profile_text, .. }
            | Operation::ParallelChoice { profile_text, .. }
            | Operation::IndexChoice { profile_text, .. }
            | Operation::ParallelIndexChoice { profile_text, .. }
            | Operation::Aggregate { profile_text, .. }
            | Operation::IndexAggregate { profile_text, .. }
            | Operation::UnpackRecord { profile_text, .. }
            | Operation::Filter { profile_text, .. }
            | Operation::Break { profile_text, .. } => profile_text,
            Operation::Project { .. } | Operation::SubroutineReturn { .. } => return None,
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// The loop variable introduced by this operation, if any.
    pub fn tuple_id(&self) -> Option<TupleId> {
        match self {
            Operation::Scan { tuple_id, .. }
            | Operation::ParallelScan { tuple_id, .. }
            | Operation::IndexScan { tuple_id, .. }
            | Operation::ParallelIndexScan { tuple_id, .. }
            | Operation::Choice { tuple_id, .. }
            | Operation::ParallelChoice { tuple_id, .. }
            | Operation::IndexChoice { tuple_id, .. }
            | Operation::ParallelIndexChoice { tuple_id, .. }
            | Operation::Aggregate { tuple_id, .. }
            | Operation::IndexAggregate { tuple_id, .. }
            | Operation::UnpackRecord { tuple_id, .. } => Some(*tuple_id),
            _ => None,
        }
    }

    /// Whether this node itself is a parallel operation.
    pub fn is_parallel(&self) -> bool {
        matches!(
            self,
            Operation::ParallelScan { .. }
                | Operation::ParallelIndexScan { .. }
                | Operation::ParallelChoice { .. }
                | Operation::ParallelIndexChoice { .. }
        )
    }

    /// Whether any operation in this subtree is parallel.
    pub fn has_parallel(&self) -> bool {
        let mut found = false;
        self.for_each_operation(&mut |op| {
            if op.is_parallel() {
                found = true;
            }
        });
        found
    }

    /// Pre-order walk over this operation tree.
    pub fn for_each_operation(&self, f: &mut impl FnMut(&Operation)) {
        f(self);
        if let Some(nested) = self.nested() {
            nested.for_each_operation(f);
        }
    }

    /// Walk every condition attached to operations of this subtree.
    pub fn for_each_condition(&self, f: &mut impl FnMut(&Condition)) {
        self.for_each_operation(&mut |op| match op {
            Operation::Choice { condition, .. }
            | Operation::ParallelChoice { condition, .. }
            | Operation::IndexChoice { condition, .. }
            | Operation::ParallelIndexChoice { condition, .. }
            | Operation::Aggregate { condition, .. }
            | Operation::IndexAggregate { condition, .. }
            | Operation::Filter { condition, .. }
            | Operation::Break { condition, .. } => condition.for_each_condition(f),
            _ => {}
        });
    }

    /// Walk every expression of this subtree, including range patterns,
    /// condition operands, and projected values.
    pub fn for_each_expression(&self, f: &mut impl FnMut(&Expression)) {
        self.for_each_operation(&mut |op| {
            match op {
                Operation::IndexScan { pattern, .. }
                | Operation::ParallelIndexScan { pattern, .. }
                | Operation::IndexChoice { pattern, .. }
                | Operation::ParallelIndexChoice { pattern, .. }
                | Operation::IndexAggregate { pattern, .. } => {
                    for v in pattern {
                        v.for_each(f);
                    }
                }
                Operation::UnpackRecord { expression, .. } => expression.for_each(f),
                Operation::Project { values, .. } | Operation::SubroutineReturn { values } => {
                    for v in values {
                        v.for_each(f);
                    }
                }
                _ => {}
            }
            match op {
                Operation::Aggregate { expression, .. }
                | Operation::IndexAggregate { expression, .. } => expression.for_each(f),
                _ => {}
            }
        });
        self.for_each_condition(&mut |c| c.for_each_expression(f));
    }
}

/// A RAM statement.
#[derive(Clone, Debug)]
pub enum Statement {
    Sequence(Vec<Statement>),
    /// Parallel statement sections; distinct from parallel operations.
    Parallel(Vec<Statement>),
    Loop(Box<Statement>),
    Exit(Condition),
    Swap {
        first: Rc<Relation>,
        second: Rc<Relation>,
    },
    Extend {
        source: Rc<Relation>,
        target: Rc<Relation>,
    },
    Clear(Rc<Relation>),
    Load {
        relation: Rc<Relation>,
        directives: Vec<IoDirectives>,
    },
    Store {
        relation: Rc<Relation>,
        directives: Vec<IoDirectives>,
    },
    LogSize {
        relation: Rc<Relation>,
        message: String,
    },
    LogTimer {
        message: String,
        body: Box<Statement>,
    },
    LogRelationTimer {
        relation: Rc<Relation>,
        message: String,
        body: Box<Statement>,
    },
    DebugInfo {
        message: String,
        body: Box<Statement>,
    },
    Query(Operation),
}

impl Statement {
    /// Pre-order walk over this statement tree.
    pub fn for_each_statement(&self, f: &mut impl FnMut(&Statement)) {
        f(self);
        match self {
            Statement::Sequence(stmts) | Statement::Parallel(stmts) => {
                for s in stmts {
                    s.for_each_statement(f);
                }
            }
            Statement::Loop(body)
            | Statement::LogTimer { body, .. }
            | Statement::LogRelationTimer { body, .. }
            | Statement::DebugInfo { body, .. } => body.for_each_statement(f),
            _ => {}
        }
    }

    /// Walk every operation under every query of this statement tree.
    pub fn for_each_operation(&self, f: &mut impl FnMut(&Operation)) {
        self.for_each_statement(&mut |s| {
            if let Statement::Query(op) = s {
                op.for_each_operation(f);
            }
        });
    }

    /// Walk every expression of this statement tree, including those of
    /// exit conditions and query operations.
    pub fn for_each_expression(&self, f: &mut impl FnMut(&Expression)) {
        self.for_each_statement(&mut |s| match s {
            Statement::Query(op) => op.for_each_expression(f),
            Statement::Exit(cond) => cond.for_each_expression(f),
            _ => {}
        });
    }
}
