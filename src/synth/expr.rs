//! Expression and condition emitter.
//!
//! Renders RAM values and conditions as C++ expressions — never
//! statements. Numeric literals are wrapped in their domain constructors
//! so arithmetic stays in the tagged domain; string operators route
//! through the generated program's symbol table and wrapper functions.

use crate::ram::{BinaryConstraintOp, Condition, Expression, FunctorOp};
use crate::synth::mint::index_template;
use crate::synth::ops::CodeEmitter;
use std::fmt::Write;

impl<'s, 'a> CodeEmitter<'s, 'a> {
    // -- conditions --

    pub(crate) fn emit_cond(&mut self, cond: &Condition, out: &mut String) {
        match cond {
            Condition::True => out.push_str("true"),
            Condition::False => out.push_str("false"),
            Condition::Conjunction(lhs, rhs) => {
                self.emit_cond(lhs, out);
                out.push_str(" && ");
                self.emit_cond(rhs, out);
            }
            Condition::Negation(operand) => {
                out.push_str("!(");
                self.emit_cond(operand, out);
                out.push(')');
            }
            Condition::Constraint { op, lhs, rhs } => self.emit_constraint(*op, lhs, rhs, out),
            Condition::EmptinessCheck(relation) => {
                let name = self.synth.mint.relation_name(relation);
                write!(out, "{}->empty()", name).unwrap();
            }
            Condition::ExistenceCheck { relation, values } => {
                let rel_name = self.synth.mint.relation_name(relation);
                let ctx = format!("READ_OP_CONTEXT({})", self.synth.mint.op_context_name(relation));
                let arity = relation.arity();
                assert!(arity > 0, "no existence check for nullary relations");

                // profiled builds count evaluations of non-temp checks
                let mut after = "";
                if self.synth.config.profiling() && !relation.is_temp() {
                    let idx = self.synth.mint.read_index(relation.name());
                    write!(out, "(reads[{}]++,", idx).unwrap();
                    after = ")";
                }

                // a fully bound check is a containment test
                if self.synth.unit.index_analysis().is_total_signature(relation, values) {
                    write!(out, "{}->contains(Tuple<RamDomain,{}>{{{{", rel_name, arity).unwrap();
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        self.emit_expr(value, out);
                    }
                    write!(out, "}}}},{}){}", ctx, after).unwrap();
                    return;
                }

                // otherwise a range query over the bound prefix
                let keys = self.synth.unit.index_analysis().search_signature(values);
                write!(
                    out,
                    "!{}->equalRange_{}(Tuple<RamDomain,{}>{{{{",
                    rel_name,
                    index_template(keys),
                    arity
                )
                .unwrap();
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    if !value.is_undef() {
                        self.emit_expr(value, out);
                    } else {
                        out.push('0');
                    }
                }
                write!(out, "}}}},{}).empty(){}", ctx, after).unwrap();
            }
            Condition::ProvenanceExistenceCheck { relation, values } => {
                self.emit_provenance_existence(relation, values, out);
            }
        }
    }

    fn emit_constraint(
        &mut self,
        op: BinaryConstraintOp,
        lhs: &Expression,
        rhs: &Expression,
        out: &mut String,
    ) {
        use BinaryConstraintOp::*;
        match op {
            Eq | Ne | Lt | Le | Gt | Ge | Ult | Ule | Ugt | Uge | Flt | Fle | Fgt | Fge => {
                let symbol = match op {
                    Eq => "==",
                    Ne => "!=",
                    Lt | Ult | Flt => "<",
                    Le | Ule | Fle => "<=",
                    Gt | Ugt | Fgt => ">",
                    Ge | Uge | Fge => ">=",
                    _ => unreachable!(),
                };
                out.push_str("((");
                self.emit_expr(lhs, out);
                write!(out, ") {} (", symbol).unwrap();
                self.emit_expr(rhs, out);
                out.push_str("))");
            }
            Match => {
                out.push_str("regex_wrapper(symTable.resolve(");
                self.emit_expr(lhs, out);
                out.push_str("),symTable.resolve(");
                self.emit_expr(rhs, out);
                out.push_str("))");
            }
            NotMatch => {
                out.push_str("!regex_wrapper(symTable.resolve(");
                self.emit_expr(lhs, out);
                out.push_str("),symTable.resolve(");
                self.emit_expr(rhs, out);
                out.push_str("))");
            }
            Contains => {
                out.push_str("(symTable.resolve(");
                self.emit_expr(rhs, out);
                out.push_str(").find(symTable.resolve(");
                self.emit_expr(lhs, out);
                out.push_str(")) != std::string::npos)");
            }
            NotContains => {
                out.push_str("(symTable.resolve(");
                self.emit_expr(rhs, out);
                out.push_str(").find(symTable.resolve(");
                self.emit_expr(lhs, out);
                out.push_str(")) == std::string::npos)");
            }
        }
    }

    /// Provenance checks range-query the data columns plus the rule
    /// number, then compare the stored height vector against the query's
    /// heights; the whole test stays an expression by way of an
    /// immediately-invoked closure.
    fn emit_provenance_existence(
        &mut self,
        relation: &std::rc::Rc<crate::relation::Relation>,
        values: &[Expression],
        out: &mut String,
    ) {
        let rel_name = self.synth.mint.relation_name(relation);
        let ctx = format!("READ_OP_CONTEXT({})", self.synth.mint.op_context_name(relation));
        let arity = relation.arity();
        let aux = relation.auxiliary_arity();
        let keys = self.synth.unit.index_analysis().provenance_signature(relation, values);

        out.push_str("[&]() -> bool {\n");
        write!(
            out,
            "auto existenceCheck = {}->equalRange_{}(Tuple<RamDomain,{}>{{{{",
            rel_name,
            index_template(keys),
            arity
        )
        .unwrap();
        // data columns plus rule number, heights zeroed
        for value in values.iter().take(values.len() - aux + 1) {
            if !value.is_undef() {
                self.emit_expr(value, out);
            } else {
                out.push('0');
            }
            out.push(',');
        }
        for _ in 0..aux.saturating_sub(2) {
            out.push_str("0,");
        }
        out.push('0');
        writeln!(out, "}}}},{});", ctx).unwrap();

        let level = arity - aux + 1;
        write!(
            out,
            "if (existenceCheck.empty()) return false; else return ((*existenceCheck.begin())[{}] <= ",
            level
        )
        .unwrap();
        self.emit_expr(&values[level], out);
        out.push(')');

        if aux > 2 {
            write!(out, " &&  !((*existenceCheck.begin())[{}] == ", level).unwrap();
            self.emit_expr(&values[level], out);
            out.push_str(" && (");

            write!(out, "(*existenceCheck.begin())[{}] > ", level + 1).unwrap();
            self.emit_expr(&values[level + 1], out);
            for i in (arity - aux + 3)..arity {
                out.push_str(" || (");
                for j in (arity - aux + 2)..i {
                    write!(out, "(*existenceCheck.begin())[{}] == ", j).unwrap();
                    self.emit_expr(&values[j], out);
                    out.push_str(" && ");
                }
                write!(out, "(*existenceCheck.begin())[{}] > ", i).unwrap();
                self.emit_expr(&values[i], out);
                out.push(')');
            }
            out.push_str("))");
        }
        out.push_str(";}()\n");
    }

    // -- values --

    pub(crate) fn emit_expr(&mut self, expr: &Expression, out: &mut String) {
        match expr {
            Expression::SignedConstant(value) => {
                write!(out, "RamSigned({})", value).unwrap();
            }
            Expression::UnsignedConstant(value) => {
                write!(out, "RamUnsigned({})", value).unwrap();
            }
            Expression::FloatConstant(value) => {
                write!(out, "RamFloat({})", value).unwrap();
            }
            Expression::TupleElement { tuple_id, element } => {
                write!(out, "env{}[{}]", tuple_id, element).unwrap();
            }
            Expression::AutoIncrement => out.push_str("(ctr++)"),
            Expression::Intrinsic { op, args } => self.emit_intrinsic(*op, args, out),
            Expression::UserDefined { name, type_sig, args } => {
                self.emit_user_defined(name, type_sig, args, out);
            }
            Expression::PackRecord(args) => {
                write!(out, "pack(ram::Tuple<RamDomain,{}>({{", args.len()).unwrap();
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.emit_expr(arg, out);
                }
                out.push_str("}))");
            }
            Expression::SubroutineArgument(index) => {
                write!(out, "(args)[{}]", index).unwrap();
            }
            Expression::Undef => panic!("undef value in value position"),
        }
    }

    fn emit_intrinsic(&mut self, op: FunctorOp, args: &[Expression], out: &mut String) {
        use FunctorOp::*;
        match op {
            Ord => self.emit_expr(&args[0], out),
            Strlen => {
                out.push_str("static_cast<RamDomain>(symTable.resolve(");
                self.emit_expr(&args[0], out);
                out.push_str(").size())");
            }
            Neg | Fneg => {
                out.push_str("(-(");
                self.emit_expr(&args[0], out);
                out.push_str("))");
            }
            Bnot | Ubnot => {
                out.push_str("(~(");
                self.emit_expr(&args[0], out);
                out.push_str("))");
            }
            Lnot | Ulnot => {
                out.push_str("(!(");
                self.emit_expr(&args[0], out);
                out.push_str("))");
            }
            Tostring => {
                out.push_str("symTable.lookup(std::to_string(");
                self.emit_expr(&args[0], out);
                out.push_str("))");
            }
            Tonumber => {
                out.push_str("(wrapper_tonumber(symTable.resolve((size_t)");
                self.emit_expr(&args[0], out);
                out.push_str(")))");
            }
            Itou | Ftou => {
                out.push_str("(static_cast<RamUnsigned>(");
                self.emit_expr(&args[0], out);
                out.push_str("))");
            }
            Utoi | Ftoi => {
                out.push_str("(static_cast<RamSigned>(");
                self.emit_expr(&args[0], out);
                out.push_str("))");
            }
            Itof | Utof => {
                out.push_str("(static_cast<RamFloat>(");
                self.emit_expr(&args[0], out);
                out.push_str("))");
            }
            Add | Fadd | Uadd => self.emit_binary(args, "+", out),
            Sub | Fsub | Usub => self.emit_binary(args, "-", out),
            Mul | Fmul | Umul => self.emit_binary(args, "*", out),
            Div | Fdiv | Udiv => self.emit_binary(args, "/", out),
            Exp | Fexp | Uexp => {
                // evaluate in 64 bits so a 32-bit domain cannot wrap
                out.push_str("static_cast<int64_t>(std::pow(");
                self.emit_expr(&args[0], out);
                out.push(',');
                self.emit_expr(&args[1], out);
                out.push_str("))");
            }
            Mod | Umod => self.emit_binary(args, "%", out),
            Band | Uband => self.emit_binary(args, "&", out),
            Bor | Ubor => self.emit_binary(args, "|", out),
            Bxor | Ubxor => self.emit_binary(args, "^", out),
            Land | Uland => self.emit_binary(args, "&&", out),
            Lor | Ulor => self.emit_binary(args, "||", out),
            Max | Umax | Fmax => {
                out.push_str("std::max({");
                for arg in args {
                    self.emit_expr(arg, out);
                    out.push_str(", ");
                }
                out.push_str("})");
            }
            Min | Umin | Fmin => {
                out.push_str("std::min({");
                for arg in args {
                    self.emit_expr(arg, out);
                    out.push_str(", ");
                }
                out.push_str("})");
            }
            Cat => {
                out.push_str("symTable.lookup(");
                for arg in &args[..args.len() - 1] {
                    out.push_str("symTable.resolve(");
                    self.emit_expr(arg, out);
                    out.push_str(") + ");
                }
                out.push_str("symTable.resolve(");
                self.emit_expr(&args[args.len() - 1], out);
                out.push_str("))");
            }
            Substr => {
                out.push_str("symTable.lookup(substr_wrapper(symTable.resolve(");
                self.emit_expr(&args[0], out);
                out.push_str("),(");
                self.emit_expr(&args[1], out);
                out.push_str("),(");
                self.emit_expr(&args[2], out);
                out.push_str(")))");
            }
        }
    }

    fn emit_binary(&mut self, args: &[Expression], symbol: &str, out: &mut String) {
        out.push('(');
        self.emit_expr(&args[0], out);
        write!(out, ") {} (", symbol).unwrap();
        self.emit_expr(&args[1], out);
        out.push(')');
    }

    /// External operator call. Symbol arguments are resolved to C
    /// strings, numeric arguments pass as domain values, and a symbol
    /// return value is re-interned.
    fn emit_user_defined(
        &mut self,
        name: &str,
        type_sig: &str,
        args: &[Expression],
        out: &mut String,
    ) {
        let kinds: Vec<char> = type_sig.chars().collect();
        let arity = kinds.len() - 1;

        if kinds[arity] == 'S' {
            out.push_str("symTable.lookup(");
        }
        write!(out, "{}(", name).unwrap();
        for i in 0..arity {
            if i > 0 {
                out.push(',');
            }
            if kinds[i] == 'N' {
                out.push_str("((RamDomain)");
                self.emit_expr(&args[i], out);
                out.push(')');
            } else {
                out.push_str("symTable.resolve((RamDomain)");
                self.emit_expr(&args[i], out);
                out.push_str(").c_str()");
            }
        }
        out.push(')');
        if kinds[arity] == 'S' {
            out.push(')');
        }
    }
}
