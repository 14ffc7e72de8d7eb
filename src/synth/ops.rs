//! Operation and statement emitter.
//!
//! Walks a RAM statement tree and emits the C++ statement blocks that
//! evaluate it: nested loops introducing `env<tuple_id>` bindings, query
//! framing with per-relation operation contexts, and the fork-join
//! scaffolding for parallel loops. Conditions and values are delegated
//! to the expression emitter.
//!
//! The emitter owns the per-query preamble buffer: context-creation
//! statements accumulate there and are flushed either at closure entry
//! (sequential queries) or inside the parallel region (so each worker
//! builds its own contexts). The `preamble_issued` flag enforces at most
//! one parallelised outer loop per query.

use crate::ram::{AggregateFunction, Condition, Expression, Operation, Statement};
use crate::relation::Relation;
use crate::synth::generate::Synthesiser;
use crate::synth::mint::{index_template, referenced_relations};
use std::fmt::Write;

pub(crate) struct CodeEmitter<'s, 'a> {
    pub(crate) synth: &'s mut Synthesiser<'a>,
    preamble: String,
    preamble_issued: bool,
}

/// Attribute kind mask rendered into reader/writer construction.
pub(crate) fn symbol_mask(relation: &Relation) -> String {
    let mut parts = Vec::with_capacity(relation.arity());
    for ty in relation.attribute_types() {
        let kind = match ty.chars().next() {
            Some('s') => "RamTypeAttribute::Symbol",
            Some('f') => "RamTypeAttribute::Float",
            Some('u') => "RamTypeAttribute::Unsigned",
            _ => "RamTypeAttribute::Signed",
        };
        parts.push(kind);
    }
    parts.join(",")
}

impl<'s, 'a> CodeEmitter<'s, 'a> {
    pub(crate) fn new(synth: &'s mut Synthesiser<'a>) -> Self {
        CodeEmitter {
            synth,
            preamble: String::new(),
            preamble_issued: false,
        }
    }

    pub(crate) fn begin_comment(&self, out: &mut String, rule: &str) {
        if self.synth.config.debug_report || self.synth.config.verbose {
            writeln!(out, "/* BEGIN {} */", rule).unwrap();
        }
    }

    pub(crate) fn end_comment(&self, out: &mut String, rule: &str) {
        if self.synth.config.debug_report || self.synth.config.verbose {
            writeln!(out, "/* END {} */", rule).unwrap();
        }
    }

    // -- statements --

    pub(crate) fn emit_stmt(&mut self, stmt: &Statement, out: &mut String) {
        match stmt {
            Statement::Sequence(stmts) => {
                self.begin_comment(out, "sequence");
                for cur in stmts {
                    self.emit_stmt(cur, out);
                }
                self.end_comment(out, "sequence");
            }
            Statement::Parallel(stmts) => self.emit_parallel(stmts, out),
            Statement::Loop(body) => {
                self.begin_comment(out, "loop");
                out.push_str("iter = 0;\n");
                out.push_str("for(;;) {\n");
                self.emit_stmt(body, out);
                out.push_str("iter++;\n");
                out.push_str("}\n");
                out.push_str("iter = 0;\n");
                self.end_comment(out, "loop");
            }
            Statement::Exit(condition) => {
                self.begin_comment(out, "exit");
                out.push_str("if(");
                self.emit_cond(condition, out);
                out.push_str(") break;\n");
                self.end_comment(out, "exit");
            }
            Statement::Swap { first, second } => {
                self.begin_comment(out, "swap");
                let delta = self.synth.mint.relation_name(first);
                let new = self.synth.mint.relation_name(second);
                writeln!(out, "std::swap({}, {});", delta, new).unwrap();
                self.end_comment(out, "swap");
            }
            Statement::Extend { source, target } => {
                self.begin_comment(out, "extend");
                let src = self.synth.mint.relation_name(source);
                let tgt = self.synth.mint.relation_name(target);
                writeln!(out, "{}->extend(*{});", src, tgt).unwrap();
                self.end_comment(out, "extend");
            }
            Statement::Clear(relation) => {
                self.begin_comment(out, "clear");
                out.push_str("if (!isHintsProfilingEnabled()");
                out.push_str(if relation.is_temp() { ") " } else { "&& performIO) " });
                let name = self.synth.mint.relation_name(relation);
                writeln!(out, "{}->purge();", name).unwrap();
                self.end_comment(out, "clear");
            }
            Statement::Load { relation, directives } => {
                self.begin_comment(out, "load");
                out.push_str("if (performIO) {\n");
                for io in directives {
                    out.push_str("try {");
                    writeln!(out, "std::map<std::string, std::string> directiveMap({});", io)
                        .unwrap();
                    out.push_str(
                        "if (!inputDirectory.empty() && directiveMap[\"IO\"] == \"file\" && \
                         directiveMap[\"filename\"].front() != '/') {",
                    );
                    out.push_str(
                        "directiveMap[\"filename\"] = inputDirectory + \"/\" + directiveMap[\"filename\"];",
                    );
                    out.push_str("}\n");
                    out.push_str("IODirectives ioDirectives(directiveMap);\n");
                    out.push_str("IOSystem::getInstance().getReader(");
                    write!(out, "std::vector<RamTypeAttribute>({{{}}})", symbol_mask(relation))
                        .unwrap();
                    out.push_str(", symTable, ioDirectives");
                    write!(out, ", {}", relation.auxiliary_arity()).unwrap();
                    let name = self.synth.mint.relation_name(relation);
                    writeln!(out, ")->readAll(*{});", name).unwrap();
                    out.push_str(
                        "} catch (std::exception& e) {std::cerr << \"Error loading data: \" << e.what() << '\\n';}\n",
                    );
                }
                out.push_str("}\n");
                self.end_comment(out, "load");
            }
            Statement::Store { relation, directives } => {
                self.begin_comment(out, "store");
                out.push_str("if (performIO) {\n");
                for io in directives {
                    out.push_str("try {");
                    writeln!(out, "std::map<std::string, std::string> directiveMap({});", io)
                        .unwrap();
                    out.push_str(
                        "if (!outputDirectory.empty() && directiveMap[\"IO\"] == \"file\" && \
                         directiveMap[\"filename\"].front() != '/') {",
                    );
                    out.push_str(
                        "directiveMap[\"filename\"] = outputDirectory + \"/\" + directiveMap[\"filename\"];",
                    );
                    out.push_str("}\n");
                    out.push_str("IODirectives ioDirectives(directiveMap);\n");
                    out.push_str("IOSystem::getInstance().getWriter(");
                    write!(out, "std::vector<RamTypeAttribute>({{{}}})", symbol_mask(relation))
                        .unwrap();
                    out.push_str(", symTable, ioDirectives");
                    write!(out, ", {}", relation.auxiliary_arity()).unwrap();
                    let name = self.synth.mint.relation_name(relation);
                    writeln!(out, ")->writeAll(*{});", name).unwrap();
                    out.push_str("} catch (std::exception& e) {std::cerr << e.what();exit(1);}\n");
                }
                out.push_str("}\n");
                self.end_comment(out, "store");
            }
            Statement::LogSize { relation, message } => {
                self.begin_comment(out, "log-size");
                let name = self.synth.mint.relation_name(relation);
                write!(
                    out,
                    "ProfileEventSingleton::instance().makeQuantityEvent( R\"({})\",{}->size(),iter);",
                    message, name
                )
                .unwrap();
                self.end_comment(out, "log-size");
            }
            Statement::LogTimer { message, body } => {
                self.begin_comment(out, "log-timer");
                out.push_str("{\n");
                writeln!(out, "\tLogger logger(R\"_({})_\",iter);", message).unwrap();
                self.emit_stmt(body, out);
                out.push_str("}\n");
                self.end_comment(out, "log-timer");
            }
            Statement::LogRelationTimer { relation, message, body } => {
                self.begin_comment(out, "log-relation-timer");
                out.push_str("{\n");
                let name = self.synth.mint.relation_name(relation);
                writeln!(
                    out,
                    "\tLogger logger(R\"_({})_\",iter, [&](){{return {}->size();}});",
                    message, name
                )
                .unwrap();
                self.emit_stmt(body, out);
                out.push_str("}\n");
                self.end_comment(out, "log-relation-timer");
            }
            Statement::DebugInfo { message, body } => {
                self.begin_comment(out, "debug-info");
                writeln!(out, "SignalHandler::instance()->setMsg(R\"_({})_\");", message).unwrap();
                self.emit_stmt(body, out);
                self.end_comment(out, "debug-info");
            }
            Statement::Query(op) => self.emit_query(op, out),
        }
    }

    fn emit_parallel(&mut self, stmts: &[Statement], out: &mut String) {
        self.begin_comment(out, "parallel");

        if stmts.is_empty() {
            self.end_comment(out, "parallel");
            return;
        }

        // a single statement saves the sections overhead
        if stmts.len() == 1 {
            self.emit_stmt(&stmts[0], out);
            self.end_comment(out, "parallel");
            return;
        }

        out.push_str("SECTIONS_START;\n");
        for cur in stmts {
            out.push_str("SECTION_START;\n");
            self.emit_stmt(cur, out);
            out.push_str("SECTION_END\n");
        }
        out.push_str("SECTIONS_END;\n");
        self.end_comment(out, "parallel");
    }

    // -- query framing --

    fn emit_query(&mut self, op: &Operation, out: &mut String) {
        self.begin_comment(out, "query");

        // split the terms of an outer filter into those needing an
        // operation context and those evaluable before contexts exist
        let mut next: &Operation = op;
        let mut require_ctx: Vec<&Condition> = Vec::new();
        let mut free_of_ctx: Vec<&Condition> = Vec::new();
        if let Operation::Filter { condition, nested, .. } = op {
            next = nested.as_ref();
            for cur in condition.conjuncts() {
                if cur.mentions_existence_check() {
                    require_ctx.push(cur);
                } else {
                    free_of_ctx.push(cur);
                }
            }
            // discharge conditions that do not require a context
            if !free_of_ctx.is_empty() {
                out.push_str("if(");
                self.emit_conjunction(&free_of_ctx, out);
                out.push_str(") {\n");
            }
        }

        // outline each search operation to improve compilation time
        out.push_str("[&]()");
        out.push_str("{\n");

        let is_parallel = next.has_parallel();

        self.preamble.clear();
        self.preamble_issued = false;

        let mut preamble = String::new();
        for rel in referenced_relations(op) {
            let ctxt = self.synth.mint.op_context_name(&rel);
            let name = self.synth.mint.relation_name(&rel);
            writeln!(preamble, "CREATE_OP_CONTEXT({},{}->createContext());", ctxt, name).unwrap();
        }

        if is_parallel {
            // the outermost parallel operation consumes the preamble, so
            // the context-requiring guard must travel with it
            if !require_ctx.is_empty() {
                preamble.push_str("if(");
                self.emit_conjunction(&require_ctx, &mut preamble);
                preamble.push_str(") {\n");
                self.preamble = preamble;
                self.emit_op(next, out);
                out.push_str("}\n");
            } else {
                self.preamble = preamble;
                self.emit_op(next, out);
            }
        } else {
            out.push_str(&preamble);
            if !require_ctx.is_empty() {
                out.push_str("if(");
                self.emit_conjunction(&require_ctx, out);
                out.push_str(") {\n");
                self.emit_op(next, out);
                out.push_str("}\n");
            } else {
                self.emit_op(next, out);
            }
        }

        if is_parallel {
            out.push_str("PARALLEL_END;\n");
        }

        out.push_str("}\n");
        out.push_str("();");

        if !free_of_ctx.is_empty() {
            out.push_str("}\n");
        }

        self.end_comment(out, "query");
    }

    pub(crate) fn emit_conjunction(&mut self, terms: &[&Condition], out: &mut String) {
        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                out.push_str(" && ");
            }
            self.emit_cond(term, out);
        }
    }

    // -- operations --

    /// Body of a nested operation plus its frequency counter increment.
    fn emit_nested(&mut self, op: &Operation, out: &mut String) {
        if let Some(nested) = op.nested() {
            self.emit_op(nested, out);
        }
        if self.synth.config.profiling() {
            if let Some(text) = op.profile_text() {
                let idx = self.synth.mint.freq_index(text);
                writeln!(out, "freqs[{}]++;", idx).unwrap();
            }
        }
    }

    /// Key tuple body for an index lookup: one entry per column, bound
    /// positions as expressions and unbound positions as `0`.
    fn emit_key_tuple(&mut self, pattern: &[Expression], out: &mut String) {
        for (i, value) in pattern.iter().enumerate() {
            if !value.is_undef() {
                self.emit_expr(value, out);
            } else {
                out.push('0');
            }
            if i + 1 < pattern.len() {
                out.push(',');
            }
        }
    }

    fn emit_op(&mut self, op: &Operation, out: &mut String) {
        match op {
            Operation::Scan { relation, tuple_id, .. } => {
                let rel_name = self.synth.mint.relation_name(relation);
                assert!(relation.arity() > 0, "no scans for nullary relations");

                self.begin_comment(out, "scan");
                writeln!(out, "for(const auto& env{} : *{}) {{", tuple_id, rel_name).unwrap();
                self.emit_nested(op, out);
                out.push_str("}\n");
                self.end_comment(out, "scan");
            }
            Operation::ParallelScan { relation, tuple_id, .. } => {
                let rel_name = self.synth.mint.relation_name(relation);

                assert!(*tuple_id == 0, "parallel scan must be the outer-most loop");
                assert!(relation.arity() > 0, "no parallel scans for nullary relations");
                assert!(!self.preamble_issued, "only the first loop can be made parallel");
                self.preamble_issued = true;

                self.begin_comment(out, "parallel-scan");
                writeln!(out, "auto part = {}->partition();", rel_name).unwrap();
                out.push_str("PARALLEL_START;\n");
                out.push_str(&self.preamble);
                out.push_str("pfor(auto it = part.begin(); it<part.end();++it){\n");
                out.push_str("try{\n");
                out.push_str("for(const auto& env0 : *it) {\n");
                self.emit_nested(op, out);
                out.push_str("}\n");
                out.push_str("} catch(std::exception &e) { SignalHandler::instance()->error(e.what());}\n");
                out.push_str("}\n");
                self.end_comment(out, "parallel-scan");
            }
            Operation::IndexScan { relation, tuple_id, pattern, .. } => {
                let rel_name = self.synth.mint.relation_name(relation);
                let arity = relation.arity();
                let keys = self.synth.unit.index_analysis().search_signature(pattern);

                assert!(arity > 0, "no index scans for nullary relations");

                self.begin_comment(out, "index-scan");
                write!(out, "const Tuple<RamDomain,{}> key{{{{", arity).unwrap();
                self.emit_key_tuple(pattern, out);
                out.push_str("}};\n");

                let ctx = format!("READ_OP_CONTEXT({})", self.synth.mint.op_context_name(relation));
                writeln!(
                    out,
                    "auto range = {}->equalRange_{}(key,{});",
                    rel_name,
                    index_template(keys),
                    ctx
                )
                .unwrap();
                writeln!(out, "for(const auto& env{} : range) {{", tuple_id).unwrap();
                self.emit_nested(op, out);
                out.push_str("}\n");
                self.end_comment(out, "index-scan");
            }
            Operation::ParallelIndexScan { relation, tuple_id, pattern, .. } => {
                let rel_name = self.synth.mint.relation_name(relation);
                let arity = relation.arity();
                let keys = self.synth.unit.index_analysis().search_signature(pattern);

                assert!(*tuple_id == 0, "parallel index scan must be the outer-most loop");
                assert!(arity > 0, "no parallel index scans for nullary relations");
                assert!(!self.preamble_issued, "only the first loop can be made parallel");
                self.preamble_issued = true;

                self.begin_comment(out, "parallel-index-scan");
                write!(out, "const Tuple<RamDomain,{}> key{{{{", arity).unwrap();
                self.emit_key_tuple(pattern, out);
                out.push_str("}};\n");
                // TODO (index analysis): the operation context may be missing here
                writeln!(
                    out,
                    "auto range = {}->equalRange_{}(key);",
                    rel_name,
                    index_template(keys)
                )
                .unwrap();
                out.push_str("auto part = range.partition();\n");
                out.push_str("PARALLEL_START;\n");
                out.push_str(&self.preamble);
                out.push_str("pfor(auto it = part.begin(); it<part.end(); ++it) {\n");
                out.push_str("try{\n");
                out.push_str("for(const auto& env0 : *it) {\n");
                self.emit_nested(op, out);
                out.push_str("}\n");
                out.push_str("} catch(std::exception &e) { SignalHandler::instance()->error(e.what());}\n");
                out.push_str("}\n");
                self.end_comment(out, "parallel-index-scan");
            }
            Operation::Choice { relation, tuple_id, condition, .. } => {
                let rel_name = self.synth.mint.relation_name(relation);

                assert!(relation.arity() > 0, "no choice for nullary relations");

                self.begin_comment(out, "choice");
                writeln!(out, "for(const auto& env{} : *{}) {{", tuple_id, rel_name).unwrap();
                out.push_str("if( ");
                self.emit_cond(condition, out);
                out.push_str(") {\n");
                self.emit_nested(op, out);
                out.push_str("break;\n");
                out.push_str("}\n");
                out.push_str("}\n");
                self.end_comment(out, "choice");
            }
            Operation::ParallelChoice { relation, tuple_id, condition, .. } => {
                let rel_name = self.synth.mint.relation_name(relation);

                assert!(*tuple_id == 0, "parallel choice must be the outer-most loop");
                assert!(relation.arity() > 0, "no parallel choice for nullary relations");
                assert!(!self.preamble_issued, "only the first loop can be made parallel");
                self.preamble_issued = true;

                self.begin_comment(out, "parallel-choice");
                writeln!(out, "auto part = {}->partition();", rel_name).unwrap();
                out.push_str("PARALLEL_START;\n");
                out.push_str(&self.preamble);
                out.push_str("pfor(auto it = part.begin(); it<part.end();++it){\n");
                out.push_str("try{\n");
                out.push_str("for(const auto& env0 : *it) {\n");
                out.push_str("if( ");
                self.emit_cond(condition, out);
                out.push_str(") {\n");
                self.emit_nested(op, out);
                out.push_str("break;\n");
                out.push_str("}\n");
                out.push_str("}\n");
                out.push_str("} catch(std::exception &e) { SignalHandler::instance()->error(e.what());}\n");
                out.push_str("}\n");
                self.end_comment(out, "parallel-choice");
            }
            Operation::IndexChoice { relation, tuple_id, pattern, condition, .. } => {
                self.begin_comment(out, "index-choice");
                let rel_name = self.synth.mint.relation_name(relation);
                let arity = relation.arity();
                let keys = self.synth.unit.index_analysis().search_signature(pattern);

                assert!(arity > 0, "no index choice for nullary relations");

                write!(out, "const Tuple<RamDomain,{}> key{{{{", arity).unwrap();
                self.emit_key_tuple(pattern, out);
                out.push_str("}};\n");

                let ctx = format!("READ_OP_CONTEXT({})", self.synth.mint.op_context_name(relation));
                writeln!(
                    out,
                    "auto range = {}->equalRange_{}(key,{});",
                    rel_name,
                    index_template(keys),
                    ctx
                )
                .unwrap();
                writeln!(out, "for(const auto& env{} : range) {{", tuple_id).unwrap();
                out.push_str("if( ");
                self.emit_cond(condition, out);
                out.push_str(") {\n");
                self.emit_nested(op, out);
                out.push_str("break;\n");
                out.push_str("}\n");
                out.push_str("}\n");
                self.end_comment(out, "index-choice");
            }
            Operation::ParallelIndexChoice { relation, tuple_id, pattern, condition, .. } => {
                let rel_name = self.synth.mint.relation_name(relation);
                let arity = relation.arity();
                let keys = self.synth.unit.index_analysis().search_signature(pattern);

                assert!(*tuple_id == 0, "parallel index choice must be the outer-most loop");
                assert!(arity > 0, "no parallel index choice for nullary relations");
                assert!(!self.preamble_issued, "only the first loop can be made parallel");
                self.preamble_issued = true;

                self.begin_comment(out, "parallel-index-choice");
                write!(out, "const Tuple<RamDomain,{}> key{{{{", arity).unwrap();
                self.emit_key_tuple(pattern, out);
                out.push_str("}};\n");
                // TODO (index analysis): the operation context may be missing here
                writeln!(
                    out,
                    "auto range = {}->equalRange_{}(key);",
                    rel_name,
                    index_template(keys)
                )
                .unwrap();
                out.push_str("auto part = range.partition();\n");
                out.push_str("PARALLEL_START;\n");
                out.push_str(&self.preamble);
                out.push_str("pfor(auto it = part.begin(); it<part.end(); ++it) {\n");
                out.push_str("try{\n");
                out.push_str("for(const auto& env0 : *it) {\n");
                out.push_str("if( ");
                self.emit_cond(condition, out);
                out.push_str(") {\n");
                self.emit_nested(op, out);
                out.push_str("break;\n");
                out.push_str("}\n");
                out.push_str("}\n");
                out.push_str("} catch(std::exception &e) { SignalHandler::instance()->error(e.what());}\n");
                out.push_str("}\n");
                self.end_comment(out, "parallel-index-choice");
            }
            Operation::UnpackRecord { expression, arity, tuple_id, .. } => {
                self.begin_comment(out, "unpack-record");
                let tuple_type = format!("ram::Tuple<RamDomain,{}>", arity);

                out.push_str("auto ref = ");
                self.emit_expr(expression, out);
                out.push_str(";\n");

                writeln!(out, "if (isNull<{}>(ref)) continue;", tuple_type).unwrap();
                writeln!(
                    out,
                    "{} env{} = unpack<{}>(ref);",
                    tuple_type, tuple_id, tuple_type
                )
                .unwrap();
                out.push_str("{\n");
                self.emit_nested(op, out);
                out.push_str("}\n");
                self.end_comment(out, "unpack-record");
            }
            Operation::Aggregate { function, relation, tuple_id, condition, expression, .. } => {
                self.begin_comment(out, "aggregate");
                let rel_name = self.synth.mint.relation_name(relation);

                writeln!(out, "ram::Tuple<RamDomain,1> env{};", tuple_id).unwrap();

                // counting over an unrestricted predicate is the size
                if *function == AggregateFunction::Count && condition.is_true() {
                    writeln!(out, "env{}[0] = {}->size();", tuple_id, rel_name).unwrap();
                    self.emit_nested(op, out);
                    self.end_comment(out, "aggregate");
                    return;
                }

                let init = aggregate_init(*function);
                writeln!(out, "RamDomain res{} = {};", tuple_id, init).unwrap();

                writeln!(out, "for(const auto& env{} : *{}) {{", tuple_id, rel_name).unwrap();
                out.push_str("if( ");
                self.emit_cond(condition, out);
                out.push_str(") {\n");
                self.emit_aggregate_update(*function, *tuple_id, expression, out);
                out.push_str("}\n");
                out.push_str("}\n");

                writeln!(out, "env{}[0] = res{};", tuple_id, tuple_id).unwrap();
                self.emit_aggregate_recursion(op, *function, *tuple_id, init, out);
                self.end_comment(out, "aggregate");
            }
            Operation::IndexAggregate {
                function,
                relation,
                tuple_id,
                pattern,
                condition,
                expression,
                ..
            } => {
                self.begin_comment(out, "index-aggregate");
                let rel_name = self.synth.mint.relation_name(relation);
                let arity = relation.arity();
                let ctx = format!("READ_OP_CONTEXT({})", self.synth.mint.op_context_name(relation));
                let keys = self.synth.unit.index_analysis().search_signature(pattern);
                let tuple_type = format!("ram::Tuple<RamDomain,{}>", arity);

                writeln!(out, "ram::Tuple<RamDomain,1> env{};", tuple_id).unwrap();

                if *function == AggregateFunction::Count && keys == 0 && condition.is_true() {
                    writeln!(out, "env{}[0] = {}->size();", tuple_id, rel_name).unwrap();
                    self.emit_nested(op, out);
                    self.end_comment(out, "index-aggregate");
                    return;
                }

                let init = aggregate_init(*function);
                writeln!(out, "RamDomain res{} = {};", tuple_id, init).unwrap();

                if keys == 0 {
                    writeln!(out, "for(const auto& env{} : *{}) {{", tuple_id, rel_name).unwrap();
                } else {
                    write!(out, "const {} key{{{{", tuple_type).unwrap();
                    self.emit_key_tuple(pattern, out);
                    out.push_str("}};\n");
                    writeln!(
                        out,
                        "auto range = {}->equalRange_{}(key,{});",
                        rel_name,
                        index_template(keys),
                        ctx
                    )
                    .unwrap();
                    writeln!(out, "for(const auto& env{} : range) {{", tuple_id).unwrap();
                }

                out.push_str("if( ");
                self.emit_cond(condition, out);
                out.push_str(") {\n");
                self.emit_aggregate_update(*function, *tuple_id, expression, out);
                out.push_str("}\n");
                out.push_str("}\n");

                writeln!(out, "env{}[0] = res{};", tuple_id, tuple_id).unwrap();
                self.emit_aggregate_recursion(op, *function, *tuple_id, init, out);
                self.end_comment(out, "index-aggregate");
            }
            Operation::Filter { condition, .. } => {
                self.begin_comment(out, "filter");
                out.push_str("if( ");
                self.emit_cond(condition, out);
                out.push_str(") {\n");
                self.emit_nested(op, out);
                out.push_str("}\n");
                self.end_comment(out, "filter");
            }
            Operation::Break { condition, .. } => {
                self.begin_comment(out, "break");
                out.push_str("if( ");
                self.emit_cond(condition, out);
                out.push_str(") break;\n");
                self.emit_nested(op, out);
                self.end_comment(out, "break");
            }
            Operation::Project { relation, values } => {
                self.begin_comment(out, "project");
                let rel_name = self.synth.mint.relation_name(relation);
                let arity = relation.arity();
                let ctx = format!("READ_OP_CONTEXT({})", self.synth.mint.op_context_name(relation));

                if values.is_empty() {
                    writeln!(out, "Tuple<RamDomain,{}> tuple{{{{}}}};", arity).unwrap();
                } else {
                    write!(out, "Tuple<RamDomain,{}> tuple{{{{static_cast<RamDomain>(", arity)
                        .unwrap();
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            out.push_str("),static_cast<RamDomain>(");
                        }
                        self.emit_expr(value, out);
                    }
                    out.push_str(")}};\n");
                }

                writeln!(out, "{}->insert(tuple,{});", rel_name, ctx).unwrap();
                self.end_comment(out, "project");
            }
            Operation::SubroutineReturn { values } => {
                out.push_str("std::lock_guard<std::mutex> guard(lock);\n");
                for value in values {
                    if value.is_undef() {
                        out.push_str("ret.push_back(0);\n");
                    } else {
                        out.push_str("ret.push_back(");
                        self.emit_expr(value, out);
                        out.push_str(");\n");
                    }
                }
            }
        }
    }

    fn emit_aggregate_update(
        &mut self,
        function: AggregateFunction,
        tuple_id: u32,
        expression: &Expression,
        out: &mut String,
    ) {
        match function {
            AggregateFunction::Min => {
                write!(out, "res{} = std::min(res{},", tuple_id, tuple_id).unwrap();
                self.emit_expr(expression, out);
                out.push_str(");\n");
            }
            AggregateFunction::Max => {
                write!(out, "res{} = std::max(res{},", tuple_id, tuple_id).unwrap();
                self.emit_expr(expression, out);
                out.push_str(");\n");
            }
            AggregateFunction::Count => {
                writeln!(out, "++res{};", tuple_id).unwrap();
            }
            AggregateFunction::Sum => {
                write!(out, "res{} += ", tuple_id).unwrap();
                self.emit_expr(expression, out);
                out.push_str(";\n");
            }
        }
    }

    /// MIN/MAX only recurse when at least one tuple matched; COUNT and
    /// SUM always have a result.
    fn emit_aggregate_recursion(
        &mut self,
        op: &Operation,
        function: AggregateFunction,
        tuple_id: u32,
        init: &str,
        out: &mut String,
    ) {
        if function == AggregateFunction::Min || function == AggregateFunction::Max {
            writeln!(out, "if(res{} != {}){{", tuple_id, init).unwrap();
            self.emit_nested(op, out);
            out.push_str("}\n");
        } else {
            self.emit_nested(op, out);
        }
    }
}

fn aggregate_init(function: AggregateFunction) -> &'static str {
    match function {
        AggregateFunction::Min => "MAX_RAM_DOMAIN",
        AggregateFunction::Max => "MIN_RAM_DOMAIN",
        AggregateFunction::Count => "0",
        AggregateFunction::Sum => "0",
    }
}
