//! End-to-end emission tests.
//!
//! Builds small RAM programs and checks the generated translation unit
//! for the key observable fragments: identifier minting, operation
//! context preambles, parallel regions, aggregate framing, filter
//! splitting, and profiling counter layout.

use crate::config::{Config, Provenance};
use crate::program::{Program, TranslationUnit};
use crate::ram::*;
use crate::relation::Relation;
use crate::symbols::SymbolTable;
use crate::synth::Synthesiser;
use std::rc::Rc;

fn rel(name: &str, arity: usize) -> Rc<Relation> {
    Rc::new(Relation::numeric(name, arity))
}

fn unit(relations: Vec<Rc<Relation>>, main: Statement) -> TranslationUnit {
    TranslationUnit::new(Program::new(relations, main), SymbolTable::new())
}

fn generate(unit: &TranslationUnit, config: &Config) -> (String, bool) {
    let mut synthesiser = Synthesiser::new(unit, config);
    let mut out = String::new();
    let with_shared_library = synthesiser.generate_code("test", &mut out);
    (out, with_shared_library)
}

fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

/// scan A, copy every tuple into B
fn copy_query(a: Rc<Relation>, b: Rc<Relation>) -> Statement {
    Statement::Query(Operation::Scan {
        relation: a,
        tuple_id: 0,
        nested: Box::new(Operation::Project {
            relation: b,
            values: vec![Expression::tuple_element(0, 0)],
        }),
        profile_text: String::new(),
    })
}

#[test]
fn test_host_ids_distinguish_colliding_names() {
    let a = rel("A", 1);
    let a_prime = rel("A-prime", 1);
    let u = unit(
        vec![a.clone(), a_prime.clone()],
        copy_query(a, a_prime),
    );
    let (out, _) = generate(&u, &Config::default());

    assert!(out.contains("rel_1_A"));
    assert!(out.contains("rel_2_A_prime"));
}

#[test]
fn test_sequential_query_contexts() {
    let a = rel("A", 1);
    let b = rel("B", 1);
    let u = unit(vec![a.clone(), b.clone()], copy_query(a, b));
    let (out, _) = generate(&u, &Config::default());

    assert_eq!(
        count(&out, "CREATE_OP_CONTEXT(rel_1_A_op_ctxt,rel_1_A->createContext());"),
        1
    );
    assert_eq!(
        count(&out, "CREATE_OP_CONTEXT(rel_2_B_op_ctxt,rel_2_B->createContext());"),
        1
    );
    assert_eq!(count(&out, "PARALLEL_START"), 0);
    assert!(out.contains("for(const auto& env0 : *rel_1_A) {"));
    assert!(out.contains("rel_2_B->insert(tuple,READ_OP_CONTEXT(rel_2_B_op_ctxt));"));
}

#[test]
fn test_parallel_region_owns_preamble() {
    let a = rel("A", 2);
    let b = rel("B", 2);
    let c = rel("C", 2);
    let main = Statement::Query(Operation::ParallelScan {
        relation: a.clone(),
        tuple_id: 0,
        nested: Box::new(Operation::IndexScan {
            relation: b.clone(),
            tuple_id: 1,
            pattern: vec![Expression::tuple_element(0, 0), Expression::Undef],
            nested: Box::new(Operation::Project {
                relation: c.clone(),
                values: vec![
                    Expression::tuple_element(0, 0),
                    Expression::tuple_element(1, 1),
                ],
            }),
            profile_text: String::new(),
        }),
        profile_text: String::new(),
    });
    let u = unit(vec![a, b, c], main);
    let (out, _) = generate(&u, &Config::default());

    assert_eq!(count(&out, "PARALLEL_START;"), 1);
    assert_eq!(count(&out, "PARALLEL_END;"), 1);

    // contexts are created inside the parallel region so every worker
    // holds its own
    let start = out.find("PARALLEL_START;").unwrap();
    let end = out.find("PARALLEL_END;").unwrap();
    let ctx = out.find("CREATE_OP_CONTEXT(rel_2_B_op_ctxt").unwrap();
    assert!(start < ctx && ctx < end);

    assert!(out.contains("auto part = rel_1_A->partition();"));
    assert!(out
        .contains("} catch(std::exception &e) { SignalHandler::instance()->error(e.what());}"));
    // inner lookup keeps the bound column in the key and zero elsewhere
    assert!(out.contains("const Tuple<RamDomain,2> key{{env0[0],0}};"));
    assert!(out.contains("auto range = rel_2_B->equalRange_<0>(key,READ_OP_CONTEXT(rel_2_B_op_ctxt));"));
}

#[test]
fn test_count_aggregate_shortcuts_to_size() {
    let a = rel("A", 2);
    let b = rel("B", 1);
    let main = Statement::Query(Operation::Aggregate {
        function: AggregateFunction::Count,
        relation: a.clone(),
        tuple_id: 0,
        condition: Condition::True,
        expression: Expression::signed(0),
        nested: Box::new(Operation::Project {
            relation: b.clone(),
            values: vec![Expression::tuple_element(0, 0)],
        }),
        profile_text: String::new(),
    });
    let u = unit(vec![a, b], main);
    let (out, _) = generate(&u, &Config::default());

    assert!(out.contains("env0[0] = rel_1_A->size();"));
    assert!(!out.contains("RamDomain res0"));
}

#[test]
fn test_min_aggregate_guards_recursion() {
    let a = rel("A", 2);
    let b = rel("B", 1);
    let main = Statement::Query(Operation::Scan {
        relation: a.clone(),
        tuple_id: 0,
        nested: Box::new(Operation::IndexAggregate {
            function: AggregateFunction::Min,
            relation: a.clone(),
            tuple_id: 1,
            pattern: vec![Expression::tuple_element(0, 0), Expression::Undef],
            condition: Condition::Constraint {
                op: BinaryConstraintOp::Gt,
                lhs: Expression::tuple_element(1, 1),
                rhs: Expression::tuple_element(0, 1),
            },
            expression: Expression::tuple_element(1, 1),
            nested: Box::new(Operation::Project {
                relation: b.clone(),
                values: vec![Expression::tuple_element(1, 0)],
            }),
            profile_text: String::new(),
        }),
        profile_text: String::new(),
    });
    let u = unit(vec![a, b], main);
    let (out, _) = generate(&u, &Config::default());

    assert!(out.contains("RamDomain res1 = MAX_RAM_DOMAIN;"));
    assert!(out.contains("auto range = rel_1_A->equalRange_<0>(key,READ_OP_CONTEXT(rel_1_A_op_ctxt));"));
    assert!(out.contains("res1 = std::min(res1,env1[1]);"));
    assert!(out.contains("if(res1 != MAX_RAM_DOMAIN){"));
}

#[test]
fn test_sum_aggregate_recurses_unconditionally() {
    let a = rel("A", 1);
    let b = rel("B", 1);
    let main = Statement::Query(Operation::Aggregate {
        function: AggregateFunction::Sum,
        relation: a.clone(),
        tuple_id: 0,
        condition: Condition::Constraint {
            op: BinaryConstraintOp::Gt,
            lhs: Expression::tuple_element(0, 0),
            rhs: Expression::signed(0),
        },
        expression: Expression::tuple_element(0, 0),
        nested: Box::new(Operation::Project {
            relation: b.clone(),
            values: vec![Expression::tuple_element(0, 0)],
        }),
        profile_text: String::new(),
    });
    let u = unit(vec![a, b], main);
    let (out, _) = generate(&u, &Config::default());

    assert!(out.contains("RamDomain res0 = 0;"));
    assert!(out.contains("res0 += env0[0];"));
    assert!(!out.contains("if(res0 != 0){"));
}

#[test]
fn test_filter_splitting_at_query_top() {
    let a = rel("A", 2);
    let b = rel("B", 1);
    let free_term = Condition::Constraint {
        op: BinaryConstraintOp::Gt,
        lhs: Expression::signed(1),
        rhs: Expression::signed(0),
    };
    let ctx_term = Condition::ExistenceCheck {
        relation: a.clone(),
        values: vec![Expression::signed(1), Expression::signed(2)],
    };
    let main = Statement::Query(Operation::Filter {
        condition: Condition::and(ctx_term, free_term),
        nested: Box::new(copy_scan(a.clone(), b.clone())),
        profile_text: String::new(),
    });
    let u = unit(vec![a, b], main);

    let mut config = Config::default();
    config.profile = Some("p.log".to_string());
    let (out, _) = generate(&u, &config);

    let guard = "((RamSigned(1)) > (RamSigned(0)))";
    let exists =
        "rel_1_A->contains(Tuple<RamDomain,2>{{RamSigned(1),RamSigned(2)}},READ_OP_CONTEXT(rel_1_A_op_ctxt))";

    // each conjunct appears exactly once
    assert_eq!(count(&out, guard), 1);
    assert_eq!(count(&out, exists), 1);

    // the context-free guard precedes the closure; the existence check
    // follows the context preamble inside it
    let guard_pos = out.find(guard).unwrap();
    let closure_pos = out.find("[&]()").unwrap();
    let ctx_pos = out.find("CREATE_OP_CONTEXT(rel_1_A_op_ctxt").unwrap();
    let exists_pos = out.find(exists).unwrap();
    assert!(guard_pos < closure_pos);
    assert!(closure_pos < ctx_pos && ctx_pos < exists_pos);

    // profiled existence checks count reads on non-temp relations
    assert!(out.contains("(reads[0]++,"));
}

fn copy_scan(a: Rc<Relation>, b: Rc<Relation>) -> Operation {
    Operation::Scan {
        relation: a,
        tuple_id: 0,
        nested: Box::new(Operation::Project {
            relation: b,
            values: vec![Expression::tuple_element(0, 0)],
        }),
        profile_text: String::new(),
    }
}

#[test]
fn test_type_definitions_are_unique() {
    // two relations of identical shape share one emitted type
    let a = rel("A", 2);
    let b = rel("B", 2);
    let u = unit(
        vec![a.clone(), b.clone()],
        Statement::Query(Operation::Scan {
            relation: a,
            tuple_id: 0,
            nested: Box::new(Operation::Project {
                relation: b,
                values: vec![
                    Expression::tuple_element(0, 0),
                    Expression::tuple_element(0, 1),
                ],
            }),
            profile_text: String::new(),
        }),
    );
    let (out, _) = generate(&u, &Config::default());

    assert_eq!(count(&out, "struct t_btree_2__0_1 {"), 1);
    assert_eq!(count(&out, "std::unique_ptr<t_btree_2__0_1>"), 2);
}

#[test]
fn test_profiling_counter_arrays_match_map_sizes() {
    let a = rel("A", 1);
    let b = rel("B", 1);
    let filtered = |text: &str, a: Rc<Relation>, b: Rc<Relation>| {
        Statement::Query(Operation::Scan {
            relation: a.clone(),
            tuple_id: 0,
            nested: Box::new(Operation::Filter {
                condition: Condition::ExistenceCheck {
                    relation: b.clone(),
                    values: vec![Expression::tuple_element(0, 0)],
                },
                nested: Box::new(Operation::Project {
                    relation: b,
                    values: vec![Expression::tuple_element(0, 0)],
                }),
                profile_text: text.to_string(),
            }),
            profile_text: String::new(),
        })
    };
    let main = Statement::Sequence(vec![
        filtered("rule one", a.clone(), b.clone()),
        filtered("rule two", a.clone(), b.clone()),
    ]);
    let u = unit(vec![a, b], main);

    let mut config = Config::default();
    config.profile = Some("p.log".to_string());
    let (out, _) = generate(&u, &config);

    // two distinct profile texts, one read-counted relation
    assert!(out.contains("size_t freqs[2]{};"));
    assert!(out.contains("size_t reads[1]{};"));
    assert!(out.contains("freqs[0]++;"));
    assert!(out.contains("freqs[1]++;"));
    assert!(out.contains("makeQuantityEvent(R\"_(rule one)_\", freqs[0],0);"));
    assert!(out.contains("makeQuantityEvent(R\"_(rule two)_\", freqs[1],0);"));
    assert!(out.contains("makeQuantityEvent(R\"_(@relation-reads;B)_\", reads[0],0);"));
}

#[test]
fn test_provenance_existence_check() {
    let p = Rc::new(Relation::new(
        "path",
        4,
        2,
        vec!["x".into(), "y".into(), "@rule".into(), "@height".into()],
        vec!["i:number".into(); 4],
        crate::relation::RelationRepresentation::Default,
    ));
    let out_rel = rel("out", 1);
    let main = Statement::Query(Operation::Filter {
        condition: Condition::ProvenanceExistenceCheck {
            relation: p.clone(),
            values: vec![
                Expression::signed(1),
                Expression::signed(2),
                Expression::signed(0),
                Expression::signed(5),
            ],
        },
        nested: Box::new(Operation::Project {
            relation: out_rel.clone(),
            values: vec![Expression::signed(1)],
        }),
        profile_text: String::new(),
    });
    let u = unit(vec![p, out_rel], main);
    let mut config = Config::default();
    config.provenance = Provenance::Explain;
    let (out, _) = generate(&u, &config);

    // the check is an immediately-invoked boolean closure performing a
    // range query and a height comparison
    assert!(out.contains("[&]() -> bool {"));
    assert!(out.contains("auto existenceCheck = rel_1_path->equalRange_<0,1,2>"));
    assert!(out.contains(
        "if (existenceCheck.empty()) return false; else return ((*existenceCheck.begin())[3] <= RamSigned(5))"
    ));
}

#[test]
fn test_loop_exit_swap_clear() {
    let path = rel("path", 2);
    let delta = rel("@delta_path", 2);
    let new = rel("@new_path", 2);
    let main = Statement::Loop(Box::new(Statement::Sequence(vec![
        copy2_query(delta.clone(), new.clone()),
        Statement::Exit(Condition::EmptinessCheck(new.clone())),
        Statement::Swap {
            first: delta.clone(),
            second: new.clone(),
        },
        Statement::Extend {
            source: new.clone(),
            target: path.clone(),
        },
        Statement::Clear(new.clone()),
    ])));
    let u = unit(vec![path, delta, new], main);
    let (out, _) = generate(&u, &Config::default());

    assert!(out.contains("iter = 0;\nfor(;;) {\n"));
    assert!(out.contains("iter++;\n"));
    assert!(out.contains("if(rel_3_new_path->empty()) break;"));
    assert!(out.contains("std::swap(rel_2_delta_path, rel_3_new_path);"));
    assert!(out.contains("rel_3_new_path->extend(*rel_1_path);"));
    // temp relations purge without the performIO guard
    assert!(out.contains("if (!isHintsProfilingEnabled()) rel_3_new_path->purge();"));
}

#[test]
fn test_load_store_render_directive_maps() {
    let edge = rel("edge", 2);
    let path = rel("path", 2);
    let main = Statement::Sequence(vec![
        Statement::Load {
            relation: edge.clone(),
            directives: vec![crate::relation::IoDirectives::file("edge", "edge.facts")],
        },
        copy2_query(edge.clone(), path.clone()),
        Statement::Store {
            relation: path.clone(),
            directives: vec![crate::relation::IoDirectives::file("path", "path.csv")],
        },
    ]);
    let u = unit(vec![edge, path], main);
    let (out, _) = generate(&u, &Config::default());

    assert!(out.contains(
        r#"std::map<std::string, std::string> directiveMap({{"IO","file"},{"filename","edge.facts"},{"name","edge"}});"#
    ));
    assert!(out.contains(")->readAll(*rel_1_edge);"));
    assert!(out.contains(")->writeAll(*rel_2_path);"));
    // load failures warn, store failures exit
    assert!(out.contains("std::cerr << \"Error loading data: \" << e.what()"));
    assert!(out.contains("{std::cerr << e.what();exit(1);}"));
    // thin entry points replay the directives
    assert!(out.contains("void loadAll(std::string inputDirectory = \".\") override {"));
    assert!(out.contains("void printAll(std::string outputDirectory = \".\") override {"));
    // registration carries the input/output roles
    assert!(out.contains("addRelation(\"edge\",&wrapper_rel_1_edge,true,false);"));
    assert!(out.contains("addRelation(\"path\",&wrapper_rel_2_path,false,true);"));
}

fn copy2_query(a: Rc<Relation>, b: Rc<Relation>) -> Statement {
    Statement::Query(Operation::Scan {
        relation: a,
        tuple_id: 0,
        nested: Box::new(Operation::Project {
            relation: b,
            values: vec![
                Expression::tuple_element(0, 0),
                Expression::tuple_element(0, 1),
            ],
        }),
        profile_text: String::new(),
    })
}

#[test]
fn test_user_defined_operator_sets_shared_library_flag() {
    let a = rel("A", 1);
    let b = rel("B", 1);
    let main = Statement::Query(Operation::Scan {
        relation: a.clone(),
        tuple_id: 0,
        nested: Box::new(Operation::Project {
            relation: b.clone(),
            values: vec![Expression::UserDefined {
                name: "myfunc".to_string(),
                type_sig: "NSN".to_string(),
                args: vec![Expression::tuple_element(0, 0), Expression::signed(3)],
            }],
        }),
        profile_text: String::new(),
    });
    let u = unit(vec![a, b], main);
    let (out, with_shared_library) = generate(&u, &Config::default());

    assert!(with_shared_library);
    assert!(out.contains("extern \"C\" {\n"));
    assert!(out.contains("souffle::RamDomain myfunc(souffle::RamDomain,const char *);"));
    assert!(out.contains("myfunc(((RamDomain)env0[0]),symTable.resolve((RamDomain)RamSigned(3)).c_str())"));
}

#[test]
fn test_auto_increment_declares_counter() {
    let a = rel("A", 1);
    let b = rel("B", 1);
    let with_ctr = Statement::Query(Operation::Scan {
        relation: a.clone(),
        tuple_id: 0,
        nested: Box::new(Operation::Project {
            relation: b.clone(),
            values: vec![Expression::AutoIncrement],
        }),
        profile_text: String::new(),
    });
    let u = unit(vec![a.clone(), b.clone()], with_ctr);
    let (out, _) = generate(&u, &Config::default());
    assert!(out.contains("std::atomic<RamDomain> ctr(0);"));
    assert!(out.contains("(ctr++)"));

    let without = unit(vec![a.clone(), b.clone()], copy_query(a, b));
    let (out, _) = generate(&without, &Config::default());
    assert!(!out.contains("std::atomic<RamDomain> ctr(0);"));
}

#[test]
fn test_subroutines_emitted_under_provenance() {
    let a = rel("A", 1);
    let b = rel("B", 1);
    let sub_body = Statement::Query(Operation::Filter {
        condition: Condition::Constraint {
            op: BinaryConstraintOp::Eq,
            lhs: Expression::SubroutineArgument(0),
            rhs: Expression::signed(1),
        },
        nested: Box::new(Operation::SubroutineReturn {
            values: vec![Expression::SubroutineArgument(0), Expression::Undef],
        }),
        profile_text: String::new(),
    });
    let program = Program::with_subroutines(
        vec![a.clone(), b.clone()],
        copy_query(a, b),
        vec![("path_0_subproof".to_string(), sub_body)],
    );
    let u = TranslationUnit::new(program, SymbolTable::new());
    let mut config = Config::default();
    config.provenance = Provenance::Explain;
    let (out, _) = generate(&u, &config);

    assert!(out.contains("void executeSubroutine(std::string name"));
    assert!(out.contains("if (name == \"path_0_subproof\") {"));
    assert!(out.contains("subproof_0(args, ret);"));
    // the shared return vector is filled under a lock
    assert!(out.contains("std::mutex lock;"));
    assert!(out.contains("std::lock_guard<std::mutex> guard(lock);"));
    assert!(out.contains("ret.push_back((args)[0]);"));
    assert!(out.contains("ret.push_back(0);"));
    assert!(out.contains("#include \"souffle/Explain.h\""));
}

#[test]
fn test_main_and_factory_hooks() {
    let a = rel("A", 1);
    let b = rel("B", 1);
    let u = unit(vec![a.clone(), b.clone()], copy_query(a, b));
    let mut config = Config::default();
    config.jobs = 4;
    config.source_file = "tc.dl".to_string();
    let (out, _) = generate(&u, &config);

    assert!(out.contains("class Sf_test : public SouffleProgram {"));
    assert!(out.contains("SouffleProgram *newInstance_test(){return new Sf_test;}"));
    assert!(out.contains("#ifdef __EMBEDDED_SOUFFLE__"));
    assert!(out.contains("factory_Sf_test() : ProgramFactory(\"test\"){}"));
    assert!(out.contains("int main(int argc, char** argv)"));
    assert!(out.contains("R\"(tc.dl)\","));
    assert!(out.contains("4,"));
    assert!(out.contains("obj.runAll(opt.getInputFileDir(), opt.getOutputFileDir());"));
    assert!(out.contains("} catch(std::exception &e) { souffle::SignalHandler::instance()->error(e.what());}"));
}

#[test]
fn test_parallel_sections_statement() {
    let a = rel("A", 1);
    let b = rel("B", 1);
    let c = rel("C", 1);
    let main = Statement::Parallel(vec![
        copy_query(a.clone(), b.clone()),
        copy_query(a.clone(), c.clone()),
    ]);
    let u = unit(vec![a, b, c], main);
    let (out, _) = generate(&u, &Config::default());

    assert_eq!(count(&out, "SECTIONS_START;"), 1);
    assert_eq!(count(&out, "SECTION_START;"), 2);
    assert_eq!(count(&out, "SECTIONS_END;"), 1);

    // a single-section parallel collapses to the plain statement
    let a = rel("A", 1);
    let b = rel("B", 1);
    let u = unit(
        vec![a.clone(), b.clone()],
        Statement::Parallel(vec![copy_query(a, b)]),
    );
    let (out, _) = generate(&u, &Config::default());
    assert_eq!(count(&out, "SECTIONS_START;"), 0);
}

#[test]
fn test_debug_region_comments() {
    let a = rel("A", 1);
    let b = rel("B", 1);
    let u = unit(vec![a.clone(), b.clone()], copy_query(a, b));
    let mut config = Config::default();
    config.debug_report = true;
    let (out, _) = generate(&u, &config);

    assert!(out.contains("/* BEGIN query */"));
    assert!(out.contains("/* END scan */"));

    let u = unit(vec![rel("A", 1), rel("B", 1)], copy_query(rel("A", 1), rel("B", 1)));
    let (out, _) = generate(&u, &Config::default());
    assert!(!out.contains("/* BEGIN"));
}

#[test]
#[should_panic(expected = "only the first loop can be made parallel")]
fn test_second_parallel_loop_is_rejected() {
    let a = rel("A", 1);
    let b = rel("B", 1);
    let main = Statement::Query(Operation::ParallelScan {
        relation: a.clone(),
        tuple_id: 0,
        nested: Box::new(Operation::ParallelScan {
            relation: a.clone(),
            tuple_id: 0,
            nested: Box::new(Operation::Project {
                relation: b.clone(),
                values: vec![Expression::signed(1)],
            }),
            profile_text: String::new(),
        }),
        profile_text: String::new(),
    });
    let u = unit(vec![a, b], main);
    generate(&u, &Config::default());
}

#[test]
#[should_panic(expected = "outer-most loop")]
fn test_parallel_scan_below_outer_position_is_rejected() {
    let a = rel("A", 1);
    let b = rel("B", 1);
    let main = Statement::Query(Operation::Scan {
        relation: a.clone(),
        tuple_id: 0,
        nested: Box::new(Operation::ParallelScan {
            relation: a.clone(),
            tuple_id: 1,
            nested: Box::new(Operation::Project {
                relation: b.clone(),
                values: vec![Expression::signed(1)],
            }),
            profile_text: String::new(),
        }),
        profile_text: String::new(),
    });
    let u = unit(vec![a, b], main);
    generate(&u, &Config::default());
}

#[test]
#[should_panic(expected = "undef value in value position")]
fn test_undef_in_value_position_is_rejected() {
    let a = rel("A", 1);
    let b = rel("B", 1);
    let main = Statement::Query(Operation::Scan {
        relation: a.clone(),
        tuple_id: 0,
        nested: Box::new(Operation::Project {
            relation: b.clone(),
            values: vec![Expression::Undef],
        }),
        profile_text: String::new(),
    });
    let u = unit(vec![a, b], main);
    generate(&u, &Config::default());
}
