//! Benchmark for translation-unit generation over a fixpoint workload
//!
//! Run with: cargo bench --bench synth_bench

use std::rc::Rc;
use std::time::Instant;

use ram_synth::{
    Condition, Config, Expression, IoDirectives, Operation, Program, Relation, Statement,
    SymbolTable, Synthesiser, TranslationUnit,
};

const ITERATIONS: usize = 200;

/// Transitive closure: load edge, saturate path, store path.
fn transitive_closure() -> TranslationUnit {
    let edge = Rc::new(Relation::numeric("edge", 2));
    let path = Rc::new(Relation::numeric("path", 2));
    let delta = Rc::new(Relation::numeric("@delta_path", 2));
    let new = Rc::new(Relation::numeric("@new_path", 2));

    let copy = |from: &Rc<Relation>, to: &Rc<Relation>| {
        Statement::Query(Operation::Scan {
            relation: from.clone(),
            tuple_id: 0,
            nested: Box::new(Operation::Project {
                relation: to.clone(),
                values: vec![
                    Expression::tuple_element(0, 0),
                    Expression::tuple_element(0, 1),
                ],
            }),
            profile_text: String::new(),
        })
    };

    // path(x, z) :- delta(x, y), edge(y, z).
    let step = Statement::Query(Operation::ParallelScan {
        relation: delta.clone(),
        tuple_id: 0,
        nested: Box::new(Operation::IndexScan {
            relation: edge.clone(),
            tuple_id: 1,
            pattern: vec![Expression::tuple_element(0, 1), Expression::Undef],
            nested: Box::new(Operation::Filter {
                condition: Condition::not(Condition::ExistenceCheck {
                    relation: path.clone(),
                    values: vec![
                        Expression::tuple_element(0, 0),
                        Expression::tuple_element(1, 1),
                    ],
                }),
                nested: Box::new(Operation::Project {
                    relation: new.clone(),
                    values: vec![
                        Expression::tuple_element(0, 0),
                        Expression::tuple_element(1, 1),
                    ],
                }),
                profile_text: "path(x,z) :- delta(x,y), edge(y,z).".to_string(),
            }),
            profile_text: String::new(),
        }),
        profile_text: String::new(),
    });

    let main = Statement::Sequence(vec![
        Statement::Load {
            relation: edge.clone(),
            directives: vec![IoDirectives::file("edge", "edge.facts")],
        },
        copy(&edge, &path),
        copy(&edge, &delta),
        Statement::Loop(Box::new(Statement::Sequence(vec![
            step,
            Statement::Exit(Condition::EmptinessCheck(new.clone())),
            Statement::Query(Operation::Scan {
                relation: new.clone(),
                tuple_id: 0,
                nested: Box::new(Operation::Project {
                    relation: path.clone(),
                    values: vec![
                        Expression::tuple_element(0, 0),
                        Expression::tuple_element(0, 1),
                    ],
                }),
                profile_text: String::new(),
            }),
            Statement::Swap {
                first: delta.clone(),
                second: new.clone(),
            },
            Statement::Clear(new.clone()),
        ]))),
        Statement::Clear(delta.clone()),
        Statement::Store {
            relation: path.clone(),
            directives: vec![IoDirectives::file("path", "path.csv")],
        },
    ]);

    let program = Program::new(vec![edge, path, delta, new], main);
    TranslationUnit::new(program, SymbolTable::from_strings(["a", "b", "c"]))
}

fn main() {
    let unit = transitive_closure();
    let config = Config::default();

    // warm up and record the output size once
    let mut synthesiser = Synthesiser::new(&unit, &config);
    let mut out = String::new();
    synthesiser.generate_code("tc", &mut out);
    let bytes = out.len();

    let start = Instant::now();
    for _ in 0..ITERATIONS {
        let mut synthesiser = Synthesiser::new(&unit, &config);
        let mut out = String::new();
        synthesiser.generate_code("tc", &mut out);
    }
    let elapsed = start.elapsed().as_secs_f64() * 1000.0;

    println!("generated unit size: {} bytes", bytes);
    println!(
        "synthesis: {} iterations in {:.2} ms ({:.3} ms/unit)",
        ITERATIONS,
        elapsed,
        elapsed / ITERATIONS as f64
    );
}
