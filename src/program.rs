//! RAM programs and translation units.

use crate::ram::Statement;
use crate::relation::Relation;
use crate::symbols::SymbolTable;
use crate::synth::analysis::IndexAnalysis;
use std::rc::Rc;

/// A complete RAM program: relation declarations, the main evaluation
/// statement, and named provenance subroutines.
#[derive(Clone, Debug)]
pub struct Program {
    relations: Vec<Rc<Relation>>,
    main: Statement,
    subroutines: Vec<(String, Statement)>,
}

impl Program {
    pub fn new(relations: Vec<Rc<Relation>>, main: Statement) -> Self {
        Program {
            relations,
            main,
            subroutines: Vec::new(),
        }
    }

    pub fn with_subroutines(
        relations: Vec<Rc<Relation>>,
        main: Statement,
        subroutines: Vec<(String, Statement)>,
    ) -> Self {
        Program {
            relations,
            main,
            subroutines,
        }
    }

    pub fn relations(&self) -> &[Rc<Relation>] {
        &self.relations
    }

    pub fn main(&self) -> &Statement {
        &self.main
    }

    /// Subroutines in declaration order; order fixes the generated
    /// `subproof_<n>` numbering.
    pub fn subroutines(&self) -> &[(String, Statement)] {
        &self.subroutines
    }
}

/// The synthesiser's input: a RAM program, the front-end's symbol table,
/// and the index analysis computed over the program.
#[derive(Debug)]
pub struct TranslationUnit {
    program: Program,
    symbols: SymbolTable,
    analysis: IndexAnalysis,
}

impl TranslationUnit {
    pub fn new(program: Program, symbols: SymbolTable) -> Self {
        let analysis = IndexAnalysis::analyze(&program);
        TranslationUnit {
            program,
            symbols,
            analysis,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn index_analysis(&self) -> &IndexAnalysis {
        &self.analysis
    }
}
