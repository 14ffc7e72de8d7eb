//! Program emitter: renders one complete C++ translation unit.
//!
//! Owns the file-scope emission order: headers, external operator
//! declarations, relation type definitions, the program class with its
//! relation fields and entry points, factory hooks, and `main`. The
//! statement bodies are rendered first into side buffers so the
//! profiling counter arrays can be sized by the final counter maps.

use crate::config::Config;
use crate::program::TranslationUnit;
use crate::ram::{Expression, Statement};
use crate::relation::{Relation, RelationRepresentation};
use crate::synth::mint::Mint;
use crate::synth::ops::{symbol_mask, CodeEmitter};
use crate::synth::reltype::{make_synthesiser_relation, SynthesiserRelation};
use log::debug;
use rustc_hash::FxHashSet;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::rc::Rc;

/// The synthesiser: carries the naming and counter state of one run.
pub struct Synthesiser<'a> {
    pub(crate) unit: &'a TranslationUnit,
    pub(crate) config: &'a Config,
    pub(crate) mint: Mint,
    type_cache: FxHashSet<String>,
}

impl<'a> Synthesiser<'a> {
    pub fn new(unit: &'a TranslationUnit, config: &'a Config) -> Self {
        Synthesiser {
            unit,
            config,
            mint: Mint::new(),
            type_cache: FxHashSet::default(),
        }
    }

    pub fn translation_unit(&self) -> &TranslationUnit {
        self.unit
    }

    /// Emit the C++ statement block for one RAM statement tree.
    pub(crate) fn emit_code(&mut self, stmt: &Statement, out: &mut String) {
        CodeEmitter::new(self).emit_stmt(stmt, out);
    }

    /// Emit a relation type definition at most once per type name.
    fn generate_relation_type_struct(&mut self, out: &mut String, relation_type: &SynthesiserRelation) {
        let name = relation_type.type_name();
        if self.type_cache.contains(&name) {
            return;
        }
        self.type_cache.insert(name);
        relation_type.generate_type_struct(out);
    }

    fn relation_type(&self, rel: &Rc<Relation>) -> SynthesiserRelation {
        let is_prov_info = rel.representation() == RelationRepresentation::Info;
        make_synthesiser_relation(
            rel.clone(),
            self.unit.index_analysis().indexes(rel),
            self.config.provenance.is_enabled() && !is_prov_info,
        )
    }

    /// Generate the complete translation unit for program `id`.
    ///
    /// Returns true iff the program references a user-defined operator,
    /// in which case the caller must link the generated unit against the
    /// operator's shared library.
    pub fn generate_code(&mut self, id: &str, os: &mut String) -> bool {
        let unit = self.unit;
        let prog = unit.program();
        let symbols = unit.symbol_table();
        let config = self.config;
        let classname = format!("Sf_{}", id);

        debug!("synthesising translation unit for {}", id);

        // relation numbering follows declaration order
        for rel in prog.relations() {
            self.mint.relation_name(rel);
        }

        // render bodies first so the counter maps reach their final size
        let mut main_body = String::new();
        self.emit_code(prog.main(), &mut main_body);
        let mut subroutine_bodies: Vec<(String, String)> = Vec::new();
        if config.provenance.is_enabled() {
            for (name, stmt) in prog.subroutines() {
                let mut buf = String::new();
                self.emit_code(stmt, &mut buf);
                subroutine_bodies.push((name.clone(), buf));
            }
        }
        debug!(
            "emitted {} frequency and {} read counters",
            self.mint.freq_count(),
            self.mint.read_count()
        );

        // -- headers --
        os.push_str("\n#include \"souffle/CompiledSouffle.h\"\n");
        if config.provenance.is_enabled() {
            os.push_str("#include <mutex>\n");
            os.push_str("#include \"souffle/Explain.h\"\n");
        }
        if config.live_profile {
            os.push_str("#include <thread>\n");
            os.push_str("#include \"souffle/profile/Tui.h\"\n");
        }
        os.push('\n');

        // -- external declarations for user-defined operators --
        let mut functors: BTreeMap<String, String> = BTreeMap::new();
        let mut collect = |e: &Expression| {
            if let Expression::UserDefined { name, type_sig, .. } = e {
                functors.entry(name.clone()).or_insert_with(|| type_sig.clone());
            }
        };
        prog.main().for_each_expression(&mut collect);
        for (_, stmt) in prog.subroutines() {
            stmt.for_each_expression(&mut collect);
        }
        let with_shared_library = !functors.is_empty();

        os.push_str("extern \"C\" {\n");
        for (name, type_sig) in &functors {
            let kinds: Vec<char> = type_sig.chars().collect();
            let arity = kinds.len() - 1;
            if kinds[arity] == 'N' {
                os.push_str("souffle::RamDomain ");
            } else {
                os.push_str("const char * ");
            }
            write!(os, "{}(", name).unwrap();
            let args: Vec<&str> = kinds[..arity]
                .iter()
                .map(|k| if *k == 'N' { "souffle::RamDomain" } else { "const char *" })
                .collect();
            os.push_str(&args.join(","));
            os.push_str(");\n");
        }
        os.push_str("}\n");
        os.push('\n');
        os.push_str("namespace souffle {\n");
        os.push_str("using namespace ram;\n");

        // -- relation type definitions --
        for rel in prog.relations() {
            let relation_type = self.relation_type(rel);
            self.generate_relation_type_struct(os, &relation_type);
        }
        os.push('\n');

        // -- the program class --
        writeln!(os, "class {} : public SouffleProgram {{", classname).unwrap();

        os.push_str("private:\n");
        os.push_str(
            r#"static inline bool regex_wrapper(const std::string& pattern, const std::string& text) {
   bool result = false;
   try { result = std::regex_match(text, std::regex(pattern)); } catch(...) {
     std::cerr << "warning: wrong pattern provided for match(\"" << pattern << "\",\"" << text << "\").\n";
}
   return result;
}
"#,
        );
        os.push_str("private:\n");
        os.push_str(
            r#"static inline std::string substr_wrapper(const std::string& str, size_t idx, size_t len) {
   std::string result;
   try { result = str.substr(idx,len); } catch(...) {
     std::cerr << "warning: wrong index position provided by substr(\"";
     std::cerr << str << "\"," << (int32_t)idx << "," << (int32_t)len << ") functor.\n";
   } return result;
}
"#,
        );
        os.push_str("private:\n");
        os.push_str(
            r#"static inline RamDomain wrapper_tonumber(const std::string& str) {
   RamDomain result=0;
   try { result = stord(str); } catch(...) {
     std::cerr << "error: wrong string provided by to_number(\"";
     std::cerr << str << "\") functor.\n";
     raise(SIGFPE);
   } return result;
}
"#,
        );

        if config.profiling() {
            os.push_str("std::string profiling_fname;\n");
        }

        os.push_str("public:\n");
        os.push_str("// -- initialize symbol table --\n");
        os.push_str("SymbolTable symTable\n");
        if symbols.len() > 0 {
            os.push_str("{\n");
            for symbol in symbols.iter() {
                writeln!(os, "\tR\"_({})_\",", symbol).unwrap();
            }
            os.push('}');
        }
        os.push(';');

        if config.profiling() {
            os.push_str("private:\n");
            if self.mint.freq_count() > 0 {
                writeln!(os, "  size_t freqs[{}]{{}};", self.mint.freq_count()).unwrap();
            }
            if self.mint.read_count() > 0 {
                writeln!(os, "  size_t reads[{}]{{}};", self.mint.read_count()).unwrap();
            }
        }

        // input/output roles derive from the load/store statements
        let mut load_relations: BTreeSet<String> = BTreeSet::new();
        let mut store_relations: BTreeSet<String> = BTreeSet::new();
        prog.main().for_each_statement(&mut |s| match s {
            Statement::Load { relation, .. } => {
                load_relations.insert(relation.name().to_string());
            }
            Statement::Store { relation, .. } => {
                store_relations.insert(relation.name().to_string());
            }
            _ => {}
        });

        // -- relation fields --
        let mut init_cons = String::new();
        let mut register_rel = String::new();
        let mut rel_ctr = 0;
        for rel in prog.relations() {
            let arity = rel.arity();
            let auxiliary_arity = rel.auxiliary_arity();
            let datalog_name = rel.name();
            let cpp_name = self.mint.relation_name(rel);
            let relation_type = self.relation_type(rel);
            let type_name = relation_type.type_name();

            writeln!(os, "// -- Table: {}", datalog_name).unwrap();
            writeln!(
                os,
                "std::unique_ptr<{}> {} = std::make_unique<{}>();",
                type_name, cpp_name, type_name
            )
            .unwrap();
            if !rel.is_temp() {
                writeln!(
                    os,
                    "souffle::RelationWrapper<{},{},Tuple<RamDomain,{}>,{},{}> wrapper_{};",
                    rel_ctr, type_name, arity, arity, auxiliary_arity, cpp_name
                )
                .unwrap();
                rel_ctr += 1;

                let quote_join = |items: &[String]| -> String {
                    items
                        .iter()
                        .map(|s| format!("\"{}\"", s))
                        .collect::<Vec<_>>()
                        .join(",")
                };
                let tuple_type = format!(
                    "std::array<const char *,{}>{{{{{}}}}}",
                    arity,
                    quote_join(rel.attribute_types())
                );
                let tuple_name = format!(
                    "std::array<const char *,{}>{{{{{}}}}}",
                    arity,
                    quote_join(rel.attribute_names())
                );

                if !init_cons.is_empty() {
                    init_cons.push_str(",\n");
                }
                write!(
                    init_cons,
                    "\nwrapper_{}(*{},symTable,\"{}\",{},{})",
                    cpp_name, cpp_name, datalog_name, tuple_type, tuple_name
                )
                .unwrap();
                write!(register_rel, "addRelation(\"{}\",&wrapper_{},", datalog_name, cpp_name)
                    .unwrap();
                register_rel.push_str(if load_relations.contains(datalog_name) {
                    "true"
                } else {
                    "false"
                });
                register_rel.push(',');
                register_rel.push_str(if store_relations.contains(datalog_name) {
                    "true"
                } else {
                    "false"
                });
                register_rel.push_str(");\n");
            }
        }
        os.push_str("public:\n");

        // -- constructor --
        os.push_str(&classname);
        if config.profiling() {
            os.push_str("(std::string pf=\"profile.log\") : profiling_fname(pf)");
            if !init_cons.is_empty() {
                write!(os, ",\n{}", init_cons).unwrap();
            }
        } else {
            os.push_str("()");
            if !init_cons.is_empty() {
                write!(os, " : {}", init_cons).unwrap();
            }
        }
        os.push_str("{\n");
        if config.profiling() {
            os.push_str("ProfileEventSingleton::instance().setOutputFile(profiling_fname);\n");
        }
        os.push_str(&register_rel);
        os.push_str("}\n");

        // -- destructor --
        writeln!(os, "~{}() {{", classname).unwrap();
        os.push_str("}\n");

        // -- run function --
        os.push_str(
            "private:\nvoid runFunction(std::string inputDirectory = \".\", \
             std::string outputDirectory = \".\", bool performIO = false) {\n",
        );
        os.push_str("SignalHandler::instance()->set();\n");
        if config.verbose {
            os.push_str("SignalHandler::instance()->enableLogging();\n");
        }

        let mut has_increment = false;
        prog.main().for_each_expression(&mut |e| {
            if matches!(e, Expression::AutoIncrement) {
                has_increment = true;
            }
        });
        if has_increment {
            os.push_str("// -- initialize counter --\n");
            os.push_str("std::atomic<RamDomain> ctr(0);\n\n");
        }
        os.push_str("std::atomic<size_t> iter(0);\n\n");

        os.push_str("#if defined(_OPENMP)\n");
        os.push_str("if (getNumThreads() > 0) {omp_set_num_threads(getNumThreads());}\n");
        os.push_str("#endif\n\n");

        os.push_str("// -- query evaluation --\n");
        if config.profiling() {
            os.push_str("ProfileEventSingleton::instance().startTimer();\n");
            os.push_str("ProfileEventSingleton::instance().makeTimeEvent(\"@time;starttime\");\n");
            os.push_str("{\n");
            os.push_str("Logger logger(\"@runtime;\", 0);\n");
            let relation_count = prog
                .relations()
                .iter()
                .filter(|rel| !rel.name().starts_with('@'))
                .count();
            write!(
                os,
                "ProfileEventSingleton::instance().makeConfigRecord(\"relationCount\", std::to_string({}));",
                relation_count
            )
            .unwrap();
        }

        os.push_str(&main_body);

        if config.profiling() {
            os.push_str("}\n");
            os.push_str("ProfileEventSingleton::instance().stopTimer();\n");
            os.push_str("dumpFreqs();\n");
        }

        os.push_str("\n// -- relation hint statistics --\n");
        os.push_str("if(isHintsProfilingEnabled()) {\n");
        os.push_str("std::cout << \" -- Operation Hint Statistics --\\n\";\n");
        for rel in prog.relations() {
            let name = self.mint.relation_name(rel);
            writeln!(os, "std::cout << \"Relation {}:\\n\";", name).unwrap();
            writeln!(os, "{}->printHintStatistics(std::cout,\"  \");", name).unwrap();
            os.push_str("std::cout << \"\\n\";\n");
        }
        os.push_str("}\n");
        os.push_str("SignalHandler::instance()->reset();\n");
        os.push_str("}\n");

        // -- entry points --
        os.push_str("public:\nvoid run() override { runFunction(\".\", \".\", false); }\n");
        os.push_str(
            "public:\nvoid runAll(std::string inputDirectory = \".\", \
             std::string outputDirectory = \".\") override { ",
        );
        if config.live_profile {
            os.push_str("std::thread profiler([]() { profile::Tui().runProf(); });\n");
        }
        os.push_str("runFunction(inputDirectory, outputDirectory, true);\n");
        if config.live_profile {
            os.push_str("if (profiler.joinable()) { profiler.join(); }\n");
        }
        os.push_str("}\n");

        // -- printAll --
        os.push_str("public:\n");
        os.push_str("void printAll(std::string outputDirectory = \".\") override {\n");
        prog.main().for_each_statement(&mut |s| {
            if let Statement::Store { relation, directives } = s {
                for io in directives {
                    os.push_str("try {");
                    writeln!(os, "std::map<std::string, std::string> directiveMap({});", io)
                        .unwrap();
                    os.push_str(
                        "if (!outputDirectory.empty() && directiveMap[\"IO\"] == \"file\" && \
                         directiveMap[\"filename\"].front() != '/') {",
                    );
                    os.push_str(
                        "directiveMap[\"filename\"] = outputDirectory + \"/\" + directiveMap[\"filename\"];",
                    );
                    os.push_str("}\n");
                    os.push_str("IODirectives ioDirectives(directiveMap);\n");
                    os.push_str("IOSystem::getInstance().getWriter(");
                    write!(os, "std::vector<RamTypeAttribute>({{{}}})", symbol_mask(relation))
                        .unwrap();
                    write!(os, ", symTable, ioDirectives, {}", relation.auxiliary_arity()).unwrap();
                    writeln!(os, ")->writeAll(*{});", self.mint.relation_name(relation)).unwrap();
                    os.push_str("} catch (std::exception& e) {std::cerr << e.what();exit(1);}\n");
                }
            }
        });
        os.push_str("}\n");

        // -- dumpFreqs --
        if config.profiling() {
            os.push_str("private:\n");
            os.push_str("void dumpFreqs() {\n");
            for (text, idx) in self.mint.freq_entries() {
                writeln!(
                    os,
                    "\tProfileEventSingleton::instance().makeQuantityEvent(R\"_({})_\", freqs[{}],0);",
                    text, idx
                )
                .unwrap();
            }
            for (key, idx) in self.mint.read_entries() {
                writeln!(
                    os,
                    "\tProfileEventSingleton::instance().makeQuantityEvent(R\"_(@relation-reads;{})_\", reads[{}],0);",
                    key, idx
                )
                .unwrap();
            }
            os.push_str("}\n");
        }

        // -- loadAll --
        os.push_str("public:\n");
        os.push_str("void loadAll(std::string inputDirectory = \".\") override {\n");
        prog.main().for_each_statement(&mut |s| {
            if let Statement::Load { relation, directives } = s {
                for io in directives {
                    os.push_str("try {");
                    writeln!(os, "std::map<std::string, std::string> directiveMap({});", io)
                        .unwrap();
                    os.push_str(
                        "if (!inputDirectory.empty() && directiveMap[\"IO\"] == \"file\" && \
                         directiveMap[\"filename\"].front() != '/') {",
                    );
                    os.push_str(
                        "directiveMap[\"filename\"] = inputDirectory + \"/\" + directiveMap[\"filename\"];",
                    );
                    os.push_str("}\n");
                    os.push_str("IODirectives ioDirectives(directiveMap);\n");
                    os.push_str("IOSystem::getInstance().getReader(");
                    write!(os, "std::vector<RamTypeAttribute>({{{}}})", symbol_mask(relation))
                        .unwrap();
                    os.push_str(", symTable, ioDirectives");
                    write!(os, ", {}", relation.auxiliary_arity()).unwrap();
                    writeln!(os, ")->readAll(*{});", self.mint.relation_name(relation)).unwrap();
                    os.push_str(
                        "} catch (std::exception& e) {std::cerr << \"Error loading data: \" << e.what() << '\\n';}\n",
                    );
                }
            }
        });
        os.push_str("}\n");

        // -- dump methods --
        os.push_str("public:\n");
        os.push_str("void dumpInputs(std::ostream& out = std::cout) override {\n");
        let mut dumped: BTreeSet<String> = BTreeSet::new();
        prog.main().for_each_statement(&mut |s| {
            if let Statement::Load { relation, .. } = s {
                if dumped.insert(relation.name().to_string()) {
                    self.dump_relation(os, relation);
                }
            }
        });
        os.push_str("}\n");

        os.push_str("public:\n");
        os.push_str("void dumpOutputs(std::ostream& out = std::cout) override {\n");
        let mut dumped: BTreeSet<String> = BTreeSet::new();
        prog.main().for_each_statement(&mut |s| {
            if let Statement::Store { relation, .. } = s {
                if dumped.insert(relation.name().to_string()) {
                    self.dump_relation(os, relation);
                }
            }
        });
        os.push_str("}\n");

        os.push_str("public:\n");
        os.push_str("SymbolTable& getSymbolTable() override {\n");
        os.push_str("return symTable;\n");
        os.push_str("}\n");

        // -- provenance subroutines --
        if config.provenance.is_enabled() {
            if config.provenance == crate::config::Provenance::SubtreeHeights {
                os.push_str("void copyIndex() {\n");
                for rel in prog.relations() {
                    let relation_type = self.relation_type(rel);
                    if !relation_type.provenance_index_numbers().is_empty() {
                        writeln!(os, "{}->copyIndex();", self.mint.relation_name(rel)).unwrap();
                    }
                }
                os.push_str("}\n");
            }

            os.push_str(
                "void executeSubroutine(std::string name, const std::vector<RamDomain>& args, \
                 std::vector<RamDomain>& ret) override {\n",
            );
            for (num, (name, _)) in subroutine_bodies.iter().enumerate() {
                writeln!(os, "if (name == \"{}\") {{", name).unwrap();
                writeln!(os, "subproof_{}(args, ret);", num).unwrap();
                os.push_str("}\n");
            }
            os.push_str("}\n");

            for (num, (_, body)) in subroutine_bodies.iter().enumerate() {
                writeln!(
                    os,
                    "void subproof_{}(const std::vector<RamDomain>& args, std::vector<RamDomain>& ret) {{",
                    num
                )
                .unwrap();
                // writes to the shared return vector serialise on this lock
                os.push_str("std::mutex lock;\n");
                os.push_str(body);
                os.push_str("return;\n");
                os.push_str("}\n");
            }
        }
        os.push_str("};\n");

        // -- factory hooks --
        writeln!(os, "SouffleProgram *newInstance_{}(){{return new {};}}", id, classname).unwrap();
        writeln!(
            os,
            "SymbolTable *getST_{}(SouffleProgram *p){{return &reinterpret_cast<{}*>(p)->symTable;}}",
            id, classname
        )
        .unwrap();

        os.push_str("\n#ifdef __EMBEDDED_SOUFFLE__\n");
        writeln!(os, "class factory_{}: public souffle::ProgramFactory {{", classname).unwrap();
        os.push_str("SouffleProgram *newInstance() {\n");
        writeln!(os, "return new {}();", classname).unwrap();
        os.push_str("};\n");
        os.push_str("public:\n");
        writeln!(os, "factory_{}() : ProgramFactory(\"{}\"){{}}", classname, id).unwrap();
        os.push_str("};\n");
        writeln!(os, "static factory_{} __factory_{}_instance;", classname, classname).unwrap();
        os.push_str("}\n");
        os.push_str("#else\n");
        os.push_str("}\n");

        // -- main --
        os.push_str("int main(int argc, char** argv)\n{\n");
        os.push_str("try{\n");
        os.push_str("souffle::CmdOptions opt(");
        writeln!(os, "R\"({})\",", config.source_file).unwrap();
        os.push_str("R\"(.)\",\n");
        os.push_str("R\"(.)\",\n");
        if config.profiling() {
            os.push_str("true,\n");
            writeln!(os, "R\"({})\",", config.profile_path()).unwrap();
        } else {
            os.push_str("false,\n");
            os.push_str("R\"()\",\n");
        }
        writeln!(os, "{},", config.jobs).unwrap();
        os.push_str("-1");
        os.push_str(");\n");

        os.push_str("if (!opt.parse(argc,argv)) return 1;\n");

        os.push_str("souffle::");
        if config.profiling() {
            writeln!(os, "{} obj(opt.getProfileName());", classname).unwrap();
        } else {
            writeln!(os, "{} obj;", classname).unwrap();
        }

        os.push_str("#if defined(_OPENMP) \n");
        os.push_str("obj.setNumThreads(opt.getNumJobs());\n");
        os.push_str("\n#endif\n");

        if config.profiling() {
            os.push_str(
                "souffle::ProfileEventSingleton::instance().makeConfigRecord(\"\", opt.getSourceFileName());\n",
            );
            os.push_str(
                "souffle::ProfileEventSingleton::instance().makeConfigRecord(\"fact-dir\", opt.getInputFileDir());\n",
            );
            os.push_str(
                "souffle::ProfileEventSingleton::instance().makeConfigRecord(\"jobs\", std::to_string(opt.getNumJobs()));\n",
            );
            os.push_str(
                "souffle::ProfileEventSingleton::instance().makeConfigRecord(\"output-dir\", opt.getOutputFileDir());\n",
            );
            writeln!(
                os,
                "souffle::ProfileEventSingleton::instance().makeConfigRecord(\"version\", \"{}\");",
                config.version
            )
            .unwrap();
        }
        os.push_str("obj.runAll(opt.getInputFileDir(), opt.getOutputFileDir());\n");

        match config.provenance {
            crate::config::Provenance::Explain => os.push_str("explain(obj, false, false);\n"),
            crate::config::Provenance::SubtreeHeights => {
                os.push_str("obj.copyIndex();\n");
                os.push_str("explain(obj, false, true);\n");
            }
            crate::config::Provenance::Explore => os.push_str("explain(obj, true, false);\n"),
            crate::config::Provenance::Off => {}
        }
        os.push_str("return 0;\n");
        os.push_str("} catch(std::exception &e) { souffle::SignalHandler::instance()->error(e.what());}\n");
        os.push_str("}\n");
        os.push_str("\n#endif\n");

        debug!("translation unit for {} complete ({} bytes)", id, os.len());
        with_shared_library
    }

    /// Write one relation to stdout via the I/O system; shared by the
    /// input and output dump methods.
    fn dump_relation(&mut self, os: &mut String, relation: &Rc<Relation>) {
        let rel_name = self.mint.relation_name(relation);

        os.push_str("try {");
        os.push_str("IODirectives ioDirectives;\n");
        os.push_str("ioDirectives.setIOType(\"stdout\");\n");
        writeln!(os, "ioDirectives.setRelationName(\"{}\");", relation.name()).unwrap();
        os.push_str("IOSystem::getInstance().getWriter(");
        write!(os, "std::vector<RamTypeAttribute>({{{}}})", symbol_mask(relation)).unwrap();
        write!(os, ", symTable, ioDirectives, {}", relation.auxiliary_arity()).unwrap();
        writeln!(os, ")->writeAll(*{});", rel_name).unwrap();
        os.push_str("} catch (std::exception& e) {std::cerr << e.what();exit(1);}\n");
    }
}
