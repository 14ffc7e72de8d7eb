//! Relation-type synthesiser.
//!
//! Maps a relation plus its index signatures to a C++ container type:
//! a stable type name and the emission of the type's struct definition.
//! Lookup methods are emitted as `equalRange_<Columns...>` templates
//! dispatching on a signature tag, so call sites can name the bound
//! columns directly.

use crate::ram::SearchSignature;
use crate::relation::{Relation, RelationRepresentation};
use crate::synth::analysis::total_signature;
use std::fmt::Write;
use std::rc::Rc;

/// Descriptor of one synthesised relation type.
#[derive(Debug)]
pub struct SynthesiserRelation {
    relation: Rc<Relation>,
    /// Signatures the program uses on this relation, first-use order.
    signatures: Vec<SearchSignature>,
    /// One full lexicographic column order per index.
    orders: Vec<Vec<usize>>,
    provenance: bool,
}

/// Factory: build the type descriptor for a relation given its index
/// signatures and the provenance flag.
pub fn make_synthesiser_relation(
    relation: Rc<Relation>,
    signatures: &[SearchSignature],
    provenance: bool,
) -> SynthesiserRelation {
    let arity = relation.arity();
    let mut orders: Vec<Vec<usize>> = Vec::new();
    let mut kept: Vec<SearchSignature> = Vec::new();
    for &sig in signatures {
        let order = order_for(sig, arity);
        if !orders.contains(&order) {
            orders.push(order);
        }
        if !kept.contains(&sig) {
            kept.push(sig);
        }
    }
    if orders.is_empty() && arity > 0 {
        // every non-nullary relation carries at least the identity order
        orders.push((0..arity).collect());
    }
    SynthesiserRelation {
        relation,
        signatures: kept,
        orders,
        provenance,
    }
}

/// Full column order serving a signature: bound columns ascending, then
/// the remaining columns ascending.
fn order_for(signature: SearchSignature, arity: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..arity).filter(|i| signature & (1 << i) != 0).collect();
    order.extend((0..arity).filter(|i| signature & (1 << i) == 0));
    order
}

fn columns_of(signature: SearchSignature, arity: usize) -> Vec<usize> {
    (0..arity).filter(|i| signature & (1 << i) != 0).collect()
}

impl SynthesiserRelation {
    pub fn relation(&self) -> &Relation {
        &self.relation
    }

    /// Stable C++ type name for this relation shape.
    pub fn type_name(&self) -> String {
        let arity = self.relation.arity();
        if self.relation.representation() == RelationRepresentation::Info {
            return format!("t_info_{}", arity);
        }
        if arity == 0 {
            return "t_nullaries".to_string();
        }
        let mut name = format!("t_btree_{}", arity);
        if self.provenance {
            name.push_str("__p");
        }
        for order in &self.orders {
            name.push_str("__");
            for (i, col) in order.iter().enumerate() {
                if i > 0 {
                    name.push('_');
                }
                write!(name, "{}", col).unwrap();
            }
        }
        name
    }

    /// Indices participating in provenance bookkeeping; non-empty iff
    /// the generated type needs a `copyIndex` call before explanation.
    pub fn provenance_index_numbers(&self) -> Vec<usize> {
        if self.provenance && self.relation.auxiliary_arity() >= 2 {
            (0..self.orders.len()).collect()
        } else {
            Vec::new()
        }
    }

    /// Emit the C++ struct definition for this type.
    pub fn generate_type_struct(&self, out: &mut String) {
        if self.relation.representation() == RelationRepresentation::Info {
            self.generate_info_struct(out);
        } else if self.relation.arity() == 0 {
            self.generate_nullary_struct(out);
        } else {
            self.generate_btree_struct(out);
        }
    }

    fn generate_info_struct(&self, out: &mut String) {
        let arity = self.relation.arity();
        let name = self.type_name();
        writeln!(out, "struct {} {{", name).unwrap();
        writeln!(out, "using t_tuple = Tuple<RamDomain,{}>;", arity).unwrap();
        writeln!(out, "std::vector<t_tuple> data;").unwrap();
        writeln!(out, "Lock insert_lock;").unwrap();
        writeln!(out, "struct context {{}};").unwrap();
        writeln!(out, "context createContext() {{ return context(); }}").unwrap();
        writeln!(out, "bool insert(const t_tuple& t) {{").unwrap();
        writeln!(out, "auto lease = insert_lock.acquire();").unwrap();
        writeln!(out, "data.push_back(t);").unwrap();
        writeln!(out, "return true;").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool insert(const t_tuple& t, context&) {{ return insert(t); }}").unwrap();
        writeln!(out, "std::size_t size() const {{ return data.size(); }}").unwrap();
        writeln!(out, "bool empty() const {{ return data.empty(); }}").unwrap();
        writeln!(out, "void purge() {{ data.clear(); }}").unwrap();
        writeln!(out, "using iterator = std::vector<t_tuple>::const_iterator;").unwrap();
        writeln!(out, "iterator begin() const {{ return data.begin(); }}").unwrap();
        writeln!(out, "iterator end() const {{ return data.end(); }}").unwrap();
        writeln!(
            out,
            "void printHintStatistics(std::ostream& o, const std::string prefix) const {{"
        )
        .unwrap();
        writeln!(out, "o << prefix << \"info relation: no hints\\n\";").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "}};").unwrap();
    }

    fn generate_nullary_struct(&self, out: &mut String) {
        writeln!(out, "struct t_nullaries {{").unwrap();
        writeln!(out, "using t_tuple = Tuple<RamDomain,0>;").unwrap();
        writeln!(out, "std::atomic<bool> data{{false}};").unwrap();
        writeln!(out, "struct context {{}};").unwrap();
        writeln!(out, "context createContext() {{ return context(); }}").unwrap();
        writeln!(out, "bool insert(const t_tuple&) {{").unwrap();
        writeln!(out, "bool was = data.exchange(true);").unwrap();
        writeln!(out, "return !was;").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool insert(const t_tuple& t, context&) {{ return insert(t); }}").unwrap();
        writeln!(
            out,
            "bool contains(const t_tuple&, context&) const {{ return data; }}"
        )
        .unwrap();
        writeln!(out, "std::size_t size() const {{ return data ? 1 : 0; }}").unwrap();
        writeln!(out, "bool empty() const {{ return !data; }}").unwrap();
        writeln!(out, "void purge() {{ data = false; }}").unwrap();
        writeln!(out, "}};").unwrap();
    }

    fn generate_btree_struct(&self, out: &mut String) {
        let arity = self.relation.arity();
        let name = self.type_name();

        writeln!(out, "struct {} {{", name).unwrap();
        writeln!(out, "using t_tuple = Tuple<RamDomain,{}>;", arity).unwrap();
        for (i, order) in self.orders.iter().enumerate() {
            let args: Vec<String> = order.iter().map(|c| c.to_string()).collect();
            writeln!(
                out,
                "using t_ind_{} = btree_set<t_tuple, index_utils::comparator<{}>>;",
                i,
                args.join(",")
            )
            .unwrap();
            writeln!(out, "t_ind_{} ind_{};", i, i).unwrap();
        }
        writeln!(out, "using iterator = t_ind_0::iterator;").unwrap();
        writeln!(out, "template <unsigned... Columns> struct t_sig {{}};").unwrap();

        // per-thread hint bundle
        writeln!(out, "struct context {{").unwrap();
        for i in 0..self.orders.len() {
            writeln!(out, "t_ind_{}::operation_hints hints_{};", i, i).unwrap();
        }
        writeln!(out, "}};").unwrap();
        writeln!(out, "context createContext() {{ return context(); }}").unwrap();

        // insertion maintains every index
        writeln!(out, "bool insert(const t_tuple& t) {{").unwrap();
        writeln!(out, "context h;").unwrap();
        writeln!(out, "return insert(t, h);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool insert(const t_tuple& t, context& h) {{").unwrap();
        writeln!(out, "if (ind_0.insert(t, h.hints_0)) {{").unwrap();
        for i in 1..self.orders.len() {
            writeln!(out, "ind_{}.insert(t, h.hints_{});", i, i).unwrap();
        }
        writeln!(out, "return true;").unwrap();
        writeln!(out, "}} else return false;").unwrap();
        writeln!(out, "}}").unwrap();

        writeln!(out, "bool contains(const t_tuple& t, context& h) const {{").unwrap();
        writeln!(out, "return ind_0.contains(t, h.hints_0);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "std::size_t size() const {{ return ind_0.size(); }}").unwrap();
        writeln!(out, "bool empty() const {{ return ind_0.empty(); }}").unwrap();
        writeln!(out, "void purge() {{").unwrap();
        for i in 0..self.orders.len() {
            writeln!(out, "ind_{}.clear();", i).unwrap();
        }
        writeln!(out, "}}").unwrap();
        writeln!(out, "iterator begin() const {{ return ind_0.begin(); }}").unwrap();
        writeln!(out, "iterator end() const {{ return ind_0.end(); }}").unwrap();

        // lookup entry point: tag dispatch on the bound column pack
        writeln!(out, "template <unsigned... Columns>").unwrap();
        writeln!(out, "auto equalRange_(const t_tuple& key, context& h) const {{").unwrap();
        writeln!(out, "return equalRange(t_sig<Columns...>(), key, h);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "template <unsigned... Columns>").unwrap();
        writeln!(out, "auto equalRange_(const t_tuple& key) const {{").unwrap();
        writeln!(out, "context h;").unwrap();
        writeln!(out, "return equalRange(t_sig<Columns...>(), key, h);").unwrap();
        writeln!(out, "}}").unwrap();
        for &sig in &self.signatures {
            self.generate_equal_range(out, sig);
        }

        writeln!(out, "void extend(const {}& other) {{", name).unwrap();
        writeln!(out, "for (const auto& t : other.ind_0) insert(t);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "auto partition() const {{ return ind_0.getChunks(400); }}").unwrap();

        if !self.provenance_index_numbers().is_empty() {
            writeln!(out, "void copyIndex() {{").unwrap();
            writeln!(out, "for (const auto& t : ind_0) {{").unwrap();
            for i in 1..self.orders.len() {
                writeln!(out, "ind_{}.insert(t);", i).unwrap();
            }
            writeln!(out, "}}").unwrap();
            writeln!(out, "}}").unwrap();
        }

        writeln!(
            out,
            "void printHintStatistics(std::ostream& o, const std::string prefix) const {{"
        )
        .unwrap();
        for i in 0..self.orders.len() {
            writeln!(out, "o << prefix << \"arity {} b-tree index {}:\\n\";", arity, i).unwrap();
            writeln!(out, "ind_{}.printStats(o);", i).unwrap();
        }
        writeln!(out, "}}").unwrap();
        writeln!(out, "}};").unwrap();
    }

    /// Range lookup for one signature: fill the unbound columns of the
    /// serving index's low/high keys with the domain extremes.
    fn generate_equal_range(&self, out: &mut String, signature: SearchSignature) {
        let arity = self.relation.arity();
        let columns = columns_of(signature, arity);
        let index = self.index_for(signature);

        let args: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        writeln!(
            out,
            "souffle::range<t_ind_{}::iterator> equalRange(t_sig<{}>, const t_tuple& key, context& h) const {{",
            index,
            args.join(",")
        )
        .unwrap();
        if signature == total_signature(arity) {
            writeln!(
                out,
                "auto pos = ind_{}.find(key, h.hints_{});",
                index, index
            )
            .unwrap();
            writeln!(out, "auto fin = ind_{}.end();", index).unwrap();
            writeln!(out, "if (pos != fin) {{ fin = pos; ++fin; }}").unwrap();
            writeln!(out, "return souffle::make_range(pos, fin);").unwrap();
        } else {
            writeln!(out, "t_tuple low(key), high(key);").unwrap();
            for col in 0..arity {
                if signature & (1 << col) == 0 {
                    writeln!(out, "low[{}] = MIN_RAM_DOMAIN;", col).unwrap();
                    writeln!(out, "high[{}] = MAX_RAM_DOMAIN;", col).unwrap();
                }
            }
            writeln!(
                out,
                "return souffle::make_range(ind_{}.lower_bound(low, h.hints_{}), ind_{}.upper_bound(high, h.hints_{}));",
                index, index, index, index
            )
            .unwrap();
        }
        writeln!(out, "}}").unwrap();
    }

    /// The index whose order fronts exactly the signature's columns.
    fn index_for(&self, signature: SearchSignature) -> usize {
        let arity = self.relation.arity();
        let columns = columns_of(signature, arity);
        for (i, order) in self.orders.iter().enumerate() {
            let mut prefix: Vec<usize> = order[..columns.len().min(order.len())].to_vec();
            prefix.sort_unstable();
            if prefix == columns {
                return i;
            }
        }
        0
    }
}
