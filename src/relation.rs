//! Relation descriptors and I/O directives.
//!
//! A [`Relation`] describes one Datalog relation as seen by the RAM
//! program: name, arity, provenance columns, attribute metadata, and the
//! container representation requested upstream. Descriptors are shared
//! (`Rc`) between every RAM node that touches the relation.

use std::collections::BTreeMap;
use std::fmt;

/// Container representation requested for a relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationRepresentation {
    /// Let the synthesiser pick (b-tree).
    Default,
    Btree,
    Brie,
    Eqrel,
    /// Rule-info relation used by the provenance system.
    Info,
}

/// A Datalog relation descriptor.
#[derive(Clone, Debug)]
pub struct Relation {
    name: String,
    arity: usize,
    /// Trailing columns reserved for provenance annotations.
    auxiliary_arity: usize,
    attribute_names: Vec<String>,
    /// Attribute type tags; the first character distinguishes symbols
    /// (`s`) from numbers.
    attribute_types: Vec<String>,
    representation: RelationRepresentation,
}

impl Relation {
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        auxiliary_arity: usize,
        attribute_names: Vec<String>,
        attribute_types: Vec<String>,
        representation: RelationRepresentation,
    ) -> Self {
        assert!(auxiliary_arity <= arity, "auxiliary arity exceeds arity");
        Relation {
            name: name.into(),
            arity,
            auxiliary_arity,
            attribute_names,
            attribute_types,
            representation,
        }
    }

    /// Plain relation with numeric attributes named `x0..xn`.
    pub fn numeric(name: impl Into<String>, arity: usize) -> Self {
        let names = (0..arity).map(|i| format!("x{}", i)).collect();
        let types = (0..arity).map(|_| "i:number".to_string()).collect();
        Relation::new(name, arity, 0, names, types, RelationRepresentation::Default)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn auxiliary_arity(&self) -> usize {
        self.auxiliary_arity
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    pub fn attribute_types(&self) -> &[String] {
        &self.attribute_types
    }

    pub fn representation(&self) -> RelationRepresentation {
        self.representation
    }

    /// Fixed-point scratch relations (delta/new) carry a `@` prefix and
    /// are excluded from I/O, wrappers, and read counters.
    pub fn is_temp(&self) -> bool {
        self.name.starts_with('@')
    }
}

/// One I/O directive set for a load or store: string key/value pairs
/// rendered literally into the generated program.
///
/// Keys are kept sorted so the rendered map initialiser is deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IoDirectives {
    entries: BTreeMap<String, String>,
}

impl IoDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    /// File-backed directives for the common load/store case.
    pub fn file(relation: &str, filename: &str) -> Self {
        let mut io = Self::new();
        io.set("IO", "file");
        io.set("filename", filename);
        io.set("name", relation);
        io
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for IoDirectives {
    /// Renders as a C++ `std::map<std::string, std::string>` initialiser
    /// list body.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{{\"{}\",\"{}\"}}", k, v)?;
        }
        write!(f, "}}")
    }
}
