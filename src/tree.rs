//! Parse tree produced by the dissector.
//!
//! Every node carries absolute byte offsets into the packet, `[start, end)`, so a
//! viewer can highlight exactly the bytes of any nested field. A sub-byte field spans
//! every byte it touches.

use crate::value::Value;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedField {
    pub name: String,
    pub node: Node,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Scalar(Value),
    /// Result of a `parse` field: one concrete structure.
    Structure(DecodedStructure),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedStructure {
    pub name: String,
    pub fields: Vec<DecodedField>,
    pub start: usize,
    pub end: usize,
}

/// Top-level result: the accepted root followed by any structures chained with `next`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseTree {
    pub structures: Vec<DecodedStructure>,
}

impl DecodedField {
    pub fn value(&self) -> Option<&Value> {
        match &self.node {
            Node::Scalar(v) => Some(v),
            Node::Structure(_) => None,
        }
    }

    pub fn structure(&self) -> Option<&DecodedStructure> {
        match &self.node {
            Node::Structure(s) => Some(s),
            Node::Scalar(_) => None,
        }
    }

    pub fn width(&self) -> usize {
        self.end - self.start
    }
}

impl DecodedStructure {
    /// First direct field named `name` holding a scalar.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .filter(|f| f.name == name)
            .find_map(DecodedField::value)
    }

    /// All direct fields named `name`, in order (repeated and `parse` fields).
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DecodedField> + 'a {
        self.fields.iter().filter(move |f| f.name == name)
    }

    /// First scalar named `name`, searching nested structures depth-first.
    pub fn find(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find_map(|f| match &f.node {
            Node::Scalar(v) if f.name == name => Some(v),
            Node::Scalar(_) => None,
            Node::Structure(s) => s.find(name),
        })
    }

    /// Scalar leaves in document order.
    pub fn leaves(&self) -> Vec<&DecodedField> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a DecodedField>) {
        for f in &self.fields {
            match &f.node {
                Node::Scalar(_) => out.push(f),
                Node::Structure(s) => s.collect_leaves(out),
            }
        }
    }
}

impl ParseTree {
    pub fn root(&self) -> Option<&DecodedStructure> {
        self.structures.first()
    }

    /// Offset one past the last decoded byte.
    pub fn end(&self) -> usize {
        self.structures.last().map(|s| s.end).unwrap_or(0)
    }

    pub fn find(&self, name: &str) -> Option<&Value> {
        self.structures.iter().find_map(|s| s.find(name))
    }
}
