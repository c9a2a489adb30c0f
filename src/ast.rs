//! In-memory model of a structure grammar document.
//!
//! A [`Grammar`] maps structure names to ordered field descriptors and lists the root
//! structures tried at top level. Descriptors are a tagged variant ([`Descriptor`]);
//! per-field attributes live in [`FieldAttributes`], the same shape used for trigger
//! overrides and the stream context.

use crate::format::Format;
use crate::value::Value;
use std::collections::HashMap;

/// Loaded grammar: roots plus structures in document order.
#[derive(Debug, Clone)]
pub struct Grammar {
    pub roots: Vec<String>,
    pub structures: Vec<Structure>,
    structures_by_name: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct Structure {
    pub name: String,
    pub descriptors: Vec<Descriptor>,
}

#[derive(Debug, Clone)]
pub enum Descriptor {
    /// `type: Name` marks the structure as an alternative of an abstract type.
    Type(String),
    /// `next: Name` ends the structure and chains a sibling.
    Next(String),
    Field(FieldDescriptor),
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub attributes: FieldAttributes,
    pub repeated: bool,
}

/// Decode parameters of one field. Every attribute is optional so the same shape
/// serves static descriptors, trigger overrides and persisted context entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldAttributes {
    pub length: Option<Length>,
    pub values: Option<ValueSpec>,
    pub parse: Option<String>,
    pub conditions: Option<Vec<Condition>>,
    pub triggers: Option<Vec<Trigger>>,
    pub byte_length: Option<usize>,
    pub format: Option<Format>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Bits(u64),
    /// Self-describing integer, width from the top 2 bits.
    Varint,
    /// Packet-number encoding (`pn`).
    PacketNumber,
    /// `*`: remainder of the buffer.
    Rest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueSpec {
    Single(Literal),
    OneOf(Vec<Literal>),
    Ops(Vec<(CompareOp, Literal)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: CompareOp,
    pub literal: Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub target: TriggerTarget,
    pub rules: Vec<(AttributeKind, TriggerAction)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerTarget {
    Field(String),
    /// Persist the pending overrides into the stream context.
    SaveToContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerAction {
    /// Copy the decoded value into the attribute.
    Set,
    /// Value-indexed table; entries are typed at load time.
    Lookup(Vec<(Literal, AttributeValue)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Length,
    Values,
    Parse,
    Conditions,
    Triggers,
    ByteLength,
    Format,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Length(Length),
    Values(ValueSpec),
    Parse(String),
    Conditions(Vec<Condition>),
    Triggers(Vec<Trigger>),
    ByteLength(usize),
    Format(Format),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl CompareOp {
    pub fn holds(self, value: &Value, literal: &Literal) -> bool {
        match self {
            CompareOp::Eq => value.matches(literal),
            CompareOp::Neq => !value.matches(literal),
        }
    }
}

impl ValueSpec {
    /// Post-decode acceptance test.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueSpec::Single(l) => value.matches(l),
            ValueSpec::OneOf(ls) => ls.iter().any(|l| value.matches(l)),
            ValueSpec::Ops(ops) => ops.iter().all(|(op, l)| op.holds(value, l)),
        }
    }
}

impl std::fmt::Display for ValueSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSpec::Single(l) => write!(f, "{}", l),
            ValueSpec::OneOf(ls) => {
                let parts: Vec<String> = ls.iter().map(Literal::to_string).collect();
                write!(f, "one of [{}]", parts.join(", "))
            }
            ValueSpec::Ops(ops) => {
                let parts: Vec<String> = ops
                    .iter()
                    .map(|(op, l)| match op {
                        CompareOp::Eq => format!("eq {}", l),
                        CompareOp::Neq => format!("neq {}", l),
                    })
                    .collect();
                f.write_str(&parts.join(" and "))
            }
        }
    }
}

impl AttributeKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "length" => AttributeKind::Length,
            "values" => AttributeKind::Values,
            "parse" => AttributeKind::Parse,
            "conditions" => AttributeKind::Conditions,
            "triggers" => AttributeKind::Triggers,
            "byte_length" => AttributeKind::ByteLength,
            "format" => AttributeKind::Format,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            AttributeKind::Length => "length",
            AttributeKind::Values => "values",
            AttributeKind::Parse => "parse",
            AttributeKind::Conditions => "conditions",
            AttributeKind::Triggers => "triggers",
            AttributeKind::ByteLength => "byte_length",
            AttributeKind::Format => "format",
        }
    }
}

impl FieldAttributes {
    pub fn set(&mut self, value: AttributeValue) {
        match value {
            AttributeValue::Length(v) => self.length = Some(v),
            AttributeValue::Values(v) => self.values = Some(v),
            AttributeValue::Parse(v) => self.parse = Some(v),
            AttributeValue::Conditions(v) => self.conditions = Some(v),
            AttributeValue::Triggers(v) => self.triggers = Some(v),
            AttributeValue::ByteLength(v) => self.byte_length = Some(v),
            AttributeValue::Format(v) => self.format = Some(v),
        }
    }

    /// Overwrite every attribute `other` defines, keep the rest.
    pub fn merge(&mut self, other: &FieldAttributes) {
        if other.length.is_some() {
            self.length = other.length;
        }
        if other.values.is_some() {
            self.values = other.values.clone();
        }
        if other.parse.is_some() {
            self.parse = other.parse.clone();
        }
        if other.conditions.is_some() {
            self.conditions = other.conditions.clone();
        }
        if other.triggers.is_some() {
            self.triggers = other.triggers.clone();
        }
        if other.byte_length.is_some() {
            self.byte_length = other.byte_length;
        }
        if other.format.is_some() {
            self.format = other.format;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == FieldAttributes::default()
    }
}

impl Structure {
    /// Abstract type this structure is an alternative of (first descriptor `type`).
    pub fn type_name(&self) -> Option<&str> {
        match self.descriptors.first() {
            Some(Descriptor::Type(t)) => Some(t),
            _ => None,
        }
    }
}

impl Grammar {
    pub fn new(roots: Vec<String>, structures: Vec<Structure>) -> Result<Self, crate::error::GrammarError> {
        use crate::error::GrammarError;
        let mut structures_by_name = HashMap::new();
        for (i, s) in structures.iter().enumerate() {
            if structures_by_name.insert(s.name.clone(), i).is_some() {
                return Err(GrammarError::DuplicateStructure(s.name.clone()));
            }
        }
        if roots.is_empty() {
            return Err(GrammarError::MissingRoots);
        }
        if let Some(r) = roots.iter().find(|r| !structures_by_name.contains_key(r.as_str())) {
            return Err(GrammarError::UnknownRoot(r.clone()));
        }
        Ok(Grammar {
            roots,
            structures,
            structures_by_name,
        })
    }

    pub fn get_structure(&self, name: &str) -> Option<&Structure> {
        self.structures_by_name
            .get(name)
            .map(|&i| &self.structures[i])
    }

    /// Structures tagged `type: type_name`, in document order.
    pub fn structures_of_type(&self, type_name: &str) -> Vec<&Structure> {
        self.structures
            .iter()
            .filter(|s| s.type_name() == Some(type_name))
            .collect()
    }
}
