//! Load YAML grammar documents into the [`Grammar`] model.
//!
//! Trigger lookup tables are typed here, so a malformed table is a load error rather
//! than a parse-time surprise.

use crate::ast::*;
use crate::error::GrammarError;
use crate::format::Format;
use serde_yaml::{Mapping, Value as Yaml};
use std::path::Path;

/// Key holding the root structure names.
const ROOTS_KEY: &str = "top";
const SAVE_TO_CONTEXT: &str = "save_to_context";

/// Parse grammar source text.
pub fn parse(source: &str) -> Result<Grammar, GrammarError> {
    let doc: Yaml = serde_yaml::from_str(source)?;
    let map = doc.as_mapping().ok_or_else(|| GrammarError::Malformed {
        structure: "<document>".to_string(),
        reason: "top level must be a mapping".to_string(),
    })?;
    let mut roots = None;
    let mut structures = Vec::new();
    for (key, body) in map {
        let name = key.as_str().ok_or_else(|| GrammarError::Malformed {
            structure: format!("{:?}", key),
            reason: "structure names must be strings".to_string(),
        })?;
        if name == ROOTS_KEY {
            roots = Some(build_roots(body)?);
        } else {
            structures.push(build_structure(name, body)?);
        }
    }
    Grammar::new(roots.ok_or(GrammarError::MissingRoots)?, structures)
}

/// Read and parse a grammar file.
pub fn load_file(path: &Path) -> Result<Grammar, GrammarError> {
    let src = std::fs::read_to_string(path)?;
    parse(&src)
}

fn build_roots(body: &Yaml) -> Result<Vec<String>, GrammarError> {
    let seq = body.as_sequence().ok_or(GrammarError::MissingRoots)?;
    seq.iter()
        .map(|r| {
            r.as_str().map(str::to_string).ok_or_else(|| GrammarError::Malformed {
                structure: ROOTS_KEY.to_string(),
                reason: format!("root name {:?} is not a string", r),
            })
        })
        .collect()
}

fn build_structure(name: &str, body: &Yaml) -> Result<Structure, GrammarError> {
    let malformed = |reason: String| GrammarError::Malformed {
        structure: name.to_string(),
        reason,
    };
    let seq = body
        .as_sequence()
        .ok_or_else(|| malformed("expected a list of field descriptors".to_string()))?;
    let mut descriptors = Vec::with_capacity(seq.len());
    for item in seq {
        let entry = item
            .as_mapping()
            .filter(|m| m.len() == 1)
            .and_then(|m| m.iter().next())
            .ok_or_else(|| malformed(format!("descriptor {:?} is not a single-entry mapping", item)))?;
        let (key, args) = entry;
        let field = key
            .as_str()
            .map(str::to_string)
            .or_else(|| key.as_i64().map(|i| i.to_string()))
            .ok_or_else(|| malformed(format!("descriptor key {:?} is not a name", key)))?;
        let d = match field.as_str() {
            "type" => Descriptor::Type(
                args.as_str()
                    .ok_or_else(|| malformed("`type` must name an abstract type".to_string()))?
                    .to_string(),
            ),
            "next" => Descriptor::Next(
                args.as_str()
                    .ok_or_else(|| malformed("`next` must name a structure".to_string()))?
                    .to_string(),
            ),
            _ => {
                let at = At { structure: name, field: &field };
                Descriptor::Field(build_field(&at, args)?)
            }
        };
        descriptors.push(d);
    }
    Ok(Structure {
        name: name.to_string(),
        descriptors,
    })
}

/// Location used in attribute errors.
struct At<'a> {
    structure: &'a str,
    field: &'a str,
}

impl At<'_> {
    fn err(&self, reason: impl Into<String>) -> GrammarError {
        GrammarError::BadAttribute {
            structure: self.structure.to_string(),
            field: self.field.to_string(),
            reason: reason.into(),
        }
    }
}

fn build_field(at: &At<'_>, args: &Yaml) -> Result<FieldDescriptor, GrammarError> {
    let mut attributes = FieldAttributes::default();
    let mut repeated = false;
    let map = match args {
        Yaml::Null => Mapping::new(),
        Yaml::Mapping(m) => m.clone(),
        other => return Err(at.err(format!("attributes must be a mapping, got {:?}", other))),
    };
    for (key, v) in &map {
        let name = key.as_str().ok_or_else(|| at.err(format!("attribute name {:?}", key)))?;
        if name == "repeated" {
            repeated = match v {
                Yaml::Bool(b) => *b,
                Yaml::Null => true,
                other => return Err(at.err(format!("`repeated` must be a boolean, got {:?}", other))),
            };
            continue;
        }
        let kind = AttributeKind::from_name(name).ok_or_else(|| at.err(format!("unknown attribute `{}`", name)))?;
        attributes.set(attribute_value(at, kind, v)?);
    }
    Ok(FieldDescriptor {
        name: at.field.to_string(),
        attributes,
        repeated,
    })
}

/// Typed value of one attribute; shared by field attributes and lookup tables.
fn attribute_value(at: &At<'_>, kind: AttributeKind, v: &Yaml) -> Result<AttributeValue, GrammarError> {
    Ok(match kind {
        AttributeKind::Length => AttributeValue::Length(build_length(at, v)?),
        AttributeKind::Values => AttributeValue::Values(build_values(at, v)?),
        AttributeKind::Parse => AttributeValue::Parse(
            v.as_str()
                .ok_or_else(|| at.err("`parse` must name a structure or type"))?
                .to_string(),
        ),
        AttributeKind::Conditions => AttributeValue::Conditions(build_conditions(at, v)?),
        AttributeKind::Triggers => AttributeValue::Triggers(build_triggers(at, v)?),
        AttributeKind::ByteLength => AttributeValue::ByteLength(
            v.as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| at.err("`byte_length` must be a non-negative integer"))?,
        ),
        AttributeKind::Format => {
            let name = v.as_str().ok_or_else(|| at.err("`format` must be a name"))?;
            AttributeValue::Format(Format::from_name(name).ok_or_else(|| at.err(format!("unknown format `{}`", name)))?)
        }
    })
}

fn build_length(at: &At<'_>, v: &Yaml) -> Result<Length, GrammarError> {
    if let Some(n) = v.as_u64() {
        return Ok(Length::Bits(n));
    }
    match v.as_str() {
        Some("varint") => Ok(Length::Varint),
        Some("pn") => Ok(Length::PacketNumber),
        Some("*") => Ok(Length::Rest),
        _ => Err(at.err(format!("invalid length {:?}", v))),
    }
}

fn literal(at: &At<'_>, v: &Yaml) -> Result<Literal, GrammarError> {
    match v {
        Yaml::Number(n) => n
            .as_i64()
            .map(Literal::Int)
            .ok_or_else(|| at.err(format!("literal {} out of range", n))),
        Yaml::String(s) => Ok(Literal::Str(s.clone())),
        Yaml::Bool(b) => Ok(Literal::Bool(*b)),
        other => Err(at.err(format!("invalid literal {:?}", other))),
    }
}

fn compare_op(at: &At<'_>, key: &Yaml) -> Result<CompareOp, GrammarError> {
    match key.as_str() {
        Some("eq") => Ok(CompareOp::Eq),
        Some("neq") => Ok(CompareOp::Neq),
        _ => Err(at.err(format!("unknown operator {:?}", key))),
    }
}

fn build_values(at: &At<'_>, v: &Yaml) -> Result<ValueSpec, GrammarError> {
    match v {
        Yaml::Sequence(seq) => Ok(ValueSpec::OneOf(
            seq.iter().map(|l| literal(at, l)).collect::<Result<_, _>>()?,
        )),
        Yaml::Mapping(m) => Ok(ValueSpec::Ops(
            m.iter()
                .map(|(op, l)| Ok((compare_op(at, op)?, literal(at, l)?)))
                .collect::<Result<_, GrammarError>>()?,
        )),
        scalar => Ok(ValueSpec::Single(literal(at, scalar)?)),
    }
}

fn build_conditions(at: &At<'_>, v: &Yaml) -> Result<Vec<Condition>, GrammarError> {
    let seq = v.as_sequence().ok_or_else(|| at.err("`conditions` must be a list"))?;
    let mut out = Vec::new();
    for c in seq {
        let m = c.as_mapping().ok_or_else(|| at.err(format!("condition {:?} is not a mapping", c)))?;
        for (field, formula) in m {
            let field = field
                .as_str()
                .ok_or_else(|| at.err(format!("condition field {:?}", field)))?;
            let formula = formula
                .as_mapping()
                .ok_or_else(|| at.err(format!("condition on `{}` needs eq/neq", field)))?;
            for (op, l) in formula {
                out.push(Condition {
                    field: field.to_string(),
                    op: compare_op(at, op)?,
                    literal: literal(at, l)?,
                });
            }
        }
    }
    Ok(out)
}

fn build_triggers(at: &At<'_>, v: &Yaml) -> Result<Vec<Trigger>, GrammarError> {
    let seq = v.as_sequence().ok_or_else(|| at.err("`triggers` must be a list"))?;
    let mut out = Vec::new();
    for t in seq {
        let m = t.as_mapping().ok_or_else(|| at.err(format!("trigger {:?} is not a mapping", t)))?;
        for (target, actions) in m {
            let target = target
                .as_str()
                .ok_or_else(|| at.err(format!("trigger target {:?}", target)))?;
            if target == SAVE_TO_CONTEXT {
                out.push(Trigger {
                    target: TriggerTarget::SaveToContext,
                    rules: Vec::new(),
                });
                continue;
            }
            let actions = actions
                .as_mapping()
                .ok_or_else(|| at.err(format!("trigger on `{}` needs attribute: action", target)))?;
            let mut rules = Vec::new();
            for (attr, action) in actions {
                let attr_name = attr.as_str().unwrap_or_default();
                let kind = AttributeKind::from_name(attr_name)
                    .ok_or_else(|| at.err(format!("trigger sets unknown attribute {:?}", attr)))?;
                let action = match action {
                    Yaml::String(s) if s == "set" => TriggerAction::Set,
                    Yaml::Mapping(table) => TriggerAction::Lookup(
                        table
                            .iter()
                            .map(|(k, v)| Ok((literal(at, k)?, attribute_value(at, kind, v)?)))
                            .collect::<Result<_, GrammarError>>()?,
                    ),
                    other => return Err(at.err(format!("invalid trigger action {:?}", other))),
                };
                rules.push((kind, action));
            }
            out.push(Trigger {
                target: TriggerTarget::Field(target.to_string()),
                rules,
            });
        }
    }
    Ok(out)
}
