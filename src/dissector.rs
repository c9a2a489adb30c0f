//! Structure parser and polymorphic type resolver.
//!
//! A structure is parsed descriptor by descriptor against a [`BitCursor`]. Each field's
//! effective attributes are resolved with a fixed precedence: pending trigger
//! overrides from earlier fields of the same structure, then the stream context, then
//! the static descriptor. Every failure is a [`ParseError`] returned to the caller,
//! which decides whether to try another alternative.
//!
//! ## Repetition
//!
//! A `repeated` field is queued again after each success that consumed input, while
//! enough input remains. A failed re-attempt is rolled back (cursor, decoded fields,
//! overrides, context) and parsing continues with the next descriptor.
//!
//! ## Delegation
//!
//! A `parse` field hands the rest of the buffer (or a `byte_length` window of it) to a
//! named structure, or to the resolver when the name is an abstract type. Each parsed
//! structure follows its own `next` chain while bytes remain; every structure in the
//! chain becomes one decoded field named after the `parse` field. Entering a structure
//! at the offset where it is already being parsed is a [`ParseError::RecursiveStructure`].

use crate::ast::*;
use crate::context::{Overrides, StreamContext};
use crate::error::ParseError;
use crate::format::Format;
use crate::reader::BitCursor;
use crate::tree::{DecodedField, DecodedStructure, Node};
use crate::value::Value;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Behaviour switches for grammar quirks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// A `set` trigger writing 0 drops the target's remaining descriptors from the
    /// current structure instead of decoding a zero-width field.
    pub prune_zero_triggered: bool,
}

/// Fields of one parsed structure plus what the caller needs to continue.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureOutcome {
    pub fields: Vec<DecodedField>,
    /// Bytes consumed; a partially read final byte counts as consumed.
    pub consumed: usize,
    /// Sibling named by a `next` descriptor.
    pub next: Option<String>,
}

/// Concrete structure chosen for a `parse` target.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub structure: DecodedStructure,
    pub consumed: usize,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Pending<'g> {
    descriptor: &'g Descriptor,
    /// Queued by `repeated`; may fail silently and is never required.
    reattempt: bool,
}

#[derive(Debug, Clone, Copy)]
enum Repeat {
    Times(u64),
    UntilExhausted,
}

/// Structures currently being parsed, with their absolute start offsets.
type Active<'g> = Vec<(&'g str, usize)>;

/// Mutable state of one structure parse, saved whole for repetition rollback.
#[derive(Clone)]
struct Scope<'g> {
    queue: VecDeque<Pending<'g>>,
    fields: Vec<DecodedField>,
    overrides: Overrides,
}

/// Interprets one grammar.
#[derive(Debug, Clone, Copy)]
pub struct Dissector<'g> {
    grammar: &'g Grammar,
    options: Options,
}

impl<'g> Dissector<'g> {
    pub fn new(grammar: &'g Grammar, options: Options) -> Self {
        Dissector { grammar, options }
    }

    /// Parse `buffer` as structure `name`. `start_offset` is the absolute offset of
    /// `buffer[0]` in the packet and is only used for reporting.
    pub fn parse_structure(
        &self,
        buffer: &[u8],
        name: &str,
        start_offset: usize,
        ctx: &mut StreamContext,
    ) -> Result<StructureOutcome, ParseError> {
        let structure = self
            .grammar
            .get_structure(name)
            .ok_or_else(|| ParseError::UnknownStructure(name.to_string()))?;
        self.parse_definition(buffer, structure, start_offset, ctx, &mut Active::new())
    }

    /// Try every structure tagged `type: type_name` in document order and keep the
    /// first that parses. Context writes of rejected alternatives are discarded.
    pub fn resolve_type(
        &self,
        buffer: &[u8],
        type_name: &str,
        start_offset: usize,
        ctx: &mut StreamContext,
    ) -> Result<Resolved, ParseError> {
        self.resolve_type_in(buffer, type_name, start_offset, ctx, &mut Active::new())
    }

    /// Named structure if the grammar has one, abstract type otherwise.
    pub fn parse_target(
        &self,
        buffer: &[u8],
        target: &str,
        start_offset: usize,
        ctx: &mut StreamContext,
    ) -> Result<Resolved, ParseError> {
        self.parse_target_in(buffer, target, start_offset, ctx, &mut Active::new())
    }

    fn resolve_type_in(
        &self,
        buffer: &[u8],
        type_name: &str,
        start_offset: usize,
        ctx: &mut StreamContext,
        active: &mut Active<'g>,
    ) -> Result<Resolved, ParseError> {
        for candidate in self.grammar.structures_of_type(type_name) {
            let snapshot = ctx.clone();
            match self.parse_definition(buffer, candidate, start_offset, ctx, active) {
                Ok(out) => {
                    trace!(type_name, structure = %candidate.name, consumed = out.consumed, "type resolved");
                    return Ok(Resolved {
                        structure: DecodedStructure {
                            name: candidate.name.clone(),
                            fields: out.fields,
                            start: start_offset,
                            end: start_offset + out.consumed,
                        },
                        consumed: out.consumed,
                        next: out.next,
                    });
                }
                Err(e) => {
                    *ctx = snapshot;
                    debug!(type_name, structure = %candidate.name, error = %e, "alternative rejected");
                }
            }
        }
        Err(ParseError::NoMatchingStructure {
            type_name: type_name.to_string(),
            offset: start_offset,
            first_byte: buffer.first().copied(),
        })
    }

    fn parse_target_in(
        &self,
        buffer: &[u8],
        target: &str,
        start_offset: usize,
        ctx: &mut StreamContext,
        active: &mut Active<'g>,
    ) -> Result<Resolved, ParseError> {
        match self.grammar.get_structure(target) {
            Some(structure) => {
                let out = self.parse_definition(buffer, structure, start_offset, ctx, active)?;
                Ok(Resolved {
                    structure: DecodedStructure {
                        name: structure.name.clone(),
                        fields: out.fields,
                        start: start_offset,
                        end: start_offset + out.consumed,
                    },
                    consumed: out.consumed,
                    next: out.next,
                })
            }
            None => self.resolve_type_in(buffer, target, start_offset, ctx, active),
        }
    }

    fn parse_definition(
        &self,
        buffer: &[u8],
        structure: &'g Structure,
        start_offset: usize,
        ctx: &mut StreamContext,
        active: &mut Active<'g>,
    ) -> Result<StructureOutcome, ParseError> {
        if active.contains(&(structure.name.as_str(), start_offset)) {
            return Err(ParseError::RecursiveStructure {
                structure: structure.name.clone(),
                offset: start_offset,
            });
        }
        active.push((structure.name.as_str(), start_offset));
        let mut cursor = BitCursor::with_base(buffer, start_offset);
        let parsed = self.parse_fields(&mut cursor, structure, ctx, active);
        active.pop();
        let (fields, next) = parsed?;
        let consumed = cursor.position() + usize::from(!cursor.is_aligned());
        Ok(StructureOutcome { fields, consumed, next })
    }

    fn parse_fields(
        &self,
        cursor: &mut BitCursor<'_>,
        structure: &'g Structure,
        ctx: &mut StreamContext,
        active: &mut Active<'g>,
    ) -> Result<(Vec<DecodedField>, Option<String>), ParseError> {
        let mut scope = Scope {
            queue: structure
                .descriptors
                .iter()
                .map(|descriptor| Pending { descriptor, reattempt: false })
                .collect(),
            fields: Vec::new(),
            overrides: Overrides::new(),
        };
        let mut next = None;

        while !cursor.is_exhausted() {
            let Some(item) = scope.queue.pop_front() else {
                break;
            };
            let field = match item.descriptor {
                Descriptor::Type(_) => continue,
                Descriptor::Next(n) => {
                    next = Some(n.clone());
                    break;
                }
                Descriptor::Field(f) => f,
            };
            if item.reattempt {
                let saved_cursor = *cursor;
                let saved_scope = scope.clone();
                let saved_ctx = ctx.clone();
                if let Err(e) = self.parse_field(cursor, item, field, &mut scope, ctx, active) {
                    trace!(field = %field.name, error = %e, "repetition stopped");
                    *cursor = saved_cursor;
                    scope = saved_scope;
                    *ctx = saved_ctx;
                }
            } else {
                self.parse_field(cursor, item, field, &mut scope, ctx, active)?;
            }
        }

        if next.is_none() && cursor.is_exhausted() {
            self.check_complete(structure, &scope, ctx)?;
        }
        Ok((scope.fields, next))
    }

    /// Input ran out: every remaining required field is an error.
    fn check_complete(&self, structure: &Structure, scope: &Scope<'g>, ctx: &StreamContext) -> Result<(), ParseError> {
        for item in scope.queue.iter().filter(|p| !p.reattempt) {
            let Descriptor::Field(field) = item.descriptor else {
                continue;
            };
            let (attrs, _) = effective(field, &scope.overrides, ctx);
            if let Some(conds) = &attrs.conditions {
                if !conditions_hold(&scope.fields, conds) {
                    continue;
                }
            }
            let required = match attrs.length {
                None | Some(Length::Rest) | Some(Length::Bits(0)) => false,
                Some(_) => true,
            };
            if required {
                return Err(ParseError::IncompleteStructure {
                    structure: structure.name.clone(),
                    field: field.name.clone(),
                });
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn parse_field(
        &self,
        cursor: &mut BitCursor<'_>,
        item: Pending<'g>,
        field: &FieldDescriptor,
        scope: &mut Scope<'g>,
        ctx: &mut StreamContext,
        active: &mut Active<'g>,
    ) -> Result<(), ParseError> {
        let name = field.name.as_str();
        let (attrs, dynamic_length) = effective(field, &scope.overrides, ctx);

        if let Some(conds) = &attrs.conditions {
            if !conditions_hold(&scope.fields, conds) {
                trace!(field = name, "conditions not met, skipped");
                return Ok(());
            }
        }

        let before = cursor.bit_position();
        if let Some(target) = &attrs.parse {
            let repeat = match attrs.length {
                Some(Length::Bits(n)) if dynamic_length => Repeat::Times(n / 8),
                Some(Length::Bits(n)) => Repeat::Times(n),
                Some(Length::Rest) => Repeat::UntilExhausted,
                _ if attrs.byte_length.is_some() => Repeat::UntilExhausted,
                _ => Repeat::Times(1),
            };
            self.parse_delegated(cursor, name, target, repeat, attrs.byte_length, scope, ctx, active)?;
            if field.repeated && cursor.bit_position() > before && cursor.remaining_bytes() > 0 {
                scope.queue.push_front(Pending { reattempt: true, ..item });
            }
            return Ok(());
        }

        let Some(length) = attrs.length else {
            trace!(field = name, "no length, nothing decoded");
            return Ok(());
        };
        let start = cursor.absolute();
        let lead = u64::from(cursor.bit_offset());
        let (raw, bits) = read_scalar(cursor, name, length)?;
        let end = if bits == 0 { start } else { start + ((lead + bits + 7) / 8) as usize };

        if let Some(spec) = &attrs.values {
            if !spec.accepts(&raw) {
                return Err(ParseError::ValueMismatch {
                    field: name.to_string(),
                    value: raw.to_string(),
                    expected: spec.to_string(),
                });
            }
        }

        let stored = match attrs.format {
            Some(f) => f.apply(raw.clone()),
            None => raw.clone(),
        };
        trace!(field = name, start, end, value = %stored, "decoded");
        scope.fields.push(DecodedField {
            name: name.to_string(),
            node: Node::Scalar(stored),
            start,
            end,
        });

        if let Some(triggers) = &attrs.triggers {
            self.fire_triggers(name, &raw, triggers, scope, ctx)?;
        }

        if field.repeated && cursor.bit_position() > before {
            let quota = match length {
                Length::Bits(n) => cursor.remaining_bits() >= n / 4,
                _ => cursor.remaining_bytes() > 0,
            };
            if quota {
                scope.queue.push_front(Pending { reattempt: true, ..item });
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn parse_delegated(
        &self,
        cursor: &mut BitCursor<'_>,
        field: &str,
        target: &str,
        repeat: Repeat,
        byte_length: Option<usize>,
        scope: &mut Scope<'g>,
        ctx: &mut StreamContext,
        active: &mut Active<'g>,
    ) -> Result<(), ParseError> {
        let mut view = match byte_length {
            Some(n) => cursor.window(field, n)?,
            None => cursor.rest(field)?,
        };
        let mut done = 0u64;
        loop {
            match repeat {
                Repeat::Times(n) if done >= n => break,
                _ => {}
            }
            if view.is_exhausted() {
                break;
            }
            let before = view.position();
            let mut next = Some(target.to_string());
            while let Some(name) = next.take() {
                if view.is_exhausted() {
                    break;
                }
                let resolved = self.parse_target_in(view.remaining(), &name, view.absolute(), ctx, active)?;
                view.advance(resolved.consumed);
                scope.fields.push(DecodedField {
                    name: field.to_string(),
                    start: resolved.structure.start,
                    end: resolved.structure.end,
                    node: Node::Structure(resolved.structure),
                });
                if resolved.consumed == 0 {
                    break;
                }
                next = resolved.next;
            }
            done += 1;
            if view.position() == before {
                break;
            }
        }
        cursor.advance(view.position());
        Ok(())
    }

    fn fire_triggers(
        &self,
        field: &str,
        raw: &Value,
        triggers: &[Trigger],
        scope: &mut Scope<'g>,
        ctx: &mut StreamContext,
    ) -> Result<(), ParseError> {
        for trigger in triggers {
            let target = match &trigger.target {
                TriggerTarget::SaveToContext => {
                    debug!(field, entries = scope.overrides.len(), "saving overrides to stream context");
                    ctx.merge(&scope.overrides);
                    continue;
                }
                TriggerTarget::Field(t) => t,
            };
            for (kind, action) in &trigger.rules {
                let value = match action {
                    TriggerAction::Set => {
                        if self.options.prune_zero_triggered && raw.as_u64() == Some(0) {
                            scope.queue.retain(|p| {
                                !matches!(p.descriptor, Descriptor::Field(f) if f.name == *target)
                            });
                            continue;
                        }
                        attribute_from_value(field, *kind, raw)?
                    }
                    TriggerAction::Lookup(table) => table
                        .iter()
                        .find(|(key, _)| raw.matches(key))
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| ParseError::ValueMismatch {
                            field: field.to_string(),
                            value: raw.to_string(),
                            expected: format!("a key of the `{}` trigger table for `{}`", kind.name(), target),
                        })?,
                };
                trace!(field, target = %target, attribute = kind.name(), "override set");
                scope.overrides.entry(target.clone()).or_default().set(value);
            }
        }
        Ok(())
    }
}

/// Static attributes, then context, then pending overrides. The flag tells whether
/// `length` came from a trigger or the context (a bit count, even on `parse` fields).
fn effective(field: &FieldDescriptor, overrides: &Overrides, ctx: &StreamContext) -> (FieldAttributes, bool) {
    let mut attrs = field.attributes.clone();
    let from_ctx = ctx.get(&field.name);
    let from_trigger = overrides.get(&field.name);
    let dynamic_length = from_trigger.and_then(|a| a.length).is_some() || from_ctx.and_then(|a| a.length).is_some();
    if let Some(c) = from_ctx {
        attrs.merge(c);
    }
    if let Some(o) = from_trigger {
        attrs.merge(o);
    }
    (attrs, dynamic_length)
}

/// All conditions hold against the first earlier field of each name.
fn conditions_hold(fields: &[DecodedField], conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| {
        fields
            .iter()
            .find(|f| f.name == c.field)
            .and_then(DecodedField::value)
            .map(|v| c.op.holds(v, &c.literal))
            .unwrap_or(false)
    })
}

/// Decode one scalar; returns the raw value and its width in bits.
fn read_scalar(cursor: &mut BitCursor<'_>, field: &str, length: Length) -> Result<(Value, u64), ParseError> {
    Ok(match length {
        Length::Varint => {
            let (v, bits) = cursor.read_varint(field)?;
            (Value::Uint(v), bits)
        }
        Length::PacketNumber => {
            let (v, bits) = cursor.read_packet_number(field)?;
            (Value::Uint(v), bits)
        }
        Length::Rest => {
            let bits = cursor.remaining_bytes() as u64 * 8;
            (cursor.read_rest(field)?, bits)
        }
        Length::Bits(0) => (Value::Bytes(Vec::new()), 0),
        Length::Bits(n) if n % 8 == 0 && cursor.is_aligned() => {
            let bytes = usize::try_from(n / 8).unwrap_or(usize::MAX);
            (cursor.read_fixed(field, bytes)?, n)
        }
        Length::Bits(n) => (Value::Uint(cursor.read_bits(field, n)?), n),
    })
}

/// Attribute value for a `set` trigger, taken from the decoded value.
fn attribute_from_value(field: &str, kind: AttributeKind, raw: &Value) -> Result<AttributeValue, ParseError> {
    let invalid = || ParseError::InvalidTrigger {
        field: field.to_string(),
        attribute: kind.name().to_string(),
        value: raw.to_string(),
    };
    Ok(match kind {
        AttributeKind::Length => {
            let bits = raw.as_u64().and_then(|v| v.checked_mul(8)).ok_or_else(invalid)?;
            AttributeValue::Length(Length::Bits(bits))
        }
        AttributeKind::ByteLength => {
            let n = raw.as_u64().and_then(|v| usize::try_from(v).ok()).ok_or_else(invalid)?;
            AttributeValue::ByteLength(n)
        }
        AttributeKind::Values => {
            let lit = match raw {
                Value::Uint(v) => Literal::Int(i64::try_from(*v).map_err(|_| invalid())?),
                Value::Wide(v) => Literal::Str(format!("{:#x}", v)),
                Value::Bytes(b) => Literal::Str(hex::encode(b)),
                Value::Text(t) => Literal::Str(t.clone()),
            };
            AttributeValue::Values(ValueSpec::Single(lit))
        }
        AttributeKind::Parse => AttributeValue::Parse(raw.as_text().ok_or_else(invalid)?.to_string()),
        AttributeKind::Format => {
            let f = raw.as_text().and_then(Format::from_name).ok_or_else(invalid)?;
            AttributeValue::Format(f)
        }
        AttributeKind::Conditions | AttributeKind::Triggers => return Err(invalid()),
    })
}
