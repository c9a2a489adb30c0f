//! Stream context: field attributes learned from earlier packets of one direction.
//!
//! The context is owned by the caller and threaded explicitly through every parse.
//! Packets of one direction must be dissected in arrival order, since a later
//! packet's field widths may depend on what an earlier one saved. Different
//! directions get independent contexts ([`DirectionContexts`]) and never share one.

use crate::ast::FieldAttributes;
use std::collections::HashMap;

/// Per-field attribute overrides keyed by field name.
pub type Overrides = HashMap<String, FieldAttributes>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamContext {
    fields: Overrides,
}

impl StreamContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&FieldAttributes> {
        self.fields.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Merge pending overrides attribute by attribute; existing entries keep any
    /// attribute the overrides do not mention.
    pub fn merge(&mut self, pending: &Overrides) {
        for (field, attrs) in pending {
            self.fields.entry(field.clone()).or_default().merge(attrs);
        }
    }
}

/// One context per stream direction, created on first use.
#[derive(Debug, Default)]
pub struct DirectionContexts {
    by_direction: HashMap<String, StreamContext>,
}

impl DirectionContexts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_direction(&mut self, direction: &str) -> &mut StreamContext {
        self.by_direction.entry(direction.to_string()).or_default()
    }

    pub fn get(&self, direction: &str) -> Option<&StreamContext> {
        self.by_direction.get(direction)
    }
}
