//! Grammar selection: roots of one grammar, then grammars of other versions.
//!
//! A root structure is accepted only if it (with its `next` chain) consumes the
//! whole packet; anything else is a failed candidate, never a partial tree. Stream
//! context writes are committed only for the accepted attempt.

use crate::ast::Grammar;
use crate::catalog::GrammarSet;
use crate::context::StreamContext;
use crate::dissector::{Dissector, Options};
use crate::error::{DissectError, ParseError};
use crate::tree::ParseTree;
use serde::Serialize;
use tracing::debug;

/// Successful decode of one packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dissection {
    /// Identifier of the grammar that parsed the packet.
    pub grammar: String,
    pub tree: ParseTree,
}

/// Try each root of `grammar` in order; keep the first that consumes all of `buffer`.
/// On failure the last root's error is returned and `ctx` is untouched.
pub fn parse_top_level(
    buffer: &[u8],
    grammar: &Grammar,
    options: Options,
    ctx: &mut StreamContext,
) -> Result<ParseTree, ParseError> {
    let dissector = Dissector::new(grammar, options);
    let mut last = None;
    for root in &grammar.roots {
        let mut working = ctx.clone();
        match parse_chain(&dissector, buffer, root, &mut working) {
            Ok(tree) => {
                *ctx = working;
                return Ok(tree);
            }
            Err(e) => {
                debug!(root = %root, error = %e, "root rejected");
                last = Some(e);
            }
        }
    }
    Err(last.unwrap_or_else(|| ParseError::UnknownStructure("<no root>".to_string())))
}

fn parse_chain(
    dissector: &Dissector<'_>,
    buffer: &[u8],
    root: &str,
    ctx: &mut StreamContext,
) -> Result<ParseTree, ParseError> {
    let mut structures = Vec::new();
    let mut offset = 0;
    let mut next = Some(root.to_string());
    while let Some(name) = next.take() {
        if !structures.is_empty() && offset >= buffer.len() {
            break;
        }
        let resolved = dissector.parse_target(&buffer[offset..], &name, offset, ctx)?;
        offset += resolved.consumed;
        structures.push(resolved.structure);
        if resolved.consumed == 0 {
            break;
        }
        next = resolved.next;
    }
    if offset != buffer.len() {
        return Err(ParseError::TrailingBytes {
            root: root.to_string(),
            consumed: offset,
            total: buffer.len(),
        });
    }
    Ok(ParseTree { structures })
}

/// Try every grammar in priority order and return the first full parse, tagged
/// with the grammar's identifier.
pub fn dissect(
    buffer: &[u8],
    grammars: &GrammarSet,
    options: Options,
    ctx: &mut StreamContext,
) -> Result<Dissection, DissectError> {
    let mut last = None;
    let mut tried = 0;
    for (id, grammar) in grammars.iter() {
        tried += 1;
        match parse_top_level(buffer, grammar, options, ctx) {
            Ok(tree) => {
                return Ok(Dissection {
                    grammar: id.to_string(),
                    tree,
                })
            }
            Err(e) => {
                debug!(grammar = id, error = %e, "grammar rejected");
                last = Some((id, e));
            }
        }
    }
    match last {
        Some((id, cause)) => Err(DissectError::Exhausted {
            tried,
            last_grammar: id.to_string(),
            cause,
        }),
        None => Err(DissectError::NoGrammars),
    }
}
