//! # protodissect: Grammar-Driven Binary Dissector
//!
//! Decodes protocol packets whose layout is described by external YAML structure
//! grammars instead of hard-coded decoders. Given a byte buffer and a set of grammar
//! versions, the dissector produces an annotated parse tree (every field with its
//! absolute byte offsets), resolves polymorphic structure alternatives by trial
//! parsing, lets earlier fields alter how later ones decode (triggers), and
//! backtracks across grammar versions until one consumes the packet exactly.
//!
//! ## Grammar structure
//!
//! - **`top`**: root structures tried, in order, for a whole packet
//! - **Structures**: named lists of single-entry `field: {attributes}` mappings
//! - **`type: T`** as first entry: the structure is one alternative of abstract type `T`
//! - **`next: S`**: ends the structure and chains sibling `S` at the same level
//!
//! ## Field attributes
//!
//! - `length`: bit width, `varint`, `pn` (packet number) or `*` (rest of buffer)
//! - `values`: literal, list of literals, or `{eq: x, neq: y}`; a mismatch rejects the alternative
//! - `parse`: structure or abstract type decoded in place of a scalar
//! - `byte_length`: window size in bytes for `parse`
//! - `conditions`: `[{field: {eq: 1}}]`, field skipped unless all hold
//! - `triggers`: `[{Target: {length: set}}]`, `[{Target: {parse: {0x06: Crypto}}}]`, `[save_to_context: ~]`
//! - `repeated`: attempt the field again while input remains
//! - `format`: `hex`, `dec`, `ascii` or `bytes`
//!
//! ## Example grammar
//!
//! ```text
//! top: [ShortHeader]
//! ShortHeader:
//!   - Header Form: {length: 1, values: 0}
//!   - Key Phase: {length: 1}
//!   - Type: {length: 6}
//!   - Destination Connection ID: {length: 64, format: hex}
//!   - Packet Number: {length: pn}
//!   - Frames: {parse: Frame, length: '*'}
//! Padding:
//!   - type: Frame
//!   - Frame Type: {length: 8, values: 0}
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use protodissect::{dissect, GrammarSet, Options, StreamContext};
//!
//! let grammars = GrammarSet::load_dir("grammars".as_ref())?;
//! let mut ctx = StreamContext::new();
//! let packet = [0x40, 0x00];
//! match dissect(&packet, &grammars, Options::default(), &mut ctx) {
//!     Ok(d) => println!("{} parsed {} structures", d.grammar, d.tree.structures.len()),
//!     Err(e) => eprintln!("{}", e),
//! }
//! # Ok::<(), protodissect::GrammarError>(())
//! ```
//!
//! The stream context must be threaded through the packets of one direction in
//! arrival order; see [`context`].

pub mod ast;
pub mod catalog;
pub mod context;
pub mod dissector;
pub mod driver;
pub mod error;
pub mod format;
pub mod parser;
pub mod reader;
pub mod trace;
pub mod tree;
pub mod value;

pub use ast::{Grammar, Structure};
pub use catalog::GrammarSet;
pub use context::{DirectionContexts, StreamContext};
pub use dissector::{Dissector, Options};
pub use driver::{dissect, parse_top_level, Dissection};
pub use error::{DissectError, GrammarError, ParseError, TraceError};
pub use parser::{load_file, parse};
pub use trace::{dissect_trace, DissectedPacket, PacketKind, Trace, TraceOptions};
pub use tree::{DecodedField, DecodedStructure, Node, ParseTree};
pub use value::Value;
