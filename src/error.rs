//! Error types for grammar loading, packet dissection and trace processing.
//!
//! Every [`ParseError`] is recoverable: the resolver and the driver catch it and try
//! the next alternative. Only [`DissectError`] is surfaced to callers once every
//! grammar and every root structure has been tried.

use thiserror::Error;

/// Failure of one structure attempt. Drives backtracking.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// A decoded field failed its `values` acceptance test.
    #[error("value {value} for field `{field}` not acceptable ({expected})")]
    ValueMismatch {
        field: String,
        value: String,
        expected: String,
    },

    #[error("field `{field}` needs {needed} bytes at offset {offset}, only {available} left")]
    InsufficientBytes {
        field: String,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Invalid variable-length prefix (packet number pattern `01`).
    #[error("unknown encoding pattern {pattern:#04b} for field `{field}` at offset {offset}")]
    UnknownEncodingPattern {
        field: String,
        offset: usize,
        pattern: u8,
    },

    #[error("no structure of type `{type_name}` parses at offset {offset} (first byte {first_byte:?})")]
    NoMatchingStructure {
        type_name: String,
        offset: usize,
        first_byte: Option<u8>,
    },

    #[error("structure `{structure}` ended before required field `{field}`")]
    IncompleteStructure { structure: String, field: String },

    #[error("field `{field}` cannot start mid-byte (bit {bit} of offset {offset})")]
    UnalignedField {
        field: String,
        offset: usize,
        bit: u8,
    },

    /// Non-byte-multiple width above 64 bits.
    #[error("field `{field}` at offset {offset}: {bits}-bit width is neither whole bytes nor at most 64 bits")]
    UnsupportedWidth {
        field: String,
        offset: usize,
        bits: u64,
    },

    /// A structure was entered again at the offset where it is already being parsed.
    #[error("structure `{structure}` re-entered at offset {offset} without consuming input")]
    RecursiveStructure { structure: String, offset: usize },

    #[error("trigger from `{field}` cannot set `{attribute}` to {value}")]
    InvalidTrigger {
        field: String,
        attribute: String,
        value: String,
    },

    /// A root structure parsed but left bytes behind.
    #[error("root `{root}` consumed {consumed} of {total} bytes")]
    TrailingBytes {
        root: String,
        consumed: usize,
        total: usize,
    },

    #[error("unknown structure `{0}`")]
    UnknownStructure(String),
}

/// Grammar document could not be loaded.
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("grammar has no `top` list of root structures")]
    MissingRoots,
    #[error("root `{0}` is not a structure of the grammar")]
    UnknownRoot(String),
    #[error("duplicate structure name: {0}")]
    DuplicateStructure(String),
    #[error("structure `{structure}`: {reason}")]
    Malformed { structure: String, reason: String },
    #[error("structure `{structure}`, field `{field}`: {reason}")]
    BadAttribute {
        structure: String,
        field: String,
        reason: String,
    },
}

/// Terminal failure of a packet: every grammar was tried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DissectError {
    #[error("no grammar available")]
    NoGrammars,
    #[error("all {tried} grammars failed, last `{last_grammar}`: {cause}")]
    Exhausted {
        tried: usize,
        last_grammar: String,
        cause: ParseError,
    },
}

impl DissectError {
    /// Underlying cause of the last attempt, if any grammar was tried.
    pub fn cause(&self) -> Option<&ParseError> {
        match self {
            DissectError::NoGrammars => None,
            DissectError::Exhausted { cause, .. } => Some(cause),
        }
    }
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet {index}: invalid base64 payload: {source}")]
    Base64 {
        index: usize,
        #[source]
        source: base64::DecodeError,
    },
}
