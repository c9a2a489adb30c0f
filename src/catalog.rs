//! Versioned grammar set: one grammar document per protocol version.
//!
//! A directory of `*.yaml` / `*.yml` files is loaded once; each file stem is the
//! grammar's identifier. Grammars are tried newest first, i.e. identifiers in
//! descending natural order (`draft-10` before `draft-9`).

use crate::ast::Grammar;
use crate::error::GrammarError;
use crate::parser::load_file;
use std::cmp::Ordering;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct GrammarSet {
    entries: Vec<(String, Grammar)>,
}

impl GrammarSet {
    /// Pre-loaded grammars, tried in the given order.
    pub fn new(entries: Vec<(String, Grammar)>) -> Self {
        GrammarSet { entries }
    }

    /// Load every grammar file in `dir`, newest version first.
    pub fn load_dir(dir: &Path) -> Result<Self, GrammarError> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if !is_yaml || !path.is_file() {
                continue;
            }
            let id = match path.file_stem().and_then(|s| s.to_str()) {
                Some(s) => s.to_string(),
                None => continue,
            };
            let grammar = load_file(&path).map_err(|e| match e {
                GrammarError::Malformed { structure, reason } => GrammarError::Malformed {
                    structure,
                    reason: format!("{} ({})", reason, path.display()),
                },
                other => other,
            })?;
            debug!(grammar = %id, structures = grammar.structures.len(), "grammar loaded");
            entries.push((id, grammar));
        }
        entries.sort_by(|a, b| version_cmp(&b.0, &a.0));
        Ok(GrammarSet { entries })
    }

    pub fn get(&self, id: &str) -> Option<&Grammar> {
        self.entries.iter().find(|(i, _)| i == id).map(|(_, g)| g)
    }

    /// Identifiers in priority order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Grammar)> {
        self.entries.iter().map(|(id, g)| (id.as_str(), g))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Natural ordering: digit runs compare numerically, everything else bytewise.
pub fn version_cmp(a: &str, b: &str) -> Ordering {
    let (mut x, mut y) = (a.as_bytes(), b.as_bytes());
    loop {
        match (x.first(), y.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(c), Some(d)) if c.is_ascii_digit() && d.is_ascii_digit() => {
                let xn = x.iter().take_while(|c| c.is_ascii_digit()).count();
                let yn = y.iter().take_while(|c| c.is_ascii_digit()).count();
                let (xd, yd) = (trim_zeros(&x[..xn]), trim_zeros(&y[..yn]));
                let ord = xd.len().cmp(&yd.len()).then_with(|| xd.cmp(yd));
                if ord != Ordering::Equal {
                    return ord;
                }
                x = &x[xn..];
                y = &y[yn..];
            }
            (Some(c), Some(d)) => {
                if c != d {
                    return c.cmp(d);
                }
                x = &x[1..];
                y = &y[1..];
            }
        }
    }
}

fn trim_zeros(digits: &[u8]) -> &[u8] {
    let n = digits.iter().take_while(|&&c| c == b'0').count();
    &digits[n..]
}
