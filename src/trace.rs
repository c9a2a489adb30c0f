//! Recorded test traces: decode every packet of a trace in arrival order.
//!
//! A trace is the JSON record produced by a test scenario run against one host. Its
//! `stream` lists packets with a direction, a timestamp and base64 payload bytes.
//! Each direction gets its own [`StreamContext`], so packets of one direction see
//! what earlier packets of that direction saved.

use crate::catalog::GrammarSet;
use crate::context::DirectionContexts;
use crate::dissector::Options;
use crate::driver::{dissect, Dissection};
use crate::error::TraceError;
use crate::tree::ParseTree;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub scenario: String,
    /// `null` in traces of scenarios that never sent anything.
    #[serde(default)]
    pub stream: Option<Vec<TracePacket>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TracePacket {
    pub direction: String,
    #[serde(default)]
    pub timestamp: u64,
    /// Standard base64.
    pub data: String,
}

impl Trace {
    pub fn from_json(text: &str) -> Result<Self, TraceError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn packets(&self) -> &[TracePacket] {
        self.stream.as_deref().unwrap_or_default()
    }
}

impl TracePacket {
    /// Raw packet bytes; `index` is only used for the error.
    pub fn bytes(&self, index: usize) -> Result<Vec<u8>, TraceError> {
        STANDARD
            .decode(self.data.trim())
            .map_err(|source| TraceError::Base64 { index, source })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceOptions {
    /// Packets dissected per trace; `None` for all of them.
    pub packet_limit: Option<usize>,
    pub dissector: Options,
}

impl Default for TraceOptions {
    fn default() -> Self {
        TraceOptions {
            packet_limit: Some(100),
            dissector: Options::default(),
        }
    }
}

/// Packet label derived from the root structure's header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PacketKind {
    Initial,
    Retry,
    Handshake,
    #[serde(rename = "0-RTT Protected")]
    ZeroRtt,
    #[serde(rename = "1-RTT Protected Payload")]
    OneRtt,
    #[serde(rename = "Version Negotiation")]
    VersionNegotiation,
    Undecoded,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PacketKind::Initial => "Initial",
            PacketKind::Retry => "Retry",
            PacketKind::Handshake => "Handshake",
            PacketKind::ZeroRtt => "0-RTT Protected",
            PacketKind::OneRtt => "1-RTT Protected Payload",
            PacketKind::VersionNegotiation => "Version Negotiation",
            PacketKind::Undecoded => "Undecoded",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Decoded(Dissection),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DissectedPacket {
    pub direction: String,
    pub timestamp: u64,
    /// Payload size in bytes.
    pub length: usize,
    pub outcome: Outcome,
    pub kind: PacketKind,
    pub number: Option<u64>,
}

impl DissectedPacket {
    pub fn tree(&self) -> Option<&ParseTree> {
        match &self.outcome {
            Outcome::Decoded(d) => Some(&d.tree),
            Outcome::Failed { .. } => None,
        }
    }
}

/// Dissect the packets of `trace` in order. A packet that fails to decode is
/// reported as [`Outcome::Failed`] and does not stop the trace.
pub fn dissect_trace(trace: &Trace, grammars: &GrammarSet, options: &TraceOptions) -> Vec<DissectedPacket> {
    let packets = trace.packets();
    let take = options.packet_limit.unwrap_or(packets.len()).min(packets.len());
    let mut contexts = DirectionContexts::new();
    let mut out = Vec::with_capacity(take);

    for (index, packet) in packets[..take].iter().enumerate() {
        let ctx = contexts.for_direction(&packet.direction);
        let (length, outcome) = match packet.bytes(index) {
            Ok(bytes) => {
                let outcome = match dissect(&bytes, grammars, options.dissector, ctx) {
                    Ok(d) => Outcome::Decoded(d),
                    Err(e) => {
                        debug!(index, direction = %packet.direction, error = %e, "packet not decoded");
                        Outcome::Failed { error: e.to_string() }
                    }
                };
                (bytes.len(), outcome)
            }
            Err(e) => (0, Outcome::Failed { error: e.to_string() }),
        };
        let kind = match &outcome {
            Outcome::Decoded(d) => classify(&d.tree),
            Outcome::Failed { .. } => PacketKind::Undecoded,
        };
        let number = match &outcome {
            Outcome::Decoded(d) => packet_number(&d.tree, kind),
            Outcome::Failed { .. } => None,
        };
        out.push(DissectedPacket {
            direction: packet.direction.clone(),
            timestamp: packet.timestamp,
            length,
            outcome,
            kind,
            number,
        });
    }
    out
}

/// Label a decoded packet from its first root structure's own fields.
pub fn classify(tree: &ParseTree) -> PacketKind {
    let Some(root) = tree.root() else {
        return PacketKind::Undecoded;
    };
    for field in &root.fields {
        let Some(value) = field.value() else {
            continue;
        };
        match field.name.as_str() {
            "Header Form" if value.as_u64() == Some(0) => return PacketKind::OneRtt,
            "Long Packet Type" => match value.as_u64() {
                Some(0x7f) => return PacketKind::Initial,
                Some(0x7e) => return PacketKind::Retry,
                Some(0x7d) => return PacketKind::Handshake,
                Some(0x7c) => return PacketKind::ZeroRtt,
                _ => {}
            },
            _ => {}
        }
    }
    PacketKind::VersionNegotiation
}

/// 0 for version negotiation, else the first `Packet Number` found depth-first.
pub fn packet_number(tree: &ParseTree, kind: PacketKind) -> Option<u64> {
    match kind {
        PacketKind::VersionNegotiation => Some(0),
        PacketKind::Undecoded => None,
        _ => tree.find("Packet Number").and_then(|v| v.as_u64()),
    }
}
