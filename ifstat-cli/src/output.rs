//! Output formatting abstraction for text vs JSON rendering
//!
//! Every snapshot flows through [`OutputWriter`], which handles format switching.
//! Text mode prints one line per rule; JSON mode prints one compact object per
//! snapshot so the stream can be consumed line by line.

use std::collections::BTreeMap;
use std::io::Write;

use ifstat_ebpf_engine::counters::SIZE_BUCKET_LABELS;
use ifstat_ebpf_engine::{CounterSnapshot, FilterRuleSet};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Abstraction for writing CLI output in different formats.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    /// Create a new output writer with the specified format.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render a payload to `w`.
    ///
    /// For `Text` format, delegates to `Render::render_text()`.
    /// For `Json` format, serialises via `serde_json` followed by a newline.
    pub fn render<T: Render + Serialize>(
        &self,
        w: &mut dyn Write,
        payload: &T,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => payload.render_text(w)?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        w.flush()?;
        Ok(())
    }
}

/// Trait for human-readable text rendering.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

/// One polling interval's worth of counters for an interface.
#[derive(Debug, Serialize)]
pub struct SnapshotReport {
    pub interface: String,
    pub rules: Vec<RuleLine>,
}

/// Counters for one loaded rule.
#[derive(Debug, Serialize)]
pub struct RuleLine {
    pub index: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub packets: u64,
    pub bytes: u64,
    pub size_buckets: BTreeMap<&'static str, u64>,
}

impl SnapshotReport {
    /// Build a report from a snapshot, labelling each index with its rule.
    pub fn new(interface: &str, rules: &FilterRuleSet, snapshot: &CounterSnapshot) -> Self {
        let rules = snapshot
            .iter()
            .map(|(index, counters)| RuleLine {
                index,
                description: rules.label(index).unwrap_or_default(),
                packets: counters.packets,
                bytes: counters.bytes,
                size_buckets: SIZE_BUCKET_LABELS
                    .iter()
                    .copied()
                    .zip(counters.size_buckets)
                    .collect(),
            })
            .collect();
        Self {
            interface: interface.to_owned(),
            rules,
        }
    }
}

impl Render for SnapshotReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for rule in &self.rules {
            writeln!(
                w,
                "rule {} [{}]: {} packets, {} bytes",
                rule.index, rule.description, rule.packets, rule.bytes
            )?;
        }
        Ok(())
    }
}
