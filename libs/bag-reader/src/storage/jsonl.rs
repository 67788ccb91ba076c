use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use bag_api::error::PluginError;
use bag_api::record::SerializedBagMessage;
use bag_api::schema::Schema;
use bag_api::storage::{RecordStream, StorageFilter, StorageOptions, StreamFactory};
use bag_api::topic::TopicMetadata;

use super::STORAGE_JSONL;

pub const METADATA_FILE: &str = "metadata.json";
pub const MESSAGES_FILE: &str = "messages.jsonl";
pub const BAG_VERSION: u32 = 1;

// ═══════════════════════════════════════════════════════════════
//  On-disk layout
// ═══════════════════════════════════════════════════════════════

/// `<bag>/metadata.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BagMetadata {
    pub version: u32,
    #[serde(default)]
    pub storage_id: String,
    pub topics: Vec<TopicMetadata>,
    /// Message layouts, keyed by type name.
    #[serde(default)]
    pub types: BTreeMap<String, Schema>,
}

/// One line of `<bag>/messages.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskRecord {
    pub topic: String,
    pub time_stamp: i64,
    pub data: Vec<u8>,
}

impl From<DiskRecord> for SerializedBagMessage {
    fn from(r: DiskRecord) -> Self {
        SerializedBagMessage::new(r.topic, r.data, r.time_stamp)
    }
}

impl BagMetadata {
    pub fn load(dir: &Path) -> Result<Self, PluginError> {
        let path = dir.join(METADATA_FILE);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| PluginError::io(format!("read {}: {e}", path.display())))?;
        let metadata: BagMetadata = serde_json::from_str(&content)
            .map_err(|e| PluginError::format(format!("parse {}: {e}", path.display())))?;

        if metadata.version != BAG_VERSION {
            return Err(PluginError::format(format!(
                "{}: unsupported bag version {} (expected {BAG_VERSION})",
                path.display(),
                metadata.version
            )));
        }
        if !metadata.storage_id.is_empty() && metadata.storage_id != STORAGE_JSONL {
            tracing::warn!(
                bag = %dir.display(),
                storage_id = %metadata.storage_id,
                "bag metadata names another storage id, reading as jsonl"
            );
        }
        let mut seen = HashSet::new();
        if let Some(dup) = metadata.topics.iter().find(|t| !seen.insert(t.name.as_str())) {
            return Err(PluginError::schema(format!(
                "{}: topic '{}' declared twice",
                path.display(),
                dup.name
            )));
        }
        Ok(metadata)
    }
}

// ═══════════════════════════════════════════════════════════════
//  JsonlStream
// ═══════════════════════════════════════════════════════════════

/// Streams a bag directory line by line.
///
/// Records parsed ahead of the caller stay buffered whatever the filter, so
/// `has_next` never consumes anything: a filter change after a lookahead
/// still sees every record the caller has not read.
pub struct JsonlStream {
    messages_path: PathBuf,
    metadata: BagMetadata,
    declared: HashSet<String>,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    lookahead: VecDeque<SerializedBagMessage>,
    filter: StorageFilter,
}

impl JsonlStream {
    pub fn open(dir: &Path) -> Result<Self, PluginError> {
        let metadata = BagMetadata::load(dir)?;
        let messages_path = dir.join(MESSAGES_FILE);
        let lines = open_lines(&messages_path)?;
        let declared = metadata.topics.iter().map(|t| t.name.clone()).collect();

        tracing::debug!(
            bag = %dir.display(),
            topics = metadata.topics.len(),
            types = metadata.types.len(),
            "opened jsonl bag"
        );
        Ok(Self {
            messages_path,
            metadata,
            declared,
            lines,
            line_no: 0,
            lookahead: VecDeque::new(),
            filter: StorageFilter::default(),
        })
    }

    /// Position of the first buffered record the filter accepts.
    fn next_accepted(&self) -> Option<usize> {
        self.lookahead
            .iter()
            .position(|m| self.filter.accepts(&m.topic_name))
    }

    /// Pull lines until a record passing the filter is buffered or the file ends.
    fn fill(&mut self) -> Result<(), PluginError> {
        while self.next_accepted().is_none() {
            let Some(line) = self.lines.next() else {
                return Ok(());
            };
            self.line_no += 1;
            let line = line.map_err(|e| {
                PluginError::io(format!("{}:{}: {e}", self.messages_path.display(), self.line_no))
            })?;
            if line.trim().is_empty() {
                tracing::warn!(
                    file = %self.messages_path.display(),
                    line = self.line_no,
                    "skipping blank line"
                );
                continue;
            }

            let record: DiskRecord = serde_json::from_str(&line).map_err(|e| {
                PluginError::format(format!(
                    "{}:{}: {e}",
                    self.messages_path.display(),
                    self.line_no
                ))
            })?;
            if !self.declared.contains(&record.topic) {
                return Err(PluginError::schema(format!(
                    "{}:{}: record on undeclared topic '{}'",
                    self.messages_path.display(),
                    self.line_no,
                    record.topic
                )));
            }
            self.lookahead.push_back(record.into());
        }
        Ok(())
    }
}

fn open_lines(path: &Path) -> Result<Lines<BufReader<File>>, PluginError> {
    let file = File::open(path)
        .map_err(|e| PluginError::io(format!("open {}: {e}", path.display())))?;
    Ok(BufReader::new(file).lines())
}

impl RecordStream for JsonlStream {
    fn storage_id(&self) -> &str {
        STORAGE_JSONL
    }

    fn has_next(&mut self) -> Result<bool, PluginError> {
        self.fill()?;
        Ok(self.next_accepted().is_some())
    }

    fn read_next(&mut self) -> Result<SerializedBagMessage, PluginError> {
        self.fill()?;
        let at = self
            .next_accepted()
            .ok_or_else(|| PluginError::logic("no more records in jsonl bag"))?;
        // Reading moves past the rejected records in front of it.
        self.lookahead.drain(..at);
        self.lookahead
            .pop_front()
            .ok_or_else(|| PluginError::logic("no more records in jsonl bag"))
    }

    fn topics(&self) -> Vec<TopicMetadata> {
        self.metadata.topics.clone()
    }

    fn message_definitions(&self) -> BTreeMap<String, Schema> {
        self.metadata.types.clone()
    }

    /// Scans the messages file once more; the stream position is unaffected.
    fn message_counts(&self) -> Option<BTreeMap<String, u64>> {
        let mut counts: BTreeMap<String, u64> = self
            .metadata
            .topics
            .iter()
            .map(|t| (t.name.clone(), 0))
            .collect();
        let lines = match open_lines(&self.messages_path) {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!(error = %e, "cannot count records");
                return None;
            }
        };
        for line in lines {
            let line = line.ok()?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DiskRecord>(&line) {
                Ok(r) => *counts.entry(r.topic).or_default() += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot count records");
                    return None;
                }
            }
        }
        Some(counts)
    }

    fn set_filter(&mut self, filter: StorageFilter) {
        self.filter = filter;
    }
}

/// Opens `StorageOptions::uri` as a bag directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlStreamFactory;

impl StreamFactory for JsonlStreamFactory {
    fn open(&self, options: &StorageOptions) -> Result<Box<dyn RecordStream>, PluginError> {
        Ok(Box::new(JsonlStream::open(Path::new(&options.uri))?))
    }
}
