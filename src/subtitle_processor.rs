use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use regex::Regex;
use once_cell::sync::Lazy;
use anyhow::{Result, Context, anyhow};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::errors::SubtitleError;
use crate::file_utils::FileManager;

// @module: Subtitle entries, the in-memory entry store and the SRT codec

// @const: SRT timestamp regex
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2})[,.](\d{3})")
        .expect("timestamp regex is valid")
});

// @struct: Single subtitle entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleEntry {
    // @field: Sequence number, unique within a file
    pub seq_num: usize,

    // @field: Start time in ms
    pub start_time_ms: u64,

    // @field: End time in ms
    pub end_time_ms: u64,

    // @field: Subtitle text (translated once a translation was accepted)
    pub text: String,

    // @field: Source text, set on the first accepted translation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
}

impl SubtitleEntry {
    /// Creates a new, untranslated subtitle entry
    pub fn new(seq_num: usize, start_time_ms: u64, end_time_ms: u64, text: String) -> Self {
        SubtitleEntry {
            seq_num,
            start_time_ms,
            end_time_ms,
            text,
            original_text: None,
        }
    }

    /// Whether a translation has been applied to this entry
    pub fn is_translated(&self) -> bool {
        self.original_text.is_some()
    }

    /// Replace the text with a translation, remembering the source text once
    pub fn apply_translation(&mut self, translation: String) {
        if self.original_text.is_none() {
            self.original_text = Some(std::mem::take(&mut self.text));
        }
        self.text = translation;
    }

    /// Parse an SRT timestamp (HH:MM:SS,mmm) to milliseconds
    pub fn parse_timestamp(timestamp: &str) -> Result<u64, SubtitleError> {
        let parts: Vec<&str> = timestamp.trim().split(&[':', ',', '.'][..]).collect();

        if parts.len() != 4 {
            return Err(SubtitleError::InvalidTimestamp(timestamp.to_string()));
        }

        let parse = |s: &str| s.parse::<u64>().map_err(|_| SubtitleError::InvalidTimestamp(timestamp.to_string()));
        let hours = parse(parts[0])?;
        let minutes = parse(parts[1])?;
        let seconds = parse(parts[2])?;
        let millis = parse(parts[3])?;

        if minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return Err(SubtitleError::InvalidTimestamp(timestamp.to_string()));
        }

        Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
    }

    /// Convert start time to formatted SRT timestamp
    pub fn format_start_time(&self) -> String {
        Self::format_timestamp(self.start_time_ms)
    }

    /// Convert end time to formatted SRT timestamp
    pub fn format_end_time(&self) -> String {
        Self::format_timestamp(self.end_time_ms)
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }

    /// Render the entry as an SRT block, optionally with the source line above the translation
    pub fn to_srt_block(&self, bilingual: bool) -> String {
        let mut block = format!(
            "{}\n{} --> {}\n",
            self.seq_num,
            self.format_start_time(),
            self.format_end_time()
        );
        if bilingual {
            if let Some(original) = &self.original_text {
                block.push_str(original);
                block.push('\n');
            }
        }
        block.push_str(&self.text);
        block.push_str("\n\n");
        block
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_srt_block(false))
    }
}

/// Ordered collection of subtitle entries; the entry store the pipeline works on
#[derive(Debug, Clone)]
pub struct SubtitleCollection {
    /// Source filename
    pub source_file: PathBuf,

    /// List of subtitle entries, in file order
    pub entries: Vec<SubtitleEntry>,
}

impl SubtitleCollection {
    /// Create an empty collection for a source file
    pub fn new(source_file: PathBuf) -> Self {
        SubtitleCollection {
            source_file,
            entries: Vec::new(),
        }
    }

    /// Create a collection from already parsed entries
    pub fn from_entries(source_file: PathBuf, entries: Vec<SubtitleEntry>) -> Self {
        SubtitleCollection { source_file, entries }
    }

    /// Load and parse an SRT file
    pub fn load_srt<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = FileManager::read_to_string(path)?;
        let entries = Self::parse_srt_string(&content)
            .with_context(|| format!("Failed to parse subtitle file: {:?}", path))?;
        debug!("Parsed {} entries from {:?}", entries.len(), path);
        Ok(Self::from_entries(path.to_path_buf(), entries))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Set of all entry indices
    pub fn index_set(&self) -> HashSet<usize> {
        self.entries.iter().map(|e| e.seq_num).collect()
    }

    /// Fail on the first index that appears twice
    pub fn ensure_unique_indices(&self) -> Result<(), SubtitleError> {
        ensure_unique_indices(&self.entries)
    }

    /// Number of entries carrying a translation
    pub fn translated_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_translated()).count()
    }

    /// Render the collection as SRT text
    pub fn to_srt_string(&self, bilingual: bool) -> String {
        self.entries
            .iter()
            .map(|entry| entry.to_srt_block(bilingual))
            .collect()
    }

    /// Write subtitles to an SRT file
    pub fn write_to_srt<P: AsRef<Path>>(&self, path: P, bilingual: bool) -> Result<()> {
        let path = path.as_ref();
        FileManager::write_atomic(path, &self.to_srt_string(bilingual))
            .with_context(|| format!("Failed to write subtitle file: {}", path.display()))
    }

    /// Parse SRT format string into subtitle entries, keeping file order and indices
    pub fn parse_srt_string(content: &str) -> Result<Vec<SubtitleEntry>> {
        let mut entries = Vec::new();
        let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");

        for (block_no, block) in content.split("\n\n").enumerate() {
            let mut lines = block.lines().map(str::trim_end).skip_while(|l| l.trim().is_empty());

            let Some(header) = lines.next() else {
                continue;
            };

            let seq_num = match header.trim().parse::<usize>() {
                Ok(num) => num,
                Err(_) => {
                    warn!("Skipping block {}: expected a sequence number, found {:?}", block_no + 1, header);
                    continue;
                }
            };

            let Some(timing) = lines.next() else {
                warn!("Skipping subtitle {}: missing timing line", seq_num);
                continue;
            };

            let Some(caps) = TIMESTAMP_REGEX.captures(timing) else {
                warn!("Skipping subtitle {}: invalid timing line {:?}", seq_num, timing);
                continue;
            };

            let (start_ms, end_ms) = match (Self::parse_timestamp_to_ms(&caps, 1), Self::parse_timestamp_to_ms(&caps, 5)) {
                (Ok(start), Ok(end)) => (start, end),
                _ => {
                    warn!("Skipping subtitle {}: unreadable timestamps", seq_num);
                    continue;
                }
            };

            let text = lines.collect::<Vec<_>>().join("\n").trim().to_string();
            entries.push(SubtitleEntry::new(seq_num, start_ms, end_ms, text));
        }

        if entries.is_empty() {
            return Err(anyhow!(SubtitleError::Empty));
        }

        Ok(entries)
    }

    /// Parse timestamp captures to milliseconds
    fn parse_timestamp_to_ms(caps: &regex::Captures, start_idx: usize) -> Result<u64, SubtitleError> {
        let field = |offset: usize| -> Result<u64, SubtitleError> {
            caps.get(start_idx + offset)
                .and_then(|m| m.as_str().parse().ok())
                .ok_or_else(|| SubtitleError::InvalidTimestamp(caps[0].to_string()))
        };

        Ok((field(0)? * 3600 + field(1)? * 60 + field(2)?) * 1000 + field(3)?)
    }
}

/// Fail on the first index that appears twice in `entries`
pub fn ensure_unique_indices(entries: &[SubtitleEntry]) -> Result<(), SubtitleError> {
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.seq_num) {
            return Err(SubtitleError::DuplicateIndex(entry.seq_num));
        }
    }
    Ok(())
}

/// Copy the input next to itself as `<input>.backup` unless a backup already exists
pub fn create_backup<P: AsRef<Path>>(input_file: P) -> Result<Option<PathBuf>> {
    let input_file = input_file.as_ref();
    let mut backup = input_file.as_os_str().to_owned();
    backup.push(".backup");
    let backup = PathBuf::from(backup);

    if backup.exists() {
        return Ok(None);
    }

    fs::copy(input_file, &backup)
        .with_context(|| format!("Failed to create backup {:?}", backup))?;
    Ok(Some(backup))
}

impl fmt::Display for SubtitleCollection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Subtitle Collection")?;
        writeln!(f, "Source: {:?}", self.source_file)?;
        writeln!(f, "Entries: {}", self.entries.len())?;
        Ok(())
    }
}
