/*!
 * Splits an ordered entry list into contiguous chunks, one unit of parallel work each.
 */

use crate::subtitle_processor::SubtitleEntry;

/// A contiguous run of entries processed by one worker task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position in the partition, also part of the chunk checkpoint path
    pub id: usize,

    /// Entries in input order
    pub entries: Vec<SubtitleEntry>,
}

impl Chunk {
    /// Number of entries in the chunk
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the chunk holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Subtitle indices covered by this chunk
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|e| e.seq_num)
    }
}

/// Chunk size for `total` entries and `num_workers` workers: `floor(N / W)`, at least 1
pub fn chunk_size(total: usize, num_workers: usize) -> usize {
    (total / num_workers.max(1)).max(1)
}

/// Split entries into contiguous chunks of `floor(N / W)`; only the last one may be shorter.
///
/// When `N` is not a multiple of the chunk size the result holds more chunks than
/// `num_workers` (23 entries over 5 workers gives six chunks: 4,4,4,4,4,3). The worker
/// pool still bounds concurrency. An empty input gives no chunks.
pub fn partition(entries: &[SubtitleEntry], num_workers: usize) -> Vec<Chunk> {
    if entries.is_empty() {
        return Vec::new();
    }

    let size = chunk_size(entries.len(), num_workers);
    entries
        .chunks(size)
        .enumerate()
        .map(|(position, slice)| Chunk {
            id: position + 1,
            entries: slice.to_vec(),
        })
        .collect()
}
