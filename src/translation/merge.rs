/*!
 * Final reconciliation of merged chunk results against the source entries.
 */

use std::collections::BTreeMap;

use log::debug;

use crate::subtitle_processor::SubtitleEntry;

/// Exactly one entry per source index, ascending by index.
///
/// Indices missing from `merged` fall back to the source entry; merged entries
/// whose index is not in `source` are dropped.
pub fn reconcile<I>(source: &[SubtitleEntry], merged: I) -> Vec<SubtitleEntry>
where
    I: IntoIterator<Item = SubtitleEntry>,
{
    let mut by_index: BTreeMap<usize, SubtitleEntry> = merged.into_iter().map(|e| (e.seq_num, e)).collect();

    let mut result: Vec<SubtitleEntry> = source
        .iter()
        .map(|original| {
            by_index
                .remove(&original.seq_num)
                .unwrap_or_else(|| original.clone())
        })
        .collect();

    if !by_index.is_empty() {
        debug!(
            "Dropping {} merged entries with unknown indices: {:?}",
            by_index.len(),
            by_index.keys().collect::<Vec<_>>()
        );
    }

    result.sort_by_key(|e| e.seq_num);
    result.dedup_by_key(|e| e.seq_num);
    result
}
