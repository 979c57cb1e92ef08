use crate::summarize::CleanedEntry;
use crate::tokens::CountTokens;
use std::collections::VecDeque;

/// Default per-chunk token ceiling.
pub const DEFAULT_MAX_TOKENS: usize = 18_000;

/// A contiguous run of cleaned entries, persisted as one batch file.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub entries: Vec<CleanedEntry>,
    /// Tokens in the compact JSON array of `entries`.
    pub tokens: usize,
}

/// Tokens in an entry's compact JSON serialization.
pub fn entry_tokens<C: CountTokens + ?Sized>(
    entry: &CleanedEntry,
    counter: &C,
) -> serde_json::Result<usize> {
    Ok(counter.count(&serde_json::to_string(entry)?))
}

/// Tokens in the compact JSON array of `entries`, brackets and commas
/// included.
pub fn batch_tokens<C: CountTokens + ?Sized>(
    entries: &[CleanedEntry],
    counter: &C,
) -> serde_json::Result<usize> {
    Ok(counter.count(&serde_json::to_string(entries)?))
}

/// Greedily pack entries, in order, into chunks of at most `max_tokens`.
///
/// Entries are added while the running estimate (entry counts plus the
/// array's brackets and commas) stays within the ceiling. The closed batch
/// is then measured as a whole; if the tokenizer merges across entry
/// boundaries and the batch comes out over the ceiling, trailing entries
/// are handed back to the next chunk until it fits.
///
/// Entries are never split, so a single entry larger than the ceiling
/// ends up alone in its own (oversized) chunk.
pub fn chunk_entries<C: CountTokens + ?Sized>(
    entries: Vec<CleanedEntry>,
    max_tokens: usize,
    counter: &C,
) -> serde_json::Result<Vec<Chunk>> {
    let brackets = counter.count("[]");
    let comma = counter.count(",");
    let mut pending = entries
        .into_iter()
        .map(|entry| entry_tokens(&entry, counter).map(|tokens| (entry, tokens)))
        .collect::<serde_json::Result<VecDeque<_>>>()?;
    let mut chunks = Vec::new();

    while !pending.is_empty() {
        let mut batch: Vec<CleanedEntry> = Vec::new();
        let mut sizes: Vec<usize> = Vec::new();
        let mut estimate = brackets;
        while let Some(&(_, tokens)) = pending.front() {
            let separator = if batch.is_empty() { 0 } else { comma };
            let next = estimate + separator + tokens;
            if !batch.is_empty() && next > max_tokens {
                break;
            }
            let Some((entry, tokens)) = pending.pop_front() else {
                break;
            };
            batch.push(entry);
            sizes.push(tokens);
            estimate = next;
        }

        let mut tokens = batch_tokens(&batch, counter)?;
        while tokens > max_tokens && batch.len() > 1 {
            if let (Some(entry), Some(size)) = (batch.pop(), sizes.pop()) {
                pending.push_front((entry, size));
            }
            tokens = batch_tokens(&batch, counter)?;
        }
        chunks.push(Chunk {
            entries: batch,
            tokens,
        });
    }
    Ok(chunks)
}
