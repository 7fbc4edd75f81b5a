//! MP3 segment splitter.
//!
//! Cuts only on frame-sync boundaries (0xFF followed by 0xE0-masked
//! byte) so every segment starts on a decodable frame and no audio is
//! dropped: segment bytes concatenated in index order are exactly the
//! source bytes.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::error::StageError;

use super::AudioSegment;

const READ_BUF_BYTES: usize = 64 * 1024;

/// How far into the file a sync word must appear for the content to be
/// treated as MP3 (generously past any ID3v2 tag of sane size).
const SYNC_PROBE_BYTES: usize = 512 * 1024;

/// Split `path` into segments of at most `max_bytes`, written next to it
/// as `segment-NNN.mp3`. A file already within the limit is returned as
/// its own single segment.
pub async fn split_file(
    path: &Path,
    out_dir: &Path,
    max_bytes: u64,
) -> Result<Vec<AudioSegment>, StageError> {
    let total = fs::metadata(path).await?.len();

    let mut file = File::open(path).await?;
    validate_mp3_head(&mut file, path).await?;

    if total <= max_bytes {
        return Ok(vec![AudioSegment {
            index: 0,
            path: path.to_path_buf(),
            byte_len: total,
        }]);
    }

    // Re-open so the splitter sees the file from byte zero.
    let mut file = File::open(path).await?;
    let mut pending: Vec<u8> = Vec::with_capacity(max_bytes as usize + READ_BUF_BYTES);
    let mut buf = vec![0u8; READ_BUF_BYTES];
    let mut segments = Vec::new();

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&buf[..n]);

        while pending.len() as u64 > max_bytes {
            let cut = last_sync_before(&pending, max_bytes as usize).ok_or_else(|| {
                StageError::UnsupportedFormat(format!(
                    "no frame boundary within {} bytes of {}",
                    max_bytes,
                    path.display()
                ))
            })?;

            let segment_bytes: Vec<u8> = pending.drain(..cut).collect();
            segments.push(write_segment(out_dir, segments.len(), &segment_bytes).await?);
        }
    }

    if !pending.is_empty() {
        let tail = std::mem::take(&mut pending);
        segments.push(write_segment(out_dir, segments.len(), &tail).await?);
    }

    debug!(count = segments.len(), total, "Chunked audio file");
    Ok(segments)
}

async fn write_segment(
    out_dir: &Path,
    index: usize,
    bytes: &[u8],
) -> Result<AudioSegment, StageError> {
    let path: PathBuf = out_dir.join(format!("segment-{:03}.mp3", index));
    let mut file = File::create(&path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;

    Ok(AudioSegment {
        index,
        path,
        byte_len: bytes.len() as u64,
    })
}

/// Reject content with no MP3 frame sync near the start. An ID3v2 tag
/// prefix is fine; HTML error pages and other formats are not.
async fn validate_mp3_head(file: &mut File, path: &Path) -> Result<(), StageError> {
    let mut head = vec![0u8; SYNC_PROBE_BYTES];
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    head.truncate(filled);

    if head.is_empty() {
        return Err(StageError::UnsupportedFormat(format!(
            "{} is empty",
            path.display()
        )));
    }

    if find_sync(&head).is_none() {
        return Err(StageError::UnsupportedFormat(format!(
            "no MP3 frame sync found in {}",
            path.display()
        )));
    }

    Ok(())
}

fn is_sync(b0: u8, b1: u8) -> bool {
    b0 == 0xFF && (b1 & 0xE0) == 0xE0
}

fn find_sync(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| is_sync(w[0], w[1]))
}

/// Last frame-sync offset in `bytes[1..=limit]`, searching backward.
/// Offset zero is excluded so a cut always makes progress.
fn last_sync_before(bytes: &[u8], limit: usize) -> Option<usize> {
    let limit = limit.min(bytes.len().saturating_sub(2));
    (1..=limit)
        .rev()
        .find(|&i| is_sync(bytes[i], bytes[i + 1]))
}
