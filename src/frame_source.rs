// src/frame_source.rs
//
// Replays prepared frames from disk. Each file holds one frame as packed
// little-endian f32 values; files are played in name order. An optional
// `<name>.desire` sidecar holds the desire index requested on that frame.

use crate::types::{FrameSourceConfig, PreparedFrame};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

const DESIRE_EXTENSION: &str = "desire";

/// Camera period used to synthesize end-of-frame timestamps (20 Hz)
pub const FRAME_INTERVAL_NS: u64 = 50_000_000;

pub struct FrameSource {
    files: Vec<PathBuf>,
    next: usize,
}

impl FrameSource {
    pub fn open(config: &FrameSourceConfig) -> Result<Self> {
        let files = find_frame_files(Path::new(&config.input_dir), &config.extension)?;
        info!(
            "Found {} frame file(s) in {}",
            files.len(),
            config.input_dir
        );
        Ok(Self { files, next: 0 })
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Iterator for FrameSource {
    type Item = Result<PreparedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.files.get(self.next)?;
        let frame_id = self.next as u32;
        self.next += 1;
        Some(read_prepared(path, frame_id))
    }
}

fn read_prepared(path: &Path, frame_id: u32) -> Result<PreparedFrame> {
    Ok(PreparedFrame {
        frame_id,
        timestamp_eof: frame_id as u64 * FRAME_INTERVAL_NS,
        data: read_frame(path)?,
        desire: read_desire(&path.with_extension(DESIRE_EXTENSION))?,
    })
}

/// Desire index from a sidecar file; a missing sidecar means no request.
pub fn read_desire(path: &Path) -> Result<Option<usize>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read desire {}", path.display()))?;
    let idx = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid desire index in {}", path.display()))?;
    Ok(Some(idx))
}

pub fn find_frame_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Frame directory {} does not exist", dir.display());
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(extension))
        .collect();
    files.sort();
    Ok(files)
}

pub fn read_frame(path: &Path) -> Result<Vec<f32>> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read frame {}", path.display()))?;
    if bytes.len() % 4 != 0 {
        bail!(
            "Frame {} is {} bytes, not a whole number of f32 values",
            path.display(),
            bytes.len()
        );
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
