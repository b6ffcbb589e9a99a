//! Asset discovery

use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use upbench_core::{BenchError, FileAsset, Result};

/// Create the asset and output directories if they are missing
pub fn prepare_dirs(asset_dir: &Path, out_dir: &Path) -> Result<()> {
    fs::create_dir_all(asset_dir)?;
    fs::create_dir_all(out_dir)?;
    Ok(())
}

/// Pick `required` regular, non-hidden files from `dir`, sorted by size
///
/// When more are available the picks are spread evenly over the size range,
/// always keeping the smallest and the largest.
pub fn discover(dir: &Path, required: usize) -> Result<Vec<FileAsset>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        found.push(FileAsset::new(name, entry.path(), metadata.len()));
    }

    if found.len() < required {
        return Err(BenchError::Discovery {
            found: found.len(),
            required,
        });
    }

    found.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.name.cmp(&b.name)));
    let picked = spread(found, required);

    for pair in picked.windows(2) {
        if pair[0].size == pair[1].size {
            warn!(
                first = %pair[0].name,
                second = %pair[1].name,
                size = pair[0].size,
                "Assets share a size; per-size statistics will blur together"
            );
        }
    }
    debug!(dir = %dir.display(), count = picked.len(), "Assets discovered");
    Ok(picked)
}

/// Evenly spaced picks from a size-sorted list
fn spread(sorted: Vec<FileAsset>, count: usize) -> Vec<FileAsset> {
    let n = sorted.len();
    if count >= n {
        return sorted;
    }
    if count <= 1 {
        return sorted.into_iter().take(count).collect();
    }

    let step = (n - 1) as f64 / (count - 1) as f64;
    let wanted: Vec<usize> = (0..count).map(|i| (i as f64 * step).round() as usize).collect();
    sorted
        .into_iter()
        .enumerate()
        .filter(|(i, _)| wanted.contains(i))
        .map(|(_, asset)| asset)
        .collect()
}
