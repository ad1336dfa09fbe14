//! Latency histogram persistence
//!
//! Saves the run's latency histogram in the HdrHistogram V2 binary format, so
//! it can be post-processed by any HdrHistogram implementation (percentile
//! plots, merging several runs).

use crate::stats::histogram::LatencyHistogram;
use crate::Result;
use anyhow::Context;
use hdrhistogram::serialization::{Deserializer, Serializer, V2Serializer};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Write `histogram` to `path`, replacing any existing file
///
/// Returns the number of bytes written.
pub fn save_histogram(path: &Path, histogram: &LatencyHistogram) -> Result<usize> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create histogram file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    let written = V2Serializer::new()
        .serialize(histogram.as_hdr(), &mut writer)
        .map_err(|e| anyhow::anyhow!("Failed to serialize histogram: {:?}", e))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write histogram file: {}", path.display()))?;

    tracing::debug!(path = %path.display(), bytes = written, "histogram saved");
    Ok(written)
}

/// Read a histogram previously written by [`save_histogram`]
pub fn load_histogram(path: &Path) -> Result<LatencyHistogram> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open histogram file: {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let histogram = Deserializer::new()
        .deserialize(&mut reader)
        .map_err(|e| anyhow::anyhow!("Failed to parse histogram file {}: {:?}", path.display(), e))?;

    Ok(LatencyHistogram::from_hdr(histogram))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let mut histogram = LatencyHistogram::new();
        for micros in [120, 450, 450, 10_000, 2_000_000] {
            histogram.record_micros(micros);
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latency.hgrm");
        let written = save_histogram(&path, &histogram).unwrap();
        assert!(written > 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), written as u64);

        let loaded = load_histogram(&path).unwrap();
        assert_eq!(loaded.total_count(), 5);
        assert_eq!(loaded.min(), histogram.min());
        assert_eq!(loaded.max(), histogram.max());
        assert_eq!(
            loaded.value_at_percentile(50.0),
            histogram.value_at_percentile(50.0)
        );
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.hgrm");
        std::fs::write(&path, b"not a histogram").unwrap();
        assert!(load_histogram(&path).is_err());
    }

    #[test]
    fn test_save_to_missing_directory() {
        let histogram = LatencyHistogram::new();
        assert!(save_histogram(Path::new("/nonexistent/dir/latency.hgrm"), &histogram).is_err());
    }
}
