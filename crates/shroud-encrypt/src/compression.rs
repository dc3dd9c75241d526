//! Per-item compression choice and the zstd calls behind it.

use std::io;
use std::path::Path;

/// How the engine decides whether to compress an item's chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMode {
    /// Sample the item and check its name hint on every commit
    #[default]
    Auto,
    /// Never compress
    Never,
    /// Always compress
    Always,
}

impl CompressionMode {
    /// Parses `auto`, `never` or `always`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "never" | "off" | "none" => Some(Self::Never),
            "always" | "on" | "zstd" => Some(Self::Always),
            _ => None,
        }
    }
}

/// Compressed-to-original ratio above which compression is not worth it.
pub const MAX_USEFUL_RATIO: f64 = 0.9;

/// Extensions of formats that are already compressed.
const PRECOMPRESSED_EXTENSIONS: &[&str] = &[
    // archives
    "7z", "br", "bz2", "gz", "lz", "lz4", "lzma", "rar", "tgz", "xz", "zip", "zst",
    // images
    "avif", "gif", "heic", "jpeg", "jpg", "png", "webp",
    // audio
    "aac", "flac", "m4a", "mp3", "ogg", "opus",
    // video
    "avi", "m4v", "mkv", "mov", "mp4", "webm",
    // containers
    "apk", "docx", "epub", "jar", "odt", "pptx", "xlsx",
];

/// True if `path` names a format that is already compressed.
pub fn is_precompressed(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            PRECOMPRESSED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// True if compressing `sample` at `level` saves at least 10%.
pub fn is_compressible(sample: &[u8], level: i32) -> bool {
    if sample.is_empty() {
        return false;
    }
    match compress(sample, level) {
        Ok(compressed) => compressed.len() as f64 / sample.len() as f64 <= MAX_USEFUL_RATIO,
        Err(_) => false,
    }
}

/// zstd-compresses one chunk.
pub fn compress(data: &[u8], level: i32) -> io::Result<Vec<u8>> {
    zstd::bulk::compress(data, level)
}

/// Decompresses one chunk whose plaintext is at most `capacity` bytes.
pub fn decompress(data: &[u8], capacity: usize) -> io::Result<Vec<u8>> {
    zstd::bulk::decompress(data, capacity)
}

/// Valid compression levels.
pub fn level_range() -> std::ops::RangeInclusive<i32> {
    zstd::compression_level_range()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(CompressionMode::parse("AUTO"), Some(CompressionMode::Auto));
        assert_eq!(CompressionMode::parse("never"), Some(CompressionMode::Never));
        assert_eq!(CompressionMode::parse("zstd"), Some(CompressionMode::Always));
        assert_eq!(CompressionMode::parse("sometimes"), None);
    }

    #[test]
    fn test_precompressed_extensions() {
        assert!(is_precompressed(Path::new("holiday/IMG_0001.JPG")));
        assert!(is_precompressed(Path::new("backup.tar.gz")));
        assert!(!is_precompressed(Path::new("notes.txt")));
        assert!(!is_precompressed(Path::new("Makefile")));
    }

    #[test]
    fn test_text_is_compressible() {
        let text = b"the quick brown fox jumps over the lazy dog. ".repeat(100);
        assert!(is_compressible(&text, 3));
    }

    #[test]
    fn test_random_bytes_are_not_compressible() {
        use rand::{rngs::StdRng, RngCore, SeedableRng};
        let mut data = vec![0u8; 4096];
        StdRng::seed_from_u64(7).fill_bytes(&mut data);
        assert!(!is_compressible(&data, 3));
        assert!(!is_compressible(&[], 3));
    }

    #[test]
    fn test_decompress_respects_capacity() {
        let data = vec![1u8; 1000];
        let compressed = compress(&data, 3).unwrap();
        assert_eq!(decompress(&compressed, 1000).unwrap(), data);
        assert!(decompress(&compressed, 999).is_err());
    }
}
