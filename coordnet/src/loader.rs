// coordnet/src/loader.rs
//
// Input opening. Everything downstream sees one BufRead regardless of
// whether the file on disk is gzipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;

/// Open a possibly-gzipped input file. A file name ending in `z` is assumed
/// to be gzip (covers .gz and .tgz-style suffixes).
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    if is_gzip_name(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn is_gzip_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_lowercase().ends_with('z'))
        .unwrap_or(false)
}
