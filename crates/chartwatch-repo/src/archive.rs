//! Chart archive helpers
//!
//! Charts are distributed as `.tgz` files whose entries live under a single
//! top-level directory named after the chart.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Component, Path};

use crate::error::{RepoError, Result};

/// Read one file out of a gzipped chart archive
///
/// `file` is relative to the chart root, e.g. `values.yaml`.
pub fn read_chart_file(data: &[u8], chart: &str, file: &str) -> Result<Vec<u8>> {
    let gz = flate2::read::GzDecoder::new(std::io::Cursor::new(data));
    let mut archive = tar::Archive::new(gz);

    let entries = archive.entries().map_err(|e| RepoError::InvalidArchive {
        message: e.to_string(),
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|e| RepoError::InvalidArchive {
            message: e.to_string(),
        })?;

        let matches = {
            let path = entry.path().map_err(|e| RepoError::InvalidArchive {
                message: e.to_string(),
            })?;
            is_chart_file(&path, chart, file)
        };

        if matches {
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(content);
        }
    }

    Err(RepoError::ValuesFileNotFound {
        chart: chart.to_string(),
        file: file.to_string(),
    })
}

/// `<chart>/<file>`, ignoring a leading `./`
fn is_chart_file(path: &Path, chart: &str, file: &str) -> bool {
    let mut components = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir));

    match components.next() {
        Some(Component::Normal(root)) if root == chart => {}
        _ => return false,
    }

    let rest: std::path::PathBuf = components.collect();
    rest == Path::new(file)
}

/// Check an archive against the `sha256` digest published in the index
///
/// Digests may be given bare or with a `sha256:` prefix.
pub fn verify_digest(name: &str, data: &[u8], expected: &str) -> Result<()> {
    let expected = expected.trim_start_matches("sha256:").to_lowercase();
    let actual = hex::encode(Sha256::digest(data));

    if actual != expected {
        return Err(RepoError::IntegrityCheckFailed {
            name: name.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Build a gzipped tar archive in memory
#[cfg(test)]
pub(crate) fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *content).unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}
