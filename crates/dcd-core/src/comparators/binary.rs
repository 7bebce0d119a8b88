//! The fallback comparator: whole-file byte equality.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::comparator::{Comparator, Data, RawDiff};
use crate::error::{DcdError, DcdResult};
use crate::options::DiffOptions;

/// Detects that two files differ without localizing the difference.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultComparator;

impl DefaultComparator {
    pub const NAME: &'static str = "DefaultComparator";
}

impl Comparator for DefaultComparator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn diff(
        &self,
        reference: &Data,
        compared: &Data,
        _options: &DiffOptions,
    ) -> DcdResult<RawDiff> {
        binary_diff(reference, compared)
    }
}

/// Compare two payloads byte for byte.
///
/// Two files are streamed side by side and never read whole.
pub fn binary_diff(reference: &Data, compared: &Data) -> DcdResult<RawDiff> {
    if let (Data::Path(a), Data::Path(b)) = (reference, compared) {
        if file_len(a)? != file_len(b)? {
            return Ok(RawDiff::Binary(true));
        }
        return files_differ(a, b).map(RawDiff::Binary);
    }
    let a = reference.bytes()?;
    let b = compared.bytes()?;
    Ok(RawDiff::Binary(a != b))
}

fn open(path: &Path) -> DcdResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| DcdError::io(path, e))
}

/// Stop at the first chunk that differs.
fn files_differ(a: &Path, b: &Path) -> DcdResult<bool> {
    let (mut left, mut right) = (open(a)?, open(b)?);
    loop {
        let chunk_a = left.fill_buf().map_err(|e| DcdError::io(a, e))?;
        let chunk_b = right.fill_buf().map_err(|e| DcdError::io(b, e))?;
        if chunk_a.is_empty() || chunk_b.is_empty() {
            return Ok(chunk_a.len() != chunk_b.len());
        }
        let n = chunk_a.len().min(chunk_b.len());
        if chunk_a[..n] != chunk_b[..n] {
            return Ok(true);
        }
        left.consume(n);
        right.consume(n);
    }
}

fn file_len(path: &Path) -> DcdResult<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| DcdError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_and_different_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let c = dir.path().join("c.bin");
        std::fs::write(&a, b"\x00\x01payload").unwrap();
        std::fs::write(&b, b"\x00\x01payload").unwrap();
        std::fs::write(&c, b"\x00\x02payload").unwrap();

        let cmp = DefaultComparator;
        let opts = DiffOptions::default();
        let load = |p: &Path| cmp.load(p, &Default::default()).unwrap();
        assert_eq!(cmp.diff(&load(&a), &load(&b), &opts).unwrap(), RawDiff::Binary(false));
        assert_eq!(cmp.diff(&load(&a), &load(&c), &opts).unwrap(), RawDiff::Binary(true));
    }

    #[test]
    fn large_files_are_streamed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let mut content = vec![7u8; 3 * 8192 + 11];
        std::fs::write(&a, &content).unwrap();
        std::fs::write(&b, &content).unwrap();
        assert!(!files_differ(&a, &b).unwrap());

        let last = content.len() - 1;
        content[last] = 8;
        std::fs::write(&b, &content).unwrap();
        assert!(files_differ(&a, &b).unwrap());
        assert_eq!(
            binary_diff(&Data::Path(a.clone()), &Data::Path(b)).unwrap(),
            RawDiff::Binary(true)
        );

        let short = dir.path().join("short.bin");
        std::fs::write(&short, &content[..100]).unwrap();
        assert!(files_differ(&a, &short).unwrap());
    }

    #[test]
    fn in_memory_payloads() {
        let diff = binary_diff(&Data::Bytes(vec![1, 2]), &Data::Bytes(vec![1, 2, 3])).unwrap();
        assert_eq!(diff, RawDiff::Binary(true));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Data::Path(dir.path().join("nope"));
        assert!(matches!(
            binary_diff(&missing, &missing),
            Err(DcdError::Io { .. })
        ));
    }
}
