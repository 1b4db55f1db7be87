use crate::SigningError;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_BUF: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha256,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::Md5, Algorithm::Sha1, Algorithm::Sha256];

    /// Lowercase name, also used as the checksum document suffix.
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha1 => "sha1",
            Algorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase hex digests of one input under every supported algorithm.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checksums {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

impl Checksums {
    pub fn get(&self, alg: Algorithm) -> &str {
        match alg {
            Algorithm::Md5 => &self.md5,
            Algorithm::Sha1 => &self.sha1,
            Algorithm::Sha256 => &self.sha256,
        }
    }
}

pub fn checksum_bytes(data: &[u8], alg: Algorithm) -> String {
    match alg {
        Algorithm::Md5 => hex::encode(Md5::digest(data)),
        Algorithm::Sha1 => hex::encode(Sha1::digest(data)),
        Algorithm::Sha256 => hex::encode(Sha256::digest(data)),
    }
}

pub fn checksum_file(path: &Path, alg: Algorithm) -> Result<String, SigningError> {
    let sums = all_checksums_file(path)?;
    Ok(sums.get(alg).to_owned())
}

pub fn all_checksums_bytes(data: &[u8]) -> Checksums {
    Checksums {
        md5: checksum_bytes(data, Algorithm::Md5),
        sha1: checksum_bytes(data, Algorithm::Sha1),
        sha256: checksum_bytes(data, Algorithm::Sha256),
    }
}

/// Stream `path` once through all three hashers. Any read error fails the
/// whole call; no partial digest set is returned.
pub fn all_checksums_file(path: &Path) -> Result<Checksums, SigningError> {
    let io_err = |source| SigningError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let n = file.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        md5.update(&buf[..n]);
        sha1.update(&buf[..n]);
        sha256.update(&buf[..n]);
    }
    Ok(Checksums {
        md5: hex::encode(md5.finalize()),
        sha1: hex::encode(sha1.finalize()),
        sha256: hex::encode(sha256.finalize()),
    })
}

/// A checksum document line in the `md5sum`/`sha256sum -c` layout.
pub fn checksum_line(digest: &str, file_name: &str) -> String {
    format!("{digest}  {file_name}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: &[u8] = b"the quick fox jumped over the lazy brown dog";
    const MD5: &str = "356b5768c6964531f678781446840b76";
    const SHA1: &str = "041b2390cd9697ba6b9f57b532b0aa5ac183736b";
    const SHA256: &str = "e088f8b9456b8a91a48159497ac425a4c3cdcad3ad81cc3a269618209dee033b";

    #[test]
    fn known_digests() {
        assert_eq!(checksum_bytes(CONTENT, Algorithm::Md5), MD5);
        assert_eq!(checksum_bytes(CONTENT, Algorithm::Sha1), SHA1);
        assert_eq!(checksum_bytes(CONTENT, Algorithm::Sha256), SHA256);
    }

    #[test]
    fn digests_are_deterministic() {
        for alg in Algorithm::ALL {
            assert_eq!(checksum_bytes(CONTENT, alg), checksum_bytes(CONTENT, alg));
        }
    }

    #[test]
    fn aggregate_matches_single_algorithms() {
        let all = all_checksums_bytes(CONTENT);
        for alg in Algorithm::ALL {
            assert_eq!(all.get(alg), checksum_bytes(CONTENT, alg));
        }
    }

    #[test]
    fn file_digests_match_byte_digests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo");
        std::fs::write(&path, CONTENT).unwrap();
        let sums = all_checksums_file(&path).unwrap();
        assert_eq!(sums, all_checksums_bytes(CONTENT));
        assert_eq!(checksum_file(&path, Algorithm::Sha1).unwrap(), SHA1);
    }

    #[test]
    fn large_file_spanning_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large");
        let data: Vec<u8> = (0..(READ_BUF * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();
        assert_eq!(all_checksums_file(&path).unwrap(), all_checksums_bytes(&data));
    }

    #[test]
    fn missing_file_fails_whole_call() {
        let dir = tempfile::tempdir().unwrap();
        let err = all_checksums_file(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, SigningError::Io { .. }));
    }

    #[test]
    fn checksum_line_layout() {
        assert_eq!(checksum_line(MD5, "foo"), format!("{MD5}  foo\n"));
        assert_eq!(Algorithm::Sha256.to_string(), "sha256");
    }
}
