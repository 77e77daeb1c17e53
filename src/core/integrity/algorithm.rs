// ─── Integrity Algorithms ───
// Hex digests over files, buffers and git-style framed objects.

use std::fmt;
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tokio::io::AsyncReadExt;

use crate::core::error::{CoreError, CoreResult};

const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrityAlgorithm {
    Sha1,
    Sha256,
    Md5,
    /// SHA-1 over `"blob <len>\0" + payload`, identical to `git hash-object`.
    GitBlobSha1,
}

/// Running digest state, dispatched without boxing.
enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
    Md5(Md5),
}

impl Hasher {
    fn update(&mut self, bytes: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(bytes),
            Hasher::Sha256(h) => h.update(bytes),
            Hasher::Md5(h) => h.update(bytes),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

impl IntegrityAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            IntegrityAlgorithm::Sha1 => "sha1",
            IntegrityAlgorithm::Sha256 => "sha256",
            IntegrityAlgorithm::Md5 => "md5",
            IntegrityAlgorithm::GitBlobSha1 => "git-blob-sha1",
        }
    }

    /// Length of a hex digest produced by this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            IntegrityAlgorithm::Sha1 | IntegrityAlgorithm::GitBlobSha1 => 40,
            IntegrityAlgorithm::Sha256 => 64,
            IntegrityAlgorithm::Md5 => 32,
        }
    }

    /// Fresh hasher; framed algorithms already contain their header.
    fn hasher(self, payload_len: u64) -> Hasher {
        match self {
            IntegrityAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            IntegrityAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            IntegrityAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            IntegrityAlgorithm::GitBlobSha1 => {
                let mut hasher = Hasher::Sha1(Sha1::new());
                hasher.update(&object_header("blob", payload_len));
                hasher
            }
        }
    }

    pub fn digest_bytes(self, bytes: &[u8]) -> String {
        let mut hasher = self.hasher(bytes.len() as u64);
        hasher.update(bytes);
        hasher.finalize_hex()
    }

    /// Stream a file through the hasher without loading it into memory.
    pub async fn digest_file(self, path: &Path) -> CoreResult<String> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| CoreError::io(path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| CoreError::io(path, e))?
            .len();

        let mut hasher = self.hasher(len);
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let read = file
                .read(&mut buffer)
                .await
                .map_err(|e| CoreError::io(path, e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hasher.finalize_hex())
    }
}

/// Git object id for an arbitrary object type (`blob`, `tree`, `commit`).
pub fn git_object_id(kind: &str, payload: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(object_header(kind, payload.len() as u64));
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

fn object_header(kind: &str, len: u64) -> Vec<u8> {
    format!("{kind} {len}\0").into_bytes()
}

impl fmt::Display for IntegrityAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests() {
        assert_eq!(
            IntegrityAlgorithm::Sha1.digest_bytes(b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            IntegrityAlgorithm::Sha256.digest_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            IntegrityAlgorithm::Md5.digest_bytes(b"abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn git_blob_matches_hash_object() {
        // `printf 'hello\n' | git hash-object --stdin`
        assert_eq!(
            IntegrityAlgorithm::GitBlobSha1.digest_bytes(b"hello\n"),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
        assert_eq!(
            IntegrityAlgorithm::GitBlobSha1.digest_bytes(b""),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
        assert_eq!(
            git_object_id("blob", b"hello\n"),
            IntegrityAlgorithm::GitBlobSha1.digest_bytes(b"hello\n")
        );
        for algorithm in [IntegrityAlgorithm::GitBlobSha1, IntegrityAlgorithm::Md5] {
            assert_eq!(algorithm.digest_bytes(b"x").len(), algorithm.hex_len());
        }
    }

    #[tokio::test]
    async fn file_digest_matches_buffer_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &payload).unwrap();

        for algorithm in [
            IntegrityAlgorithm::Sha1,
            IntegrityAlgorithm::Sha256,
            IntegrityAlgorithm::Md5,
            IntegrityAlgorithm::GitBlobSha1,
        ] {
            assert_eq!(
                algorithm.digest_file(&path).await.unwrap(),
                algorithm.digest_bytes(&payload)
            );
        }
    }

    #[test]
    fn serde_names_are_kebab_case() {
        let json = serde_json::to_string(&IntegrityAlgorithm::GitBlobSha1).unwrap();
        assert_eq!(json, "\"git-blob-sha1\"");
    }
}
