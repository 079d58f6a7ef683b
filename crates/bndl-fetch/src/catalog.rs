//! Endpoint catalog: the JSON list of bundle descriptors.
//!
//! The catalog is produced and validated server-side; this module only
//! deserializes it and offers summary helpers for the CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use bndl_core::BundleDescriptor;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub bundles: Vec<BundleDescriptor>,
}

impl Catalog {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("parsing catalog JSON")
    }

    /// Total on-wire bytes across every bundle, framing included.
    pub fn total_bytes(&self) -> u64 {
        self.bundles.iter().map(|b| b.file_size).sum()
    }

    /// Number of bundles using the packed container format.
    pub fn packed_count(&self) -> usize {
        self.bundles.iter().filter(|b| b.is_packed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog() {
        let json = br#"{
            "bundles": [
                {
                    "relativePath": "assets/card/c001.unity3d",
                    "bundleName": "card_c001",
                    "contentHash": "9f2d41aa",
                    "crc": 123456,
                    "fileSize": 2076,
                    "fileMd5": "0123456789abcdef0123456789abcdef",
                    "compressionMode": 3
                },
                {
                    "relativePath": "sound/bgm/title.awb",
                    "bundleName": "bgm_title",
                    "contentHash": "11aa22bb",
                    "crc": 99,
                    "fileSize": 1000,
                    "fileMd5": "",
                    "compressionMode": 0
                }
            ]
        }"#;

        let catalog = Catalog::from_json(json).unwrap();
        assert_eq!(catalog.bundles.len(), 2);
        assert_eq!(catalog.packed_count(), 1);
        assert_eq!(catalog.total_bytes(), 3076);
        assert_eq!(catalog.bundles[0].plaintext_size(), 2048);
    }

    #[test]
    fn test_parse_empty_catalog() {
        let catalog = Catalog::from_json(br#"{"bundles": []}"#).unwrap();
        assert!(catalog.bundles.is_empty());
        assert_eq!(catalog.total_bytes(), 0);
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(Catalog::from_json(b"not json at all").is_err());
    }
}
