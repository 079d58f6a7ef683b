use serde::{Deserialize, Serialize};

/// Size of the fixed container header (magic + version + reserved + flag).
pub const HEADER_SIZE: usize = 12;

/// Size of the MD5 digest stored immediately after the header.
pub const HASH_SIZE: usize = 16;

/// Total framing overhead of a packed bundle.
pub const FRAME_OVERHEAD: u64 = (HEADER_SIZE + HASH_SIZE) as u64;

/// Compression mode signalling the packed container format
/// (header + payload hash + optional cipher). Every other mode means the
/// payload is stored verbatim.
pub const COMPRESSION_PACKED: u32 = 3;

/// One catalog entry describing a remote asset bundle.
///
/// Field names match the endpoint's JSON schema (camelCase on the wire).
/// Immutable once loaded; the orchestrator owns descriptors for the
/// duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleDescriptor {
    /// Download path relative to the endpoint root; also the output path
    /// relative to the output root. May contain directory separators.
    pub relative_path: String,
    /// Bundle identity used in key derivation.
    pub bundle_name: String,
    /// Content hash used in key derivation.
    pub content_hash: String,
    /// Checksum used in key derivation.
    pub crc: u32,
    /// Total on-wire size, including framing when packed.
    pub file_size: u64,
    /// Full-content digest. Reserved: the verification pass is size-only.
    #[serde(default)]
    pub file_md5: String,
    /// See [`COMPRESSION_PACKED`].
    pub compression_mode: u32,
}

impl BundleDescriptor {
    /// Whether the payload arrives in the packed container format.
    pub fn is_packed(&self) -> bool {
        self.compression_mode == COMPRESSION_PACKED
    }

    /// Size of the materialized plaintext file. For a packed bundle this
    /// is the on-wire size minus the header and stored hash; a pre-existing
    /// output file of any other size is stale and must be re-downloaded.
    pub fn plaintext_size(&self) -> u64 {
        if self.is_packed() {
            self.file_size.saturating_sub(FRAME_OVERHEAD)
        } else {
            self.file_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(file_size: u64) -> BundleDescriptor {
        BundleDescriptor {
            relative_path: "assets/card/c001.unity3d".into(),
            bundle_name: "card_c001".into(),
            content_hash: "9f2d41aa".into(),
            crc: 0xDEAD_BEEF,
            file_size,
            file_md5: String::new(),
            compression_mode: COMPRESSION_PACKED,
        }
    }

    #[test]
    fn plaintext_size_strips_framing_when_packed() {
        assert_eq!(packed(1028).plaintext_size(), 1000);
    }

    #[test]
    fn plaintext_size_saturates_on_undersized_packed_bundle() {
        // A packed bundle shorter than its own framing is malformed; size
        // math must not underflow before the container parser rejects it.
        assert_eq!(packed(10).plaintext_size(), 0);
    }

    #[test]
    fn plaintext_size_is_identity_when_verbatim() {
        let mut d = packed(1028);
        d.compression_mode = 0;
        assert_eq!(d.plaintext_size(), 1028);
    }

    #[test]
    fn descriptor_parses_camel_case_wire_names() {
        let json = r#"{
            "relativePath": "assets/bg/title.unity3d",
            "bundleName": "bg_title",
            "contentHash": "ab12cd34",
            "crc": 123456,
            "fileSize": 2076,
            "fileMd5": "0123456789abcdef0123456789abcdef",
            "compressionMode": 3
        }"#;
        let d: BundleDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.bundle_name, "bg_title");
        assert!(d.is_packed());
        assert_eq!(d.plaintext_size(), 2048);
    }

    #[test]
    fn descriptor_tolerates_missing_file_md5() {
        let json = r#"{
            "relativePath": "a",
            "bundleName": "a",
            "contentHash": "00",
            "crc": 0,
            "fileSize": 28,
            "compressionMode": 3
        }"#;
        let d: BundleDescriptor = serde_json::from_str(json).unwrap();
        assert!(d.file_md5.is_empty());
    }
}
