//! Testing utilities and mock implementations.
//!
//! # Example
//!
//! ```rust,ignore
//! use jsonify_core::testing::{fixtures, MockConverter};
//!
//! let mock = MockConverter::new("mock", &[TypeTag::Csv]);
//! let input = tempfile::TempDir::new()?;
//! fixtures::write_file(input.path(), "logs/a.csv", b"a,b\n1,2\n");
//! ```

mod mock_converter;

pub use mock_converter::{MockBehavior, MockConverter};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::io::Write;
    use std::path::{Path, PathBuf};

    /// Writes `contents` to `root/relative`, creating parent directories.
    pub fn write_file(root: &Path, relative: &str, contents: &[u8]) -> PathBuf {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create fixture directory");
        }
        std::fs::write(&path, contents).expect("Failed to write fixture");
        path
    }

    /// Builds an in-memory zip with the given `(name, contents)` members.
    pub fn zip_bytes(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, contents) in members {
            writer.start_file(*name, options).expect("Failed to start zip member");
            writer.write_all(contents).expect("Failed to write zip member");
        }
        writer.finish().expect("Failed to finish zip").into_inner()
    }

    /// Wraps `contents` in `levels` nested zips, each holding one member.
    ///
    /// The innermost member is `leaf_name`; the wrapping members are named
    /// `level<N>.zip`.
    pub fn nested_zip(levels: usize, leaf_name: &str, contents: &[u8]) -> Vec<u8> {
        let mut bytes = zip_bytes(&[(leaf_name, contents)]);
        for level in (1..levels).rev() {
            let name = format!("level{level}.zip");
            bytes = zip_bytes(&[(name.as_str(), bytes.as_slice())]);
        }
        bytes
    }

    /// Minimal classic pcap with `count` UDP/IPv4 packets on Ethernet.
    pub fn pcap_bytes(count: usize) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&65535u32.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());

        for index in 0..count {
            let mut frame = Vec::new();
            frame.extend_from_slice(&[0xff; 6]);
            frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 1]);
            frame.extend_from_slice(&[0x08, 0x00]);
            // IPv4 header, UDP, 10.0.0.1 -> 10.0.0.2
            frame.extend_from_slice(&[0x45, 0, 0, 28, 0, 0, 0, 0, 64, 17, 0, 0]);
            frame.extend_from_slice(&[10, 0, 0, 1, 10, 0, 0, 2]);
            frame.extend_from_slice(&5353u16.to_be_bytes());
            frame.extend_from_slice(&53u16.to_be_bytes());
            frame.extend_from_slice(&[0, 8, 0, 0]);

            out.extend_from_slice(&(1_700_000_000u32 + index as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(&frame);
        }
        out
    }
}
