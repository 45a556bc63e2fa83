//! ZIP archive assembly.
//!
//! [`ArchiveBuilder`] accumulates named entries during a run and serializes
//! them into one ZIP payload on request. Entries are already-compressed
//! images, so they are stored without recompression.

use std::io::{Cursor, Write};

use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::configuration::ImageFormat;
use crate::error::FrameFlowError;

/// Deterministic archive file name for frame `id`: `frame_0001.webp`.
///
/// Ids are zero-padded to four digits and grow wider past 9999.
pub fn frame_filename(id: u64, format: ImageFormat) -> String {
    format!("frame_{id:04}.{}", format.extension())
}

/// Name of the finished archive for a source base name: `<base>_sequence.zip`.
pub fn archive_filename(base_name: &str) -> String {
    format!("{base_name}_sequence.zip")
}

/// The in-memory manifest of entries destined for the archive.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    folder: String,
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    /// Create a builder that places entries under `folder` inside the
    /// archive. An empty folder places them at the root.
    pub fn new(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            entries: Vec::new(),
        }
    }

    /// Append an entry. File names are unique per run by construction.
    pub fn add(&mut self, filename: impl Into<String>, payload: Vec<u8>) {
        self.entries.push((filename.into(), payload));
    }

    /// Number of entries in the manifest.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Serialize all entries into one ZIP payload.
    ///
    /// `progress` receives non-decreasing percentages and always ends with
    /// `100.0`. The manifest is left intact so a failed request can be
    /// retried.
    ///
    /// # Errors
    ///
    /// Returns [`FrameFlowError::Archive`] if the ZIP writer fails.
    ///
    /// # Example
    ///
    /// ```
    /// use frameflow::ArchiveBuilder;
    ///
    /// let mut builder = ArchiveBuilder::new("extracted_frames");
    /// builder.add("frame_0001.png", vec![1, 2, 3]);
    ///
    /// let mut seen = Vec::new();
    /// let payload = builder.serialize(|percent| seen.push(percent))?;
    /// assert!(payload.starts_with(b"PK"));
    /// assert_eq!(seen.last(), Some(&100.0));
    /// # Ok::<(), frameflow::FrameFlowError>(())
    /// ```
    pub fn serialize<F>(&self, mut progress: F) -> Result<Vec<u8>, FrameFlowError>
    where
        F: FnMut(f32),
    {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let total = self.entries.len();

        for (index, (filename, payload)) in self.entries.iter().enumerate() {
            writer.start_file(self.entry_path(filename), options)?;
            writer.write_all(payload)?;
            progress((index + 1) as f32 / total as f32 * 100.0);
        }

        let payload = writer.finish()?.into_inner();
        if total == 0 {
            progress(100.0);
        }

        log::debug!(
            "Serialized {total} archive entries into {} bytes",
            payload.len()
        );
        Ok(payload)
    }

    fn entry_path(&self, filename: &str) -> String {
        if self.folder.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{filename}", self.folder.trim_end_matches('/'))
        }
    }
}
