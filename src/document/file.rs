//! Upload payloads

use std::fmt;
use std::path::Path;

/// A file selected or dropped by the user, waiting to be uploaded
///
/// Moved into the backend upload call, so the bytes are released as soon as
/// the call returns.
pub struct UploadFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Create an upload from in-memory bytes, guessing the content type from the name
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Self {
            filename,
            content_type,
            bytes,
        }
    }

    /// Read a file from disk
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        Ok(Self::new(filename, bytes))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Lowercased extension without the dot
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_guess() {
        let file = UploadFile::new("invoice.PDF", vec![1, 2, 3]);
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.extension().as_deref(), Some("pdf"));
        assert_eq!(file.size(), 3);

        let file = UploadFile::new("notes", vec![]);
        assert_eq!(file.content_type, "application/octet-stream");
        assert_eq!(file.extension(), None);
    }

    #[tokio::test]
    async fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.csv");
        std::fs::write(&path, b"date,amount\n").unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.filename, "bank.csv");
        assert_eq!(file.bytes, b"date,amount\n");
    }
}
