// LogWarden - platform/source.rs
//
// Where attachment bytes come from. The chat integration plugs its HTTP
// client in through `AttachmentSource`; the CLI and tests read local files.

use crate::core::model::Attachment;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Opens the byte stream behind an attachment locator.
pub trait AttachmentSource: Send + Sync {
    fn open(&self, attachment: &Attachment) -> io::Result<Box<dyn Read + Send>>;
}

/// Resolves locators as filesystem paths, optionally relative to a root.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    root: Option<PathBuf>,
}

impl FileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(locator),
            None => PathBuf::from(locator),
        }
    }
}

impl AttachmentSource for FileSource {
    fn open(&self, attachment: &Attachment) -> io::Result<Box<dyn Read + Send>> {
        let path = self.resolve(&attachment.locator);
        let file = File::open(&path)?;
        tracing::debug!(path = %path.display(), "Opened attachment");
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Attachment describing a local file, with its size as the declared size.
pub fn attachment_for_path(path: &Path) -> Attachment {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut attachment = Attachment::new(path.to_string_lossy(), file_name);
    attachment.declared_size = std::fs::metadata(path).ok().map(|m| m.len());
    attachment
}
