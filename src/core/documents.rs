//! Markdown notes stored as plain files under one root folder.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

pub const NOTE_EXTENSION: &str = "md";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentNode {
    File {
        name: String,
        path: String,
    },
    Directory {
        name: String,
        path: String,
        children: Vec<DocumentNode>,
    },
}

#[derive(Debug)]
pub enum DocumentError {
    InvalidName(String),
    OutsideRoot(String),
    AlreadyExists(String),
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::InvalidName(name) => write!(f, "Invalid note name: '{name}'"),
            DocumentError::OutsideRoot(path) => {
                write!(f, "Path '{path}' is outside the notes folder")
            }
            DocumentError::AlreadyExists(name) => write!(f, "Note '{name}' already exists"),
            DocumentError::Io { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocumentError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> DocumentError + '_ {
    move |source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Append `.md` unless the name already ends with it.
pub fn with_note_extension(name: &str) -> String {
    let suffix = format!(".{NOTE_EXTENSION}");
    if name.ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

fn is_note(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == NOTE_EXTENSION)
}

fn relative_display(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a path relative to the root, refusing anything that could
    /// leave it.
    fn resolve(&self, relative: &str) -> Result<PathBuf, DocumentError> {
        let candidate = Path::new(relative);
        if relative.trim().is_empty() {
            return Err(DocumentError::InvalidName(relative.to_string()));
        }
        let escapes = candidate.components().any(|component| {
            !matches!(component, Component::Normal(_) | Component::CurDir)
        });
        if escapes {
            return Err(DocumentError::OutsideRoot(relative.to_string()));
        }
        Ok(self.root.join(candidate))
    }

    /// Every directory and `.md` file under the root, sorted by name at each
    /// level.
    pub fn list_documents(&self) -> Result<Vec<DocumentNode>, DocumentError> {
        self.list_dir(&self.root)
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<DocumentNode>, DocumentError> {
        let mut entries = fs::read_dir(dir)
            .map_err(io_error(dir))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(io_error(dir))?;
        entries.sort_by_key(|entry| entry.file_name());

        let mut nodes = Vec::new();
        for entry in entries {
            let full_path = entry.path();
            let file_type = entry.file_type().map_err(io_error(&full_path))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = full_path
                .strip_prefix(&self.root)
                .map(relative_display)
                .unwrap_or_else(|_| name.clone());

            if file_type.is_dir() {
                let children = self.list_dir(&full_path)?;
                nodes.push(DocumentNode::Directory {
                    name,
                    path,
                    children,
                });
            } else if file_type.is_file() && is_note(&full_path) {
                nodes.push(DocumentNode::File { name, path });
            }
        }
        Ok(nodes)
    }

    pub fn read_document(&self, relative: &str) -> Result<String, DocumentError> {
        let path = self.resolve(relative)?;
        fs::read_to_string(&path).map_err(io_error(&path))
    }

    pub fn write_document(&self, relative: &str, text: &str) -> Result<(), DocumentError> {
        let path = self.resolve(relative)?;
        fs::write(&path, text).map_err(io_error(&path))
    }

    /// Create an empty note and return its name relative to the root.
    pub fn create_document(&self, name: &str) -> Result<String, DocumentError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DocumentError::InvalidName(name.to_string()));
        }
        let note_name = with_note_extension(trimmed);
        let path = self.resolve(&note_name)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| match source.kind() {
                io::ErrorKind::AlreadyExists => DocumentError::AlreadyExists(note_name.clone()),
                _ => DocumentError::Io {
                    path: path.clone(),
                    source,
                },
            })?;

        debug!(note = %note_name, "created note");
        Ok(note_name)
    }

    /// Move a note to a new name and return that name. An existing note at
    /// the new name is replaced.
    pub fn rename_document(&self, old: &str, new: &str) -> Result<String, DocumentError> {
        let trimmed = new.trim();
        if trimmed.is_empty() {
            return Err(DocumentError::InvalidName(new.to_string()));
        }
        let new_name = with_note_extension(trimmed);
        let from = self.resolve(old)?;
        let to = self.resolve(&new_name)?;

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        fs::rename(&from, &to).map_err(io_error(&from))?;

        debug!(from = %old, to = %new_name, "renamed note");
        Ok(new_name)
    }
}
