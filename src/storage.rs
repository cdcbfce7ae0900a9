use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::AppError;

/// Extensions the listing endpoint recognizes as images.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// All file I/O goes through this handle, scoped to a single flat directory.
/// Client-supplied names are validated before they touch a path.
#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Opens the storage root, creating the directory if it is missing.
    pub fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Maps a client-supplied name onto a path inside the root. Names with
    /// path separators or non-plain components (`..`, `.`) never reach disk.
    fn resolve(&self, name: &str) -> Result<PathBuf, AppError> {
        let plain = !name.is_empty()
            && !name.contains(['/', '\\'])
            && matches!(
                Path::new(name).components().next(),
                Some(Component::Normal(_))
            );
        if !plain {
            return Err(AppError::bad_request(format!("invalid filename: {name:?}")));
        }
        Ok(self.root.join(name))
    }

    pub fn exists(&self, name: &str) -> Result<bool, AppError> {
        Ok(self.resolve(name)?.exists())
    }

    /// Writes a new file, refusing to overwrite. The create-new open lets the
    /// filesystem arbitrate concurrent uploads of the same name; exactly one
    /// writer wins and the rest see a conflict. Returns the stored size.
    pub async fn write_new(&self, name: &str, bytes: &[u8]) -> Result<u64, AppError> {
        let path = self.resolve(name)?;
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(AppError::Conflict(name.to_string()));
            }
            Err(err) => return Err(AppError::Storage(err)),
        };

        if let Err(err) = write_all(&mut file, bytes).await {
            // don't leave a truncated file behind to show up in listings
            drop(file);
            let _ = fs::remove_file(&path).await;
            return Err(AppError::Storage(err));
        }
        Ok(bytes.len() as u64)
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>, AppError> {
        let path = self.resolve(name)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(AppError::NotFound),
            Err(err) => Err(AppError::Storage(err)),
        }
    }

    /// Names of stored images, ordered by modification time ascending.
    /// Filename breaks ties so equal timestamps still have a total order.
    pub async fn list_images(&self) -> Result<Vec<String>, AppError> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut images: Vec<(SystemTime, String)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if !is_image_name(&name) {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            images.push((modified, name));
        }
        images.sort();
        Ok(images.into_iter().map(|(_, name)| name).collect())
    }
}

fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|image_ext| ext.eq_ignore_ascii_case(image_ext))
        })
}

async fn write_all(file: &mut fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await
}
