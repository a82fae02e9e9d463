use jobs::{ArtifactStore, JobError, Result};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// `ArtifactStore` sobre el sistema de ficheros. Las ubicaciones relativas
/// se resuelven contra `root`; las absolutas sólo se aceptan si están dentro
/// de `root`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
  root: PathBuf,
}
impl FsArtifactStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }
  pub fn root(&self) -> &Path {
    &self.root
  }
  fn resolve(&self, location: &str) -> Result<PathBuf> {
    let path = Path::new(location);
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
      return Err(JobError::Storage(format!("fs: ubicación fuera del directorio de salida: {}", location)));
    }
    if path.is_absolute() {
      if path.starts_with(&self.root) {
        return Ok(path.to_path_buf());
      }
      return Err(JobError::Storage(format!("fs: ubicación fuera del directorio de salida: {}", location)));
    }
    Ok(self.root.join(path))
  }
}
impl ArtifactStore for FsArtifactStore {
  fn remove(&self, location: &str) -> Result<()> {
    let path = self.resolve(location)?;
    let res = if path.is_dir() { std::fs::remove_dir_all(&path) } else { std::fs::remove_file(&path) };
    match res {
      Ok(()) => {
        log::debug!("eliminado {}", path.display());
        Ok(())
      }
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      Err(e) => Err(JobError::Storage(format!("fs: {}: {}", path.display(), e))),
    }
  }
}
