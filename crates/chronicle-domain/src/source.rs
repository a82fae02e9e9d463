// source.rs
use crate::DomainError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static WATCH_OR_SHORT: Lazy<Result<Regex, DomainError>> =
  Lazy::new(|| Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/)([^&\s]+)").map_err(DomainError::from));

static EMBED: Lazy<Result<Regex, DomainError>> =
  Lazy::new(|| Regex::new(r"youtube\.com/embed/([^&\s]+)").map_err(DomainError::from));

static EMAIL: Lazy<Result<Regex, DomainError>> =
  Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").map_err(DomainError::from));

/// Extrae el id de vídeo de una URL de YouTube (`watch?v=`, `youtu.be/` o
/// `/embed/`).
pub fn extract_video_id(url: &str) -> Result<String, DomainError> {
  for pattern in [&*WATCH_OR_SHORT, &*EMBED] {
    let re = pattern.as_ref().map_err(|e| e.clone())?;
    if let Some(id) = re.captures(url).and_then(|c| c.get(1)) {
      return Ok(id.as_str().to_string());
    }
  }
  Err(DomainError::ValidationError(format!("URL de YouTube inválida: {}", url)))
}

/// Valida la forma `local@dominio.tld` de un correo.
pub fn validate_email(email: &str) -> Result<(), DomainError> {
  let re = EMAIL.as_ref().map_err(|e| e.clone())?;
  if re.is_match(email) {
    Ok(())
  } else {
    Err(DomainError::ValidationError(format!("Correo inválido: {}", email)))
  }
}

/// Nombre visible de una transcripción: `"<orador> - <fecha>"`.
pub fn display_name(speaker: &str, date: &str) -> String {
  format!("{} - {}", speaker, date)
}

/// Slug de salida: orador en minúsculas con los espacios como `-`, más la
/// fecha.
pub fn slug(speaker: &str, date: &str) -> String {
  let speaker = speaker.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-");
  format!("{}-{}", speaker, date)
}

/// Documento fuente de un trabajo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sourceType", rename_all = "camelCase")]
pub enum SourceDocument {
  /// Transcripción subida por el usuario.
  #[serde(rename_all = "camelCase")]
  Transcript { speaker: String, date: String, transcript_path: String },
  /// Enlace a un vídeo externo.
  #[serde(rename_all = "camelCase")]
  Media { url: String, video_id: String, title: Option<String> },
}

impl SourceDocument {
  /// Ruta de la transcripción subida, si la hay.
  pub fn transcript_path(&self) -> Option<&str> {
    match self {
      SourceDocument::Transcript { transcript_path, .. } => Some(transcript_path),
      SourceDocument::Media { .. } => None,
    }
  }

  pub fn display_name(&self) -> String {
    match self {
      SourceDocument::Transcript { speaker, date, .. } => display_name(speaker, date),
      SourceDocument::Media { video_id, title, .. } => title.clone().unwrap_or_else(|| video_id.clone()),
    }
  }
}

impl fmt::Display for SourceDocument {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SourceDocument::Transcript { .. } => write!(f, "transcript({})", self.display_name()),
      SourceDocument::Media { video_id, .. } => write!(f, "media({})", video_id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_video_id_from_known_forms() {
    assert_eq!(extract_video_id("https://www.youtube.com/watch?v=abc123&t=10").unwrap(), "abc123");
    assert_eq!(extract_video_id("https://youtu.be/xyz789").unwrap(), "xyz789");
    assert_eq!(extract_video_id("https://www.youtube.com/embed/emb42").unwrap(), "emb42");
  }

  #[test]
  fn rejects_unrecognised_urls() {
    assert!(matches!(extract_video_id("https://vimeo.com/123"), Err(DomainError::ValidationError(_))));
    assert!(extract_video_id("https://youtube.com/watch?v=").is_err());
  }

  #[test]
  fn email_shape() {
    assert!(validate_email("ana@example.org").is_ok());
    assert!(validate_email("ana@example").is_err());
    assert!(validate_email("ana example@x.org").is_err());
    assert!(validate_email("").is_err());
  }

  #[test]
  fn naming_and_slug() {
    assert_eq!(display_name("John  Smith", "2024-05-01"), "John  Smith - 2024-05-01");
    assert_eq!(slug("John  Smith", "2024-05-01"), "john-smith-2024-05-01");
  }
}
