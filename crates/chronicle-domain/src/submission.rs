// submission.rs
use crate::source::{extract_video_id, slug, validate_email, SourceDocument};
use crate::DomainError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Entrada sin validar de un envío. Para una transcripción se esperan
/// `speaker`, `date` y `transcriptPath`; para un vídeo, `mediaUrl` y
/// `email`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
  pub speaker: Option<String>,
  pub date: Option<String>,
  pub transcript_path: Option<String>,
  pub media_url: Option<String>,
  pub title: Option<String>,
  pub email: Option<String>,
  pub owner_ref: Option<String>,
}

impl SubmissionRequest {
  pub fn transcript(speaker: &str, date: &str, transcript_path: &str) -> Self {
    Self { speaker: Some(speaker.to_string()),
           date: Some(date.to_string()),
           transcript_path: Some(transcript_path.to_string()),
           ..Self::default() }
  }

  pub fn media(url: &str, email: &str) -> Self {
    Self { media_url: Some(url.to_string()), email: Some(email.to_string()), ..Self::default() }
  }

  pub fn with_owner(mut self, owner_ref: &str) -> Self {
    self.owner_ref = Some(owner_ref.to_string());
    self
  }

  /// Valida la entrada y construye un `Submission`. Nada se persiste si
  /// falla.
  pub fn validate(&self) -> Result<Submission, DomainError> {
    let notify_email = match non_empty(&self.email) {
      Some(email) => {
        validate_email(email)?;
        Some(email.to_string())
      }
      None => None,
    };

    let source = match non_empty(&self.media_url) {
      Some(url) => {
        if notify_email.is_none() {
          return Err(DomainError::ValidationError("URL y correo son obligatorios".to_string()));
        }
        let video_id = extract_video_id(url)?;
        SourceDocument::Media { url: url.to_string(),
                                video_id,
                                title: non_empty(&self.title).map(str::to_string) }
      }
      None => {
        let speaker = required(&self.speaker, "speaker")?;
        let date = required(&self.date, "date")?;
        let transcript_path = required(&self.transcript_path, "transcriptPath")?;
        SourceDocument::Transcript { speaker: speaker.to_string(),
                                     date: date.to_string(),
                                     transcript_path: transcript_path.to_string() }
      }
    };

    Ok(Submission { name: source.display_name(),
                    owner_ref: non_empty(&self.owner_ref).map(str::to_string),
                    source,
                    notify_email })
  }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
  field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn required<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str, DomainError> {
  non_empty(field).ok_or_else(|| DomainError::ValidationError(format!("{} es obligatorio", name)))
}

/// Envío validado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
  pub name: String,
  pub owner_ref: Option<String>,
  pub source: SourceDocument,
  pub notify_email: Option<String>,
}

impl Submission {
  /// Documento base que se guarda con el trabajo y del que se deriva el
  /// payload de cada disparo.
  pub fn payload(&self) -> Result<Value, DomainError> {
    let mut doc = serde_json::to_value(&self.source)?;
    doc["name"] = json!(self.name);
    if let Some(email) = &self.notify_email {
      doc["email"] = json!(email);
    }
    if let SourceDocument::Transcript { speaker, date, .. } = &self.source {
      doc["slug"] = json!(slug(speaker, date));
    }
    Ok(doc)
  }
}

/// Payload que recibe el flujo externo en un disparo concreto: el documento
/// base más `jobId`, `attempt` y `outputPath`. Los vídeos usan
/// `<videoId>-<attempt>` como ruta de salida; las transcripciones, su slug.
pub fn trigger_payload(base: &Value, job_id: Uuid, attempt: u32) -> Result<Value, DomainError> {
  let mut doc = base.clone();
  let fields = doc.as_object_mut()
                  .ok_or_else(|| DomainError::SerializationError("el payload base debe ser un objeto".to_string()))?;
  let output_path = match (fields.get("videoId").and_then(Value::as_str), fields.get("slug").and_then(Value::as_str)) {
    (Some(video_id), _) => format!("{}-{}", video_id, attempt),
    (None, Some(slug)) => slug.to_string(),
    (None, None) => job_id.to_string(),
  };
  fields.insert("jobId".to_string(), json!(job_id));
  fields.insert("attempt".to_string(), json!(attempt));
  fields.insert("outputPath".to_string(), json!(output_path));
  Ok(doc)
}
