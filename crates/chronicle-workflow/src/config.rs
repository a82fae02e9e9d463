use crate::errors::{Result, WorkflowError};
use jobs::ArtifactKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

pub const ENV_ARTIFACT_KINDS: &str = "CHRONICLE_ARTIFACT_KINDS";
pub const ENV_OUTPUTS_DIR: &str = "CHRONICLE_OUTPUTS_DIR";

/// Configuracion del coordinador.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Conjunto de artefactos con el que se crea cada trabajo.
    pub artifact_kinds: Vec<ArtifactKind>,
    /// Raiz de los ficheros generados.
    pub outputs_dir: PathBuf,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        WorkflowConfig { artifact_kinds: ArtifactKind::defaults(),
                         outputs_dir: PathBuf::from("./outputs") }
    }
}

impl WorkflowConfig {
    /// Carga `.env` (si existe) y lee la configuracion del entorno.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
        where F: Fn(&str) -> Option<String>
    {
        let mut config = WorkflowConfig::default();
        if let Some(raw) = lookup(ENV_ARTIFACT_KINDS) {
            config.artifact_kinds = raw.split(',')
                                       .map(str::trim)
                                       .filter(|s| !s.is_empty())
                                       .map(ArtifactKind::new)
                                       .collect();
        }
        if let Some(dir) = lookup(ENV_OUTPUTS_DIR).filter(|d| !d.trim().is_empty()) {
            config.outputs_dir = PathBuf::from(dir.trim());
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.artifact_kinds.is_empty() {
            return Err(WorkflowError::Config(format!("{} no define ningun artefacto", ENV_ARTIFACT_KINDS)));
        }
        let mut seen = HashSet::new();
        for kind in &self.artifact_kinds {
            if !seen.insert(kind.as_str()) {
                return Err(WorkflowError::Config(format!("artefacto duplicado: {}", kind)));
            }
        }
        Ok(())
    }
}
