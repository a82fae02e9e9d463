use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use chronicle_domain::SubmissionRequest;
use chronicle_persistence::FsArtifactStore;
use chronicle_workflow::stubs::{LoggingDispatcher, LoggingTrigger};
use chronicle_workflow::{CallbackEvent, CallbackHandler, JobLifecycleManager, WorkflowConfig};
use jobs::{JobFilter, JobRepository};
use uuid::Uuid;

/// Pequeño menú interactivo para operar trabajos sobre el repositorio de
/// `chronicle-persistence`.
///
/// Opciones soportadas:
/// 1) Ver trabajos
/// 2) Enviar transcripción
/// 3) Enviar vídeo
/// 4) Aplicar callback de artefacto
/// 5) Cancelar trabajo
/// 6) Reintentar trabajo
/// 7) Eliminar trabajo (y sus ficheros)
/// 8) Estadísticas y actividad
/// 9) Salir
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Inicializar repo (aplica migraciones embebidas si procede)
    let config = WorkflowConfig::from_env()?;
    let repo: Arc<dyn JobRepository> = Arc::new(chronicle_persistence::new_from_env()?);
    let files = Arc::new(FsArtifactStore::new(config.outputs_dir.clone()));
    let manager = JobLifecycleManager::new(repo.clone(), Arc::new(LoggingTrigger), files, config);
    let callbacks = CallbackHandler::new(repo.clone(), Arc::new(LoggingDispatcher));
    log::info!("main-core listo; artefactos: {:?}; salidas en {}",
               manager.config().artifact_kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
               manager.config().outputs_dir.display());

    loop {
        println!("\n== Chronicle CLI menu ==");
        println!("1) Ver trabajos");
        println!("2) Enviar transcripción");
        println!("3) Enviar vídeo");
        println!("4) Aplicar callback de artefacto");
        println!("5) Cancelar trabajo");
        println!("6) Reintentar trabajo");
        println!("7) Eliminar trabajo");
        println!("8) Estadísticas y actividad");
        println!("9) Salir");
        print!("Elige una opción: ");
        io::stdout().flush().ok();

        let mut choice = String::new();
        io::stdin().read_line(&mut choice)?;
        match choice.trim() {
            "1" => {
                let owner = prompt("Filtrar por owner (enter para todos): ")?;
                let filter = JobFilter { owner_ref: non_empty(&owner),
                                         statuses: Vec::new() };
                match manager.list(&filter).await {
                    Ok(jobs) => {
                        println!("\nID                                   | ESTADO     | LISTOS | NOMBRE");
                        println!("-----------------------------------------------------------------------------------");
                        for j in jobs {
                            let summary = j.readiness();
                            let ready = summary.values().filter(|r| **r).count();
                            println!("{} | {:<10} | {}/{}    | {}", j.id, j.status, ready, summary.len(), j.name);
                        }
                    }
                    Err(e) => eprintln!("Error listando trabajos: {}", e),
                }
            }
            "2" => {
                let speaker = prompt("Orador: ")?;
                let date = prompt("Fecha (YYYY-MM-DD): ")?;
                let path = prompt("Ruta de la transcripción: ")?;
                let owner = prompt("Owner (enter para vacío): ")?;
                let mut request = SubmissionRequest::transcript(speaker.trim(), date.trim(), path.trim());
                request.owner_ref = non_empty(&owner);
                match manager.submit(&request).await {
                    Ok(job) => println!("Trabajo {} en estado {}", job.id, job.status),
                    Err(e) => eprintln!("Error enviando transcripción: {}", e),
                }
            }
            "3" => {
                let url = prompt("URL del vídeo: ")?;
                let email = prompt("Correo de aviso: ")?;
                let request = SubmissionRequest::media(url.trim(), email.trim());
                match manager.submit(&request).await {
                    Ok(job) => println!("Trabajo {} en estado {}", job.id, job.status),
                    Err(e) => eprintln!("Error enviando vídeo: {}", e),
                }
            }
            "4" => {
                let id = match prompt_id("Job id (UUID): ")? {
                    Some(id) => id,
                    None => continue,
                };
                let kind = prompt("Tipo de artefacto: ")?;
                let ready = prompt("¿Listo? (s/n): ")?;
                let event = if ready.trim().eq_ignore_ascii_case("s") {
                    let location = prompt("Ubicación: ")?;
                    CallbackEvent::ready(id, kind.trim(), location.trim())
                } else {
                    let error = prompt("Error: ")?;
                    CallbackEvent::failed(id, kind.trim(), error.trim())
                };
                match callbacks.apply_callback(&event).await {
                    Ok(t) => println!("Trabajo {}: {} -> {}", id, t.before.status, t.after.status),
                    Err(e) => eprintln!("Error aplicando callback: {}", e),
                }
            }
            "5" => {
                let id = match prompt_id("Job id a cancelar (UUID): ")? {
                    Some(id) => id,
                    None => continue,
                };
                match manager.cancel(&id).await {
                    Ok(job) => println!("Trabajo {} en estado {}", job.id, job.status),
                    Err(e) => eprintln!("Error cancelando: {}", e),
                }
            }
            "6" => {
                let id = match prompt_id("Job id a reintentar (UUID): ")? {
                    Some(id) => id,
                    None => continue,
                };
                match manager.retry(&id).await {
                    Ok(job) => println!("Trabajo {} en estado {} (intento {})", job.id, job.status, job.attempt),
                    Err(e) => eprintln!("Error reintentando: {}", e),
                }
            }
            "7" => {
                let id = match prompt_id("Job id a eliminar (UUID): ")? {
                    Some(id) => id,
                    None => continue,
                };
                let confirm = prompt(&format!("Confirma borrado de {}? escribir 'yes' para confirmar: ", id))?;
                if confirm.trim().to_lowercase() == "yes" {
                    match manager.delete(&id).await {
                        Ok(job) => println!("Trabajo eliminado: {} ({})", job.id, job.name),
                        Err(e) => eprintln!("Error eliminando trabajo: {}", e),
                    }
                } else {
                    println!("Borrado cancelado");
                }
            }
            "8" => {
                match manager.stats(chrono::Utc::now().date_naive()).await {
                    Ok(s) => println!("En proceso: {} | Completados hoy: {}", s.processing_count, s.completed_today),
                    Err(e) => eprintln!("Error calculando estadísticas: {}", e),
                }
                match manager.activity(20).await {
                    Ok(feed) => {
                        for entry in feed {
                            println!("{} | {:?} | {}", entry.timestamp.to_rfc3339(), entry.kind, entry.name);
                        }
                    }
                    Err(e) => eprintln!("Error leyendo actividad: {}", e),
                }
            }
            "9" => {
                println!("Saliendo...");
                break;
            }
            other => {
                println!("Opción inválida: {}", other);
            }
        }
    }

    Ok(())
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}

fn prompt_id(msg: &str) -> io::Result<Option<Uuid>> {
    let raw = prompt(msg)?;
    match Uuid::parse_str(raw.trim()) {
        Ok(u) => Ok(Some(u)),
        Err(_) => {
            eprintln!("UUID inválido");
            Ok(None)
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() { None } else { Some(t.to_string()) }
}
