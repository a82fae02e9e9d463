// Archivo: aggregate.rs
// Propósito: agregador puro de disponibilidad de artefactos. Traduce el
// conjunto de banderas `ready` de un trabajo al estado agregado siguiente.
use crate::domain::JobStatus;

/// Resumen de disponibilidad de un conjunto de artefactos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadinessSummary {
    /// Todas las banderas están en `true` (y el conjunto no está vacío).
    pub all_ready: bool,
    /// Al menos una bandera está en `true`.
    pub any_ready: bool,
}

/// Calcula el resumen de disponibilidad. No depende del orden de las
/// banderas: sólo de cuántas son verdaderas respecto del total.
pub fn aggregate<I>(flags: I) -> ReadinessSummary
    where I: IntoIterator<Item = bool>
{
    let mut total = 0usize;
    let mut ready = 0usize;
    for flag in flags {
        total += 1;
        if flag {
            ready += 1;
        }
    }
    ReadinessSummary { all_ready: total > 0 && ready == total,
                       any_ready: ready > 0 }
}

/// Decide el estado siguiente de un trabajo a partir del resumen.
///
/// - estados terminales no cambian;
/// - todo listo → `Complete`;
/// - se aplicó algún evento → `Processing`;
/// - sin eventos el estado se conserva (`Pending` sigue `Pending`).
pub fn next_status(current: JobStatus, summary: ReadinessSummary, event_applied: bool) -> JobStatus {
    if current.is_terminal() {
        return current;
    }
    if summary.all_ready {
        JobStatus::Complete
    } else if event_applied {
        JobStatus::Processing
    } else {
        current
    }
}
