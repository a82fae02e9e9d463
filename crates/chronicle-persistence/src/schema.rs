// Esquema Diesel del registro de trabajos.
// Tablas: jobs, job_artifacts (una fila por trabajo y tipo de artefacto)
use diesel::allow_tables_to_appear_in_same_query;
diesel::table! {
    jobs (id) {
        id -> Text,
        name -> Text,
        status -> Text,
        owner_ref -> Nullable<Text>,
        attempt -> Integer,
        payload -> Text,
        error_detail -> Nullable<Text>,
        submitted_at_ts -> BigInt,
        completed_at_ts -> Nullable<BigInt>,
        version -> BigInt,
    }
}
diesel::table! {
    job_artifacts (job_id, kind) {
        job_id -> Text,
        position -> Integer,
        kind -> Text,
        state -> Text,
        location -> Nullable<Text>,
        error -> Nullable<Text>,
        generated_at_ts -> Nullable<BigInt>,
    }
}
allow_tables_to_appear_in_same_query!(jobs, job_artifacts);
