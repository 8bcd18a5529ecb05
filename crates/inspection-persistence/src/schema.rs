// Esquema Diesel compartido por SQLite y Postgres.
// Tablas: workspaces, activity_log. Los timestamps son microsegundos epoch.
use diesel::allow_tables_to_appear_in_same_query;
diesel::table! {
    workspaces (id) {
        id -> Text,
        module_states -> Text,
        version -> BigInt,
        updated_by -> Nullable<Text>,
        updated_at_ts -> Nullable<BigInt>,
        created_at_ts -> BigInt,
    }
}
diesel::table! {
    activity_log (id) {
        id -> Text,
        workspace_id -> Text,
        activity_type -> Text,
        performed_by -> Text,
        module -> Text,
        metadata -> Text,
        recorded_at_ts -> BigInt,
    }
}
diesel::joinable!(activity_log -> workspaces (workspace_id));
allow_tables_to_appear_in_same_query!(workspaces, activity_log);
