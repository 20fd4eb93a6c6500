//! Handwritten Diesel schema declarations matching `migrations/`.

diesel::table! {
    pending_event_links (flight_number, flight_date, sheet_row) {
        flight_number -> Text,
        flight_date -> Date,
        event_id -> Text,
        sheet_row -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    sync_runs (id) {
        id -> Int8,
        started_at -> Timestamptz,
        finished_at -> Timestamptz,
        created -> Int4,
        updated -> Int4,
        skipped -> Int4,
        failed -> Int4,
        outcomes -> Jsonb,
    }
}

diesel::allow_tables_to_appear_in_same_query!(pending_event_links, sync_runs);
