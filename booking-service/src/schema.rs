diesel::table! {
    reservations (id) {
        id -> Uuid,
        room_id -> Int8,
        room_slug -> Varchar,
        room_name -> Varchar,
        room_price -> Numeric,
        check_in_date -> Date,
        check_out_date -> Date,
        duration -> Int4,
        adults -> Int4,
        children -> Int4,
        base_price -> Numeric,
        service_fee -> Numeric,
        tourism_tax_per_night -> Numeric,
        tourism_tax -> Numeric,
        total_price -> Numeric,
        customer_name -> Varchar,
        customer_email -> Varchar,
        customer_phone -> Varchar,
        customer_address -> Nullable<Varchar>,
        customer_city -> Nullable<Varchar>,
        customer_postal_code -> Nullable<Varchar>,
        special_request -> Nullable<Text>,
        invoice_id -> Nullable<Varchar>,
        invoice_url -> Nullable<Text>,
        status -> Varchar,
        paid_at -> Nullable<Timestamptz>,
        payment_method -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    outbox_events (id) {
        id -> Uuid,
        aggregate_id -> Uuid,
        event_type -> Varchar,
        event_data -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    reservations,
    outbox_events,
);
