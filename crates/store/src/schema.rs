//! DDL and statement text for the distances table.
//!
//! Every identifier comes from a [`TableLayout`] that has passed
//! [`TableLayout::validate`], which restricts names to plain or
//! schema-qualified SQL identifiers. That is what makes the `format!` calls
//! below safe.

use proximity_core::config::TableLayout;

/// `CREATE TABLE` plus indexes for the output table.
///
/// Re-running the script is harmless.
pub fn create_table_sql(layout: &TableLayout) -> String {
    let table = &layout.distances;
    let base = layout.distances_base_name();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    id BIGSERIAL PRIMARY KEY,
    origin_id BIGINT NOT NULL REFERENCES {origins} ({origin_id}) ON DELETE CASCADE,
    target_id BIGINT NOT NULL REFERENCES {targets} ({target_id}) ON DELETE CASCADE,
    distance_meters DOUBLE PRECISION NOT NULL CHECK (distance_meters > 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT uq_{base}_pair UNIQUE (origin_id, target_id)
);
CREATE INDEX IF NOT EXISTS idx_{base}_origin ON {table} (origin_id);
CREATE INDEX IF NOT EXISTS idx_{base}_target ON {table} (target_id);
",
        origins = layout.origins,
        origin_id = layout.origin_id,
        targets = layout.targets,
        target_id = layout.target_id,
    )
}

/// Every recorded pair.
pub(crate) fn processed_pairs_sql(layout: &TableLayout) -> String {
    format!("SELECT origin_id, target_id FROM {}", layout.distances)
}

/// Points with non-null, in-range coordinates.
///
/// `BETWEEN` also drops `NaN`, which PostgreSQL sorts above every number.
pub(crate) fn select_points_sql(table: &str, id: &str, latitude: &str, longitude: &str) -> String {
    format!(
        "SELECT {id}::BIGINT, {latitude}::DOUBLE PRECISION, {longitude}::DOUBLE PRECISION \
         FROM {table} \
         WHERE {latitude} IS NOT NULL AND {longitude} IS NOT NULL \
         AND {latitude} BETWEEN -90 AND 90 \
         AND {longitude} BETWEEN -180 AND 180 \
         ORDER BY {id}"
    )
}

/// Which of `$1` exist in `table`.
pub(crate) fn existing_ids_sql(table: &str, id: &str) -> String {
    format!("SELECT {id}::BIGINT FROM {table} WHERE {id} = ANY($1::BIGINT[])")
}

/// Array insert that leaves existing pairs untouched.
pub(crate) fn insert_batch_sql(layout: &TableLayout) -> String {
    format!(
        "INSERT INTO {} (origin_id, target_id, distance_meters, created_at) \
         SELECT o, t, d, NOW() \
         FROM UNNEST($1::BIGINT[], $2::BIGINT[], $3::DOUBLE PRECISION[]) AS batch(o, t, d) \
         ON CONFLICT (origin_id, target_id) DO NOTHING",
        layout.distances
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_has_constraints() {
        let sql = create_table_sql(&TableLayout::default());

        assert!(sql.contains("CREATE TABLE IF NOT EXISTS realestate.location_distances"));
        assert!(sql.contains("REFERENCES realestate.property_locations (property_id) ON DELETE CASCADE"));
        assert!(sql.contains("REFERENCES realestate.addresses (id) ON DELETE CASCADE"));
        assert!(sql.contains("CHECK (distance_meters > 0)"));
        assert!(sql.contains("CONSTRAINT uq_location_distances_pair UNIQUE (origin_id, target_id)"));
        assert!(sql.contains("idx_location_distances_origin ON realestate.location_distances (origin_id)"));
        assert!(sql.contains("idx_location_distances_target ON realestate.location_distances (target_id)"));
    }

    #[test]
    fn test_create_table_follows_layout() {
        let layout = TableLayout {
            origins: "listings".into(),
            origin_id: "listing_id".into(),
            distances: "nearby".into(),
            ..Default::default()
        };
        let sql = create_table_sql(&layout);
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS nearby ("));
        assert!(sql.contains("REFERENCES listings (listing_id)"));
        assert!(sql.contains("uq_nearby_pair"));
    }

    #[test]
    fn test_select_points_filters_coordinates() {
        let sql = select_points_sql("realestate.addresses", "id", "latitude", "longitude");
        assert!(sql.starts_with("SELECT id::BIGINT, latitude::DOUBLE PRECISION, longitude::DOUBLE PRECISION"));
        assert!(sql.contains("latitude IS NOT NULL AND longitude IS NOT NULL"));
        assert!(sql.contains("latitude BETWEEN -90 AND 90"));
        assert!(sql.contains("longitude BETWEEN -180 AND 180"));
    }

    #[test]
    fn test_insert_is_first_write_wins() {
        let sql = insert_batch_sql(&TableLayout::default());
        assert!(sql.starts_with("INSERT INTO realestate.location_distances"));
        assert!(sql.contains("UNNEST($1::BIGINT[], $2::BIGINT[], $3::DOUBLE PRECISION[])"));
        assert!(sql.ends_with("ON CONFLICT (origin_id, target_id) DO NOTHING"));
    }

    #[test]
    fn test_existing_ids_uses_array_parameter() {
        let sql = existing_ids_sql("realestate.property_locations", "property_id");
        assert_eq!(
            sql,
            "SELECT property_id::BIGINT FROM realestate.property_locations WHERE property_id = ANY($1::BIGINT[])"
        );
    }

    #[test]
    fn test_processed_pairs_reads_output_table() {
        assert_eq!(
            processed_pairs_sql(&TableLayout::default()),
            "SELECT origin_id, target_id FROM realestate.location_distances"
        );
    }
}
