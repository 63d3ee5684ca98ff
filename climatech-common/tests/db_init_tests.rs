//! Database initialization: first-run creation, reopen, schema shape

use climatech_common::db::init::{init_database, init_memory_database, SCHEMA_VERSION};
use sqlx::Row;
use tempfile::TempDir;

async fn table_names(pool: &sqlx::SqlitePool) -> Vec<String> {
    sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .fetch_all(pool)
        .await
        .unwrap()
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .collect()
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("sub").join("climatech.db");

    let pool = init_database(&db_path).await.unwrap();

    assert!(db_path.exists(), "Database file was not created");
    let tables = table_names(&pool).await;
    for expected in ["places", "harmonized_landsat_sentinel_data", "wildfire_data", "schema_version"] {
        assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_database_opens_existing_and_keeps_rows() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("climatech.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO places (name, polygon) VALUES ('field', '{}')")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM places")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version WHERE version = ?")
        .bind(SCHEMA_VERSION)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(versions, 1);
}

#[tokio::test]
async fn test_observation_key_is_unique_per_cell() {
    let pool = init_memory_database().await.unwrap();
    sqlx::query("INSERT INTO places (id, name, polygon) VALUES (1, 'field', '{}')")
        .execute(&pool)
        .await
        .unwrap();

    let insert = "INSERT INTO harmonized_landsat_sentinel_data \
                  (place_id, capture_date, longitude, latitude, cell_row, cell_col) \
                  VALUES (1, '2023-06-02', 0.0, 0.0, 5, 7)";
    sqlx::query(insert).execute(&pool).await.unwrap();
    let duplicate = sqlx::query(insert).execute(&pool).await;
    assert!(duplicate.is_err(), "same place/date/cell must be rejected");
}

#[tokio::test]
async fn test_deleting_place_cascades_to_observations() {
    let pool = init_memory_database().await.unwrap();
    sqlx::query("INSERT INTO places (id, name, polygon) VALUES (1, 'field', '{}')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO harmonized_landsat_sentinel_data \
         (place_id, capture_date, longitude, latitude, cell_row, cell_col) \
         VALUES (1, '2023-06-02', 0.0, 0.0, 0, 0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("DELETE FROM places WHERE id = 1")
        .execute(&pool)
        .await
        .unwrap();

    let remaining: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM harmonized_landsat_sentinel_data")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn test_additional_data_defaults_to_empty_object() {
    let pool = init_memory_database().await.unwrap();
    sqlx::query("INSERT INTO places (id, name, polygon) VALUES (1, 'field', '{}')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO harmonized_landsat_sentinel_data \
         (place_id, capture_date, longitude, latitude, cell_row, cell_col) \
         VALUES (1, '2023-06-02', 0.0, 0.0, 0, 0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let extra: String =
        sqlx::query_scalar("SELECT additional_data FROM harmonized_landsat_sentinel_data")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(extra, "{}");
}
