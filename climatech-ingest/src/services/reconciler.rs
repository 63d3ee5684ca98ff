//! Observation reconciler
//!
//! Merges extracted pixels into `harmonized_landsat_sentinel_data`. A pixel
//! belongs to an existing record when both share place and capture date and
//! lie within the tolerance (1 m) of each other; otherwise it starts a new
//! record. Candidates are found through the tolerance grid and confirmed by
//! haversine distance. Each call writes in a single transaction, and new
//! records go through `ON CONFLICT (place_id, capture_date, cell_row,
//! cell_col) DO UPDATE` so concurrent writers cannot duplicate a cell.

use chrono::NaiveDate;
use climatech_common::geometry::{CellKey, ToleranceGrid};
use climatech_common::time::format_capture_date;
use climatech_common::{Error, Result};
use serde_json::{Map, Value};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashMap};

use crate::models::{Band, BandTarget, ExtractedPoint};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Counts from one reconcile call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Records created
    pub inserted: usize,
    /// Existing records whose fields were set
    pub updated: usize,
    /// Points folded into a record another point of the same batch already hit
    pub merged: usize,
}

impl ReconcileStats {
    pub fn absorb(&mut self, other: ReconcileStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.merged += other.merged;
    }
}

/// Pending write for one record
#[derive(Debug, Clone)]
struct Slot {
    id: Option<i64>,
    longitude: f64,
    latitude: f64,
    cell: CellKey,
    values: Vec<(Band, f64)>,
}

impl Slot {
    /// Last write wins per band
    fn set(&mut self, band: Band, value: f64) {
        match self.values.iter_mut().find(|(b, _)| *b == band) {
            Some(entry) => entry.1 = value,
            None => self.values.push((band, value)),
        }
    }
}

/// Records of one (place, date), indexed by tolerance cell
#[derive(Debug)]
struct CellIndex {
    grid: ToleranceGrid,
    slots: Vec<Slot>,
    by_cell: HashMap<CellKey, Vec<usize>>,
}

impl CellIndex {
    fn new(grid: ToleranceGrid) -> Self {
        Self {
            grid,
            slots: Vec::new(),
            by_cell: HashMap::new(),
        }
    }

    fn push(&mut self, slot: Slot) -> usize {
        let index = self.slots.len();
        self.by_cell.entry(slot.cell).or_default().push(index);
        self.slots.push(slot);
        index
    }

    /// Nearest slot within tolerance of (lon, lat)
    fn find_match(&self, longitude: f64, latitude: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for cell in self.grid.candidate_cells(longitude, latitude) {
            let Some(indices) = self.by_cell.get(&cell) else {
                continue;
            };
            for &index in indices {
                let slot = &self.slots[index];
                let distance = climatech_common::geometry::haversine_m(
                    (longitude, latitude),
                    (slot.longitude, slot.latitude),
                );
                if distance <= self.grid.tolerance_m()
                    && best.map_or(true, |(_, d)| distance < d)
                {
                    best = Some((index, distance));
                }
            }
        }
        best.map(|(index, _)| index)
    }

    /// Route a point to its slot, creating one when nothing is in range
    ///
    /// Returns `true` when the point landed on a slot that already had values
    /// from this batch.
    fn assign(&mut self, point: &ExtractedPoint) -> bool {
        let cell = self.grid.cell_for(point.longitude, point.latitude);
        let target = self.find_match(point.longitude, point.latitude).or_else(|| {
            // Same cell implies within tolerance; keeps the UNIQUE key intact
            self.by_cell.get(&cell).and_then(|indices| indices.first().copied())
        });

        match target {
            Some(index) => {
                let slot = &mut self.slots[index];
                let already_touched = !slot.values.is_empty();
                slot.set(point.band, point.value);
                already_touched
            }
            None => {
                let mut slot = Slot {
                    id: None,
                    longitude: point.longitude,
                    latitude: point.latitude,
                    cell,
                    values: Vec::new(),
                };
                slot.set(point.band, point.value);
                self.push(slot);
                false
            }
        }
    }
}

/// Reconcile one point; equivalent to a one-element [`reconcile_points`]
pub async fn reconcile_point(
    pool: &SqlitePool,
    place_id: i64,
    point: &ExtractedPoint,
    grid: &ToleranceGrid,
) -> Result<ReconcileStats> {
    reconcile_points(pool, place_id, std::slice::from_ref(point), grid).await
}

/// Merge a batch of points (typically one raster file) into the store
pub async fn reconcile_points(
    pool: &SqlitePool,
    place_id: i64,
    points: &[ExtractedPoint],
    grid: &ToleranceGrid,
) -> Result<ReconcileStats> {
    if points.is_empty() {
        return Ok(ReconcileStats::default());
    }

    let mut by_date: BTreeMap<NaiveDate, Vec<&ExtractedPoint>> = BTreeMap::new();
    for point in points {
        by_date.entry(point.capture_date).or_default().push(point);
    }
    let by_date = &by_date;
    let grid = *grid;

    let stats = retry_on_lock("reconcile_points", DEFAULT_MAX_LOCK_WAIT_MS, move || async move {
        let mut tx = pool.begin().await?;
        let mut stats = ReconcileStats::default();

        for (date, date_points) in by_date {
            let date_text = format_capture_date(*date);
            let mut index = load_index(&mut tx, place_id, &date_text, grid).await?;

            for point in date_points {
                if index.assign(point) {
                    stats.merged += 1;
                }
            }

            for slot in index.slots.iter().filter(|s| !s.values.is_empty()) {
                match slot.id {
                    Some(id) => {
                        update_record(&mut tx, id, &slot.values).await?;
                        stats.updated += 1;
                    }
                    None => {
                        insert_record(&mut tx, place_id, &date_text, slot).await?;
                        stats.inserted += 1;
                    }
                }
            }
        }

        tx.commit().await?;
        Ok::<_, Error>(stats)
    })
    .await?;

    tracing::debug!(
        place_id,
        points = points.len(),
        inserted = stats.inserted,
        updated = stats.updated,
        merged = stats.merged,
        "Points reconciled"
    );
    Ok(stats)
}

async fn load_index(
    conn: &mut SqliteConnection,
    place_id: i64,
    date_text: &str,
    grid: ToleranceGrid,
) -> Result<CellIndex> {
    let rows = sqlx::query(
        r#"
        SELECT id, longitude, latitude, cell_row, cell_col
        FROM harmonized_landsat_sentinel_data
        WHERE place_id = ? AND capture_date = ?
        "#,
    )
    .bind(place_id)
    .bind(date_text)
    .fetch_all(&mut *conn)
    .await?;

    let mut index = CellIndex::new(grid);
    for row in rows {
        index.push(Slot {
            id: Some(row.get("id")),
            longitude: row.get("longitude"),
            latitude: row.get("latitude"),
            cell: CellKey {
                row: row.get("cell_row"),
                col: row.get("cell_col"),
            },
            values: Vec::new(),
        });
    }
    Ok(index)
}

/// Split values into (column, value) pairs and an `additional_data` patch
fn split_values(values: &[(Band, f64)]) -> Result<(Vec<(&'static str, f64)>, Option<String>)> {
    let mut columns = Vec::new();
    let mut additional = Map::new();

    for (band, value) in values {
        match band.target() {
            BandTarget::Column(column) => columns.push((column, *value)),
            BandTarget::Additional(key) => {
                let number = serde_json::Number::from_f64(*value).ok_or_else(|| {
                    Error::InvalidInput(format!("Non-finite value for {}", band))
                })?;
                additional.insert(key.to_string(), Value::Number(number));
            }
        }
    }

    let patch = if additional.is_empty() {
        None
    } else {
        Some(Value::Object(additional).to_string())
    };
    Ok((columns, patch))
}

async fn update_record(conn: &mut SqliteConnection, id: i64, values: &[(Band, f64)]) -> Result<()> {
    let (columns, patch) = split_values(values)?;

    // Column names come from the fixed band table, never from input
    let mut sets: Vec<String> = columns.iter().map(|(c, _)| format!("{} = ?", c)).collect();
    if patch.is_some() {
        sets.push("additional_data = json_patch(additional_data, ?)".to_string());
    }
    let sql = format!(
        "UPDATE harmonized_landsat_sentinel_data SET {} WHERE id = ?",
        sets.join(", ")
    );

    let mut query = sqlx::query(&sql);
    for (_, value) in &columns {
        query = query.bind(*value);
    }
    if let Some(patch) = &patch {
        query = query.bind(patch);
    }
    query.bind(id).execute(&mut *conn).await?;
    Ok(())
}

async fn insert_record(
    conn: &mut SqliteConnection,
    place_id: i64,
    date_text: &str,
    slot: &Slot,
) -> Result<()> {
    let (columns, patch) = split_values(&slot.values)?;

    let mut names = vec![
        "place_id",
        "capture_date",
        "longitude",
        "latitude",
        "cell_row",
        "cell_col",
    ];
    names.extend(columns.iter().map(|(c, _)| *c));
    if patch.is_some() {
        names.push("additional_data");
    }

    let mut updates: Vec<String> = columns
        .iter()
        .map(|(c, _)| format!("{c} = excluded.{c}"))
        .collect();
    if patch.is_some() {
        updates.push(
            "additional_data = json_patch(harmonized_landsat_sentinel_data.additional_data, excluded.additional_data)"
                .to_string(),
        );
    }

    let placeholders = vec!["?"; names.len()].join(", ");
    let conflict = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    let sql = format!(
        "INSERT INTO harmonized_landsat_sentinel_data ({}) VALUES ({}) \
         ON CONFLICT (place_id, capture_date, cell_row, cell_col) {}",
        names.join(", "),
        placeholders,
        conflict
    );

    let mut query = sqlx::query(&sql)
        .bind(place_id)
        .bind(date_text)
        .bind(slot.longitude)
        .bind(slot.latitude)
        .bind(slot.cell.row)
        .bind(slot.cell.col);
    for (_, value) in &columns {
        query = query.bind(*value);
    }
    if let Some(patch) = &patch {
        query = query.bind(patch);
    }
    query.execute(&mut *conn).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(band: Band, lon: f64, lat: f64, value: f64) -> ExtractedPoint {
        ExtractedPoint {
            band,
            capture_date: NaiveDate::from_ymd_opt(2023, 6, 2).unwrap(),
            latitude: lat,
            longitude: lon,
            value,
        }
    }

    #[test]
    fn test_index_merges_close_points_and_splits_far_ones() {
        let mut index = CellIndex::new(ToleranceGrid::default());
        let lat: f64 = -31.45;
        let metre_lon = 1.0 / (111_320.0 * lat.to_radians().cos());

        assert!(!index.assign(&point(Band::B04, -64.45, lat, 0.1)));
        // 0.4 m away: same record, touched twice in this batch
        assert!(index.assign(&point(Band::B05, -64.45 + 0.4 * metre_lon, lat, 0.2)));
        // 30 m away: new record
        assert!(!index.assign(&point(Band::B04, -64.45 + 30.0 * metre_lon, lat, 0.3)));

        assert_eq!(index.slots.len(), 2);
        assert_eq!(index.slots[0].values, vec![(Band::B04, 0.1), (Band::B05, 0.2)]);
    }

    #[test]
    fn test_slot_last_write_wins() {
        let mut index = CellIndex::new(ToleranceGrid::default());
        index.assign(&point(Band::B04, 10.0, 10.0, 0.1));
        index.assign(&point(Band::B04, 10.0, 10.0, 0.7));
        assert_eq!(index.slots.len(), 1);
        assert_eq!(index.slots[0].values, vec![(Band::B04, 0.7)]);
    }

    #[test]
    fn test_split_values_routes_ancillary_bands() {
        let (columns, patch) = split_values(&[(Band::B04, 0.2), (Band::Fmask, 64.0)]).unwrap();
        assert_eq!(columns, vec![("b04_red", 0.2)]);
        let patch: Value = serde_json::from_str(&patch.unwrap()).unwrap();
        assert_eq!(patch["fmask_quality_bits"], 64.0);
    }
}
