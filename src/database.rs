use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

pub use crate::error::DatabaseError;
use crate::models::{Activity, GeoSample, StoredActivity};

/// Persistence sink for finalized activities
pub trait ActivityStore {
    /// Store an activity and return its new id
    fn save_activity(&mut self, activity: &Activity) -> Result<String, DatabaseError>;

    /// Stored activities, most recent start first
    fn list_activities(&self, limit: Option<usize>) -> Result<Vec<StoredActivity>, DatabaseError>;

    fn get_activity(&self, id: &str) -> Result<Option<StoredActivity>, DatabaseError>;
}

/// Gzip-compressed, bincode-encoded track path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedPath {
    pub compressed_data: Vec<u8>,
    pub original_size: usize,
    pub point_count: usize,
}

impl CompressedPath {
    pub fn compress(path: &[GeoSample]) -> Result<Self, DatabaseError> {
        let serialized =
            bincode::serialize(path).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let original_size = serialized.len();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serialized)?;
        let compressed_data = encoder.finish()?;

        Ok(Self {
            compressed_data,
            original_size,
            point_count: path.len(),
        })
    }

    pub fn decompress(compressed_data: &[u8]) -> Result<Vec<GeoSample>, DatabaseError> {
        let mut decoder = GzDecoder::new(compressed_data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;

        bincode::deserialize(&decompressed).map_err(|e| DatabaseError::Serialization(e.to_string()))
    }

    /// Original size / compressed size
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed_data.is_empty() {
            return 0.0;
        }
        self.original_size as f64 / self.compressed_data.len() as f64
    }
}

/// SQLite-backed activity store
pub struct Database {
    conn: Connection,
}

const ACTIVITY_COLUMNS: &str = r#"
    id, start_time, end_time, duration_ms, distance_meters, calories_kcal, pace_string,
    heart_rate_samples, average_heart_rate_bpm, elevation_gain_meters, path_data
"#;

impl Database {
    /// Create or open a database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn.execute_batch(
            r#"
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS activities (
                id TEXT PRIMARY KEY,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                distance_meters REAL NOT NULL,
                calories_kcal INTEGER NOT NULL,
                pace_string TEXT NOT NULL,
                heart_rate_samples TEXT NOT NULL,
                average_heart_rate_bpm INTEGER NOT NULL,
                elevation_gain_meters REAL NOT NULL,

                -- Compressed track
                path_data BLOB NOT NULL,
                path_points INTEGER NOT NULL,
                path_original_size INTEGER NOT NULL,

                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_activities_start_time ON activities (start_time);
            "#,
        )?;
        Ok(())
    }

    fn activity_from_row(row: &Row) -> rusqlite::Result<(String, Activity, Vec<u8>, String)> {
        let activity = Activity {
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            duration_ms: row.get("duration_ms")?,
            distance_meters: row.get("distance_meters")?,
            calories_kcal: row.get("calories_kcal")?,
            pace_string: row.get("pace_string")?,
            path: Vec::new(),
            heart_rate_samples: Vec::new(),
            average_heart_rate_bpm: row.get("average_heart_rate_bpm")?,
            elevation_gain_meters: row.get("elevation_gain_meters")?,
        };
        Ok((
            row.get("id")?,
            activity,
            row.get("path_data")?,
            row.get("heart_rate_samples")?,
        ))
    }

    /// Decode the blob and JSON columns into a full activity
    fn hydrate(
        (id, mut activity, path_data, heart_rates): (String, Activity, Vec<u8>, String),
    ) -> Result<StoredActivity, DatabaseError> {
        activity.path = CompressedPath::decompress(&path_data)?;
        activity.heart_rate_samples = serde_json::from_str(&heart_rates)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        Ok(StoredActivity { id, activity })
    }

    /// Remove an activity, returns whether it existed
    pub fn delete_activity(&mut self, id: &str) -> Result<bool, DatabaseError> {
        let removed = self
            .conn
            .execute("DELETE FROM activities WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats, DatabaseError> {
        let stats = self.conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(distance_meters), 0.0),
                COALESCE(SUM(duration_ms), 0),
                COALESCE(SUM(path_original_size), 0),
                COALESCE(SUM(LENGTH(path_data)), 0)
            FROM activities
            "#,
            [],
            |row| {
                Ok(DatabaseStats {
                    activity_count: row.get::<_, i64>(0)? as usize,
                    total_distance_meters: row.get(1)?,
                    total_duration_ms: row.get(2)?,
                    total_original_size: row.get::<_, i64>(3)? as usize,
                    total_compressed_size: row.get::<_, i64>(4)? as usize,
                })
            },
        )?;
        Ok(stats)
    }
}

impl ActivityStore for Database {
    fn save_activity(&mut self, activity: &Activity) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let compressed = CompressedPath::compress(&activity.path)?;
        let heart_rates = serde_json::to_string(&activity.heart_rate_samples)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO activities (
                id, start_time, end_time, duration_ms, distance_meters, calories_kcal,
                pace_string, heart_rate_samples, average_heart_rate_bpm, elevation_gain_meters,
                path_data, path_points, path_original_size
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                id,
                activity.start_time,
                activity.end_time,
                activity.duration_ms,
                activity.distance_meters,
                activity.calories_kcal,
                activity.pace_string,
                heart_rates,
                activity.average_heart_rate_bpm,
                activity.elevation_gain_meters,
                compressed.compressed_data,
                compressed.point_count as i64,
                compressed.original_size as i64,
            ],
        )?;
        tx.commit()?;

        info!(
            id = %id,
            points = compressed.point_count,
            ratio = compressed.compression_ratio(),
            "Activity saved"
        );
        Ok(id)
    }

    fn list_activities(&self, limit: Option<usize>) -> Result<Vec<StoredActivity>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM activities ORDER BY start_time DESC LIMIT ?1",
            ACTIVITY_COLUMNS
        );
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params![limit], Self::activity_from_row)?;

        let mut activities = Vec::new();
        for row in rows {
            activities.push(Self::hydrate(row?)?);
        }
        debug!(count = activities.len(), "Loaded activity history");
        Ok(activities)
    }

    fn get_activity(&self, id: &str) -> Result<Option<StoredActivity>, DatabaseError> {
        let query = format!("SELECT {} FROM activities WHERE id = ?1", ACTIVITY_COLUMNS);
        let row = self
            .conn
            .query_row(&query, params![id], Self::activity_from_row)
            .optional()?;
        row.map(Self::hydrate).transpose()
    }
}

/// Volatile store keeping activities in memory.
///
/// Can be switched offline to model a backend that refuses writes.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    activities: Vec<StoredActivity>,
    offline: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

impl ActivityStore for InMemoryStore {
    fn save_activity(&mut self, activity: &Activity) -> Result<String, DatabaseError> {
        if self.offline {
            return Err(DatabaseError::Unavailable {
                reason: "store is offline".to_string(),
            });
        }
        let id = Uuid::new_v4().to_string();
        self.activities.push(StoredActivity {
            id: id.clone(),
            activity: activity.clone(),
        });
        Ok(id)
    }

    fn list_activities(&self, limit: Option<usize>) -> Result<Vec<StoredActivity>, DatabaseError> {
        let mut activities = self.activities.clone();
        activities.sort_by(|a, b| b.activity.start_time.cmp(&a.activity.start_time));
        if let Some(limit) = limit {
            activities.truncate(limit);
        }
        Ok(activities)
    }

    fn get_activity(&self, id: &str) -> Result<Option<StoredActivity>, DatabaseError> {
        Ok(self.activities.iter().find(|a| a.id == id).cloned())
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseStats {
    pub activity_count: usize,
    pub total_distance_meters: f64,
    pub total_duration_ms: i64,
    pub total_original_size: usize,
    pub total_compressed_size: usize,
}
