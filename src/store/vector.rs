//! Vector index on SQLite with the sqlite-vec extension.
//!
//! Vectors live in a `vec0` virtual table whose rowid is the chunk ordinal
//! plus one, so the chunk log order is the only link between a vector and
//! its chunk.
use std::path::Path;
use std::sync::Once;

use rusqlite::{Connection, Result, params};
use sqlite_vec::sqlite3_vec_init;
use tracing::debug;

static INIT_VEC: Once = Once::new();

/// Register sqlite-vec for every connection opened afterwards. Safe to call repeatedly.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

fn schema_sql(dimensions: usize) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(
    embedding FLOAT[{dimensions}]
);
"#
    )
}

/// Vector bytes in the layout vec0 expects (native f32).
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice(vec).to_vec()
}

/// One similarity-search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position in the chunk log.
    pub ordinal: usize,
    /// Cosine similarity; equals the inner product for unit vectors.
    pub score: f32,
}

pub struct VectorIndex {
    conn: Connection,
    dimensions: usize,
}

impl VectorIndex {
    /// Create a new index file at `path` for vectors of `dimensions` floats.
    pub fn create<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open(path.as_ref())?;
        Self::initialize(conn, dimensions)
    }

    /// Open an in-memory index (useful for testing).
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        init_sqlite_vec();
        Self::initialize(Connection::open_in_memory()?, dimensions)
    }

    fn initialize(conn: Connection, dimensions: usize) -> Result<Self> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        debug!("sqlite-vec version: {}", vec_version);

        conn.execute_batch(&schema_sql(dimensions))?;
        conn.execute(
            "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('dimensions', ?)",
            params![dimensions.to_string()],
        )?;

        Ok(Self { conn, dimensions })
    }

    /// Open an existing index, reading its dimensionality back.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open(path.as_ref())?;
        let raw: String = conn.query_row(
            "SELECT value FROM index_meta WHERE key = 'dimensions'",
            [],
            |row| row.get(0),
        )?;
        let dimensions = raw.parse::<usize>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Self { conn, dimensions })
    }

    /// Append vectors in order; the first gets ordinal `len()`.
    pub fn insert_all(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        let offset = self.len()?;
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT INTO vec_chunks(rowid, embedding) VALUES (?, ?)")?;
            for (i, vector) in vectors.iter().enumerate() {
                let rowid = (offset + i + 1) as i64;
                stmt.execute(params![rowid, serialize_vector(vector)])?;
            }
        }
        tx.commit()
    }

    /// The `k` nearest vectors by cosine similarity, best first.
    ///
    /// Returns fewer than `k` hits when the index holds fewer vectors. Equal
    /// scores keep ordinal order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT rowid, vec_distance_cosine(embedding, ?) AS distance
            FROM vec_chunks
            ORDER BY distance ASC, rowid ASC
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(params![serialize_vector(query), k as i64], |row| {
            let rowid: i64 = row.get(0)?;
            let distance: f64 = row.get(1)?;
            Ok(Neighbor {
                ordinal: (rowid - 1) as usize,
                score: (1.0 - distance) as f32,
            })
        })?;

        rows.collect()
    }

    pub fn len(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT count(*) FROM vec_chunks", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}
