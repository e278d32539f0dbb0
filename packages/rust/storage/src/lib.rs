//! Turso Embedded / libSQL storage for context packs.
//!
//! [`PackStore`] is the interface the scan pipeline persists through;
//! [`Storage`] implements it on a local libSQL file. Each pack is stored as a
//! JSON document alongside a few indexed columns for listing.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contextpack_shared::{ContextPack, ContextPackError, Result};
use libsql::{Connection, Database, params};
use serde::Serialize;

/// Persistence interface for assembled packs.
#[async_trait]
pub trait PackStore: Send + Sync {
    /// Insert or replace a pack by its `id`.
    async fn save_context_pack(&self, pack: &ContextPack) -> Result<()>;

    /// Load a pack by ID, `None` if absent.
    async fn get_context_pack(&self, id: &str) -> Result<Option<ContextPack>>;

    /// Delete a pack by ID. Fails with [`ContextPackError::NotFound`] if absent.
    async fn delete_context_pack(&self, id: &str) -> Result<()>;
}

/// Store standing in for a database that could not be opened.
///
/// Every operation fails with [`ContextPackError::Storage`] carrying the
/// original open error, so scans still run and report the failed save.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl std::fmt::Display) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }

    fn error(&self) -> ContextPackError {
        ContextPackError::Storage(format!("pack store unavailable: {}", self.reason))
    }
}

#[async_trait]
impl PackStore for UnavailableStore {
    async fn save_context_pack(&self, _pack: &ContextPack) -> Result<()> {
        Err(self.error())
    }

    async fn get_context_pack(&self, _id: &str) -> Result<Option<ContextPack>> {
        Err(self.error())
    }

    async fn delete_context_pack(&self, _id: &str) -> Result<()> {
        Err(self.error())
    }
}

/// Listing row for a stored pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackSummary {
    pub id: String,
    pub company_name: String,
    pub company_url: String,
    pub version: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn storage_err(e: impl std::fmt::Display) -> ContextPackError {
    ContextPackError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ContextPackError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ContextPackError::NotFound(format!(
                "database {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ContextPackError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ContextPackError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// All stored packs, newest first.
    pub async fn list_context_packs(&self) -> Result<Vec<PackSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, company_name, company_url, version, created_at, updated_at
                 FROM context_packs ORDER BY created_at DESC, id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(PackSummary {
                id: row.get::<String>(0).map_err(storage_err)?,
                company_name: row.get::<String>(1).map_err(storage_err)?,
                company_url: row.get::<String>(2).map_err(storage_err)?,
                version: row.get::<String>(3).map_err(storage_err)?,
                created_at: row.get::<String>(4).map_err(storage_err)?,
                updated_at: row.get::<String>(5).map_err(storage_err)?,
            });
        }
        Ok(results)
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339()
}

#[async_trait]
impl PackStore for Storage {
    async fn save_context_pack(&self, pack: &ContextPack) -> Result<()> {
        self.check_writable()?;
        let pack_json = serde_json::to_string(pack)
            .map_err(|e| ContextPackError::Storage(format!("failed to serialize pack: {e}")))?;
        let created_at = timestamp(&pack.created_at);
        let updated_at = timestamp(&pack.updated_at);

        self.conn
            .execute(
                "INSERT INTO context_packs
                    (id, company_name, company_url, version, created_at, updated_at, pack_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    company_name = excluded.company_name,
                    company_url = excluded.company_url,
                    version = excluded.version,
                    updated_at = excluded.updated_at,
                    pack_json = excluded.pack_json",
                params![
                    pack.id.as_str(),
                    pack.company_name.as_str(),
                    pack.company_url.as_str(),
                    pack.version.as_str(),
                    created_at.as_str(),
                    updated_at.as_str(),
                    pack_json.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;

        tracing::debug!(pack_id = %pack.id, "pack saved");
        Ok(())
    }

    async fn get_context_pack(&self, id: &str) -> Result<Option<ContextPack>> {
        let mut rows = self
            .conn
            .query(
                "SELECT pack_json FROM context_packs WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };
        let json = row.get::<String>(0).map_err(storage_err)?;
        let pack = serde_json::from_str(&json).map_err(|e| {
            ContextPackError::Storage(format!("stored pack {id} is not valid JSON: {e}"))
        })?;
        Ok(Some(pack))
    }

    async fn delete_context_pack(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute("DELETE FROM context_packs WHERE id = ?1", params![id])
            .await
            .map_err(storage_err)?;

        if affected == 0 {
            return Err(ContextPackError::NotFound(format!("context pack {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use contextpack_shared::{
        BusinessModelSection, Citation, ConfidentField, DRAFT_VERSION, IcpSection, IcpSegment,
        ProductSection,
    };
    use uuid::Uuid;

    fn temp_db_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("cp_test_{}.db", Uuid::now_v7()))
    }

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        Storage::open(&temp_db_path()).await.expect("open test db")
    }

    fn sample_pack(id: &str, created_secs: i64) -> ContextPack {
        let at = Utc.timestamp_opt(created_secs, 0).single().unwrap();
        let cite = vec![Citation::page("https://acme.example/about").with_excerpt("Our mission")];
        ContextPack {
            id: id.into(),
            company_name: "Acme".into(),
            company_url: "https://acme.example".into(),
            version: DRAFT_VERSION.into(),
            created_at: at,
            updated_at: at,
            vision: ConfidentField::new("A world without paperwork".into(), 0.5, "stated", cite.clone()),
            mission: ConfidentField::empty("no mission statement found"),
            values: vec![ConfidentField::new("Candor".into(), 0.25, "careers page", cite.clone())],
            icp: IcpSection {
                segments: vec![IcpSegment {
                    name: "Finance teams".into(),
                    description: ConfidentField::new("Mid-market CFOs".into(), 0.75, "hero copy", cite),
                }],
                customer_evolution: ConfidentField::not_extracted(),
            },
            business_model: BusinessModelSection {
                revenue_drivers: Vec::new(),
                pricing_model: ConfidentField::empty("no pricing found"),
                internal_metrics: ConfidentField::not_extracted(),
            },
            product: ProductSection::default(),
            decision_rules: ConfidentField::not_extracted(),
            engineering_kpis: ConfidentField::not_extracted(),
            summary: "# Acme Context Pack (v0)".into(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = temp_db_path();
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let storage = test_storage().await;
        let pack = sample_pack("acme-1700000000000-0a1b2c3d", 1_700_000_000);

        storage.save_context_pack(&pack).await.expect("save");
        let loaded = storage
            .get_context_pack(&pack.id)
            .await
            .expect("get")
            .expect("pack exists");

        assert_eq!(loaded, pack);
    }

    #[tokio::test]
    async fn missing_pack_is_none() {
        let storage = test_storage().await;
        assert!(storage.get_context_pack("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_twice_replaces() {
        let storage = test_storage().await;
        let mut pack = sample_pack("acme-1", 1_700_000_000);
        storage.save_context_pack(&pack).await.unwrap();

        pack.summary = "updated".into();
        storage.save_context_pack(&pack).await.unwrap();

        let loaded = storage.get_context_pack("acme-1").await.unwrap().unwrap();
        assert_eq!(loaded.summary, "updated");
        assert_eq!(storage.list_context_packs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let storage = test_storage().await;
        storage.save_context_pack(&sample_pack("old", 1_600_000_000)).await.unwrap();
        storage.save_context_pack(&sample_pack("new", 1_700_000_000)).await.unwrap();

        let ids: Vec<_> = storage
            .list_context_packs()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn delete_removes_pack() {
        let storage = test_storage().await;
        storage.save_context_pack(&sample_pack("gone", 1_700_000_000)).await.unwrap();

        storage.delete_context_pack("gone").await.expect("delete");
        assert!(storage.get_context_pack("gone").await.unwrap().is_none());

        let err = storage.delete_context_pack("gone").await.unwrap_err();
        assert!(matches!(err, ContextPackError::NotFound(_)));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let path = temp_db_path();
        let rw = Storage::open(&path).await.unwrap();
        rw.save_context_pack(&sample_pack("kept", 1_700_000_000)).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&path).await.unwrap();
        assert!(ro.get_context_pack("kept").await.unwrap().is_some());
        let err = ro.save_context_pack(&sample_pack("new", 1_700_000_000)).await.unwrap_err();
        assert!(matches!(err, ContextPackError::Storage(_)));
    }

    #[tokio::test]
    async fn unavailable_store_reports_open_error() {
        let store = UnavailableStore::new("I/O error at \"/proc/nope\"");
        let err = store
            .save_context_pack(&sample_pack("any", 1_700_000_000))
            .await
            .unwrap_err();

        assert!(matches!(err, ContextPackError::Storage(_)));
        assert!(err.to_string().contains("/proc/nope"));
        assert!(store.get_context_pack("any").await.is_err());
    }

    #[tokio::test]
    async fn readonly_missing_file_is_not_found() {
        let err = Storage::open_readonly(&temp_db_path()).await.err().unwrap();
        assert!(matches!(err, ContextPackError::NotFound(_)));
    }
}
