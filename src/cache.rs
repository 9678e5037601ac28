//! Document Cache (§4.2): a durable key-value store of parsed nodes.

use std::{collections::BTreeMap, path::PathBuf, str::FromStr, time::SystemTime};

use serde_json::Value as JsonValue;
use sqlx::{
    error::BoxDynError,
    migrate::{MigrateDatabase, Migration as SqlxMigration, MigrationSource, MigrationType, Migrator},
    sqlite::{Sqlite, SqliteConnectOptions},
    ConnectOptions, Pool, QueryBuilder, Row,
};

use crate::{
    error::RouxError,
    node::{CentralityRecord, Node, NodeSummary, SourceRef},
};

/// Whether ghosts/orphans should be included, excluded, or exclusively
/// returned by [`DocumentCache::list`] (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    Include,
    Exclude,
    Only,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMode {
    Any,
    All,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub tag: Option<String>,
    pub path_prefix: Option<String>,
    pub ghosts: Option<Inclusion>,
    pub orphans: Option<Inclusion>,
}

#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub limit: usize,
    pub offset: usize,
}

pub const MAX_PAGE_SIZE: usize = 1000;

impl Paging {
    pub fn capped(limit: usize, offset: usize) -> Paging {
        Paging {
            limit: limit.min(MAX_PAGE_SIZE),
            offset,
        }
    }
}

struct Migration {
    version: i64,
    description: &'static str,
    sql: &'static str,
}

struct MigrationList(Vec<Migration>);

impl MigrationSource<'static> for MigrationList {
    fn resolve(self) -> futures_core::future::BoxFuture<'static, Result<Vec<SqlxMigration>, BoxDynError>> {
        Box::pin(async move {
            Ok(self
                .0
                .into_iter()
                .map(|m| {
                    SqlxMigration::new(
                        m.version,
                        m.description.into(),
                        MigrationType::ReversibleUp,
                        m.sql.into(),
                        false,
                    )
                })
                .collect())
        })
    }
}

const SCHEMA_V1: &str = "\
    CREATE TABLE nodes ( \
        id TEXT PRIMARY KEY, \
        title TEXT NOT NULL, \
        content TEXT, \
        tags TEXT NOT NULL DEFAULT '[]', \
        properties TEXT NOT NULL DEFAULT '{}', \
        outgoing_links TEXT NOT NULL DEFAULT '[]', \
        source_kind TEXT, \
        source_path TEXT, \
        source_mtime INTEGER, \
        is_ghost INTEGER NOT NULL DEFAULT 0 \
    ); \
    CREATE UNIQUE INDEX idx_nodes_source_path ON nodes(source_path) WHERE source_path IS NOT NULL; \
    CREATE TABLE centrality ( \
        id TEXT PRIMARY KEY REFERENCES nodes(id) ON DELETE CASCADE, \
        in_degree INTEGER NOT NULL, \
        out_degree INTEGER NOT NULL, \
        computed_at INTEGER NOT NULL \
    );";

pub struct DocumentCache {
    pool: Pool<Sqlite>,
}

fn row_to_node(row: &sqlx::sqlite::SqliteRow) -> Result<Node, RouxError> {
    use sqlx::Row as _;
    let id: String = row.try_get("id")?;
    let title: String = row.try_get("title")?;
    let content: Option<String> = row.try_get("content")?;
    let tags_json: String = row.try_get("tags")?;
    let properties_json: String = row.try_get("properties")?;
    let outgoing_json: String = row.try_get("outgoing_links")?;
    let source_kind: Option<String> = row.try_get("source_kind")?;
    let source_path: Option<String> = row.try_get("source_path")?;
    let source_mtime: Option<i64> = row.try_get("source_mtime")?;

    let tags: Vec<String> = serde_json::from_str(&tags_json)?;
    let properties: BTreeMap<String, JsonValue> = serde_json::from_str(&properties_json)?;
    let outgoing_links: Vec<String> = serde_json::from_str(&outgoing_json)?;

    let source_ref = match (source_kind, source_path, source_mtime) {
        (Some(kind), Some(path), Some(mtime)) => Some(SourceRef {
            kind,
            absolute_path: PathBuf::from(path),
            last_modified: SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(mtime.max(0) as u64),
        }),
        _ => None,
    };

    Ok(Node {
        id,
        title,
        content,
        tags,
        outgoing_links,
        properties,
        source_ref,
    })
}

impl DocumentCache {
    pub async fn open(db_path: &std::path::Path) -> Result<DocumentCache, RouxError> {
        let fqdb = format!("sqlite:{}", db_path.to_str().unwrap());
        if !Sqlite::database_exists(&fqdb).await.unwrap_or(false) {
            Sqlite::create_database(&fqdb).await?;
        }
        let options = SqliteConnectOptions::from_str(&fqdb)?
            .read_only(false)
            .disable_statement_logging()
            .create_if_missing(true);
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect_with(options)
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON;").execute(&pool).await?;

        let migrations = MigrationList(vec![Migration {
            version: 1,
            description: "create_initial_tables",
            sql: SCHEMA_V1,
        }]);
        let migrator = Migrator::new(migrations).await?;
        migrator.run(&pool).await?;

        Ok(DocumentCache { pool })
    }

    #[tracing::instrument(skip(self, node))]
    pub async fn upsert(
        &self,
        node: &Node,
        source_kind: &str,
        source_path: &str,
        source_mtime: i64,
    ) -> Result<(), RouxError> {
        let tags_json = serde_json::to_string(&node.tags)?;
        let properties_json = serde_json::to_string(&node.properties)?;
        let outgoing_json = serde_json::to_string(&node.outgoing_links)?;
        sqlx::query(
            "INSERT INTO nodes (id, title, content, tags, properties, outgoing_links, \
             source_kind, source_path, source_mtime, is_ghost) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0) \
             ON CONFLICT(id) DO UPDATE SET \
             title=excluded.title, content=excluded.content, tags=excluded.tags, \
             properties=excluded.properties, outgoing_links=excluded.outgoing_links, \
             source_kind=excluded.source_kind, source_path=excluded.source_path, \
             source_mtime=excluded.source_mtime, is_ghost=0",
        )
        .bind(&node.id)
        .bind(&node.title)
        .bind(&node.content)
        .bind(tags_json)
        .bind(properties_json)
        .bind(outgoing_json)
        .bind(source_kind)
        .bind(source_path)
        .bind(source_mtime)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, node))]
    pub async fn upsert_ghost(&self, node: &Node) -> Result<(), RouxError> {
        if node.content.is_some() || node.source_ref.is_some() {
            return Err(RouxError::InvalidParams(
                "ghost nodes must not have content or a source_ref".into(),
            ));
        }
        sqlx::query(
            "INSERT INTO nodes (id, title, content, tags, properties, outgoing_links, is_ghost) \
             VALUES (?, ?, NULL, '[]', '{}', '[]', 1) \
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&node.id)
        .bind(&node.title)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Node>, RouxError> {
        let row = sqlx::query("SELECT * FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_node(&r)).transpose()
    }

    /// Returns results in the same order as `ids`, skipping misses.
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<Node>, RouxError> {
        let mut found = BTreeMap::new();
        for chunk in ids.chunks(500) {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM nodes WHERE id IN (");
            let mut sep = qb.separated(", ");
            for id in chunk {
                sep.push_bind(id.clone());
            }
            qb.push(")");
            let rows = qb.build().fetch_all(&self.pool).await?;
            for row in rows {
                let node = row_to_node(&row)?;
                found.insert(node.id.clone(), node);
            }
        }
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    pub async fn get_by_path(&self, path: &str) -> Result<Option<Node>, RouxError> {
        let row = sqlx::query("SELECT * FROM nodes WHERE source_path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_node(&r)).transpose()
    }

    pub async fn delete(&self, id: &str) -> Result<(), RouxError> {
        sqlx::query("DELETE FROM nodes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_all_tracked_paths(&self) -> Result<Vec<(String, String)>, RouxError> {
        let rows = sqlx::query("SELECT id, source_path FROM nodes WHERE source_path IS NOT NULL")
            .fetch_all(&self.pool)
            .await?;
        use sqlx::Row as _;
        rows.into_iter()
            .map(|r| -> Result<(String, String), RouxError> {
                Ok((r.try_get("id")?, r.try_get("source_path")?))
            })
            .collect()
    }

    pub async fn list_all(&self) -> Result<Vec<Node>, RouxError> {
        let rows = sqlx::query("SELECT * FROM nodes").fetch_all(&self.pool).await?;
        rows.iter().map(row_to_node).collect()
    }

    pub async fn search_by_tags(
        &self,
        tags: &[String],
        mode: TagMode,
        limit: usize,
    ) -> Result<Vec<Node>, RouxError> {
        if tags.is_empty() {
            return Err(RouxError::InvalidParams("tags must be non-empty".into()));
        }
        let all = self.list_all().await?;
        let lowered: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        let matches = all
            .into_iter()
            .filter(|n| {
                let node_tags: Vec<String> = n.tags.iter().map(|t| t.to_lowercase()).collect();
                match mode {
                    TagMode::Any => lowered.iter().any(|t| node_tags.contains(t)),
                    TagMode::All => lowered.iter().all(|t| node_tags.contains(t)),
                }
            })
            .take(limit)
            .collect();
        Ok(matches)
    }

    /// List nodes matching `filter`, returning `(summaries, total matching)`.
    pub async fn list(&self, filter: &ListFilter, paging: Paging) -> Result<(Vec<NodeSummary>, usize), RouxError> {
        let paging = Paging::capped(paging.limit, paging.offset);
        let all = self.list_all().await?;
        let centrality = self.all_centrality().await?;

        let mut matching: Vec<&Node> = all
            .iter()
            .filter(|n| {
                if let Some(tag) = &filter.tag {
                    if !n.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                        return false;
                    }
                }
                if let Some(prefix) = &filter.path_prefix {
                    let path = n.source_path_str().unwrap_or_default();
                    if !path.to_lowercase().starts_with(&prefix.to_lowercase()) {
                        return false;
                    }
                }
                if let Some(ghosts) = filter.ghosts {
                    match ghosts {
                        Inclusion::Exclude if n.is_ghost() => return false,
                        Inclusion::Only if !n.is_ghost() => return false,
                        _ => {}
                    }
                }
                if let Some(orphans) = filter.orphans {
                    let is_orphan = centrality
                        .get(&n.id)
                        .map(|c| c.in_degree == 0 && c.out_degree == 0)
                        .unwrap_or(true);
                    match orphans {
                        Inclusion::Exclude if is_orphan => return false,
                        Inclusion::Only if !is_orphan => return false,
                        _ => {}
                    }
                }
                true
            })
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(paging.offset)
            .take(paging.limit)
            .map(NodeSummary::from)
            .collect();
        Ok((page, total))
    }

    pub async fn update_outgoing_links(&self, id: &str, links: &[String]) -> Result<(), RouxError> {
        let json = serde_json::to_string(links)?;
        sqlx::query("UPDATE nodes SET outgoing_links = ? WHERE id = ?")
            .bind(json)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn store_centrality(&self, id: &str, record: CentralityRecord, computed_at: i64) -> Result<(), RouxError> {
        sqlx::query(
            "INSERT INTO centrality (id, in_degree, out_degree, computed_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET in_degree=excluded.in_degree, \
             out_degree=excluded.out_degree, computed_at=excluded.computed_at",
        )
        .bind(id)
        .bind(record.in_degree)
        .bind(record.out_degree)
        .bind(computed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_centrality(&self, id: &str) -> Result<Option<CentralityRecord>, RouxError> {
        let row = sqlx::query("SELECT in_degree, out_degree FROM centrality WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        use sqlx::Row as _;
        row.map(|r| -> Result<CentralityRecord, RouxError> {
            Ok(CentralityRecord {
                in_degree: r.try_get::<i64, _>("in_degree")? as u32,
                out_degree: r.try_get::<i64, _>("out_degree")? as u32,
            })
        })
        .transpose()
    }

    async fn all_centrality(&self) -> Result<BTreeMap<String, CentralityRecord>, RouxError> {
        let rows = sqlx::query("SELECT id, in_degree, out_degree FROM centrality")
            .fetch_all(&self.pool)
            .await?;
        use sqlx::Row as _;
        let mut map = BTreeMap::new();
        for row in rows {
            let id: String = row.try_get("id")?;
            map.insert(
                id,
                CentralityRecord {
                    in_degree: row.try_get::<i64, _>("in_degree")? as u32,
                    out_degree: row.try_get::<i64, _>("out_degree")? as u32,
                },
            );
        }
        Ok(map)
    }

    pub async fn resolve_titles(&self, ids: &[String]) -> Result<BTreeMap<String, String>, RouxError> {
        Ok(self
            .get_many(ids)
            .await?
            .into_iter()
            .map(|n| (n.id, n.title))
            .collect())
    }

    pub async fn nodes_exist(&self, ids: &[String]) -> Result<BTreeMap<String, bool>, RouxError> {
        let existing: std::collections::BTreeSet<String> =
            self.get_many(ids).await?.into_iter().map(|n| n.id).collect();
        Ok(ids.iter().map(|id| (id.clone(), existing.contains(id))).collect())
    }
}
