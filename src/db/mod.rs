use crate::errors::{AppError, AppResult};
use crate::models::{
    Conversation, DocNode, Message, MessageRole, Notebook, NotebookReference,
    NotebookWithRelations, RoutingStatus, SparkHead, SparkRouting, SparkVersion, SparkWithMeta,
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Unsaved conversations expire this many days after their last update.
const UNSAVED_CONVERSATION_TTL_DAYS: i64 = 30;

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ─── Spark lineages ───────────────────────────────────────────────────────

    /// Creates a new lineage: root version, head, and routing row commit as a
    /// single transaction so a live lineage always has all three.
    pub fn create_spark(
        &self,
        content: &str,
        title: Option<&str>,
        notebook_id: Option<&str>,
    ) -> AppResult<SparkWithMeta> {
        let version_id = Uuid::new_v4().to_string();
        let root_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_raw = now.to_rfc3339();

        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO sparks (id, root_id, parent_id, content, created_at)
             VALUES (?1, ?2, NULL, ?3, ?4)",
            params![version_id, root_id, content, now_raw],
        )?;
        tx.execute(
            "INSERT INTO spark_heads (root_id, head_id, title, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![root_id, version_id, title, now_raw],
        )?;
        tx.execute(
            "INSERT INTO spark_routings (root_id, notebook_id, routed_at)
             VALUES (?1, ?2, ?3)",
            params![root_id, notebook_id, now_raw],
        )?;
        tx.commit()?;

        Ok(SparkWithMeta {
            root_id,
            head_id: version_id,
            content: content.to_string(),
            title: title.map(ToString::to_string),
            created_at: now,
            updated_at: now,
            routing_status: routing_status_for(notebook_id),
            notebook_id: notebook_id.map(ToString::to_string),
        })
    }

    /// Appends a version chained to the current head and advances the head
    /// pointer. Both writes commit together; a head can never reference a
    /// version that was not persisted.
    pub fn edit_spark(&self, root_id: &str, content: &str) -> AppResult<SparkWithMeta> {
        let version_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_raw = now.to_rfc3339();

        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;

        let head: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT head_id, title FROM spark_heads WHERE root_id = ?1",
                [root_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((previous_head_id, title)) = head else {
            return Err(AppError::NotFound(format!(
                "No spark head for lineage {root_id}"
            )));
        };

        tx.execute(
            "INSERT INTO sparks (id, root_id, parent_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![version_id, root_id, previous_head_id, content, now_raw],
        )?;
        tx.execute(
            "UPDATE spark_heads SET head_id = ?1, updated_at = ?2 WHERE root_id = ?3",
            params![version_id, now_raw, root_id],
        )?;

        let root_created_at: Option<String> = tx
            .query_row(
                "SELECT created_at FROM sparks WHERE root_id = ?1 AND parent_id IS NULL",
                [root_id],
                |row| row.get(0),
            )
            .optional()?;
        let notebook_id: Option<String> = tx
            .query_row(
                "SELECT notebook_id FROM spark_routings WHERE root_id = ?1",
                [root_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        tx.commit()?;

        let created_at = match root_created_at {
            Some(raw) => parse_time(&raw)?,
            None => now,
        };

        Ok(SparkWithMeta {
            root_id: root_id.to_string(),
            head_id: version_id,
            content: content.to_string(),
            title,
            created_at,
            updated_at: now,
            routing_status: routing_status_for(notebook_id.as_deref()),
            notebook_id,
        })
    }

    /// Full version chain for a lineage, oldest first. Equal timestamps are
    /// tie-broken by insertion order. Unknown lineages yield an empty chain.
    pub fn spark_history(&self, root_id: &str) -> AppResult<Vec<SparkVersion>> {
        let conn = lock_conn(&self.conn)?;
        let mut statement = conn.prepare(
            "SELECT id, root_id, parent_id, content, created_at
             FROM sparks WHERE root_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let versions = statement
            .query_map([root_id], parse_spark_version_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    pub fn get_spark_head(&self, root_id: &str) -> AppResult<SparkHead> {
        let conn = lock_conn(&self.conn)?;
        conn.query_row(
            "SELECT root_id, head_id, title, updated_at FROM spark_heads WHERE root_id = ?1",
            [root_id],
            |row| {
                Ok(SparkHead {
                    root_id: row.get(0)?,
                    head_id: row.get(1)?,
                    title: row.get(2)?,
                    updated_at: parse_time(&row.get::<_, String>(3)?)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("No spark head for lineage {root_id}")))
    }

    /// Title is editable independently of content and does not bump
    /// `updated_at`.
    pub fn set_spark_title(&self, root_id: &str, title: &str) -> AppResult<()> {
        let conn = lock_conn(&self.conn)?;
        let changed = conn.execute(
            "UPDATE spark_heads SET title = ?1 WHERE root_id = ?2",
            params![title, root_id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!(
                "No spark head for lineage {root_id}"
            )));
        }
        Ok(())
    }

    pub fn route_spark(&self, root_id: &str, notebook_id: &str) -> AppResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = lock_conn(&self.conn)?;
        let changed = conn.execute(
            "UPDATE spark_routings SET notebook_id = ?1, routed_at = ?2 WHERE root_id = ?3",
            params![notebook_id, now, root_id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!(
                "No routing row for lineage {root_id}"
            )));
        }
        Ok(())
    }

    pub fn unroute_spark(&self, root_id: &str) -> AppResult<()> {
        let conn = lock_conn(&self.conn)?;
        let changed = conn.execute(
            "UPDATE spark_routings SET notebook_id = NULL WHERE root_id = ?1",
            [root_id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!(
                "No routing row for lineage {root_id}"
            )));
        }
        Ok(())
    }

    pub fn get_routing(&self, root_id: &str) -> AppResult<Option<SparkRouting>> {
        let conn = lock_conn(&self.conn)?;
        conn.query_row(
            "SELECT root_id, notebook_id, routed_at FROM spark_routings WHERE root_id = ?1",
            [root_id],
            |row| {
                Ok(SparkRouting {
                    root_id: row.get(0)?,
                    notebook_id: row.get(1)?,
                    routed_at: parse_time(&row.get::<_, String>(2)?)?,
                })
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    /// Removes the routing row, the head, and every version of the lineage in
    /// one transaction. Irreversible.
    pub fn delete_spark(&self, root_id: &str) -> AppResult<()> {
        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM spark_routings WHERE root_id = ?1", [root_id])?;
        tx.execute("DELETE FROM spark_heads WHERE root_id = ?1", [root_id])?;
        tx.execute("DELETE FROM sparks WHERE root_id = ?1", [root_id])?;
        tx.commit()?;
        Ok(())
    }

    // ─── Spark aggregation ────────────────────────────────────────────────────

    /// All sparks joined with their head content and routing, most recently
    /// edited first. Heads whose referenced version is missing are dropped
    /// from the result rather than failing the whole listing.
    pub fn all_sparks_with_meta(&self) -> AppResult<Vec<SparkWithMeta>> {
        let conn = lock_conn(&self.conn)?;
        collect_sparks_with_meta(&conn, None)
    }

    pub fn unrouted_sparks(&self) -> AppResult<Vec<SparkWithMeta>> {
        let conn = lock_conn(&self.conn)?;
        let mut statement =
            conn.prepare("SELECT root_id FROM spark_routings WHERE notebook_id IS NULL")?;
        let roots = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        if roots.is_empty() {
            return Ok(Vec::new());
        }
        collect_sparks_with_meta(&conn, Some(&roots))
    }

    pub fn sparks_for_notebook(&self, notebook_id: &str) -> AppResult<Vec<SparkWithMeta>> {
        let conn = lock_conn(&self.conn)?;
        let mut statement =
            conn.prepare("SELECT root_id FROM spark_routings WHERE notebook_id = ?1")?;
        let roots = statement
            .query_map([notebook_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        if roots.is_empty() {
            return Ok(Vec::new());
        }
        collect_sparks_with_meta(&conn, Some(&roots))
    }

    // ─── Notebooks ────────────────────────────────────────────────────────────

    pub fn create_notebook(&self, name: &str, parent_id: Option<&str>) -> AppResult<Notebook> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_raw = now.to_rfc3339();

        let conn = lock_conn(&self.conn)?;
        conn.execute(
            "INSERT INTO notebooks (id, name, body_json, parent_notebook_id, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, ?4, ?4)",
            params![id, name, parent_id, now_raw],
        )?;

        Ok(Notebook {
            id,
            name: name.to_string(),
            body: None,
            parent_notebook_id: parent_id.map(ToString::to_string),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_notebook(&self, id: &str) -> AppResult<Option<Notebook>> {
        let conn = lock_conn(&self.conn)?;
        conn.query_row(
            "SELECT id, name, body_json, parent_notebook_id, created_at, updated_at
             FROM notebooks WHERE id = ?1",
            [id],
            parse_notebook_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn update_notebook_body(&self, id: &str, body: &DocNode) -> AppResult<()> {
        let now = Utc::now().to_rfc3339();
        let body_json = serde_json::to_string(body)?;
        let conn = lock_conn(&self.conn)?;
        let changed = conn.execute(
            "UPDATE notebooks SET body_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![body_json, now, id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("Notebook {id} not found")));
        }
        Ok(())
    }

    pub fn rename_notebook(&self, id: &str, name: &str) -> AppResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = lock_conn(&self.conn)?;
        let changed = conn.execute(
            "UPDATE notebooks SET name = ?1, updated_at = ?2 WHERE id = ?3",
            params![name, now, id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("Notebook {id} not found")));
        }
        Ok(())
    }

    /// Splices the notebook out of the tree: children are reparented to the
    /// deleted notebook's own parent, then the row is removed. Reference
    /// edges and routings pointing at it are left dangling and are tolerated
    /// by readers.
    pub fn delete_notebook(&self, id: &str) -> AppResult<()> {
        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;

        let parent: Option<Option<String>> = tx
            .query_row(
                "SELECT parent_notebook_id FROM notebooks WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(parent_id) = parent else {
            return Err(AppError::NotFound(format!("Notebook {id} not found")));
        };

        tx.execute(
            "UPDATE notebooks SET parent_notebook_id = ?1 WHERE parent_notebook_id = ?2",
            params![parent_id, id],
        )?;
        tx.execute("DELETE FROM notebooks WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(())
    }

    /// Every notebook, most recently updated first.
    pub fn notebook_tree(&self) -> AppResult<Vec<Notebook>> {
        let conn = lock_conn(&self.conn)?;
        let mut statement = conn.prepare(
            "SELECT id, name, body_json, parent_notebook_id, created_at, updated_at
             FROM notebooks ORDER BY updated_at DESC",
        )?;
        let notebooks = statement
            .query_map([], parse_notebook_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notebooks)
    }

    pub fn add_reference(&self, notebook_id: &str, referenced_id: &str) -> AppResult<NotebookReference> {
        let now = Utc::now();
        let conn = lock_conn(&self.conn)?;
        conn.execute(
            "INSERT INTO notebook_references (notebook_id, referenced_notebook_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![notebook_id, referenced_id, now.to_rfc3339()],
        )?;
        Ok(NotebookReference {
            notebook_id: notebook_id.to_string(),
            referenced_notebook_id: referenced_id.to_string(),
            created_at: now,
        })
    }

    pub fn remove_reference(&self, notebook_id: &str, referenced_id: &str) -> AppResult<()> {
        let conn = lock_conn(&self.conn)?;
        conn.execute(
            "DELETE FROM notebook_references
             WHERE notebook_id = ?1 AND referenced_notebook_id = ?2",
            params![notebook_id, referenced_id],
        )?;
        Ok(())
    }

    /// Notebook plus children, outgoing references, incoming backlinks, and
    /// routed lineages. `spark_count` is derived from the routing lookup and
    /// is never stored.
    pub fn notebook_with_relations(&self, id: &str) -> AppResult<Option<NotebookWithRelations>> {
        let conn = lock_conn(&self.conn)?;
        let notebook = conn
            .query_row(
                "SELECT id, name, body_json, parent_notebook_id, created_at, updated_at
                 FROM notebooks WHERE id = ?1",
                [id],
                parse_notebook_row,
            )
            .optional()?;
        let Some(notebook) = notebook else {
            return Ok(None);
        };

        let child_ids = collect_strings(
            &conn,
            "SELECT id FROM notebooks WHERE parent_notebook_id = ?1 ORDER BY updated_at DESC",
            id,
        )?;
        let reference_ids = collect_strings(
            &conn,
            "SELECT referenced_notebook_id FROM notebook_references
             WHERE notebook_id = ?1 ORDER BY created_at ASC, rowid ASC",
            id,
        )?;
        let backlink_ids = collect_strings(
            &conn,
            "SELECT notebook_id FROM notebook_references
             WHERE referenced_notebook_id = ?1 ORDER BY created_at ASC, rowid ASC",
            id,
        )?;
        let routed_spark_root_ids = collect_strings(
            &conn,
            "SELECT root_id FROM spark_routings WHERE notebook_id = ?1 ORDER BY routed_at ASC, rowid ASC",
            id,
        )?;

        let spark_count = routed_spark_root_ids.len();
        Ok(Some(NotebookWithRelations {
            notebook,
            child_ids,
            reference_ids,
            backlink_ids,
            routed_spark_root_ids,
            spark_count,
        }))
    }

    // ─── Conversations ────────────────────────────────────────────────────────

    pub fn create_conversation(&self, notebook_id: &str) -> AppResult<Conversation> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = lock_conn(&self.conn)?;
        conn.execute(
            "INSERT INTO conversations (id, notebook_id, saved, created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, ?3)",
            params![id, notebook_id, now.to_rfc3339()],
        )?;
        Ok(Conversation {
            id,
            notebook_id: notebook_id.to_string(),
            saved: false,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        })
    }

    /// Most recently updated live conversation for the notebook, or a fresh
    /// one if none exists. Unsaved conversations past their expiry window
    /// never qualify.
    pub fn active_conversation(&self, notebook_id: &str) -> AppResult<Conversation> {
        let cutoff = unsaved_expiry_cutoff();
        let existing = {
            let conn = lock_conn(&self.conn)?;
            let row = conn
                .query_row(
                    "SELECT id, notebook_id, saved, created_at, updated_at FROM conversations
                     WHERE notebook_id = ?1 AND (saved = 1 OR updated_at >= ?2)
                     ORDER BY updated_at DESC LIMIT 1",
                    params![notebook_id, cutoff],
                    parse_conversation_row,
                )
                .optional()?;
            match row {
                Some(mut conversation) => {
                    conversation.messages = messages_for_conversation(&conn, &conversation.id)?;
                    Some(conversation)
                }
                None => None,
            }
        };
        match existing {
            Some(conversation) => Ok(conversation),
            None => self.create_conversation(notebook_id),
        }
    }

    pub fn get_conversation(&self, id: &str) -> AppResult<Option<Conversation>> {
        let cutoff = unsaved_expiry_cutoff();
        let conn = lock_conn(&self.conn)?;
        let row = conn
            .query_row(
                "SELECT id, notebook_id, saved, created_at, updated_at FROM conversations
                 WHERE id = ?1 AND (saved = 1 OR updated_at >= ?2)",
                params![id, cutoff],
                parse_conversation_row,
            )
            .optional()?;
        match row {
            Some(mut conversation) => {
                conversation.messages = messages_for_conversation(&conn, &conversation.id)?;
                Ok(Some(conversation))
            }
            None => Ok(None),
        }
    }

    /// Conversations for a notebook, most recently updated first, each with
    /// its messages in creation order. Expired unsaved conversations are
    /// excluded even before the sweep removes them.
    pub fn conversations_for_notebook(&self, notebook_id: &str) -> AppResult<Vec<Conversation>> {
        let cutoff = unsaved_expiry_cutoff();
        let conn = lock_conn(&self.conn)?;
        let mut statement = conn.prepare(
            "SELECT id, notebook_id, saved, created_at, updated_at FROM conversations
             WHERE notebook_id = ?1 AND (saved = 1 OR updated_at >= ?2)
             ORDER BY updated_at DESC",
        )?;
        let mut conversations = statement
            .query_map(params![notebook_id, cutoff], parse_conversation_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for conversation in &mut conversations {
            conversation.messages = messages_for_conversation(&conn, &conversation.id)?;
        }
        Ok(conversations)
    }

    pub fn insert_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> AppResult<Message> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = lock_conn(&self.conn)?;
        let exists: i64 = conn.query_row(
            "SELECT COUNT(1) FROM conversations WHERE id = ?1",
            [conversation_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(AppError::NotFound(format!(
                "Conversation {conversation_id} not found"
            )));
        }
        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, conversation_id, role.as_str(), content, now.to_rfc3339()],
        )?;
        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now,
        })
    }

    pub fn touch_conversation(&self, id: &str, at: DateTime<Utc>) -> AppResult<()> {
        let conn = lock_conn(&self.conn)?;
        conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn save_conversation(&self, id: &str) -> AppResult<()> {
        let conn = lock_conn(&self.conn)?;
        let changed = conn.execute("UPDATE conversations SET saved = 1 WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("Conversation {id} not found")));
        }
        Ok(())
    }

    pub fn delete_conversation(&self, id: &str) -> AppResult<()> {
        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [id])?;
        tx.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(())
    }

    /// Deletes unsaved conversations whose last update is older than the
    /// expiry window, together with their messages. Returns the number of
    /// conversations removed.
    pub fn prune_expired_conversations(&self) -> AppResult<u64> {
        let cutoff = unsaved_expiry_cutoff();
        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM messages WHERE conversation_id IN (
               SELECT id FROM conversations WHERE saved = 0 AND updated_at < ?1
             )",
            [&cutoff],
        )?;
        let removed = tx.execute(
            "DELETE FROM conversations WHERE saved = 0 AND updated_at < ?1",
            [&cutoff],
        )?;
        tx.commit()?;
        Ok(removed as u64)
    }
}

// ─── Row parsing / helpers ──────────────────────────────────────────────────

fn lock_conn(conn: &Mutex<Connection>) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
}

fn routing_status_for(notebook_id: Option<&str>) -> RoutingStatus {
    if notebook_id.is_some() {
        RoutingStatus::Routed
    } else {
        RoutingStatus::Unrouted
    }
}

fn unsaved_expiry_cutoff() -> String {
    (Utc::now() - Duration::days(UNSAVED_CONVERSATION_TTL_DAYS)).to_rfc3339()
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
        })
}

fn parse_role(raw: &str) -> Result<MessageRole, rusqlite::Error> {
    match raw {
        "user" => Ok(MessageRole::User),
        "assistant" => Ok(MessageRole::Assistant),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown message role: {other}").into(),
        )),
    }
}

/// A body that fails to deserialize is treated as absent rather than failing
/// the read; the anomaly is logged and the notebook stays listable.
fn parse_body(raw: Option<String>) -> Option<DocNode> {
    let raw = raw?;
    match serde_json::from_str::<DocNode>(&raw) {
        Ok(node) => Some(node),
        Err(err) => {
            tracing::warn!(error = %err, "dropping unreadable notebook body");
            None
        }
    }
}

fn parse_spark_version_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SparkVersion> {
    Ok(SparkVersion {
        id: row.get(0)?,
        root_id: row.get(1)?,
        parent_id: row.get(2)?,
        content: row.get(3)?,
        created_at: parse_time(&row.get::<_, String>(4)?)?,
    })
}

fn parse_notebook_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notebook> {
    Ok(Notebook {
        id: row.get(0)?,
        name: row.get(1)?,
        body: parse_body(row.get::<_, Option<String>>(2)?),
        parent_notebook_id: row.get(3)?,
        created_at: parse_time(&row.get::<_, String>(4)?)?,
        updated_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

fn parse_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        notebook_id: row.get(1)?,
        saved: row.get::<_, i64>(2)? != 0,
        created_at: parse_time(&row.get::<_, String>(3)?)?,
        updated_at: parse_time(&row.get::<_, String>(4)?)?,
        messages: Vec::new(),
    })
}

fn messages_for_conversation(conn: &Connection, conversation_id: &str) -> AppResult<Vec<Message>> {
    let mut statement = conn.prepare(
        "SELECT id, conversation_id, role, content, created_at
         FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;
    let messages = statement
        .query_map([conversation_id], |row| {
            Ok(Message {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                role: parse_role(&row.get::<_, String>(2)?)?,
                content: row.get(3)?,
                created_at: parse_time(&row.get::<_, String>(4)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}

fn collect_strings(conn: &Connection, sql: &str, param: &str) -> AppResult<Vec<String>> {
    let mut statement = conn.prepare(sql)?;
    let values = statement
        .query_map([param], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(values)
}

fn sql_placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

struct HeadScanRow {
    root_id: String,
    head_id: String,
    title: Option<String>,
    updated_at: DateTime<Utc>,
    has_routing: bool,
    notebook_id: Option<String>,
}

/// The SparkWithMeta pipeline: scan heads joined with routings (optionally
/// restricted to a set of lineages), batch-fetch the referenced head
/// versions and the root versions, then combine. A head whose version row is
/// gone is dropped with a warning; a lineage with no routing row is listed
/// as unrouted with a warning. Result is sorted most recently edited first.
fn collect_sparks_with_meta(
    conn: &Connection,
    roots: Option<&[String]>,
) -> AppResult<Vec<SparkWithMeta>> {
    let mut query = String::from(
        "SELECT h.root_id, h.head_id, h.title, h.updated_at, r.root_id, r.notebook_id
         FROM spark_heads h
         LEFT JOIN spark_routings r ON r.root_id = h.root_id",
    );
    let params_vec: Vec<&str> = match roots {
        Some(roots) => {
            query.push_str(&format!(
                " WHERE h.root_id IN ({})",
                sql_placeholders(roots.len())
            ));
            roots.iter().map(String::as_str).collect()
        }
        None => Vec::new(),
    };

    let mut statement = conn.prepare(&query)?;
    let heads = statement
        .query_map(rusqlite::params_from_iter(params_vec), |row| {
            Ok(HeadScanRow {
                root_id: row.get(0)?,
                head_id: row.get(1)?,
                title: row.get(2)?,
                updated_at: parse_time(&row.get::<_, String>(3)?)?,
                has_routing: row.get::<_, Option<String>>(4)?.is_some(),
                notebook_id: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if heads.is_empty() {
        return Ok(Vec::new());
    }

    let head_ids: Vec<&str> = heads.iter().map(|head| head.head_id.as_str()).collect();
    let mut version_stmt = conn.prepare(&format!(
        "SELECT id, content, created_at FROM sparks WHERE id IN ({})",
        sql_placeholders(head_ids.len())
    ))?;
    let head_versions: HashMap<String, (String, DateTime<Utc>)> = version_stmt
        .query_map(rusqlite::params_from_iter(head_ids), |row| {
            Ok((
                row.get::<_, String>(0)?,
                (row.get::<_, String>(1)?, parse_time(&row.get::<_, String>(2)?)?),
            ))
        })?
        .collect::<Result<_, _>>()?;

    let root_ids: Vec<&str> = heads.iter().map(|head| head.root_id.as_str()).collect();
    let mut root_stmt = conn.prepare(&format!(
        "SELECT root_id, created_at FROM sparks WHERE parent_id IS NULL AND root_id IN ({})",
        sql_placeholders(root_ids.len())
    ))?;
    let root_versions: HashMap<String, DateTime<Utc>> = root_stmt
        .query_map(rusqlite::params_from_iter(root_ids), |row| {
            Ok((
                row.get::<_, String>(0)?,
                parse_time(&row.get::<_, String>(1)?)?,
            ))
        })?
        .collect::<Result<_, _>>()?;

    let mut sparks = Vec::with_capacity(heads.len());
    for head in heads {
        let Some((content, head_created_at)) = head_versions.get(&head.head_id) else {
            tracing::warn!(
                root_id = %head.root_id,
                head_id = %head.head_id,
                "dropping spark whose head references a missing version"
            );
            continue;
        };
        if !head.has_routing {
            tracing::warn!(root_id = %head.root_id, "lineage has no routing row; listing as unrouted");
        }
        let created_at = root_versions
            .get(&head.root_id)
            .copied()
            .unwrap_or(*head_created_at);
        sparks.push(SparkWithMeta {
            routing_status: routing_status_for(head.notebook_id.as_deref()),
            root_id: head.root_id,
            head_id: head.head_id,
            content: content.clone(),
            title: head.title,
            created_at,
            updated_at: head.updated_at,
            notebook_id: head.notebook_id,
        });
    }

    sparks.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.root_id.cmp(&b.root_id))
    });
    Ok(sparks)
}
