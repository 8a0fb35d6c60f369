//! SQLite-backed durable state for the station.
//!
//! Everything the station must remember across restarts lives here: the
//! client identity, the onboarding state, groups, and messages. Uses WAL
//! mode and `Arc<Mutex<Connection>>` for safe access from the station's
//! concurrent handler tasks.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{Result, TillerError};
use crate::model::{ChatMessage, Friend, Group};

/// The station's singleton configuration row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Durable identity under which the delivery relay knows this station.
    pub client_id: String,
    /// Display name chosen during onboarding.
    pub name: Option<String>,
    pub is_onboarded: bool,
}

/// Durable station state.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open the store at a specific path.
    ///
    /// Creates the database and parent directories if they don't exist and
    /// seeds the configuration row with a fresh client identity on first
    /// open. Reopening an existing store keeps its identity, which is what
    /// makes station construction safe to repeat.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| TillerError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;
        Self::seed_configuration(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;\n\
             PRAGMA foreign_keys=ON;",
            StoreConfig::BUSY_TIMEOUT.as_millis(),
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS configuration (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                client_id TEXT NOT NULL,
                name TEXT,
                is_onboarded INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS groups (
                id TEXT PRIMARY KEY,
                user_name TEXT NOT NULL,
                friend_id TEXT NOT NULL,
                friend_name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                received_at TEXT,
                text TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn seed_configuration(conn: &Connection) -> Result<()> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let seeded = conn.execute(
            "INSERT OR IGNORE INTO configuration (id, client_id) VALUES (1, ?1)",
            params![client_id],
        )?;
        if seeded > 0 {
            debug!("Seeded station configuration with client id {}", client_id);
        }
        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| TillerError::Database {
            message: "Failed to acquire store connection lock".to_string(),
            source: None,
        })
    }

    // ========================================
    // Configuration
    // ========================================

    pub fn configuration(&self) -> Result<Configuration> {
        let conn = self.lock_conn()?;
        let config = conn.query_row(
            "SELECT client_id, name, is_onboarded FROM configuration WHERE id = 1",
            [],
            |row| {
                Ok(Configuration {
                    client_id: row.get(0)?,
                    name: row.get(1)?,
                    is_onboarded: row.get(2)?,
                })
            },
        )?;
        Ok(config)
    }

    pub fn complete_onboarding(&self, name: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE configuration SET is_onboarded = 1, name = ?1 WHERE id = 1",
            params![name],
        )?;
        Ok(())
    }

    pub fn set_name(&self, name: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE configuration SET name = ?1 WHERE id = 1",
            params![name],
        )?;
        Ok(())
    }

    // ========================================
    // Groups
    // ========================================

    /// Insert a group. Returns `false` when a group with the same id already
    /// exists, which makes replayed welcomes harmless.
    pub fn insert_group(&self, group: &Group) -> Result<bool> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO groups (id, user_name, friend_id, friend_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                group.id,
                group.user_name,
                group.friend.id,
                group.friend.name,
                now
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn group(&self, group_id: &str) -> Result<Option<Group>> {
        let conn = self.lock_conn()?;
        let group = conn
            .query_row(
                "SELECT id, user_name, friend_id, friend_name FROM groups WHERE id = ?1",
                params![group_id],
                |row| {
                    Ok(Group {
                        id: row.get(0)?,
                        user_name: row.get(1)?,
                        friend: Friend {
                            id: row.get(2)?,
                            name: row.get(3)?,
                        },
                    })
                },
            )
            .optional()?;
        Ok(group)
    }

    pub fn list_groups(&self) -> Result<Vec<Group>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_name, friend_id, friend_name FROM groups ORDER BY rowid",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(Group {
                id: row.get(0)?,
                user_name: row.get(1)?,
                friend: Friend {
                    id: row.get(2)?,
                    name: row.get(3)?,
                },
            })
        })?;

        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        Ok(groups)
    }

    // ========================================
    // Messages
    // ========================================

    /// Append a message to a group's history.
    pub fn push_message(&self, group_id: &str, message: &ChatMessage) -> Result<()> {
        let conn = self.lock_conn()?;

        let known: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM groups WHERE id = ?1)",
            params![group_id],
            |row| row.get(0),
        )?;
        if !known {
            return Err(TillerError::GroupNotFound {
                group_id: group_id.to_string(),
            });
        }

        match message {
            ChatMessage::Incoming {
                received_at,
                sent_at,
                text,
            } => {
                conn.execute(
                    "INSERT INTO messages (group_id, kind, sent_at, received_at, text)
                     VALUES (?1, 'incoming', ?2, ?3, ?4)",
                    params![group_id, sent_at.to_rfc3339(), received_at.to_rfc3339(), text],
                )?;
            }
            ChatMessage::Outgoing { sent_at, text } => {
                conn.execute(
                    "INSERT INTO messages (group_id, kind, sent_at, received_at, text)
                     VALUES (?1, 'outgoing', ?2, NULL, ?3)",
                    params![group_id, sent_at.to_rfc3339(), text],
                )?;
            }
        }
        Ok(())
    }

    /// A group's messages in arrival order.
    pub fn messages(&self, group_id: &str) -> Result<Vec<ChatMessage>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT kind, sent_at, received_at, text FROM messages
             WHERE group_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![group_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (kind, sent_at, received_at, text) = row?;
            let sent_at = parse_timestamp(&sent_at)?;
            let message = match kind.as_str() {
                "incoming" => ChatMessage::Incoming {
                    received_at: parse_timestamp(received_at.as_deref().unwrap_or_default())?,
                    sent_at,
                    text,
                },
                "outgoing" => ChatMessage::Outgoing { sent_at, text },
                other => {
                    return Err(TillerError::Database {
                        message: format!("Unknown message kind {:?}", other),
                        source: None,
                    })
                }
            };
            messages.push(message);
        }
        Ok(messages)
    }

    // ========================================
    // Wipe
    // ========================================

    /// Destroy all durable state and mint a fresh client identity.
    pub fn wipe(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            "DELETE FROM messages;
             DELETE FROM groups;
             DELETE FROM configuration;",
        )?;

        let client_id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO configuration (id, client_id) VALUES (1, ?1)",
            params![client_id],
        )?;
        debug!("Wiped station store; new client id {}", client_id);
        Ok(())
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| TillerError::Database {
            message: format!("Malformed timestamp {:?}: {}", value, err),
            source: None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open_at(&temp_dir.path().join("test-station.db")).unwrap();
        (store, temp_dir)
    }

    fn sample_group(id: &str) -> Group {
        Group {
            id: id.to_string(),
            user_name: "Me".to_string(),
            friend: Friend {
                id: "friend-1".to_string(),
                name: "Ada".to_string(),
            },
        }
    }

    #[test]
    fn test_open_seeds_configuration() {
        let (store, _dir) = create_test_store();
        let config = store.configuration().unwrap();

        assert!(!config.client_id.is_empty());
        assert!(!config.is_onboarded);
        assert!(config.name.is_none());
    }

    #[test]
    fn test_reopen_keeps_identity() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("station.db");

        let first = Store::open_at(&db_path).unwrap().configuration().unwrap();
        let second = Store::open_at(&db_path).unwrap().configuration().unwrap();
        assert_eq!(first.client_id, second.client_id);
    }

    #[test]
    fn test_complete_onboarding_persists() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("station.db");

        let store = Store::open_at(&db_path).unwrap();
        store.complete_onboarding("Grace").unwrap();
        drop(store);

        let config = Store::open_at(&db_path).unwrap().configuration().unwrap();
        assert!(config.is_onboarded);
        assert_eq!(config.name.as_deref(), Some("Grace"));
    }

    #[test]
    fn test_set_name_does_not_onboard() {
        let (store, _dir) = create_test_store();
        store.set_name("Early").unwrap();

        let config = store.configuration().unwrap();
        assert_eq!(config.name.as_deref(), Some("Early"));
        assert!(!config.is_onboarded);
    }

    #[test]
    fn test_insert_group_and_lookup() {
        let (store, _dir) = create_test_store();
        let group = sample_group("g-1");

        assert!(store.insert_group(&group).unwrap());
        assert_eq!(store.group("g-1").unwrap(), Some(group));
        assert_eq!(store.group("g-missing").unwrap(), None);
    }

    #[test]
    fn test_insert_group_idempotent() {
        let (store, _dir) = create_test_store();
        let group = sample_group("g-1");

        assert!(store.insert_group(&group).unwrap());
        assert!(!store.insert_group(&group).unwrap());
        assert_eq!(store.list_groups().unwrap().len(), 1);
    }

    #[test]
    fn test_messages_roundtrip_in_order() {
        let (store, _dir) = create_test_store();
        store.insert_group(&sample_group("g-1")).unwrap();

        let outgoing = ChatMessage::Outgoing {
            sent_at: Utc::now(),
            text: "first".to_string(),
        };
        let incoming = ChatMessage::Incoming {
            received_at: Utc::now(),
            sent_at: Utc::now(),
            text: "second".to_string(),
        };
        store.push_message("g-1", &outgoing).unwrap();
        store.push_message("g-1", &incoming).unwrap();

        let messages = store.messages("g-1").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "first");
        assert_eq!(messages[1].text(), "second");
        assert!(matches!(messages[1], ChatMessage::Incoming { .. }));
    }

    #[test]
    fn test_push_message_unknown_group() {
        let (store, _dir) = create_test_store();
        let message = ChatMessage::Outgoing {
            sent_at: Utc::now(),
            text: "lost".to_string(),
        };

        match store.push_message("nope", &message) {
            Err(TillerError::GroupNotFound { group_id }) => assert_eq!(group_id, "nope"),
            other => panic!("Expected GroupNotFound, got: {:?}", other),
        }
    }

    #[test]
    fn test_wipe_resets_identity_and_state() {
        let (store, _dir) = create_test_store();
        let before = store.configuration().unwrap();
        store.complete_onboarding("Grace").unwrap();
        store.insert_group(&sample_group("g-1")).unwrap();

        store.wipe().unwrap();

        let after = store.configuration().unwrap();
        assert_ne!(before.client_id, after.client_id);
        assert!(!after.is_onboarded);
        assert!(store.list_groups().unwrap().is_empty());
    }
}
