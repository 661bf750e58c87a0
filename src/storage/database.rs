//! SQLite Database
//!
//! Embedded database for persistent storage using rusqlite with r2d2
//! connection pooling. Repository methods apply the field cipher on every
//! free-text column, so callers read and write plaintext only.
//!
//! Terminal status transitions are conditional single-row updates guarded by
//! the current status. A transition against an already-terminal row changes
//! nothing and reports `false`, which makes redelivered jobs safe no-ops.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

use crate::models::chat::{ChatMessage, MessageSender};
use crate::models::letter::{ChatStatus, InboxReply, Letter, LetterReply, LetterStatus};
use crate::models::memory::{
    bytes_to_embedding, embedding_to_bytes, MemoryChunk, MemoryDocType,
};
use crate::models::report::{Report, ReportStatus};
use crate::models::user::{CurrentProfile, FutureProfile, User};
use crate::storage::field_cipher::FieldCipher;
use crate::utils::error::{AppError, AppResult};

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database service owning the pool and the field cipher
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    cipher: FieldCipher,
}

impl Database {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>, cipher: FieldCipher) -> AppResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path.as_ref());
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool, cipher };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database for testing.
    ///
    /// Uses a single-connection pool so every caller sees the same
    /// in-memory database.
    pub fn new_in_memory(cipher: FieldCipher) -> AppResult<Self> {
        // A uniquely-named shared-cache in-memory database: every connection in
        // the pool sees the same data, while each `Database` instance stays
        // isolated from others in the process.
        let uri = format!("file:memdb-{}?mode=memory&cache=shared", Uuid::new_v4());
        let manager = SqliteConnectionManager::file(uri);
        let pool = Pool::builder()
            .max_size(10)
            .min_idle(Some(1))
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool, cipher };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> AppResult<()> {
        let conn = self.get_connection()?;

        conn.execute_batch("PRAGMA foreign_keys = ON")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL DEFAULT 'ONBOARDING',
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS current_profiles (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                demo_data TEXT,
                vals_data TEXT,
                bfi_data TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS future_profiles (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                profile_name TEXT NOT NULL,
                future_values TEXT,
                future_vision TEXT,
                future_obstacles TEXT,
                profile_description TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_future_profiles_user
             ON future_profiles(user_id)",
            [],
        )?;

        // One letter per user, enforced by the unique index as the backstop
        // behind the service-level pre-check.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS letters (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                content TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // UNIQUE(letter_id, future_profile_id) keeps a redelivered letter
        // job from duplicating a persona's reply.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS letter_replies (
                id TEXT PRIMARY KEY,
                letter_id TEXT NOT NULL,
                future_profile_id TEXT NOT NULL,
                content TEXT NOT NULL,
                chat_status TEXT NOT NULL DEFAULT 'NOT_STARTED',
                created_at TEXT NOT NULL,
                UNIQUE(letter_id, future_profile_id),
                FOREIGN KEY (letter_id) REFERENCES letters(id) ON DELETE CASCADE,
                FOREIGN KEY (future_profile_id) REFERENCES future_profiles(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chat_messages (
                id TEXT PRIMARY KEY,
                future_profile_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                sender TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (future_profile_id) REFERENCES future_profiles(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_pair
             ON chat_messages(user_id, future_profile_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT,
                status TEXT NOT NULL DEFAULT 'GENERATING',
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reports_user
             ON reports(user_id, created_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS vector_memory (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                future_profile_id TEXT,
                doc_type TEXT NOT NULL,
                text_chunk TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (future_profile_id) REFERENCES future_profiles(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_vector_memory_user
             ON vector_memory(user_id)",
            [],
        )?;

        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Get the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Check if the database is healthy
    pub fn is_healthy(&self) -> bool {
        if let Ok(conn) = self.pool.get() {
            conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
        } else {
            false
        }
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Insert a new user
    pub fn insert_user(&self, user: &User) -> AppResult<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO users (id, status, created_at) VALUES (?1, ?2, ?3)",
            params![user.id.to_string(), user.status, user.created_at],
        )?;
        Ok(())
    }

    /// Insert or replace the current profile for a user
    pub fn upsert_current_profile(&self, profile: &CurrentProfile) -> AppResult<()> {
        let conn = self.get_connection()?;
        let demo = profile
            .demo_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let vals = profile
            .vals_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let bfi = profile
            .bfi_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            "INSERT INTO current_profiles (id, user_id, demo_data, vals_data, bfi_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                 demo_data = ?3, vals_data = ?4, bfi_data = ?5",
            params![
                profile.id.to_string(),
                profile.user_id.to_string(),
                demo,
                vals,
                bfi,
                profile.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get the current profile for a user
    pub fn get_current_profile(&self, user_id: Uuid) -> AppResult<Option<CurrentProfile>> {
        let conn = self.get_connection()?;
        let result = conn
            .query_row(
                "SELECT id, user_id, demo_data, vals_data, bfi_data, created_at
                 FROM current_profiles WHERE user_id = ?1",
                params![user_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        match result {
            Some((id, uid, demo, vals, bfi, created_at)) => Ok(Some(CurrentProfile {
                id: parse_uuid(&id)?,
                user_id: parse_uuid(&uid)?,
                demo_data: demo.as_deref().map(serde_json::from_str).transpose()?,
                vals_data: vals.as_deref().map(serde_json::from_str).transpose()?,
                bfi_data: bfi.as_deref().map(serde_json::from_str).transpose()?,
                created_at,
            })),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Future Profile Operations
    // ========================================================================

    /// Insert a new future profile (persona). Narrative fields are encrypted.
    pub fn insert_future_profile(&self, profile: &FutureProfile) -> AppResult<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO future_profiles
                 (id, user_id, profile_name, future_values, future_vision,
                  future_obstacles, profile_description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                profile.id.to_string(),
                profile.user_id.to_string(),
                profile.profile_name,
                self.cipher.encode_opt(profile.future_values.as_deref())?,
                self.cipher.encode_opt(profile.future_vision.as_deref())?,
                self.cipher.encode_opt(profile.future_obstacles.as_deref())?,
                self.cipher
                    .encode_opt(profile.profile_description.as_deref())?,
                profile.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a future profile by id
    pub fn get_future_profile(&self, id: Uuid) -> AppResult<Option<FutureProfile>> {
        let conn = self.get_connection()?;
        let raw = conn
            .query_row(
                "SELECT id, user_id, profile_name, future_values, future_vision,
                        future_obstacles, profile_description, created_at
                 FROM future_profiles WHERE id = ?1",
                params![id.to_string()],
                Self::raw_future_profile,
            )
            .optional()?;
        raw.map(|r| self.decode_future_profile(r)).transpose()
    }

    /// List all future profiles for a user, oldest first
    pub fn list_future_profiles(&self, user_id: Uuid) -> AppResult<Vec<FutureProfile>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, profile_name, future_values, future_vision,
                    future_obstacles, profile_description, created_at
             FROM future_profiles WHERE user_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let raws: Vec<RawFutureProfile> = stmt
            .query_map(params![user_id.to_string()], Self::raw_future_profile)?
            .collect::<Result<_, _>>()?;
        raws.into_iter()
            .map(|r| self.decode_future_profile(r))
            .collect()
    }

    fn raw_future_profile(row: &rusqlite::Row) -> rusqlite::Result<RawFutureProfile> {
        Ok(RawFutureProfile {
            id: row.get(0)?,
            user_id: row.get(1)?,
            profile_name: row.get(2)?,
            future_values: row.get(3)?,
            future_vision: row.get(4)?,
            future_obstacles: row.get(5)?,
            profile_description: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn decode_future_profile(&self, raw: RawFutureProfile) -> AppResult<FutureProfile> {
        Ok(FutureProfile {
            id: parse_uuid(&raw.id)?,
            user_id: parse_uuid(&raw.user_id)?,
            profile_name: raw.profile_name,
            future_values: self.cipher.decode_opt(raw.future_values.as_deref())?,
            future_vision: self.cipher.decode_opt(raw.future_vision.as_deref())?,
            future_obstacles: self.cipher.decode_opt(raw.future_obstacles.as_deref())?,
            profile_description: self
                .cipher
                .decode_opt(raw.profile_description.as_deref())?,
            created_at: raw.created_at,
        })
    }

    // ========================================================================
    // Letter Operations
    // ========================================================================

    /// Insert a new letter with encrypted content
    pub fn insert_letter(&self, letter: &Letter) -> AppResult<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO letters (id, user_id, content, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                letter.id.to_string(),
                letter.user_id.to_string(),
                self.cipher.encode(&letter.content)?,
                letter.status.as_str(),
                letter.created_at,
            ],
        )?;
        Ok(())
    }

    /// Whether the user has already submitted a letter
    pub fn letter_exists_for_user(&self, user_id: Uuid) -> AppResult<bool> {
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM letters WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get a letter by id
    pub fn get_letter(&self, id: Uuid) -> AppResult<Option<Letter>> {
        let conn = self.get_connection()?;
        let raw = conn
            .query_row(
                "SELECT id, user_id, content, status, created_at FROM letters WHERE id = ?1",
                params![id.to_string()],
                Self::raw_letter,
            )
            .optional()?;
        raw.map(|r| self.decode_letter(r)).transpose()
    }

    /// Get the user's most recent letter
    pub fn latest_letter_for_user(&self, user_id: Uuid) -> AppResult<Option<Letter>> {
        let conn = self.get_connection()?;
        let raw = conn
            .query_row(
                "SELECT id, user_id, content, status, created_at FROM letters
                 WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![user_id.to_string()],
                Self::raw_letter,
            )
            .optional()?;
        raw.map(|r| self.decode_letter(r)).transpose()
    }

    fn raw_letter(row: &rusqlite::Row) -> rusqlite::Result<RawLetter> {
        Ok(RawLetter {
            id: row.get(0)?,
            user_id: row.get(1)?,
            content: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn decode_letter(&self, raw: RawLetter) -> AppResult<Letter> {
        Ok(Letter {
            id: parse_uuid(&raw.id)?,
            user_id: parse_uuid(&raw.user_id)?,
            content: self.cipher.decode(&raw.content)?,
            status: LetterStatus::from_str_value(&raw.status)
                .ok_or_else(|| AppError::database(format!("Unknown letter status: {}", raw.status)))?,
            created_at: raw.created_at,
        })
    }

    /// Commit the letter job's success: insert all replies and flip the
    /// letter PENDING -> REPLIES_READY in one transaction.
    ///
    /// Returns `false` without writing anything if the letter already left
    /// PENDING (redelivered job).
    pub fn complete_letter_with_replies(
        &self,
        letter_id: Uuid,
        replies: &[LetterReply],
    ) -> AppResult<bool> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE letters SET status = ?2 WHERE id = ?1 AND status = ?3",
            params![
                letter_id.to_string(),
                LetterStatus::RepliesReady.as_str(),
                LetterStatus::Pending.as_str(),
            ],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        for reply in replies {
            tx.execute(
                "INSERT INTO letter_replies
                     (id, letter_id, future_profile_id, content, chat_status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    reply.id.to_string(),
                    reply.letter_id.to_string(),
                    reply.future_profile_id.to_string(),
                    self.cipher.encode(&reply.content)?,
                    reply.chat_status.as_str(),
                    reply.created_at,
                ],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    /// Delete a letter row. Used to compensate a failed submission before
    /// any job was enqueued.
    pub fn delete_letter(&self, letter_id: Uuid) -> AppResult<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "DELETE FROM letters WHERE id = ?1",
            params![letter_id.to_string()],
        )?;
        Ok(())
    }

    /// Flip a letter PENDING -> FAILED. Returns `false` if already terminal.
    pub fn mark_letter_failed(&self, letter_id: Uuid) -> AppResult<bool> {
        let conn = self.get_connection()?;
        let changed = conn.execute(
            "UPDATE letters SET status = ?2 WHERE id = ?1 AND status = ?3",
            params![
                letter_id.to_string(),
                LetterStatus::Failed.as_str(),
                LetterStatus::Pending.as_str(),
            ],
        )?;
        Ok(changed > 0)
    }

    // ========================================================================
    // Letter Reply Operations
    // ========================================================================

    /// Get a reply together with its persona name and the owning user id.
    pub fn get_reply_view(&self, reply_id: Uuid) -> AppResult<Option<(LetterReply, String, Uuid)>> {
        let conn = self.get_connection()?;
        let raw = conn
            .query_row(
                "SELECT r.id, r.letter_id, r.future_profile_id, r.content, r.chat_status,
                        r.created_at, p.profile_name, l.user_id
                 FROM letter_replies r
                 JOIN letters l ON r.letter_id = l.id
                 JOIN future_profiles p ON r.future_profile_id = p.id
                 WHERE r.id = ?1",
                params![reply_id.to_string()],
                |row| {
                    Ok((
                        RawReply {
                            id: row.get(0)?,
                            letter_id: row.get(1)?,
                            future_profile_id: row.get(2)?,
                            content: row.get(3)?,
                            chat_status: row.get(4)?,
                            created_at: row.get(5)?,
                        },
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;

        match raw {
            Some((raw_reply, profile_name, owner)) => Ok(Some((
                self.decode_reply(raw_reply)?,
                profile_name,
                parse_uuid(&owner)?,
            ))),
            None => Ok(None),
        }
    }

    /// Inbox listing for a letter: reply ids with persona names and chat
    /// status, content omitted.
    pub fn list_inbox_replies(&self, letter_id: Uuid) -> AppResult<Vec<InboxReply>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.future_profile_id, p.profile_name, r.chat_status
             FROM letter_replies r
             JOIN future_profiles p ON r.future_profile_id = p.id
             WHERE r.letter_id = ?1
             ORDER BY r.created_at ASC, r.rowid ASC",
        )?;
        let rows: Vec<(String, String, String, String)> = stmt
            .query_map(params![letter_id.to_string()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<_, _>>()?;

        rows.into_iter()
            .map(|(id, profile_id, name, chat_status)| {
                Ok(InboxReply {
                    reply_id: parse_uuid(&id)?,
                    future_profile_id: parse_uuid(&profile_id)?,
                    from_profile_name: name,
                    chat_status: ChatStatus::from_str_value(&chat_status).ok_or_else(|| {
                        AppError::database(format!("Unknown chat status: {}", chat_status))
                    })?,
                })
            })
            .collect()
    }

    /// The reply a persona wrote for the user's letter, if any.
    pub fn reply_for_persona(&self, future_profile_id: Uuid) -> AppResult<Option<LetterReply>> {
        let conn = self.get_connection()?;
        let raw = conn
            .query_row(
                "SELECT id, letter_id, future_profile_id, content, chat_status, created_at
                 FROM letter_replies WHERE future_profile_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![future_profile_id.to_string()],
                |row| {
                    Ok(RawReply {
                        id: row.get(0)?,
                        letter_id: row.get(1)?,
                        future_profile_id: row.get(2)?,
                        content: row.get(3)?,
                        chat_status: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        raw.map(|r| self.decode_reply(r)).transpose()
    }

    fn decode_reply(&self, raw: RawReply) -> AppResult<LetterReply> {
        Ok(LetterReply {
            id: parse_uuid(&raw.id)?,
            letter_id: parse_uuid(&raw.letter_id)?,
            future_profile_id: parse_uuid(&raw.future_profile_id)?,
            content: self.cipher.decode(&raw.content)?,
            chat_status: ChatStatus::from_str_value(&raw.chat_status).ok_or_else(|| {
                AppError::database(format!("Unknown chat status: {}", raw.chat_status))
            })?,
            created_at: raw.created_at,
        })
    }

    // ========================================================================
    // Chat Operations
    // ========================================================================

    /// Count USER turns for a (user, persona) pair
    pub fn count_user_turns(&self, user_id: Uuid, future_profile_id: Uuid) -> AppResult<u32> {
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_messages
             WHERE user_id = ?1 AND future_profile_id = ?2 AND sender = 'USER'",
            params![user_id.to_string(), future_profile_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Full conversation history for a pair, oldest first
    pub fn list_chat_messages(
        &self,
        user_id: Uuid,
        future_profile_id: Uuid,
    ) -> AppResult<Vec<ChatMessage>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, future_profile_id, user_id, sender, content, created_at
             FROM chat_messages
             WHERE user_id = ?1 AND future_profile_id = ?2
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let raws: Vec<RawChatMessage> = stmt
            .query_map(
                params![user_id.to_string(), future_profile_id.to_string()],
                |row| {
                    Ok(RawChatMessage {
                        id: row.get(0)?,
                        future_profile_id: row.get(1)?,
                        user_id: row.get(2)?,
                        sender: row.get(3)?,
                        content: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )?
            .collect::<Result<_, _>>()?;
        raws.into_iter().map(|r| self.decode_chat(r)).collect()
    }

    /// Conversation history across every persona for a user, oldest first
    pub fn list_chat_messages_for_user(&self, user_id: Uuid) -> AppResult<Vec<ChatMessage>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, future_profile_id, user_id, sender, content, created_at
             FROM chat_messages
             WHERE user_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let raws: Vec<RawChatMessage> = stmt
            .query_map(params![user_id.to_string()], |row| {
                Ok(RawChatMessage {
                    id: row.get(0)?,
                    future_profile_id: row.get(1)?,
                    user_id: row.get(2)?,
                    sender: row.get(3)?,
                    content: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<_, _>>()?;
        raws.into_iter().map(|r| self.decode_chat(r)).collect()
    }

    /// Commit one accepted exchange: optionally consume the persona's reply
    /// (first turn), then insert the USER and AGENT turns, all in one
    /// transaction so a failed generation persists nothing.
    pub fn append_exchange(
        &self,
        user_msg: &ChatMessage,
        agent_msg: &ChatMessage,
        open_reply: bool,
    ) -> AppResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        if open_reply {
            tx.execute(
                "UPDATE letter_replies SET chat_status = ?2
                 WHERE future_profile_id = ?1 AND chat_status = ?3",
                params![
                    user_msg.future_profile_id.to_string(),
                    ChatStatus::Completed.as_str(),
                    ChatStatus::NotStarted.as_str(),
                ],
            )?;
        }

        for msg in [user_msg, agent_msg] {
            tx.execute(
                "INSERT INTO chat_messages (id, future_profile_id, user_id, sender, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    msg.id.to_string(),
                    msg.future_profile_id.to_string(),
                    msg.user_id.to_string(),
                    msg.sender.as_str(),
                    self.cipher.encode(&msg.content)?,
                    msg.created_at,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn decode_chat(&self, raw: RawChatMessage) -> AppResult<ChatMessage> {
        Ok(ChatMessage {
            id: parse_uuid(&raw.id)?,
            future_profile_id: parse_uuid(&raw.future_profile_id)?,
            user_id: parse_uuid(&raw.user_id)?,
            sender: MessageSender::from_str_value(&raw.sender)
                .ok_or_else(|| AppError::database(format!("Unknown sender: {}", raw.sender)))?,
            content: self.cipher.decode(&raw.content)?,
            created_at: raw.created_at,
        })
    }

    // ========================================================================
    // Report Operations
    // ========================================================================

    /// Insert a new report row
    pub fn insert_report(&self, report: &Report) -> AppResult<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO reports (id, user_id, content, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                report.id.to_string(),
                report.user_id.to_string(),
                self.cipher.encode_opt(report.content.as_deref())?,
                report.status.as_str(),
                report.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a report by id
    pub fn get_report(&self, id: Uuid) -> AppResult<Option<Report>> {
        let conn = self.get_connection()?;
        let raw = conn
            .query_row(
                "SELECT id, user_id, content, status, created_at FROM reports WHERE id = ?1",
                params![id.to_string()],
                Self::raw_report,
            )
            .optional()?;
        raw.map(|r| self.decode_report(r)).transpose()
    }

    /// The user's most recent report regardless of status
    pub fn latest_report_for_user(&self, user_id: Uuid) -> AppResult<Option<Report>> {
        let conn = self.get_connection()?;
        let raw = conn
            .query_row(
                "SELECT id, user_id, content, status, created_at FROM reports
                 WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![user_id.to_string()],
                Self::raw_report,
            )
            .optional()?;
        raw.map(|r| self.decode_report(r)).transpose()
    }

    /// The user's most recent READY report
    pub fn latest_ready_report(&self, user_id: Uuid) -> AppResult<Option<Report>> {
        let conn = self.get_connection()?;
        let raw = conn
            .query_row(
                "SELECT id, user_id, content, status, created_at FROM reports
                 WHERE user_id = ?1 AND status = 'READY'
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![user_id.to_string()],
                Self::raw_report,
            )
            .optional()?;
        raw.map(|r| self.decode_report(r)).transpose()
    }

    fn raw_report(row: &rusqlite::Row) -> rusqlite::Result<RawReport> {
        Ok(RawReport {
            id: row.get(0)?,
            user_id: row.get(1)?,
            content: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn decode_report(&self, raw: RawReport) -> AppResult<Report> {
        Ok(Report {
            id: parse_uuid(&raw.id)?,
            user_id: parse_uuid(&raw.user_id)?,
            content: self.cipher.decode_opt(raw.content.as_deref())?,
            status: ReportStatus::from_str_value(&raw.status)
                .ok_or_else(|| AppError::database(format!("Unknown report status: {}", raw.status)))?,
            created_at: raw.created_at,
        })
    }

    /// Commit the report job's success: store the raw generator output and
    /// flip GENERATING -> READY in one statement.
    ///
    /// Returns `false` if the report already left GENERATING.
    pub fn complete_report(&self, report_id: Uuid, content: &str) -> AppResult<bool> {
        let conn = self.get_connection()?;
        let changed = conn.execute(
            "UPDATE reports SET content = ?2, status = ?3
             WHERE id = ?1 AND status = ?4",
            params![
                report_id.to_string(),
                self.cipher.encode(content)?,
                ReportStatus::Ready.as_str(),
                ReportStatus::Generating.as_str(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Flip a report GENERATING -> FAILED. Returns `false` if already terminal.
    pub fn mark_report_failed(&self, report_id: Uuid) -> AppResult<bool> {
        let conn = self.get_connection()?;
        let changed = conn.execute(
            "UPDATE reports SET status = ?2 WHERE id = ?1 AND status = ?3",
            params![
                report_id.to_string(),
                ReportStatus::Failed.as_str(),
                ReportStatus::Generating.as_str(),
            ],
        )?;
        Ok(changed > 0)
    }

    // ========================================================================
    // Vector Memory Operations
    // ========================================================================

    /// Insert a memory chunk. The excerpt is encrypted; the embedding is
    /// stored as a little-endian f32 BLOB.
    pub fn insert_memory_chunk(&self, chunk: &MemoryChunk) -> AppResult<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO vector_memory
                 (id, user_id, future_profile_id, doc_type, text_chunk, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                chunk.id.to_string(),
                chunk.user_id.to_string(),
                chunk.future_profile_id.map(|p| p.to_string()),
                chunk.doc_type.as_str(),
                self.cipher.encode(&chunk.text_chunk)?,
                embedding_to_bytes(&chunk.embedding),
                chunk.created_at,
            ],
        )?;
        Ok(())
    }

    /// Candidate chunks for retrieval.
    ///
    /// With a persona scope: user-wide chunks (no persona) plus chunks for
    /// that persona. Without: everything the user owns.
    pub fn list_memory_chunks(
        &self,
        user_id: Uuid,
        persona_scope: Option<Uuid>,
    ) -> AppResult<Vec<MemoryChunk>> {
        let conn = self.get_connection()?;

        let (sql, params_vec): (&str, Vec<String>) = match persona_scope {
            Some(persona) => (
                "SELECT id, user_id, future_profile_id, doc_type, text_chunk, embedding, created_at
                 FROM vector_memory
                 WHERE user_id = ?1 AND (future_profile_id IS NULL OR future_profile_id = ?2)
                 ORDER BY created_at ASC, rowid ASC",
                vec![user_id.to_string(), persona.to_string()],
            ),
            None => (
                "SELECT id, user_id, future_profile_id, doc_type, text_chunk, embedding, created_at
                 FROM vector_memory WHERE user_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
                vec![user_id.to_string()],
            ),
        };

        let mut stmt = conn.prepare(sql)?;
        let raws: Vec<RawMemoryChunk> = stmt
            .query_map(rusqlite::params_from_iter(params_vec.iter()), |row| {
                Ok(RawMemoryChunk {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    future_profile_id: row.get(2)?,
                    doc_type: row.get(3)?,
                    text_chunk: row.get(4)?,
                    embedding: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<_, _>>()?;

        raws.into_iter()
            .map(|raw| {
                Ok(MemoryChunk {
                    id: parse_uuid(&raw.id)?,
                    user_id: parse_uuid(&raw.user_id)?,
                    future_profile_id: raw
                        .future_profile_id
                        .as_deref()
                        .map(parse_uuid)
                        .transpose()?,
                    doc_type: MemoryDocType::from_str_value(&raw.doc_type).ok_or_else(|| {
                        AppError::database(format!("Unknown doc type: {}", raw.doc_type))
                    })?,
                    text_chunk: self.cipher.decode(&raw.text_chunk)?,
                    embedding: bytes_to_embedding(&raw.embedding),
                    created_at: raw.created_at,
                })
            })
            .collect()
    }

    /// Raw (encrypted) column value, for asserting encryption at rest in tests.
    #[cfg(test)]
    pub fn raw_letter_content(&self, letter_id: Uuid) -> AppResult<String> {
        let conn = self.get_connection()?;
        Ok(conn.query_row(
            "SELECT content FROM letters WHERE id = ?1",
            params![letter_id.to_string()],
            |row| row.get(0),
        )?)
    }
}

fn parse_uuid(s: &str) -> AppResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::database(format!("Invalid UUID in database: {}", e)))
}

struct RawMemoryChunk {
    id: String,
    user_id: String,
    future_profile_id: Option<String>,
    doc_type: String,
    text_chunk: String,
    embedding: Vec<u8>,
    created_at: String,
}

struct RawFutureProfile {
    id: String,
    user_id: String,
    profile_name: String,
    future_values: Option<String>,
    future_vision: Option<String>,
    future_obstacles: Option<String>,
    profile_description: Option<String>,
    created_at: String,
}

struct RawLetter {
    id: String,
    user_id: String,
    content: String,
    status: String,
    created_at: String,
}

struct RawReply {
    id: String,
    letter_id: String,
    future_profile_id: String,
    content: String,
    chat_status: String,
    created_at: String,
}

struct RawChatMessage {
    id: String,
    future_profile_id: String,
    user_id: String,
    sender: String,
    content: String,
    created_at: String,
}

struct RawReport {
    id: String,
    user_id: String,
    content: Option<String>,
    status: String,
    created_at: String,
}
