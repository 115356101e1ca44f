use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::models::*;

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`. Every call is a separate
/// round trip; nothing holds the lock across an `.await`.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Only for startup and tests.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, BoardDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to encode JSON column")
}

/// Board settings update. `None` leaves a field untouched; `Some(None)`
/// clears a nullable one.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct BoardChanges {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub icon: Option<Option<String>>,
    pub is_public: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub display_order: Option<Option<i64>>,
    pub custom_column_types: Option<Vec<CustomColumnType>>,
}

pub struct BoardDb {
    conn: Connection,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    // Referential integrity is the caller's job: no foreign keys, cascades
    // are explicit in the delete methods below.
    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    username TEXT NOT NULL UNIQUE,
                    display_name TEXT NOT NULL,
                    email TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS boards (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    description TEXT,
                    icon TEXT,
                    owner_id TEXT NOT NULL,
                    members TEXT NOT NULL DEFAULT '[]',
                    is_public INTEGER NOT NULL DEFAULT 0,
                    custom_column_types TEXT NOT NULL DEFAULT '[]',
                    display_order INTEGER,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS columns (
                    id TEXT PRIMARY KEY,
                    board_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    column_type TEXT,
                    position INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS cards (
                    id TEXT PRIMARY KEY,
                    column_id TEXT NOT NULL,
                    board_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT,
                    due_date TEXT,
                    color TEXT,
                    story_points INTEGER,
                    time_estimate INTEGER,
                    time_spent INTEGER,
                    assignees TEXT NOT NULL DEFAULT '[]',
                    labels TEXT NOT NULL DEFAULT '[]',
                    position INTEGER NOT NULL DEFAULT 0,
                    created_by TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS labels (
                    id TEXT PRIMARY KEY,
                    board_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    color TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS comments (
                    id TEXT PRIMARY KEY,
                    card_id TEXT NOT NULL,
                    board_id TEXT NOT NULL,
                    author_id TEXT NOT NULL,
                    body TEXT NOT NULL,
                    mentions TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS messages (
                    id TEXT PRIMARY KEY,
                    board_id TEXT NOT NULL,
                    author_id TEXT NOT NULL,
                    body TEXT NOT NULL,
                    mentions TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS notifications (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    board_id TEXT NOT NULL,
                    card_id TEXT,
                    kind TEXT NOT NULL,
                    message TEXT NOT NULL,
                    read INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS activities (
                    id TEXT PRIMARY KEY,
                    board_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    card_id TEXT,
                    kind TEXT NOT NULL,
                    metadata TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_boards_owner ON boards(owner_id);
                CREATE INDEX IF NOT EXISTS idx_columns_board ON columns(board_id, position);
                CREATE INDEX IF NOT EXISTS idx_cards_column ON cards(column_id, position);
                CREATE INDEX IF NOT EXISTS idx_cards_board ON cards(board_id);
                CREATE INDEX IF NOT EXISTS idx_labels_board ON labels(board_id);
                CREATE INDEX IF NOT EXISTS idx_comments_card ON comments(card_id);
                CREATE INDEX IF NOT EXISTS idx_messages_board ON messages(board_id);
                CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);
                CREATE INDEX IF NOT EXISTS idx_activities_board ON activities(board_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────

    pub fn create_user(
        &self,
        username: &str,
        display_name: &str,
        email: Option<&str>,
    ) -> Result<User> {
        let id = new_id();
        self.conn
            .execute(
                "INSERT INTO users (id, username, display_name, email, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, username, display_name, email, now()],
            )
            .context("Failed to insert user")?;
        self.get_user(&id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, username, display_name, email, created_at FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()
            .context("Failed to query user")
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, username, display_name, email, created_at FROM users WHERE lower(username) = lower(?1)",
                params![username],
                user_from_row,
            )
            .optional()
            .context("Failed to query user by username")
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, username, display_name, email, created_at FROM users ORDER BY username")
            .context("Failed to prepare list_users")?;
        let rows = stmt
            .query_map([], user_from_row)
            .context("Failed to query users")?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row.context("Failed to read user row")?);
        }
        Ok(users)
    }

    // ── Boards ────────────────────────────────────────────────────────

    pub fn create_board(
        &self,
        owner_id: &str,
        name: &str,
        description: Option<&str>,
        icon: Option<&str>,
        is_public: bool,
    ) -> Result<Board> {
        let id = new_id();
        self.conn
            .execute(
                "INSERT INTO boards (id, name, description, icon, owner_id, is_public, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, name, description, icon, owner_id, is_public, now()],
            )
            .context("Failed to insert board")?;
        self.get_board(&id)?.context("Board not found after insert")
    }

    pub fn get_board(&self, id: &str) -> Result<Option<Board>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, description, icon, owner_id, members, is_public, custom_column_types, display_order, created_at
                 FROM boards WHERE id = ?1",
                params![id],
                BoardRow::from_row,
            )
            .optional()
            .context("Failed to query board")?;
        row.map(BoardRow::into_board).transpose()
    }

    /// Boards the user owns or is a member of.
    pub fn list_boards_for_user(&self, user_id: &str) -> Result<Vec<Board>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, description, icon, owner_id, members, is_public, custom_column_types, display_order, created_at
                 FROM boards
                 WHERE owner_id = ?1 OR EXISTS (SELECT 1 FROM json_each(boards.members) WHERE value = ?1)
                 ORDER BY display_order IS NULL, display_order, created_at, rowid",
            )
            .context("Failed to prepare list_boards_for_user")?;
        let rows = stmt
            .query_map(params![user_id], BoardRow::from_row)
            .context("Failed to query boards")?;
        let mut boards = Vec::new();
        for row in rows {
            let r = row.context("Failed to read board row")?;
            boards.push(r.into_board()?);
        }
        Ok(boards)
    }

    pub fn update_board(&self, id: &str, changes: &BoardChanges) -> Result<Board> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if let Some(name) = &changes.name {
            tx.execute("UPDATE boards SET name = ?1 WHERE id = ?2", params![name, id])
                .context("Failed to update board name")?;
        }
        if let Some(description) = &changes.description {
            tx.execute(
                "UPDATE boards SET description = ?1 WHERE id = ?2",
                params![description, id],
            )
            .context("Failed to update board description")?;
        }
        if let Some(icon) = &changes.icon {
            tx.execute("UPDATE boards SET icon = ?1 WHERE id = ?2", params![icon, id])
                .context("Failed to update board icon")?;
        }
        if let Some(is_public) = changes.is_public {
            tx.execute(
                "UPDATE boards SET is_public = ?1 WHERE id = ?2",
                params![is_public, id],
            )
            .context("Failed to update board visibility")?;
        }
        if let Some(display_order) = &changes.display_order {
            tx.execute(
                "UPDATE boards SET display_order = ?1 WHERE id = ?2",
                params![display_order, id],
            )
            .context("Failed to update board display order")?;
        }
        if let Some(types) = &changes.custom_column_types {
            tx.execute(
                "UPDATE boards SET custom_column_types = ?1 WHERE id = ?2",
                params![to_json(types)?, id],
            )
            .context("Failed to update custom column types")?;
        }

        tx.commit().context("Failed to commit board update")?;
        self.get_board(id)?.context("Board not found after update")
    }

    pub fn set_board_members(&self, id: &str, members: &[String]) -> Result<Board> {
        self.conn
            .execute(
                "UPDATE boards SET members = ?1 WHERE id = ?2",
                params![to_json(&members)?, id],
            )
            .context("Failed to update board members")?;
        self.get_board(id)?
            .context("Board not found after members update")
    }

    /// Delete a board and everything beneath it. Returns false if absent.
    pub fn delete_board(&self, id: &str) -> Result<bool> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        for table in [
            "comments",
            "cards",
            "columns",
            "labels",
            "messages",
            "notifications",
            "activities",
        ] {
            tx.execute(
                &format!("DELETE FROM {} WHERE board_id = ?1", table),
                params![id],
            )
            .with_context(|| format!("Failed to cascade board delete into {}", table))?;
        }
        let count = tx
            .execute("DELETE FROM boards WHERE id = ?1", params![id])
            .context("Failed to delete board")?;
        tx.commit().context("Failed to commit board delete")?;
        Ok(count > 0)
    }

    // ── Columns ───────────────────────────────────────────────────────

    pub fn create_column(
        &self,
        board_id: &str,
        name: &str,
        column_type: Option<&ColumnType>,
    ) -> Result<Column> {
        let max_pos: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(position), -1) FROM columns WHERE board_id = ?1",
                params![board_id],
                |row| row.get(0),
            )
            .context("Failed to get max column position")?;
        let id = new_id();
        self.conn
            .execute(
                "INSERT INTO columns (id, board_id, name, column_type, position) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, board_id, name, column_type.map(|t| t.as_str()), max_pos + 1],
            )
            .context("Failed to insert column")?;
        self.get_column(&id)?.context("Column not found after insert")
    }

    pub fn get_column(&self, id: &str) -> Result<Option<Column>> {
        self.conn
            .query_row(
                "SELECT id, board_id, name, column_type, position FROM columns WHERE id = ?1",
                params![id],
                column_from_row,
            )
            .optional()
            .context("Failed to query column")
    }

    pub fn list_columns(&self, board_id: &str) -> Result<Vec<Column>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, board_id, name, column_type, position FROM columns WHERE board_id = ?1 ORDER BY position",
            )
            .context("Failed to prepare list_columns")?;
        let rows = stmt
            .query_map(params![board_id], column_from_row)
            .context("Failed to query columns")?;
        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.context("Failed to read column row")?);
        }
        Ok(columns)
    }

    pub fn update_column(
        &self,
        id: &str,
        name: Option<&str>,
        column_type: Option<&ColumnType>,
    ) -> Result<Column> {
        if let Some(n) = name {
            self.conn
                .execute("UPDATE columns SET name = ?1 WHERE id = ?2", params![n, id])
                .context("Failed to rename column")?;
        }
        if let Some(t) = column_type {
            self.conn
                .execute(
                    "UPDATE columns SET column_type = ?1 WHERE id = ?2",
                    params![t.as_str(), id],
                )
                .context("Failed to update column type")?;
        }
        self.get_column(id)?.context("Column not found after update")
    }

    /// Delete a column together with its cards and their comments.
    pub fn delete_column(&self, id: &str) -> Result<bool> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "DELETE FROM comments WHERE card_id IN (SELECT id FROM cards WHERE column_id = ?1)",
            params![id],
        )
        .context("Failed to delete column card comments")?;
        tx.execute("DELETE FROM cards WHERE column_id = ?1", params![id])
            .context("Failed to delete column cards")?;
        let count = tx
            .execute("DELETE FROM columns WHERE id = ?1", params![id])
            .context("Failed to delete column")?;
        tx.commit().context("Failed to commit column delete")?;
        Ok(count > 0)
    }

    // ── Cards ─────────────────────────────────────────────────────────

    pub fn insert_card(&self, card: &NewCard) -> Result<Card> {
        let id = new_id();
        self.conn
            .execute(
                "INSERT INTO cards (id, column_id, board_id, title, description, position, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    card.column_id,
                    card.board_id,
                    card.title,
                    card.description,
                    card.order,
                    card.created_by,
                    now()
                ],
            )
            .context("Failed to insert card")?;
        self.get_card(&id)?.context("Card not found after insert")
    }

    pub fn get_card(&self, id: &str) -> Result<Option<Card>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM cards WHERE id = ?1", CARD_COLUMNS),
                params![id],
                CardRow::from_row,
            )
            .optional()
            .context("Failed to query card")?;
        row.map(CardRow::into_card).transpose()
    }

    /// Cards currently in a column, ascending by order.
    pub fn list_cards_in_column(&self, column_id: &str) -> Result<Vec<Card>> {
        self.query_cards(
            &format!(
                "SELECT {} FROM cards WHERE column_id = ?1 ORDER BY position, rowid",
                CARD_COLUMNS
            ),
            column_id,
        )
    }

    pub fn list_cards_for_board(&self, board_id: &str) -> Result<Vec<Card>> {
        self.query_cards(
            &format!(
                "SELECT {} FROM cards WHERE board_id = ?1 ORDER BY column_id, position, rowid",
                CARD_COLUMNS
            ),
            board_id,
        )
    }

    fn query_cards(&self, sql: &str, key: &str) -> Result<Vec<Card>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare card query")?;
        let rows = stmt
            .query_map(params![key], CardRow::from_row)
            .context("Failed to query cards")?;
        let mut cards = Vec::new();
        for row in rows {
            let r = row.context("Failed to read card row")?;
            cards.push(r.into_card()?);
        }
        Ok(cards)
    }

    /// Write a card's `(column_id, order)` position.
    pub fn set_card_position(&self, id: &str, column_id: &str, order: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE cards SET column_id = ?1, position = ?2 WHERE id = ?3",
                params![column_id, order, id],
            )
            .context("Failed to update card position")?;
        Ok(())
    }

    pub fn update_card(&self, id: &str, changes: &CardChanges) -> Result<Card> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if let Some(title) = &changes.title {
            tx.execute("UPDATE cards SET title = ?1 WHERE id = ?2", params![title, id])
                .context("Failed to update card title")?;
        }
        if let Some(description) = &changes.description {
            tx.execute(
                "UPDATE cards SET description = ?1 WHERE id = ?2",
                params![description, id],
            )
            .context("Failed to update card description")?;
        }
        if let Some(due_date) = &changes.due_date {
            tx.execute(
                "UPDATE cards SET due_date = ?1 WHERE id = ?2",
                params![due_date, id],
            )
            .context("Failed to update card due date")?;
        }
        if let Some(color) = &changes.color {
            tx.execute("UPDATE cards SET color = ?1 WHERE id = ?2", params![color, id])
                .context("Failed to update card color")?;
        }
        if let Some(points) = &changes.story_points {
            tx.execute(
                "UPDATE cards SET story_points = ?1 WHERE id = ?2",
                params![points, id],
            )
            .context("Failed to update card story points")?;
        }
        if let Some(estimate) = &changes.time_estimate {
            tx.execute(
                "UPDATE cards SET time_estimate = ?1 WHERE id = ?2",
                params![estimate, id],
            )
            .context("Failed to update card time estimate")?;
        }
        if let Some(spent) = &changes.time_spent {
            tx.execute(
                "UPDATE cards SET time_spent = ?1 WHERE id = ?2",
                params![spent, id],
            )
            .context("Failed to update card time spent")?;
        }
        if let Some(assignees) = &changes.assignees {
            tx.execute(
                "UPDATE cards SET assignees = ?1 WHERE id = ?2",
                params![to_json(assignees)?, id],
            )
            .context("Failed to update card assignees")?;
        }
        if let Some(labels) = &changes.labels {
            tx.execute(
                "UPDATE cards SET labels = ?1 WHERE id = ?2",
                params![to_json(labels)?, id],
            )
            .context("Failed to update card labels")?;
        }

        tx.commit().context("Failed to commit card update")?;
        self.get_card(id)?.context("Card not found after update")
    }

    pub fn delete_card(&self, id: &str) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM cards WHERE id = ?1", params![id])
            .context("Failed to delete card")?;
        Ok(count > 0)
    }

    // ── Labels ────────────────────────────────────────────────────────

    pub fn create_label(&self, board_id: &str, name: &str, color: &str) -> Result<Label> {
        let id = new_id();
        self.conn
            .execute(
                "INSERT INTO labels (id, board_id, name, color) VALUES (?1, ?2, ?3, ?4)",
                params![id, board_id, name, color],
            )
            .context("Failed to insert label")?;
        self.get_label(&id)?.context("Label not found after insert")
    }

    pub fn get_label(&self, id: &str) -> Result<Option<Label>> {
        self.conn
            .query_row(
                "SELECT id, board_id, name, color FROM labels WHERE id = ?1",
                params![id],
                label_from_row,
            )
            .optional()
            .context("Failed to query label")
    }

    pub fn list_labels(&self, board_id: &str) -> Result<Vec<Label>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, board_id, name, color FROM labels WHERE board_id = ?1 ORDER BY name")
            .context("Failed to prepare list_labels")?;
        let rows = stmt
            .query_map(params![board_id], label_from_row)
            .context("Failed to query labels")?;
        let mut labels = Vec::new();
        for row in rows {
            labels.push(row.context("Failed to read label row")?);
        }
        Ok(labels)
    }

    pub fn delete_label(&self, id: &str) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM labels WHERE id = ?1", params![id])
            .context("Failed to delete label")?;
        Ok(count > 0)
    }

    // ── Comments ──────────────────────────────────────────────────────

    pub fn create_comment(
        &self,
        card_id: &str,
        board_id: &str,
        author_id: &str,
        body: &str,
        mentions: &[String],
    ) -> Result<Comment> {
        let id = new_id();
        let created_at = now();
        self.conn
            .execute(
                "INSERT INTO comments (id, card_id, board_id, author_id, body, mentions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, card_id, board_id, author_id, body, to_json(&mentions)?, created_at],
            )
            .context("Failed to insert comment")?;
        Ok(Comment {
            id,
            card_id: card_id.to_string(),
            board_id: board_id.to_string(),
            author_id: author_id.to_string(),
            body: body.to_string(),
            mentions: mentions.to_vec(),
            created_at,
        })
    }

    /// Comments on a card, oldest first.
    pub fn list_comments(&self, card_id: &str) -> Result<Vec<Comment>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, card_id, board_id, author_id, body, mentions, created_at
                 FROM comments WHERE card_id = ?1 ORDER BY created_at, rowid",
            )
            .context("Failed to prepare list_comments")?;
        let rows = stmt
            .query_map(params![card_id], |row| {
                Ok((
                    Comment {
                        id: row.get(0)?,
                        card_id: row.get(1)?,
                        board_id: row.get(2)?,
                        author_id: row.get(3)?,
                        body: row.get(4)?,
                        mentions: Vec::new(),
                        created_at: row.get(6)?,
                    },
                    row.get::<_, String>(5)?,
                ))
            })
            .context("Failed to query comments")?;
        let mut comments = Vec::new();
        for row in rows {
            let (mut comment, mentions) = row.context("Failed to read comment row")?;
            comment.mentions =
                serde_json::from_str(&mentions).context("Failed to parse comment mentions JSON")?;
            comments.push(comment);
        }
        Ok(comments)
    }

    pub fn delete_comments_for_card(&self, card_id: &str) -> Result<usize> {
        self.conn
            .execute("DELETE FROM comments WHERE card_id = ?1", params![card_id])
            .context("Failed to delete card comments")
    }

    // ── Messages ──────────────────────────────────────────────────────

    pub fn create_message(
        &self,
        board_id: &str,
        author_id: &str,
        body: &str,
        mentions: &[String],
    ) -> Result<Message> {
        let id = new_id();
        let created_at = now();
        self.conn
            .execute(
                "INSERT INTO messages (id, board_id, author_id, body, mentions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, board_id, author_id, body, to_json(&mentions)?, created_at],
            )
            .context("Failed to insert message")?;
        Ok(Message {
            id,
            board_id: board_id.to_string(),
            author_id: author_id.to_string(),
            body: body.to_string(),
            mentions: mentions.to_vec(),
            created_at,
        })
    }

    /// The most recent `limit` messages of a board, returned oldest first.
    pub fn list_messages(&self, board_id: &str, limit: i64) -> Result<Vec<Message>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, board_id, author_id, body, mentions, created_at FROM messages
                 WHERE board_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )
            .context("Failed to prepare list_messages")?;
        let rows = stmt
            .query_map(params![board_id, limit], |row| {
                Ok((
                    Message {
                        id: row.get(0)?,
                        board_id: row.get(1)?,
                        author_id: row.get(2)?,
                        body: row.get(3)?,
                        mentions: Vec::new(),
                        created_at: row.get(5)?,
                    },
                    row.get::<_, String>(4)?,
                ))
            })
            .context("Failed to query messages")?;
        let mut messages = Vec::new();
        for row in rows {
            let (mut message, mentions) = row.context("Failed to read message row")?;
            message.mentions =
                serde_json::from_str(&mentions).context("Failed to parse message mentions JSON")?;
            messages.push(message);
        }
        messages.reverse();
        Ok(messages)
    }

    // ── Notifications ─────────────────────────────────────────────────

    pub fn create_notification(&self, n: &NewNotification) -> Result<Notification> {
        let id = new_id();
        let created_at = now();
        self.conn
            .execute(
                "INSERT INTO notifications (id, user_id, board_id, card_id, kind, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    n.user_id,
                    n.board_id,
                    n.card_id,
                    n.kind.as_str(),
                    n.message,
                    created_at
                ],
            )
            .context("Failed to insert notification")?;
        Ok(Notification {
            id,
            user_id: n.user_id.clone(),
            board_id: n.board_id.clone(),
            card_id: n.card_id.clone(),
            kind: n.kind,
            message: n.message.clone(),
            read: false,
            created_at,
        })
    }

    pub fn get_notification(&self, id: &str) -> Result<Option<Notification>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, user_id, board_id, card_id, kind, message, read, created_at
                 FROM notifications WHERE id = ?1",
                params![id],
                NotificationRow::from_row,
            )
            .optional()
            .context("Failed to query notification")?;
        row.map(NotificationRow::into_notification).transpose()
    }

    /// A user's notifications, newest first.
    pub fn list_notifications(&self, user_id: &str, unread_only: bool) -> Result<Vec<Notification>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, board_id, card_id, kind, message, read, created_at
                 FROM notifications WHERE user_id = ?1 AND (?2 = 0 OR read = 0)
                 ORDER BY created_at DESC, rowid DESC",
            )
            .context("Failed to prepare list_notifications")?;
        let rows = stmt
            .query_map(params![user_id, unread_only], NotificationRow::from_row)
            .context("Failed to query notifications")?;
        let mut notifications = Vec::new();
        for row in rows {
            let r = row.context("Failed to read notification row")?;
            notifications.push(r.into_notification()?);
        }
        Ok(notifications)
    }

    pub fn mark_notification_read(&self, id: &str) -> Result<Notification> {
        self.conn
            .execute("UPDATE notifications SET read = 1 WHERE id = ?1", params![id])
            .context("Failed to mark notification read")?;
        self.get_notification(id)?
            .context("Notification not found after update")
    }

    // ── Activities ────────────────────────────────────────────────────

    pub fn insert_activity(&self, a: &NewActivity) -> Result<Activity> {
        let id = new_id();
        let created_at = now();
        self.conn
            .execute(
                "INSERT INTO activities (id, board_id, user_id, card_id, kind, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    a.board_id,
                    a.user_id,
                    a.card_id,
                    a.kind.as_str(),
                    to_json(&a.metadata)?,
                    created_at
                ],
            )
            .context("Failed to insert activity")?;
        Ok(Activity {
            id,
            board_id: a.board_id.clone(),
            user_id: a.user_id.clone(),
            card_id: a.card_id.clone(),
            kind: a.kind,
            metadata: a.metadata.clone(),
            created_at,
        })
    }

    /// A board's activity feed, newest first.
    pub fn list_activities(&self, board_id: &str, limit: i64) -> Result<Vec<Activity>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, board_id, user_id, card_id, kind, metadata, created_at FROM activities
                 WHERE board_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )
            .context("Failed to prepare list_activities")?;
        let rows = stmt
            .query_map(params![board_id, limit], ActivityRow::from_row)
            .context("Failed to query activities")?;
        let mut activities = Vec::new();
        for row in rows {
            let r = row.context("Failed to read activity row")?;
            activities.push(r.into_activity()?);
        }
        Ok(activities)
    }

    // ── Board view ────────────────────────────────────────────────────

    pub fn get_board_view(&self, board_id: &str) -> Result<Option<BoardView>> {
        let Some(board) = self.get_board(board_id)? else {
            return Ok(None);
        };
        let all_cards = self.list_cards_for_board(board_id)?;
        let columns = self
            .list_columns(board_id)?
            .into_iter()
            .map(|column| {
                let mut cards: Vec<Card> = all_cards
                    .iter()
                    .filter(|c| c.column_id == column.id)
                    .cloned()
                    .collect();
                cards.sort_by_key(|c| c.order);
                ColumnView { column, cards }
            })
            .collect();
        let labels = self.list_labels(board_id)?;
        Ok(Some(BoardView {
            board,
            columns,
            labels,
        }))
    }
}

// ── Row mapping ───────────────────────────────────────────────────────

const CARD_COLUMNS: &str = "id, column_id, board_id, title, description, due_date, color, story_points, time_estimate, time_spent, assignees, labels, position, created_by, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        email: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn column_from_row(row: &Row<'_>) -> rusqlite::Result<Column> {
    let column_type: Option<String> = row.get(3)?;
    Ok(Column {
        id: row.get(0)?,
        board_id: row.get(1)?,
        name: row.get(2)?,
        column_type: column_type.map(ColumnType::from),
        order: row.get(4)?,
    })
}

fn label_from_row(row: &Row<'_>) -> rusqlite::Result<Label> {
    Ok(Label {
        id: row.get(0)?,
        board_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
    })
}

/// Intermediate row struct for boards before decoding the JSON columns.
struct BoardRow {
    id: String,
    name: String,
    description: Option<String>,
    icon: Option<String>,
    owner_id: String,
    members: String,
    is_public: bool,
    custom_column_types: String,
    display_order: Option<i64>,
    created_at: String,
}

impl BoardRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            icon: row.get(3)?,
            owner_id: row.get(4)?,
            members: row.get(5)?,
            is_public: row.get(6)?,
            custom_column_types: row.get(7)?,
            display_order: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_board(self) -> Result<Board> {
        let members: Vec<String> =
            serde_json::from_str(&self.members).context("Failed to parse board members JSON")?;
        let custom_column_types: Vec<CustomColumnType> =
            serde_json::from_str(&self.custom_column_types)
                .context("Failed to parse custom column types JSON")?;
        Ok(Board {
            id: self.id,
            name: self.name,
            description: self.description,
            icon: self.icon,
            owner_id: self.owner_id,
            members,
            is_public: self.is_public,
            custom_column_types,
            display_order: self.display_order,
            created_at: self.created_at,
        })
    }
}

/// Intermediate row struct for cards before decoding assignees / labels.
struct CardRow {
    id: String,
    column_id: String,
    board_id: String,
    title: String,
    description: Option<String>,
    due_date: Option<String>,
    color: Option<String>,
    story_points: Option<i64>,
    time_estimate: Option<i64>,
    time_spent: Option<i64>,
    assignees: String,
    labels: String,
    position: i64,
    created_by: String,
    created_at: String,
}

impl CardRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            column_id: row.get(1)?,
            board_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            due_date: row.get(5)?,
            color: row.get(6)?,
            story_points: row.get(7)?,
            time_estimate: row.get(8)?,
            time_spent: row.get(9)?,
            assignees: row.get(10)?,
            labels: row.get(11)?,
            position: row.get(12)?,
            created_by: row.get(13)?,
            created_at: row.get(14)?,
        })
    }

    fn into_card(self) -> Result<Card> {
        let assignees: Vec<String> =
            serde_json::from_str(&self.assignees).context("Failed to parse card assignees JSON")?;
        let labels: Vec<String> =
            serde_json::from_str(&self.labels).context("Failed to parse card labels JSON")?;
        Ok(Card {
            id: self.id,
            column_id: self.column_id,
            board_id: self.board_id,
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            color: self.color,
            story_points: self.story_points,
            time_estimate: self.time_estimate,
            time_spent: self.time_spent,
            assignees,
            labels,
            order: self.position,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

struct NotificationRow {
    id: String,
    user_id: String,
    board_id: String,
    card_id: Option<String>,
    kind: String,
    message: String,
    read: bool,
    created_at: String,
}

impl NotificationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            board_id: row.get(2)?,
            card_id: row.get(3)?,
            kind: row.get(4)?,
            message: row.get(5)?,
            read: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_notification(self) -> Result<Notification> {
        let kind = NotificationKind::from_str(&self.kind)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse notification kind")?;
        Ok(Notification {
            id: self.id,
            user_id: self.user_id,
            board_id: self.board_id,
            card_id: self.card_id,
            kind,
            message: self.message,
            read: self.read,
            created_at: self.created_at,
        })
    }
}

struct ActivityRow {
    id: String,
    board_id: String,
    user_id: String,
    card_id: Option<String>,
    kind: String,
    metadata: String,
    created_at: String,
}

impl ActivityRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            board_id: row.get(1)?,
            user_id: row.get(2)?,
            card_id: row.get(3)?,
            kind: row.get(4)?,
            metadata: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_activity(self) -> Result<Activity> {
        let kind = ActivityKind::from_str(&self.kind)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse activity kind")?;
        let metadata =
            serde_json::from_str(&self.metadata).context("Failed to parse activity metadata")?;
        Ok(Activity {
            id: self.id,
            board_id: self.board_id,
            user_id: self.user_id,
            card_id: self.card_id,
            kind,
            metadata,
            created_at: self.created_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
