//! Storage seams consumed by the ordering engine.
//!
//! The engine never talks to SQLite directly; it sees the document store as
//! a [`CardStore`] and the activity log as an [`ActivitySink`]. `DbHandle`
//! implements both. Tests substitute wrappers to observe or fail writes.

use anyhow::Result;
use async_trait::async_trait;

use super::db::DbHandle;
use super::models::{Activity, Board, Card, Column, NewActivity, NewCard};

/// Document-store operations the ordering engine depends on.
///
/// Each method is one awaited round trip. Nothing here is transactional
/// across calls.
#[async_trait]
pub trait CardStore: Send + Sync {
    async fn board(&self, id: &str) -> Result<Option<Board>>;
    async fn column(&self, id: &str) -> Result<Option<Column>>;
    async fn card(&self, id: &str) -> Result<Option<Card>>;
    /// Cards in a column, ascending by order.
    async fn cards_in_column(&self, column_id: &str) -> Result<Vec<Card>>;
    async fn insert_card(&self, card: NewCard) -> Result<Card>;
    async fn set_card_position(&self, card_id: &str, column_id: &str, order: i64) -> Result<()>;
    async fn delete_card(&self, card_id: &str) -> Result<bool>;
    async fn delete_card_comments(&self, card_id: &str) -> Result<usize>;
}

/// Append-only activity log.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, activity: NewActivity) -> Result<Activity>;
}

#[async_trait]
impl CardStore for DbHandle {
    async fn board(&self, id: &str) -> Result<Option<Board>> {
        let id = id.to_string();
        self.call(move |db| db.get_board(&id)).await
    }

    async fn column(&self, id: &str) -> Result<Option<Column>> {
        let id = id.to_string();
        self.call(move |db| db.get_column(&id)).await
    }

    async fn card(&self, id: &str) -> Result<Option<Card>> {
        let id = id.to_string();
        self.call(move |db| db.get_card(&id)).await
    }

    async fn cards_in_column(&self, column_id: &str) -> Result<Vec<Card>> {
        let column_id = column_id.to_string();
        self.call(move |db| db.list_cards_in_column(&column_id)).await
    }

    async fn insert_card(&self, card: NewCard) -> Result<Card> {
        self.call(move |db| db.insert_card(&card)).await
    }

    async fn set_card_position(&self, card_id: &str, column_id: &str, order: i64) -> Result<()> {
        let card_id = card_id.to_string();
        let column_id = column_id.to_string();
        self.call(move |db| db.set_card_position(&card_id, &column_id, order))
            .await
    }

    async fn delete_card(&self, card_id: &str) -> Result<bool> {
        let card_id = card_id.to_string();
        self.call(move |db| db.delete_card(&card_id)).await
    }

    async fn delete_card_comments(&self, card_id: &str) -> Result<usize> {
        let card_id = card_id.to_string();
        self.call(move |db| db.delete_comments_for_card(&card_id))
            .await
    }
}

#[async_trait]
impl ActivitySink for DbHandle {
    async fn record(&self, activity: NewActivity) -> Result<Activity> {
        self.call(move |db| db.insert_activity(&activity)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::db::BoardDb;
    use crate::board::models::ActivityKind;

    #[tokio::test]
    async fn test_db_handle_serves_card_store() -> Result<()> {
        let handle = DbHandle::new(BoardDb::new_in_memory()?);
        let (board_id, column_id) = {
            let db = handle.lock_sync()?;
            let owner = db.create_user("alice", "Alice", None)?;
            let board = db.create_board(&owner.id, "B", None, None, false)?;
            let column = db.create_column(&board.id, "Todo", None)?;
            (board.id, column.id)
        };

        let store: &dyn CardStore = &handle;
        assert!(store.board(&board_id).await?.is_some());
        assert!(store.column(&column_id).await?.is_some());

        let card = store
            .insert_card(NewCard {
                column_id: column_id.clone(),
                board_id: board_id.clone(),
                title: "A".into(),
                description: None,
                order: 0,
                created_by: "alice".into(),
            })
            .await?;
        store.set_card_position(&card.id, &column_id, 3).await?;
        let cards = store.cards_in_column(&column_id).await?;
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].order, 3);

        assert_eq!(store.delete_card_comments(&card.id).await?, 0);
        assert!(store.delete_card(&card.id).await?);
        assert!(store.card(&card.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_records_activity() -> Result<()> {
        let handle = DbHandle::new(BoardDb::new_in_memory()?);
        let sink: &dyn ActivitySink = &handle;
        let recorded = sink
            .record(NewActivity {
                board_id: "b1".into(),
                user_id: "u1".into(),
                card_id: Some("c1".into()),
                kind: ActivityKind::CardCreated,
                metadata: serde_json::json!({"card_title": "A"}),
            })
            .await?;
        assert_eq!(recorded.kind, ActivityKind::CardCreated);

        let feed = handle.call(|db| db.list_activities("b1", 10)).await?;
        assert_eq!(feed.len(), 1);
        Ok(())
    }
}
