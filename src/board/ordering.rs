//! Card ordering engine.
//!
//! Keeps each column's cards in a dense, zero-based `order` sequence across
//! append, move and delete. Every store access is a separate awaited round
//! trip and nothing wraps a multi-write sequence in a transaction: a write
//! failure part way through a move leaves the earlier writes in place, and
//! concurrent moves into the same column may interleave their renumbering.
//!
//! Delete does not close the gap it leaves. `compact` renumbers a column on
//! request.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::errors::{BoardError, BoardResult};

use super::auth::{require_caller, require_member};
use super::models::{ActivityKind, Board, Card, NewActivity, NewCard};
use super::store::{ActivitySink, CardStore};

/// Result of a successful move, used to notify realtime subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct MoveOutcome {
    pub card: Card,
    pub from_column_id: String,
    pub to_column_id: String,
}

impl MoveOutcome {
    pub fn changed_column(&self) -> bool {
        self.from_column_id != self.to_column_id
    }
}

/// Position in `0..=len` where a card requested at `requested` ends up.
///
/// Out-of-range requests insert at the start or the end, never error.
pub fn insertion_index(requested: i64, len: usize) -> usize {
    if requested <= 0 {
        0
    } else {
        usize::try_from(requested).map_or(len, |p| p.min(len))
    }
}

/// `(card_id, new_order)` for every card whose order differs from its index.
pub fn renumber(cards: &[Card]) -> Vec<(String, i64)> {
    cards
        .iter()
        .enumerate()
        .filter(|(i, c)| c.order != *i as i64)
        .map(|(i, c)| (c.id.clone(), i as i64))
        .collect()
}

fn sorted_by_order(mut cards: Vec<Card>) -> Vec<Card> {
    cards.sort_by_key(|c| c.order);
    cards
}

pub struct OrderingEngine {
    store: Arc<dyn CardStore>,
    activity: Arc<dyn ActivitySink>,
}

impl OrderingEngine {
    pub fn new(store: Arc<dyn CardStore>, activity: Arc<dyn ActivitySink>) -> Self {
        Self { store, activity }
    }

    /// Create a card at the end of a column: `order = max + 1`, or 0 if empty.
    pub async fn append(
        &self,
        caller: Option<&str>,
        column_id: &str,
        title: &str,
        description: Option<String>,
    ) -> BoardResult<Card> {
        let user_id = require_caller(caller)?;
        let column = self
            .store
            .column(column_id)
            .await
            .map_err(BoardError::Database)?
            .ok_or_else(|| BoardError::not_found("Column", column_id))?;
        let board = self.load_board(&column.board_id).await?;
        require_member(&board, user_id)?;

        let existing = self
            .store
            .cards_in_column(column_id)
            .await
            .map_err(BoardError::Database)?;
        let max_order = existing.iter().map(|c| c.order).max().unwrap_or(-1);

        let card = self
            .store
            .insert_card(NewCard {
                column_id: column.id.clone(),
                board_id: board.id.clone(),
                title: title.to_string(),
                description,
                order: max_order + 1,
                created_by: user_id.to_string(),
            })
            .await
            .map_err(BoardError::Database)?;

        tracing::debug!(card_id = %card.id, column_id, order = card.order, "Appended card");
        self.emit(NewActivity {
            board_id: board.id,
            user_id: user_id.to_string(),
            card_id: Some(card.id.clone()),
            kind: ActivityKind::CardCreated,
            metadata: json!({ "card_title": card.title, "column": column.name }),
        })
        .await;

        Ok(card)
    }

    /// Move a card to `index` within `target_column_id` and renumber both
    /// the destination and, when the column changes, the source.
    pub async fn move_card(
        &self,
        caller: Option<&str>,
        card_id: &str,
        target_column_id: &str,
        index: i64,
    ) -> BoardResult<MoveOutcome> {
        let user_id = require_caller(caller)?;
        let card = self.load_card(card_id).await?;
        let board = self.load_board(&card.board_id).await?;
        require_member(&board, user_id)?;
        let target = self
            .store
            .column(target_column_id)
            .await
            .map_err(BoardError::Database)?
            .ok_or_else(|| BoardError::not_found("Column", target_column_id))?;
        if target.board_id != board.id {
            return Err(BoardError::BadRequest(
                "Cannot move a card to a column on another board".into(),
            ));
        }

        let source_column_id = card.column_id.clone();
        let changed_column = source_column_id != target.id;
        let source_name = if changed_column {
            self.store
                .column(&source_column_id)
                .await
                .map_err(BoardError::Database)?
                .map(|c| c.name)
        } else {
            None
        };

        let mut sequence: Vec<Card> = sorted_by_order(
            self.store
                .cards_in_column(&target.id)
                .await
                .map_err(BoardError::Database)?,
        )
        .into_iter()
        .filter(|c| c.id != card.id)
        .collect();
        let position = insertion_index(index, sequence.len());
        sequence.insert(position, card.clone());

        let mut writes = 0usize;
        for (i, c) in sequence.iter().enumerate() {
            let order = i as i64;
            if c.id == card.id || c.order != order {
                self.store
                    .set_card_position(&c.id, &target.id, order)
                    .await
                    .map_err(BoardError::Database)?;
                writes += 1;
            }
        }
        tracing::debug!(column_id = %target.id, writes, "Renumbered destination column");

        if changed_column {
            let remaining: Vec<Card> = sorted_by_order(
                self.store
                    .cards_in_column(&source_column_id)
                    .await
                    .map_err(BoardError::Database)?,
            )
            .into_iter()
            .filter(|c| c.id != card.id)
            .collect();
            let gaps = renumber(&remaining);
            for (id, order) in &gaps {
                self.store
                    .set_card_position(id, &source_column_id, *order)
                    .await
                    .map_err(BoardError::Database)?;
            }
            tracing::debug!(column_id = %source_column_id, writes = gaps.len(), "Closed source column gap");

            let from_name = source_name.unwrap_or_else(|| "unknown".to_string());
            self.emit(NewActivity {
                board_id: board.id.clone(),
                user_id: user_id.to_string(),
                card_id: Some(card.id.clone()),
                kind: ActivityKind::CardMoved,
                metadata: json!({
                    "card_title": card.title,
                    "from_column": from_name,
                    "to_column": target.name,
                }),
            })
            .await;
        }

        tracing::info!(
            card_id,
            from = %source_column_id,
            to = %target.id,
            index = position,
            "Moved card"
        );

        let moved = Card {
            column_id: target.id.clone(),
            order: position as i64,
            ..card
        };
        Ok(MoveOutcome {
            card: moved,
            from_column_id: source_column_id,
            to_column_id: target.id,
        })
    }

    /// Delete a card and its comments. Siblings keep their orders, so the
    /// column is left with a gap until something renumbers it.
    pub async fn delete(&self, caller: Option<&str>, card_id: &str) -> BoardResult<Card> {
        let user_id = require_caller(caller)?;
        let card = self.load_card(card_id).await?;
        let board = self.load_board(&card.board_id).await?;
        require_member(&board, user_id)?;

        let comments = self
            .store
            .delete_card_comments(card_id)
            .await
            .map_err(BoardError::Database)?;
        self.store
            .delete_card(card_id)
            .await
            .map_err(BoardError::Database)?;

        tracing::info!(card_id, column_id = %card.column_id, comments, "Deleted card");
        self.emit(NewActivity {
            board_id: board.id,
            user_id: user_id.to_string(),
            card_id: Some(card.id.clone()),
            kind: ActivityKind::CardDeleted,
            metadata: json!({ "card_title": card.title }),
        })
        .await;

        Ok(card)
    }

    /// Renumber a column to `0..n-1`, keeping relative order. Returns how
    /// many cards were rewritten.
    pub async fn compact(&self, caller: Option<&str>, column_id: &str) -> BoardResult<usize> {
        let user_id = require_caller(caller)?;
        let column = self
            .store
            .column(column_id)
            .await
            .map_err(BoardError::Database)?
            .ok_or_else(|| BoardError::not_found("Column", column_id))?;
        let board = self.load_board(&column.board_id).await?;
        require_member(&board, user_id)?;

        let cards = sorted_by_order(
            self.store
                .cards_in_column(column_id)
                .await
                .map_err(BoardError::Database)?,
        );
        let changes = renumber(&cards);
        for (id, order) in &changes {
            self.store
                .set_card_position(id, column_id, *order)
                .await
                .map_err(BoardError::Database)?;
        }
        tracing::debug!(column_id, writes = changes.len(), "Compacted column");
        Ok(changes.len())
    }

    async fn load_card(&self, id: &str) -> BoardResult<Card> {
        self.store
            .card(id)
            .await
            .map_err(BoardError::Database)?
            .ok_or_else(|| BoardError::not_found("Card", id))
    }

    async fn load_board(&self, id: &str) -> BoardResult<Board> {
        self.store
            .board(id)
            .await
            .map_err(BoardError::Database)?
            .ok_or_else(|| BoardError::not_found("Board", id))
    }

    async fn emit(&self, activity: NewActivity) {
        let kind = activity.kind;
        if let Err(e) = self.activity.record(activity).await {
            tracing::warn!(kind = kind.as_str(), error = %e, "Dropped activity record");
        }
    }
}
