//! Corkboard: collaborative Kanban board back-end.
//!
//! ## Overview
//!
//! Boards hold ordered columns, columns hold ordered cards. Members move
//! cards around, comment on them, chat, and get notified when mentioned or
//! assigned. Every mutation is persisted to SQLite and broadcast over a
//! WebSocket so open clients stay in sync.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘ WebSocket│         │                                        │
//!                       │         │ append / move_card / delete / compact  │
//!                       │         v                                        │
//!                       │  ordering.rs  (OrderingEngine)                   │
//!                       │         │                                        │
//!                       │         │ CardStore + ActivitySink traits        │
//!                       │         v                                        │
//!                       │  store.rs ──> db.rs  (BoardDb, DbHandle)         │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module     | Responsibility                                           |
//! |------------|----------------------------------------------------------|
//! | `models`   | Shared types: `Board`, `Column`, `Card`, `Activity`, ... |
//! | `auth`     | Caller identity and owner/member/reader checks           |
//! | `mentions` | `@username` parsing, skipping code spans                 |
//! | `notify`   | Comments, chat messages and notification fan-out         |
//! | `ws`       | `WsMessage` enum + `broadcast_message()` helper          |
//!
//! ## Typical Request Flow (drag a card to another column)
//!
//! 1. `PATCH /api/cards/{id}/move` → `api::move_card()`
//! 2. `OrderingEngine::move_card()` checks the caller is on the board, reads
//!    the destination column, inserts the card at the clamped index and
//!    rewrites every order that changed.
//! 3. The source column is renumbered to close the gap, and one
//!    `card_moved` activity names both columns.
//! 4. The handler broadcasts `WsMessage::CardMoved` to every socket.

pub mod api;
pub mod auth;
pub mod db;
pub mod mentions;
pub mod models;
pub mod notify;
pub mod ordering;
pub mod server;
pub mod store;
pub mod ws;
