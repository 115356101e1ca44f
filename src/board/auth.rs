//! Caller identity and board access checks.
//!
//! Identity comes from outside (the HTTP layer reads the `x-user-id`
//! header); these helpers only decide what an identified caller may do.

use crate::errors::{BoardError, BoardResult};

use super::models::Board;

/// Header carrying the caller's user id.
pub const USER_HEADER: &str = "x-user-id";

/// Reject a missing or blank caller identity.
pub fn require_caller(caller: Option<&str>) -> BoardResult<&str> {
    match caller.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(BoardError::NotAuthenticated),
    }
}

/// Owner or member may mutate the board's content.
pub fn require_member(board: &Board, user_id: &str) -> BoardResult<()> {
    if board.is_member(user_id) {
        Ok(())
    } else {
        Err(BoardError::NotAuthorized)
    }
}

/// Only the owner may change settings, membership, or delete the board.
pub fn require_owner(board: &Board, user_id: &str) -> BoardResult<()> {
    if board.is_owner(user_id) {
        Ok(())
    } else {
        Err(BoardError::NotAuthorized)
    }
}

/// Public boards are readable by any identified caller.
pub fn require_reader(board: &Board, user_id: &str) -> BoardResult<()> {
    if board.is_public || board.is_member(user_id) {
        Ok(())
    } else {
        Err(BoardError::NotAuthorized)
    }
}
