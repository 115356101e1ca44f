//! Comments, team chat and the notifications they fan out.
//!
//! These run inside a single `DbHandle::call` closure, so each function
//! takes `&BoardDb` and assumes the caller already passed the board's
//! access checks.

use std::collections::BTreeSet;

use anyhow::Result;
use serde_json::json;

use super::db::BoardDb;
use super::mentions::parse_mentions;
use super::models::*;

/// Users mentioned in `body` who can see the board, by id.
pub fn resolve_mentions(db: &BoardDb, board: &Board, body: &str) -> Result<Vec<User>> {
    let mut users = Vec::new();
    for name in parse_mentions(body) {
        if let Some(user) = db.find_user_by_username(&name)? {
            if board.is_member(&user.id) {
                users.push(user);
            }
        }
    }
    Ok(users)
}

fn display_name(db: &BoardDb, user_id: &str) -> Result<String> {
    Ok(db
        .get_user(user_id)?
        .map(|u| u.display_name)
        .unwrap_or_else(|| "Someone".to_string()))
}

/// Notify every mentioned user except the author.
fn notify_mentioned(
    db: &BoardDb,
    mentioned: &[User],
    author_id: &str,
    board_id: &str,
    card_id: Option<&str>,
    message: &str,
) -> Result<Vec<Notification>> {
    let mut sent = Vec::new();
    for user in mentioned.iter().filter(|u| u.id != author_id) {
        sent.push(db.create_notification(&NewNotification {
            user_id: user.id.clone(),
            board_id: board_id.to_string(),
            card_id: card_id.map(str::to_string),
            kind: NotificationKind::Mention,
            message: message.to_string(),
        })?);
    }
    Ok(sent)
}

/// Add a comment to a card, notify mentioned members and log `comment_added`.
pub fn add_comment(
    db: &BoardDb,
    board: &Board,
    card: &Card,
    author_id: &str,
    body: &str,
) -> Result<(Comment, Vec<Notification>)> {
    let mentioned = resolve_mentions(db, board, body)?;
    let ids: Vec<String> = mentioned.iter().map(|u| u.id.clone()).collect();
    let comment = db.create_comment(&card.id, &board.id, author_id, body, &ids)?;

    let text = format!(
        "{} mentioned you in a comment on \"{}\"",
        display_name(db, author_id)?,
        card.title
    );
    let notifications =
        notify_mentioned(db, &mentioned, author_id, &board.id, Some(&card.id), &text)?;

    if let Err(e) = db.insert_activity(&NewActivity {
        board_id: board.id.clone(),
        user_id: author_id.to_string(),
        card_id: Some(card.id.clone()),
        kind: ActivityKind::CommentAdded,
        metadata: json!({ "card_title": card.title }),
    }) {
        tracing::warn!(error = %e, "Dropped comment_added activity");
    }

    tracing::debug!(
        card_id = %card.id,
        notified = notifications.len(),
        "Added comment"
    );
    Ok((comment, notifications))
}

/// Post to the board's team chat and notify mentioned members.
pub fn post_message(
    db: &BoardDb,
    board: &Board,
    author_id: &str,
    body: &str,
) -> Result<(Message, Vec<Notification>)> {
    let mentioned = resolve_mentions(db, board, body)?;
    let ids: Vec<String> = mentioned.iter().map(|u| u.id.clone()).collect();
    let message = db.create_message(&board.id, author_id, body, &ids)?;

    let text = format!(
        "{} mentioned you in {} chat",
        display_name(db, author_id)?,
        board.name
    );
    let notifications = notify_mentioned(db, &mentioned, author_id, &board.id, None, &text)?;
    Ok((message, notifications))
}

/// Notify assignees present in `after` but not `before`, skipping the
/// caller assigning themselves. Each user is notified at most once.
pub fn notify_new_assignees(
    db: &BoardDb,
    before: &Card,
    after: &Card,
    caller: &str,
) -> Result<Vec<Notification>> {
    let mut seen: BTreeSet<&str> = before.assignees.iter().map(String::as_str).collect();
    seen.insert(caller);
    let added: Vec<&String> = after
        .assignees
        .iter()
        .filter(|a| seen.insert(a.as_str()))
        .collect();
    if added.is_empty() {
        return Ok(Vec::new());
    }

    let text = format!(
        "{} assigned you to \"{}\"",
        display_name(db, caller)?,
        after.title
    );
    let mut sent = Vec::new();
    for user_id in added {
        sent.push(db.create_notification(&NewNotification {
            user_id: user_id.clone(),
            board_id: after.board_id.clone(),
            card_id: Some(after.id.clone()),
            kind: NotificationKind::Assigned,
            message: text.clone(),
        })?);
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Seed {
        db: BoardDb,
        alice: User,
        bob: User,
        carol: User,
        board: Board,
        card: Card,
    }

    fn seed() -> Result<Seed> {
        let db = BoardDb::new_in_memory()?;
        let alice = db.create_user("alice", "Alice", None)?;
        let bob = db.create_user("bob", "Bob", None)?;
        let carol = db.create_user("carol", "Carol", None)?;
        let board = db.create_board(&alice.id, "Roadmap", None, None, false)?;
        let board = db.set_board_members(&board.id, &[bob.id.clone()])?;
        let column = db.create_column(&board.id, "Todo", None)?;
        let card = db.insert_card(&NewCard {
            column_id: column.id,
            board_id: board.id.clone(),
            title: "Fix login".into(),
            description: None,
            order: 0,
            created_by: alice.id.clone(),
        })?;
        Ok(Seed {
            db,
            alice,
            bob,
            carol,
            board,
            card,
        })
    }

    #[test]
    fn test_comment_notifies_mentioned_members_only() -> Result<()> {
        let s = seed()?;
        let (comment, sent) = add_comment(
            &s.db,
            &s.board,
            &s.card,
            &s.alice.id,
            "@bob @carol @alice @nobody take a look",
        )?;

        // carol is not on the board; alice is the author.
        assert_eq!(comment.mentions.len(), 2);
        assert!(comment.mentions.contains(&s.bob.id));
        assert!(comment.mentions.contains(&s.alice.id));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, s.bob.id);
        assert_eq!(sent[0].kind, NotificationKind::Mention);
        assert_eq!(sent[0].card_id.as_deref(), Some(s.card.id.as_str()));
        assert_eq!(sent[0].message, "Alice mentioned you in a comment on \"Fix login\"");

        assert!(s.db.list_notifications(&s.carol.id, false)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_comment_records_activity() -> Result<()> {
        let s = seed()?;
        add_comment(&s.db, &s.board, &s.card, &s.bob.id, "done")?;
        let feed = s.db.list_activities(&s.board.id, 10)?;
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].kind, ActivityKind::CommentAdded);
        assert_eq!(feed[0].user_id, s.bob.id);
        Ok(())
    }

    #[test]
    fn test_chat_message_fans_out_mentions() -> Result<()> {
        let s = seed()?;
        let (message, sent) = post_message(&s.db, &s.board, &s.bob.id, "standup in 5 @Alice")?;
        assert_eq!(message.mentions, vec![s.alice.id.clone()]);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, s.alice.id);
        assert!(sent[0].card_id.is_none());
        assert_eq!(sent[0].message, "Bob mentioned you in Roadmap chat");

        // Chat does not write to the activity feed.
        assert!(s.db.list_activities(&s.board.id, 10)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_new_assignees_are_notified() -> Result<()> {
        let s = seed()?;
        let before = s.card.clone();
        let after = Card {
            assignees: vec![s.alice.id.clone(), s.bob.id.clone()],
            ..s.card.clone()
        };

        let sent = notify_new_assignees(&s.db, &before, &after, &s.alice.id)?;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, s.bob.id);
        assert_eq!(sent[0].kind, NotificationKind::Assigned);

        // Re-saving the same assignees notifies nobody.
        let again = notify_new_assignees(&s.db, &after, &after, &s.alice.id)?;
        assert!(again.is_empty());
        Ok(())
    }

    #[test]
    fn test_repeated_assignee_is_notified_once() -> Result<()> {
        let s = seed()?;
        let after = Card {
            assignees: vec![s.bob.id.clone(), s.bob.id.clone()],
            ..s.card.clone()
        };

        let sent = notify_new_assignees(&s.db, &s.card, &after, &s.alice.id)?;
        assert_eq!(sent.len(), 1);
        assert_eq!(s.db.list_notifications(&s.bob.id, false)?.len(), 1);
        Ok(())
    }
}
