use anyhow::Context;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    db_core::prelude::*,
    email::canonical::CanonicalEmail,
    error::{AppError, AppResult},
};

pub struct EmailCtrl;

/// Result of writing one canonical record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: i32,
    pub created: bool,
}

/// Position of the last item of a page, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailCursor {
    pub received_at: DateTime<FixedOffset>,
    pub id: i32,
}

#[derive(Debug, Clone, FromQueryResult, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSummary {
    pub id: i32,
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub snippet: String,
    pub received_at: DateTime<FixedOffset>,
    pub is_read: bool,
    pub labels: serde_json::Value,
}

impl EmailSummary {
    pub fn cursor(&self) -> EmailCursor {
        EmailCursor {
            received_at: self.received_at,
            id: self.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailStats {
    pub total: u64,
    pub unread: u64,
    pub read: u64,
}

impl EmailCtrl {
    /// Inserts the record, or fully overwrites the stored row with the same `message_id`.
    /// Lookup and write share one transaction.
    pub async fn upsert(
        conn: &DatabaseConnection,
        record: CanonicalEmail,
    ) -> AppResult<UpsertOutcome> {
        let now = Utc::now().fixed_offset();
        let txn = conn.begin().await?;

        let existing = Email::find()
            .filter(email::Column::MessageId.eq(record.message_id.as_str()))
            .one(&txn)
            .await?;

        let outcome = match existing {
            Some(model) => {
                let id = model.id;
                let mut active_model = model.into_active_model();
                Self::overwrite(&mut active_model, record);
                active_model.updated_at = ActiveValue::Set(now);
                active_model.update(&txn).await?;

                UpsertOutcome { id, created: false }
            }
            None => {
                let mut active_model = email::ActiveModel {
                    id: ActiveValue::NotSet,
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                    ..Default::default()
                };
                Self::overwrite(&mut active_model, record);
                let model = active_model.insert(&txn).await?;

                UpsertOutcome {
                    id: model.id,
                    created: true,
                }
            }
        };

        txn.commit().await?;
        Ok(outcome)
    }

    fn overwrite(active_model: &mut email::ActiveModel, record: CanonicalEmail) {
        active_model.message_id = ActiveValue::Set(record.message_id);
        active_model.thread_id = ActiveValue::Set(record.thread_id);
        active_model.subject = ActiveValue::Set(record.subject);
        active_model.sender = ActiveValue::Set(record.sender);
        active_model.recipient = ActiveValue::Set(record.recipient);
        active_model.body_text = ActiveValue::Set(record.body_text);
        active_model.body_html = ActiveValue::Set(record.body_html);
        active_model.snippet = ActiveValue::Set(record.snippet);
        active_model.labels = ActiveValue::Set(json!(record.labels));
        active_model.received_at = ActiveValue::Set(record.received_at.fixed_offset());
        active_model.is_read = ActiveValue::Set(record.is_read);
        active_model.raw_payload = ActiveValue::Set(record.raw_payload);
    }

    /// Page of summaries ordered newest `received_at` first, ties broken by id
    pub async fn list(
        conn: &DatabaseConnection,
        limit: u64,
        cursor: Option<EmailCursor>,
    ) -> AppResult<Vec<EmailSummary>> {
        let mut query = Email::find()
            .select_only()
            .column(email::Column::Id)
            .column(email::Column::MessageId)
            .column(email::Column::Subject)
            .column(email::Column::Sender)
            .column(email::Column::Snippet)
            .column(email::Column::ReceivedAt)
            .column(email::Column::IsRead)
            .column(email::Column::Labels);

        if let Some(cursor) = cursor {
            query = query.filter(
                Condition::any()
                    .add(email::Column::ReceivedAt.lt(cursor.received_at))
                    .add(
                        Condition::all()
                            .add(email::Column::ReceivedAt.eq(cursor.received_at))
                            .add(email::Column::Id.lt(cursor.id)),
                    ),
            );
        }

        let emails = query
            .order_by_desc(email::Column::ReceivedAt)
            .order_by_desc(email::Column::Id)
            .limit(limit)
            .into_model::<EmailSummary>()
            .all(conn)
            .await
            .context("Error fetching email list")?;

        Ok(emails)
    }

    pub async fn get_by_id(conn: &DatabaseConnection, id: i32) -> AppResult<email::Model> {
        Email::find_by_id(id)
            .one(conn)
            .await
            .context("Error fetching email by id")?
            .ok_or_else(|| AppError::NotFound(format!("Email {} not found", id)))
    }

    pub async fn mark_as_read(conn: &DatabaseConnection, id: i32) -> AppResult<()> {
        let result = Email::update_many()
            .col_expr(email::Column::IsRead, Expr::value(true))
            .col_expr(email::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(email::Column::Id.eq(id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("Email {} not found", id)));
        }

        Ok(())
    }

    pub async fn stats(conn: &DatabaseConnection) -> AppResult<EmailStats> {
        let total = Email::find().count(conn).await?;
        let unread = Email::find()
            .filter(email::Column::IsRead.eq(false))
            .count(conn)
            .await?;

        Ok(EmailStats {
            total,
            unread,
            read: total.saturating_sub(unread),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;
    use crate::{email::canonical::normalize, testing::common::setup_db};

    fn message(id: &str, labels: &[&str], epoch_secs: i64) -> CanonicalEmail {
        normalize(json!({
            "messageId": id,
            "threadId": format!("thread-{id}"),
            "subject": format!("Subject {id}"),
            "sender": "alice@example.com",
            "to": "bob@example.com",
            "messageText": "Hello",
            "labelIds": labels,
            "messageTimestamp": epoch_secs,
        }))
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let conn = setup_db().await;
        let record = message("m1", &["UNREAD"], 1700000000);

        let first = EmailCtrl::upsert(&conn, record.clone()).await.unwrap();
        let stored_first = EmailCtrl::get_by_id(&conn, first.id).await.unwrap();
        let second = EmailCtrl::upsert(&conn, record).await.unwrap();
        let stored_second = EmailCtrl::get_by_id(&conn, second.id).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(Email::find().count(&conn).await.unwrap(), 1);

        assert_eq!(stored_first.message_id, stored_second.message_id);
        assert_eq!(stored_first.subject, stored_second.subject);
        assert_eq!(stored_first.labels, stored_second.labels);
        assert_eq!(stored_first.received_at, stored_second.received_at);
        assert_eq!(stored_first.raw_payload, stored_second.raw_payload);
        assert_eq!(stored_first.created_at, stored_second.created_at);
        assert!(!stored_second.is_read);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_every_field() {
        let conn = setup_db().await;
        let created = EmailCtrl::upsert(&conn, message("m1", &["INBOX"], 1700000000))
            .await
            .unwrap();

        let replacement = normalize(json!({
            "id": "m1",
            "subject": "Edited",
            "labels": ["UNREAD"],
            "date": "2024-01-01T00:00:00Z"
        }));
        EmailCtrl::upsert(&conn, replacement).await.unwrap();

        let stored = EmailCtrl::get_by_id(&conn, created.id).await.unwrap();
        assert_eq!(stored.subject, "Edited");
        assert_eq!(stored.thread_id, "");
        assert_eq!(stored.sender, "");
        assert_eq!(stored.body_text, "");
        assert_eq!(stored.labels, json!(["UNREAD"]));
        assert!(!stored.is_read);
        assert_eq!(
            stored.received_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().fixed_offset()
        );
    }

    #[tokio::test]
    async fn test_resync_resets_locally_read_email() {
        let conn = setup_db().await;
        let record = message("m1", &["UNREAD"], 1700000000);
        let outcome = EmailCtrl::upsert(&conn, record.clone()).await.unwrap();

        EmailCtrl::mark_as_read(&conn, outcome.id).await.unwrap();
        assert!(EmailCtrl::get_by_id(&conn, outcome.id).await.unwrap().is_read);

        EmailCtrl::upsert(&conn, record).await.unwrap();
        assert!(!EmailCtrl::get_by_id(&conn, outcome.id).await.unwrap().is_read);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_with_cursor() {
        let conn = setup_db().await;
        let base = 1700000000;
        for (offset, id) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            EmailCtrl::upsert(&conn, message(id, &[], base + offset as i64 * 60))
                .await
                .unwrap();
        }

        let first_page = EmailCtrl::list(&conn, 2, None).await.unwrap();
        let ids: Vec<_> = first_page.iter().map(|e| e.message_id.as_str()).collect();
        assert_eq!(ids, vec!["e", "d"]);

        let cursor = first_page.last().map(EmailSummary::cursor);
        let second_page = EmailCtrl::list(&conn, 2, cursor).await.unwrap();
        let ids: Vec<_> = second_page.iter().map(|e| e.message_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);

        let cursor = second_page.last().map(EmailSummary::cursor);
        let last_page = EmailCtrl::list(&conn, 2, cursor).await.unwrap();
        let ids: Vec<_> = last_page.iter().map(|e| e.message_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_cursor_breaks_timestamp_ties_by_id() {
        let conn = setup_db().await;
        for id in ["x", "y", "z"] {
            EmailCtrl::upsert(&conn, message(id, &[], 1700000000))
                .await
                .unwrap();
        }

        let first_page = EmailCtrl::list(&conn, 1, None).await.unwrap();
        let second_page = EmailCtrl::list(&conn, 5, first_page.last().map(EmailSummary::cursor))
            .await
            .unwrap();

        assert_eq!(first_page[0].message_id, "z");
        let ids: Vec<_> = second_page.iter().map(|e| e.message_id.as_str()).collect();
        assert_eq!(ids, vec!["y", "x"]);
    }

    #[tokio::test]
    async fn test_mark_as_read_and_stats() {
        let conn = setup_db().await;
        let unread = EmailCtrl::upsert(&conn, message("m1", &["UNREAD"], 1700000000))
            .await
            .unwrap();
        EmailCtrl::upsert(&conn, message("m2", &["UNREAD"], 1700000100))
            .await
            .unwrap();
        EmailCtrl::upsert(&conn, message("m3", &["INBOX"], 1700000200))
            .await
            .unwrap();

        let stats = EmailCtrl::stats(&conn).await.unwrap();
        assert_eq!(
            stats,
            EmailStats {
                total: 3,
                unread: 2,
                read: 1
            }
        );

        let before = EmailCtrl::get_by_id(&conn, unread.id).await.unwrap();
        EmailCtrl::mark_as_read(&conn, unread.id).await.unwrap();
        let after = EmailCtrl::get_by_id(&conn, unread.id).await.unwrap();
        assert!(after.is_read);
        assert!(after.updated_at >= before.updated_at - Duration::seconds(1));

        let stats = EmailCtrl::stats(&conn).await.unwrap();
        assert_eq!(stats.unread, 1);
        assert_eq!(stats.read, 2);
    }

    #[tokio::test]
    async fn test_missing_email_is_not_found() {
        let conn = setup_db().await;

        assert!(matches!(
            EmailCtrl::get_by_id(&conn, 42).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            EmailCtrl::mark_as_read(&conn, 42).await,
            Err(AppError::NotFound(_))
        ));
    }
}
