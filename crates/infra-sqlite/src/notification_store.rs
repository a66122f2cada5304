// SQLite NotificationStore Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use herald_core::domain::{
    DisplayAttributes, EventKind, NotificationRecord, NotificationStatus, Payload,
};
use herald_core::error::{AppError, Result};
use herald_core::port::notification_store::INTERRUPTED_ERROR;
use herald_core::port::NotificationStore;
use sqlx::SqlitePool;

pub struct SqliteNotificationStore {
    pool: SqlitePool,
}

impl SqliteNotificationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for SqliteNotificationStore {
    async fn save(&self, record: &NotificationRecord) -> Result<()> {
        let payload = serde_json::to_string(&record.payload)?;

        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, kind, target, title, body, platform, priority, status,
                service_source, event_type, payload,
                color, click_action, icon, sound,
                retry_count, last_error, created_at, sent_at, last_attempt_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.kind.as_str())
        .bind(&record.target)
        .bind(&record.title)
        .bind(&record.body)
        .bind(&record.platform)
        .bind(&record.priority)
        .bind(record.status.as_str())
        .bind(&record.service_source)
        .bind(&record.event_type)
        .bind(&payload)
        .bind(&record.display.color)
        .bind(&record.display.click_action)
        .bind(&record.display.icon)
        .bind(&record.display.sound)
        .bind(record.retry_count)
        .bind(&record.last_error)
        .bind(record.created_at)
        .bind(record.sent_at)
        .bind(record.last_attempt_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, record: &NotificationRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = ?, retry_count = ?, last_error = ?, sent_at = ?, last_attempt_at = ?
            WHERE id = ?
            "#,
        )
        .bind(record.status.as_str())
        .bind(record.retry_count)
        .bind(&record.last_error)
        .bind(record.sent_at)
        .bind(record.last_attempt_at)
        .bind(&record.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Notification {} not found",
                record.id
            )));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<NotificationRecord>> {
        let row = sqlx::query_as::<_, NotificationRow>("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(NotificationRow::into_record).transpose()
    }

    async fn find_redelivery_candidates(
        &self,
        cutoff: i64,
        max_retries: i32,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE retry_count < ?
              AND (
                    (status = 'pending' AND created_at <= ?)
                 OR status = 'failed'
                 OR (status = 'in_flight' AND COALESCE(last_attempt_at, created_at) <= ?)
              )
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(max_retries)
        .bind(cutoff)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(NotificationRow::into_record).collect()
    }

    async fn try_claim(
        &self,
        id: &str,
        expected_status: NotificationStatus,
        expected_retry_count: i32,
        now_millis: i64,
    ) -> Result<bool> {
        // Conditional update: only one concurrent claimer matches the old status/retry_count
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'in_flight', retry_count = retry_count + 1, last_attempt_at = ?
            WHERE id = ? AND status = ? AND retry_count = ?
            "#,
        )
        .bind(now_millis)
        .bind(id)
        .bind(expected_status.as_str())
        .bind(expected_retry_count)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn abandon_exhausted(&self, max_retries: i32, stale_cutoff: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'abandoned',
                last_error = CASE
                    WHEN status = 'in_flight' THEN COALESCE(last_error, ?)
                    ELSE last_error
                END
            WHERE retry_count >= ?
              AND (
                    status = 'failed'
                 OR (status = 'in_flight' AND COALESCE(last_attempt_at, created_at) <= ?)
              )
            "#,
        )
        .bind(INTERRUPTED_ERROR)
        .bind(max_retries)
        .bind(stale_cutoff)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, status: NotificationStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: String,
    kind: String,
    target: String,
    title: String,
    body: String,
    platform: String,
    priority: String,
    status: String,
    service_source: String,
    event_type: String,
    payload: String, // JSON object of strings
    color: String,
    click_action: String,
    icon: String,
    sound: String,
    retry_count: i32,
    last_error: Option<String>,
    created_at: i64,
    sent_at: Option<i64>,
    last_attempt_at: Option<i64>,
}

impl NotificationRow {
    fn into_record(self) -> Result<NotificationRecord> {
        let kind: EventKind = self.kind.parse()?;
        let status: NotificationStatus = self.status.parse()?;
        let payload: Payload = serde_json::from_str(&self.payload)?;

        Ok(NotificationRecord {
            id: self.id,
            kind,
            target: self.target,
            title: self.title,
            body: self.body,
            platform: self.platform,
            priority: self.priority,
            status,
            service_source: self.service_source,
            event_type: self.event_type,
            payload,
            display: DisplayAttributes {
                color: self.color,
                click_action: self.click_action,
                icon: self.icon,
                sound: self.sound,
            },
            retry_count: self.retry_count,
            last_error: self.last_error,
            created_at: self.created_at,
            sent_at: self.sent_at,
            last_attempt_at: self.last_attempt_at,
        })
    }
}
