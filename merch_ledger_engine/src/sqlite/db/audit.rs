use sqlx::SqliteConnection;

use crate::db_types::{AuditLogEntry, NewAuditEntry, UserId};

/// Appends an entry outside of any transaction. The statement must run to completion (`fetch_all`) before the new row
/// is visible to other pooled connections.
pub async fn insert_audit_entry(
    entry: NewAuditEntry,
    conn: &mut SqliteConnection,
) -> Result<AuditLogEntry, sqlx::Error> {
    let rows: Vec<AuditLogEntry> = sqlx::query_as(
        r#"
        INSERT INTO audit_log (user_id, created_by_id, reason, system_text, user_text)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.created_by_id)
    .bind(entry.reason)
    .bind(entry.system_text)
    .bind(entry.user_text)
    .fetch_all(conn)
    .await?;
    rows.into_iter().next().ok_or(sqlx::Error::RowNotFound)
}

pub async fn entries_for_user(user_id: &UserId, conn: &mut SqliteConnection) -> Result<Vec<AuditLogEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM audit_log WHERE user_id = $1 ORDER BY id ASC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

#[cfg(test)]
mod test {
    use crate::{
        db_types::{NewAuditEntry, UserId},
        test_utils::prepare_env::new_test_database,
        traits::AuditLog,
    };

    #[tokio::test]
    async fn appended_entries_are_visible_to_the_next_read() {
        let db = new_test_database().await;
        let mallory = UserId::from("mallory");
        for i in 0..20 {
            let entry = NewAuditEntry::new(&mallory, &mallory, format!("Attempt {i}"))
                .with_system_text("Unauthorized attempt")
                .with_user_text("You are not authorized.");
            let appended = db.append(entry).await.expect("Error appending audit entry");
            assert_eq!(appended.reason, format!("Attempt {i}"));
            let entries = db.entries_for_user(&mallory).await.expect("Error reading audit log");
            assert_eq!(entries.len(), i + 1, "entry {i} was not visible straight after it was written");
        }
    }
}
