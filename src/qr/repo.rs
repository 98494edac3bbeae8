use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use crate::qr::repo_types::{NewScan, QrScan, ScanCounts, ScanFilter, ScanWithPeople};

const SCAN_COLUMNS: &str =
    "id, user_id, scanned_by, qr_data, scan_type, scan_result, scan_location, notes, created_at";

const SCAN_FILTER: &str = r#"
    WHERE ($1::uuid IS NULL OR s.user_id = $1)
      AND ($2::scan_type IS NULL OR s.scan_type = $2)
"#;

impl QrScan {
    pub async fn insert(db: &PgPool, new: NewScan<'_>) -> anyhow::Result<QrScan> {
        let sql = format!(
            r#"
            INSERT INTO qr_scans
                (id, user_id, scanned_by, qr_data, scan_type, scan_result, scan_location, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {SCAN_COLUMNS}
            "#
        );
        let scan = sqlx::query_as::<_, QrScan>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.user_id)
            .bind(new.scanned_by)
            .bind(new.qr_data)
            .bind(new.scan_type)
            .bind(new.scan_result)
            .bind(new.scan_location)
            .bind(new.notes)
            .fetch_one(db)
            .await
            .context("insert qr scan")?;
        Ok(scan)
    }

    /// Newest first, with the scanned user and scanner populated.
    pub async fn list(
        db: &PgPool,
        filter: &ScanFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<ScanWithPeople>> {
        let sql = format!(
            r#"
            SELECT s.id, s.user_id, s.scanned_by, s.qr_data, s.scan_type, s.scan_result,
                   s.scan_location, s.notes, s.created_at,
                   u.name AS user_name, u.email AS user_email, u.phone AS user_phone,
                   a.name AS scanner_name, a.email AS scanner_email
              FROM qr_scans s
              LEFT JOIN users u ON u.id = s.user_id
              LEFT JOIN users a ON a.id = s.scanned_by
            {SCAN_FILTER}
             ORDER BY s.created_at DESC
             LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query_as::<_, ScanWithPeople>(&sql)
            .bind(filter.user_id)
            .bind(filter.scan_type)
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await
            .context("list qr scans")?;
        Ok(rows)
    }

    pub async fn count(db: &PgPool, filter: &ScanFilter) -> anyhow::Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM qr_scans s {SCAN_FILTER}");
        let total: i64 = sqlx::query_scalar(&sql)
            .bind(filter.user_id)
            .bind(filter.scan_type)
            .fetch_one(db)
            .await
            .context("count qr scans")?;
        Ok(total)
    }

    /// All aggregate counters in one pass over the audit table.
    pub async fn counts(db: &PgPool) -> anyhow::Result<ScanCounts> {
        let counts = sqlx::query_as::<_, ScanCounts>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE scan_result = 'success') AS successful,
                   COUNT(*) FILTER (WHERE scan_result = 'failed') AS failed,
                   COUNT(*) FILTER (WHERE scan_result = 'duplicate') AS duplicate,
                   COUNT(*) FILTER (WHERE scan_type = 'approval') AS approval,
                   COUNT(*) FILTER (WHERE scan_type = 'entry') AS entry,
                   COUNT(*) FILTER (WHERE scan_type = 'verification') AS verification,
                   COUNT(*) FILTER (WHERE created_at >= now() - INTERVAL '24 hours') AS recent
              FROM qr_scans
            "#,
        )
        .fetch_one(db)
        .await
        .context("qr scan counts")?;
        Ok(counts)
    }
}
