use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "scan_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    #[default]
    Approval,
    Entry,
    Verification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "scan_result", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScanResult {
    Success,
    Failed,
    Duplicate,
}

/// Audit record of one scan attempt. Never updated after insert.
#[derive(Debug, Clone, FromRow)]
pub struct QrScan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub scanned_by: Option<Uuid>,
    pub qr_data: String,
    pub scan_type: ScanType,
    pub scan_result: ScanResult,
    pub scan_location: Option<String>,
    pub notes: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct NewScan<'a> {
    pub user_id: Uuid,
    pub scanned_by: Uuid,
    pub qr_data: &'a str,
    pub scan_type: ScanType,
    pub scan_result: ScanResult,
    pub scan_location: Option<&'a str>,
    pub notes: Option<&'a str>,
}

/// Scan joined with the scanned user and the scanning admin.
#[derive(Debug, Clone, FromRow)]
pub struct ScanWithPeople {
    #[sqlx(flatten)]
    pub scan: QrScan,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub user_phone: Option<String>,
    pub scanner_name: Option<String>,
    pub scanner_email: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub user_id: Option<Uuid>,
    pub scan_type: Option<ScanType>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct ScanCounts {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub duplicate: i64,
    pub approval: i64,
    pub entry: i64,
    pub verification: i64,
    pub recent: i64,
}
