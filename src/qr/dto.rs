use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::pagination::PageMeta;
use crate::qr::repo_types::{QrScan, ScanResult, ScanType, ScanWithPeople};
use crate::users::dto::UserRef;

impl FromStr for ScanType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approval" => Ok(ScanType::Approval),
            "entry" => Ok(ScanType::Entry),
            "verification" => Ok(ScanType::Verification),
            other => Err(AppError::bad_request(format!("Invalid scan type: {other}"))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQrRequest {
    pub event_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrOwner {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_approved: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQrResponse {
    pub message: &'static str,
    pub qr_code: String,
    pub qr_data: String,
    pub user: QrOwner,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyQrResponse {
    pub qr_code: String,
    pub is_approved: bool,
}

/// Raw `/qr/scan` body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanBody {
    #[serde(default)]
    pub qr_data: String,
    pub scan_type: Option<String>,
    pub notes: Option<String>,
    pub scan_location: Option<String>,
}

/// Validated scan request.
#[derive(Debug)]
pub struct ScanRequest {
    pub qr_data: String,
    pub scan_type: ScanType,
    notes: Option<String>,
    scan_location: Option<String>,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl TryFrom<ScanBody> for ScanRequest {
    type Error = AppError;

    fn try_from(body: ScanBody) -> Result<Self, Self::Error> {
        // Kept verbatim: it is compared byte for byte and stored as scanned.
        let qr_data = body.qr_data;
        if qr_data.trim().is_empty() {
            return Err(AppError::bad_request("QR data is required"));
        }
        let scan_type = match body.scan_type.as_deref().map(str::trim) {
            None | Some("") => ScanType::default(),
            Some(s) => s.parse()?,
        };
        Ok(Self {
            qr_data,
            scan_type,
            notes: non_blank(body.notes),
            scan_location: non_blank(body.scan_location),
        })
    }
}

impl ScanRequest {
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.scan_location.as_deref()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScannedUserRef {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user: Option<ScannedUserRef>,
    pub scanned_by: Option<UserRef>,
    pub qr_data: String,
    pub scan_type: ScanType,
    pub scan_result: ScanResult,
    pub scan_location: Option<String>,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ScanView {
    pub fn new(scan: QrScan, user: Option<ScannedUserRef>, scanned_by: Option<UserRef>) -> Self {
        Self {
            id: scan.id,
            user_id: scan.user_id,
            user,
            scanned_by,
            qr_data: scan.qr_data,
            scan_type: scan.scan_type,
            scan_result: scan.scan_result,
            scan_location: scan.scan_location,
            notes: scan.notes,
            created_at: scan.created_at,
        }
    }
}

impl From<ScanWithPeople> for ScanView {
    fn from(row: ScanWithPeople) -> Self {
        let user = match (row.user_name, row.user_email, row.user_phone) {
            (Some(name), Some(email), Some(phone)) => Some(ScannedUserRef {
                id: row.scan.user_id,
                name,
                email,
                phone,
            }),
            _ => None,
        };
        let scanned_by = match (row.scan.scanned_by, row.scanner_name, row.scanner_email) {
            (Some(id), Some(name), Some(email)) => Some(UserRef { id, name, email }),
            _ => None,
        };
        ScanView::new(row.scan, user, scanned_by)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanUserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub is_approved: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub approved_date: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub message: &'static str,
    pub scan_result: ScanResult,
    pub user: ScanUserSummary,
    pub scan: ScanView,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanListQuery {
    pub user_id: Option<Uuid>,
    pub scan_type: Option<ScanType>,
}

#[derive(Debug, Serialize)]
pub struct ScanListResponse {
    pub scans: Vec<ScanView>,
    #[serde(flatten)]
    pub page: PageMeta,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub total_scans: i64,
    pub successful_scans: i64,
    pub failed_scans: i64,
    pub duplicate_scans: i64,
    pub approval_scans: i64,
    pub entry_scans: i64,
    pub verification_scans: i64,
    pub recent_scans: i64,
    pub success_rate: f64,
}
