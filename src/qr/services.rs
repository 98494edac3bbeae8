use std::io::Cursor;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    qr::{
        dto::{ScanRequest, ScanStats},
        repo_types::{NewScan, QrScan, ScanCounts, ScanResult, ScanType},
    },
    state::AppState,
    users::repo_types::User,
};

pub const DATA_URL_PREFIX: &str = "data:image/png;base64,";
const QR_MIN_SIZE: u32 = 256;

/// Identity encoded into a user's QR code. Serialized with camelCase keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub event_id: String,
    pub generated_at: String,
    pub generated_by: Uuid,
}

impl QrPayload {
    pub fn for_user(
        user: &User,
        event_id: &str,
        generated_by: Uuid,
        at: OffsetDateTime,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            event_id: event_id.to_string(),
            generated_at: at.format(&Rfc3339).context("format generatedAt")?,
            generated_by,
        })
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        serde_json::to_string(self).context("serialize qr payload")
    }
}

/// Renders `data` as a QR code (level M) and returns a PNG data URL.
pub fn render_png_data_url(data: &str) -> anyhow::Result<String> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)
        .context("encode qr code")?;
    let img = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_SIZE, QR_MIN_SIZE)
        .quiet_zone(true)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("encode qr png")?;

    Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(png)))
}

/// Why a scanned string could not be attributed to a user.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("Invalid QR code format")]
    Malformed,
    #[error("Invalid QR code: missing user ID")]
    MissingUserId,
    #[error("Invalid QR code: malformed user ID")]
    BadUserId,
}

impl From<PayloadError> for AppError {
    fn from(e: PayloadError) -> Self {
        AppError::bad_request(e.to_string())
    }
}

/// Pulls `userId` out of a scanned payload. Only the ID is trusted here;
/// the full string is compared against the stored payload afterwards.
pub fn scanned_user_id(qr_data: &str) -> Result<Uuid, PayloadError> {
    let value: serde_json::Value =
        serde_json::from_str(qr_data).map_err(|_| PayloadError::Malformed)?;
    match value.get("userId") {
        None | Some(serde_json::Value::Null) => Err(PayloadError::MissingUserId),
        Some(serde_json::Value::String(s)) if s.is_empty() => Err(PayloadError::MissingUserId),
        Some(serde_json::Value::String(s)) => {
            Uuid::parse_str(s).map_err(|_| PayloadError::BadUserId)
        }
        Some(_) => Err(PayloadError::BadUserId),
    }
}

/// What a scan does once the user is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDecision {
    /// Submitted payload differs from the stored one.
    Mismatch,
    /// Approval scan for a user that is already approved.
    AlreadyApproved,
    /// Approval scan that flips the user to approved.
    Approve,
    /// Entry or verification scan with a matching payload.
    Accept,
}

impl ScanDecision {
    pub fn decide(
        stored: Option<&str>,
        submitted: &str,
        scan_type: ScanType,
        is_approved: bool,
    ) -> Self {
        if stored != Some(submitted) {
            return ScanDecision::Mismatch;
        }
        match scan_type {
            ScanType::Approval if is_approved => ScanDecision::AlreadyApproved,
            ScanType::Approval => ScanDecision::Approve,
            ScanType::Entry | ScanType::Verification => ScanDecision::Accept,
        }
    }

    pub fn result(self) -> ScanResult {
        match self {
            ScanDecision::Mismatch => ScanResult::Failed,
            ScanDecision::AlreadyApproved => ScanResult::Duplicate,
            ScanDecision::Approve | ScanDecision::Accept => ScanResult::Success,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ScanDecision::Mismatch => "Invalid or expired QR code",
            ScanDecision::AlreadyApproved => "User is already approved",
            ScanDecision::Approve => "User approved successfully",
            ScanDecision::Accept => "QR code scanned successfully",
        }
    }
}

/// `part / total * 100` rounded to one decimal; 0 when `total` is 0.
pub fn percent_of(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}

pub fn scan_stats(c: ScanCounts) -> ScanStats {
    ScanStats {
        total_scans: c.total,
        successful_scans: c.successful,
        failed_scans: c.failed,
        duplicate_scans: c.duplicate,
        approval_scans: c.approval,
        entry_scans: c.entry,
        verification_scans: c.verification,
        recent_scans: c.recent,
        success_rate: percent_of(c.successful, c.total),
    }
}

pub struct GeneratedQr {
    pub user: User,
    pub image: String,
    pub data: String,
}

/// Issues a fresh payload for `user_id`, replacing any earlier one.
/// Returns `None` when the user does not exist.
pub async fn generate_for_user(
    st: &AppState,
    user_id: Uuid,
    event_id: &str,
    generated_by: Uuid,
) -> anyhow::Result<Option<GeneratedQr>> {
    let Some(user) = User::find_by_id(&st.db, user_id).await? else {
        return Ok(None);
    };

    let data = QrPayload::for_user(&user, event_id, generated_by, OffsetDateTime::now_utc())?
        .encode()?;
    let image = render_png_data_url(&data)?;

    let Some(user) = User::set_qr(&st.db, user_id, &image, &data, event_id).await? else {
        return Ok(None);
    };

    info!(user_id = %user.id, %generated_by, event_id, "qr code generated");
    Ok(Some(GeneratedQr { user, image, data }))
}

pub struct ScanOutcome {
    pub decision: ScanDecision,
    pub user: User,
    pub scan: QrScan,
}

/// Verifies a scanned payload and records the attempt.
///
/// Unparseable payloads and unknown users are rejected without an audit
/// record. A payload that does not match the user's stored one is recorded
/// as `failed` and then rejected. The approval update and the audit insert
/// are separate statements.
pub async fn process_scan(st: &AppState, admin: &User, req: &ScanRequest) -> AppResult<ScanOutcome> {
    let qr_data = req.qr_data.as_str();
    let user_id = scanned_user_id(qr_data).map_err(|e| {
        warn!(admin_id = %admin.id, error = %e, "unreadable qr payload");
        e
    })?;

    let user = User::find_by_id(&st.db, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let mut decision = ScanDecision::decide(
        user.qr_code_data.as_deref(),
        qr_data,
        req.scan_type,
        user.is_approved,
    );

    if decision == ScanDecision::Mismatch {
        QrScan::insert(
            &st.db,
            NewScan {
                user_id,
                scanned_by: admin.id,
                qr_data,
                scan_type: req.scan_type,
                scan_result: ScanResult::Failed,
                scan_location: req.location(),
                notes: Some("QR code mismatch"),
            },
        )
        .await?;
        warn!(%user_id, admin_id = %admin.id, "qr payload mismatch recorded");
        return Err(AppError::bad_request(decision.message()));
    }

    let user = if decision == ScanDecision::Approve {
        match User::approve(&st.db, user_id, admin.id).await? {
            Some(approved) => approved,
            None => {
                // Approved concurrently between the read and the update.
                decision = ScanDecision::AlreadyApproved;
                User::find_by_id(&st.db, user_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("User not found"))?
            }
        }
    } else {
        user
    };

    let scan = QrScan::insert(
        &st.db,
        NewScan {
            user_id,
            scanned_by: admin.id,
            qr_data,
            scan_type: req.scan_type,
            scan_result: decision.result(),
            scan_location: req.location(),
            notes: req.notes(),
        },
    )
    .await?;

    info!(
        %user_id,
        admin_id = %admin.id,
        scan_type = ?req.scan_type,
        result = ?decision.result(),
        "qr scan recorded"
    );
    Ok(ScanOutcome {
        decision,
        user,
        scan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::dto::ScanBody;
    use crate::qr::repo_types::ScanFilter;
    use crate::users::repo_types::{NewUser, Role};
    use axum::http::StatusCode;
    use sqlx::PgPool;

    fn user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            phone: "5551234567".into(),
            password_hash: String::new(),
            role: Role::User,
            is_approved: false,
            approved_date: None,
            approved_by: None,
            qr_code: None,
            qr_code_data: None,
            event_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn payload_uses_camel_case_keys() {
        let u = user();
        let admin = Uuid::new_v4();
        let at = time::macros::datetime!(2024-05-01 12:00 UTC);
        let json = QrPayload::for_user(&u, "launch", admin, at)
            .unwrap()
            .encode()
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["userId"], u.id.to_string());
        assert_eq!(v["eventId"], "launch");
        assert_eq!(v["generatedBy"], admin.to_string());
        assert_eq!(v["generatedAt"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn generated_payload_points_back_at_its_user() {
        let u = user();
        let json = QrPayload::for_user(&u, "e", u.id, OffsetDateTime::now_utc())
            .unwrap()
            .encode()
            .unwrap();
        assert_eq!(scanned_user_id(&json), Ok(u.id));
    }

    #[test]
    fn rendered_qr_is_a_png_data_url() {
        let url = render_png_data_url(r#"{"userId":"abc"}"#).unwrap();
        let b64 = url.strip_prefix(DATA_URL_PREFIX).expect("data url prefix");
        let png = STANDARD.decode(b64).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let img = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert!(img.width() >= QR_MIN_SIZE);
        assert_eq!(img.width(), img.height());
    }

    #[test]
    fn scanned_payload_errors() {
        assert_eq!(scanned_user_id("not json"), Err(PayloadError::Malformed));
        assert_eq!(scanned_user_id("{}"), Err(PayloadError::MissingUserId));
        assert_eq!(
            scanned_user_id(r#"{"userId":null}"#),
            Err(PayloadError::MissingUserId)
        );
        assert_eq!(
            scanned_user_id(r#"{"userId":""}"#),
            Err(PayloadError::MissingUserId)
        );
        assert_eq!(
            scanned_user_id(r#"{"userId":"42"}"#),
            Err(PayloadError::BadUserId)
        );
        assert_eq!(
            scanned_user_id(r#"{"userId":42}"#),
            Err(PayloadError::BadUserId)
        );
        assert_eq!(scanned_user_id("[1,2]"), Err(PayloadError::MissingUserId));
    }

    #[test]
    fn payload_errors_are_client_errors() {
        let err: AppError = PayloadError::Malformed.into();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid QR code format");
    }

    #[test]
    fn mismatched_payload_fails_regardless_of_type_or_state() {
        for scan_type in [ScanType::Approval, ScanType::Entry, ScanType::Verification] {
            for approved in [false, true] {
                let d = ScanDecision::decide(Some("stored"), "other", scan_type, approved);
                assert_eq!(d, ScanDecision::Mismatch);
                assert_eq!(d.result(), ScanResult::Failed);
            }
        }
    }

    #[test]
    fn user_without_stored_payload_never_matches() {
        let d = ScanDecision::decide(None, r#"{"userId":"x"}"#, ScanType::Approval, false);
        assert_eq!(d, ScanDecision::Mismatch);
    }

    #[test]
    fn approval_scan_of_pending_user_approves() {
        let d = ScanDecision::decide(Some("p"), "p", ScanType::Approval, false);
        assert_eq!(d, ScanDecision::Approve);
        assert_eq!(d.result(), ScanResult::Success);
        assert_eq!(d.message(), "User approved successfully");
    }

    #[test]
    fn approval_scan_of_approved_user_is_duplicate() {
        let d = ScanDecision::decide(Some("p"), "p", ScanType::Approval, true);
        assert_eq!(d, ScanDecision::AlreadyApproved);
        assert_eq!(d.result(), ScanResult::Duplicate);
        assert_eq!(d.message(), "User is already approved");
    }

    #[test]
    fn entry_and_verification_scans_succeed_without_approving() {
        for scan_type in [ScanType::Entry, ScanType::Verification] {
            for approved in [false, true] {
                let d = ScanDecision::decide(Some("p"), "p", scan_type, approved);
                assert_eq!(d, ScanDecision::Accept);
                assert_eq!(d.result(), ScanResult::Success);
            }
        }
    }

    #[test]
    fn percent_rounds_to_one_decimal() {
        assert_eq!(percent_of(0, 0), 0.0);
        assert_eq!(percent_of(5, 0), 0.0);
        assert_eq!(percent_of(1, 3), 33.3);
        assert_eq!(percent_of(2, 3), 66.7);
        assert_eq!(percent_of(7, 7), 100.0);
        assert_eq!(percent_of(1, 8), 12.5);
    }

    #[test]
    fn stats_map_every_counter() {
        let s = scan_stats(ScanCounts {
            total: 4,
            successful: 3,
            failed: 1,
            duplicate: 0,
            approval: 2,
            entry: 1,
            verification: 1,
            recent: 4,
        });
        assert_eq!(s.total_scans, 4);
        assert_eq!(s.successful_scans, 3);
        assert_eq!(s.failed_scans, 1);
        assert_eq!(s.approval_scans, 2);
        assert_eq!(s.recent_scans, 4);
        assert_eq!(s.success_rate, 75.0);

        assert_eq!(scan_stats(ScanCounts::default()).success_rate, 0.0);
    }

    #[test]
    fn padded_payload_does_not_match() {
        let stored = r#"{"userId":"a"}"#;
        let padded = format!("  {stored}\n");
        let d = ScanDecision::decide(Some(stored), &padded, ScanType::Entry, true);
        assert_eq!(d, ScanDecision::Mismatch);
    }

    async fn seed(db: &PgPool, email: &str, role: Role) -> User {
        User::create(
            db,
            NewUser {
                name: "Ada Lovelace",
                email,
                phone: "5551234567",
                password_hash: "not-a-real-hash",
                role,
                is_approved: role == Role::Admin,
            },
        )
        .await
        .expect("seed user")
    }

    fn scan_of(qr_data: &str, scan_type: &str) -> ScanRequest {
        ScanRequest::try_from(ScanBody {
            qr_data: qr_data.to_string(),
            scan_type: Some(scan_type.to_string()),
            ..Default::default()
        })
        .expect("valid scan request")
    }

    async fn scans_for(db: &PgPool, user_id: Uuid) -> Vec<QrScan> {
        let filter = ScanFilter {
            user_id: Some(user_id),
            scan_type: None,
        };
        QrScan::list(db, &filter, 100, 0)
            .await
            .expect("list scans")
            .into_iter()
            .map(|row| row.scan)
            .collect()
    }

    async fn scan_total(db: &PgPool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM qr_scans")
            .fetch_one(db)
            .await
            .expect("count scans")
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn approval_then_duplicate_keeps_the_first_approval(db: PgPool) {
        let st = AppState::with_pool(db.clone());
        let admin = seed(&db, "admin@example.com", Role::Admin).await;
        let guest = seed(&db, "ada@example.com", Role::User).await;
        let qr = generate_for_user(&st, guest.id, "gala", admin.id)
            .await
            .unwrap()
            .expect("user exists");

        let first = process_scan(&st, &admin, &scan_of(&qr.data, "approval"))
            .await
            .unwrap();
        assert_eq!(first.decision, ScanDecision::Approve);
        assert_eq!(first.scan.scan_result, ScanResult::Success);
        assert!(first.user.is_approved);
        assert_eq!(first.user.approved_by, Some(admin.id));
        let approved_at = first.user.approved_date.expect("approval is stamped");

        let second = process_scan(&st, &admin, &scan_of(&qr.data, "approval"))
            .await
            .unwrap();
        assert_eq!(second.decision, ScanDecision::AlreadyApproved);
        assert_eq!(second.scan.scan_result, ScanResult::Duplicate);
        assert_eq!(second.user.approved_date, Some(approved_at));

        let results: Vec<ScanResult> = scans_for(&db, guest.id)
            .await
            .iter()
            .map(|s| s.scan_result)
            .collect();
        assert_eq!(results.len(), 2);
        assert!(results.contains(&ScanResult::Success));
        assert!(results.contains(&ScanResult::Duplicate));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn mismatch_is_recorded_as_failed_without_approving(db: PgPool) {
        let st = AppState::with_pool(db.clone());
        let admin = seed(&db, "admin@example.com", Role::Admin).await;
        let guest = seed(&db, "ada@example.com", Role::User).await;
        let qr = generate_for_user(&st, guest.id, "gala", admin.id)
            .await
            .unwrap()
            .expect("user exists");

        let padded = format!("  {}\n", qr.data);
        let err = process_scan(&st, &admin, &scan_of(&padded, "approval"))
            .await
            .err()
            .expect("mismatch is rejected");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid or expired QR code");

        let after = User::find_by_id(&db, guest.id).await.unwrap().unwrap();
        assert!(!after.is_approved);
        assert_eq!(after.approved_date, None);

        let scans = scans_for(&db, guest.id).await;
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].scan_result, ScanResult::Failed);
        assert_eq!(scans[0].qr_data, padded);
        assert_eq!(scans[0].notes.as_deref(), Some("QR code mismatch"));
        assert_eq!(scans[0].scanned_by, Some(admin.id));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn regenerating_invalidates_the_old_payload(db: PgPool) {
        let st = AppState::with_pool(db.clone());
        let admin = seed(&db, "admin@example.com", Role::Admin).await;
        let guest = seed(&db, "ada@example.com", Role::User).await;
        let old = generate_for_user(&st, guest.id, "gala", admin.id)
            .await
            .unwrap()
            .expect("user exists");
        let new = generate_for_user(&st, guest.id, "gala", admin.id)
            .await
            .unwrap()
            .expect("user exists");
        assert_ne!(old.data, new.data);

        let err = process_scan(&st, &admin, &scan_of(&old.data, "entry"))
            .await
            .err()
            .expect("stale payload is rejected");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let ok = process_scan(&st, &admin, &scan_of(&new.data, "entry"))
            .await
            .unwrap();
        assert_eq!(ok.decision, ScanDecision::Accept);
        assert!(!ok.user.is_approved);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unreadable_or_unknown_payloads_write_nothing(db: PgPool) {
        let st = AppState::with_pool(db.clone());
        let admin = seed(&db, "admin@example.com", Role::Admin).await;

        for (payload, status) in [
            ("not json".to_string(), StatusCode::BAD_REQUEST),
            ("{}".to_string(), StatusCode::BAD_REQUEST),
            (r#"{"userId":"42"}"#.to_string(), StatusCode::BAD_REQUEST),
            (
                format!(r#"{{"userId":"{}"}}"#, Uuid::new_v4()),
                StatusCode::NOT_FOUND,
            ),
        ] {
            let err = process_scan(&st, &admin, &scan_of(&payload, "approval"))
                .await
                .err()
                .expect("scan is rejected");
            assert_eq!(err.status(), status, "{payload}");
        }

        assert_eq!(scan_total(&db).await, 0);
    }
}
