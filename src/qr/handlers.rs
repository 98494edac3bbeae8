use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::{AdminUser, CurrentUser},
    error::{AppError, AppResult},
    extract::{AppJson, AppPath, AppQuery},
    pagination::Pagination,
    qr::{
        dto::{
            GenerateQrRequest, GenerateQrResponse, MyQrResponse, QrOwner, ScanBody,
            ScanListQuery, ScanListResponse, ScanRequest, ScanResponse, ScanStats,
            ScanUserSummary, ScanView, ScannedUserRef,
        },
        repo_types::{QrScan, ScanFilter},
        services::{generate_for_user, process_scan, scan_stats, GeneratedQr},
    },
    state::AppState,
    users::dto::UserRef,
};

pub fn qr_routes() -> Router<AppState> {
    Router::new()
        .route("/qr/generate/:user_id", post(generate_qr))
        .route("/qr/generate-my-qr", post(generate_my_qr))
        .route("/qr/scan", post(scan_qr))
        .route("/qr/my-qr", get(my_qr))
        .route("/qr/scans", get(list_scans))
        .route("/qr/scans/stats", get(scan_statistics))
}

fn generated_response(g: GeneratedQr) -> GenerateQrResponse {
    GenerateQrResponse {
        message: "QR code generated successfully",
        qr_code: g.image,
        qr_data: g.data,
        user: QrOwner {
            id: g.user.id,
            name: g.user.name,
            email: g.user.email,
            is_approved: g.user.is_approved,
        },
    }
}

fn event_id_or_default(state: &AppState, body: Option<AppJson<GenerateQrRequest>>) -> String {
    body.and_then(|AppJson(b)| b.event_id)
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| state.config.default_event_id.clone())
}

#[instrument(skip(state, admin, body))]
pub async fn generate_qr(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(user_id): AppPath<Uuid>,
    body: Option<AppJson<GenerateQrRequest>>,
) -> AppResult<Json<GenerateQrResponse>> {
    let event_id = event_id_or_default(&state, body);
    let generated = generate_for_user(&state, user_id, &event_id, admin.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(generated_response(generated)))
}

#[instrument(skip(state, user, body))]
pub async fn generate_my_qr(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Option<AppJson<GenerateQrRequest>>,
) -> AppResult<Json<GenerateQrResponse>> {
    let event_id = event_id_or_default(&state, body);
    let generated = generate_for_user(&state, user.id, &event_id, user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(generated_response(generated)))
}

#[instrument(skip(state, admin, body))]
pub async fn scan_qr(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppJson(body): AppJson<ScanBody>,
) -> AppResult<Json<ScanResponse>> {
    let req = ScanRequest::try_from(body)?;
    let outcome = process_scan(&state, &admin, &req).await?;
    let user = outcome.user;

    let scan = ScanView::new(
        outcome.scan,
        Some(ScannedUserRef {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
        }),
        Some(UserRef {
            id: admin.id,
            name: admin.name,
            email: admin.email,
        }),
    );

    Ok(Json(ScanResponse {
        message: outcome.decision.message(),
        scan_result: outcome.decision.result(),
        user: ScanUserSummary {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            is_approved: user.is_approved,
            approved_date: user.approved_date,
        },
        scan,
    }))
}

#[instrument(skip_all)]
pub async fn my_qr(CurrentUser(user): CurrentUser) -> AppResult<Json<MyQrResponse>> {
    let qr_code = user
        .qr_code
        .ok_or_else(|| AppError::not_found("QR code not generated yet"))?;
    Ok(Json(MyQrResponse {
        qr_code,
        is_approved: user.is_approved,
    }))
}

#[instrument(skip(state, _admin))]
pub async fn list_scans(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    AppQuery(page): AppQuery<Pagination>,
    AppQuery(query): AppQuery<ScanListQuery>,
) -> AppResult<Json<ScanListResponse>> {
    let filter = ScanFilter {
        user_id: query.user_id,
        scan_type: query.scan_type,
    };
    let rows = QrScan::list(&state.db, &filter, page.limit(), page.offset()).await?;
    let total = QrScan::count(&state.db, &filter).await?;
    Ok(Json(ScanListResponse {
        scans: rows.into_iter().map(ScanView::from).collect(),
        page: page.meta(total),
    }))
}

#[instrument(skip(state, _admin))]
pub async fn scan_statistics(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<ScanStats>> {
    let counts = QrScan::counts(&state.db).await?;
    Ok(Json(scan_stats(counts)))
}
