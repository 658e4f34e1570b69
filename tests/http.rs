#![cfg(feature = "web")]

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use rdv_dashboard::app::{AppState, router};
use rdv_dashboard::config::DashboardConfig;
use rdv_dashboard::loader::MemorySource;
use rdv_dashboard::table::RawTable;
use std::sync::Arc;
use tower::ServiceExt;

const PASSWORD: &str = "papilles2025";

fn state() -> Arc<AppState> {
    let rows: Vec<Vec<String>> = [
        ["DATE", "CAMPAGNES", "NOMBRE DE RDV PRIS", "NOMBRE DE RDV PLANIFIÉ"],
        ["24/11/2025", "Plaisirs et Papilles", "3", "5"],
        ["", "Plaisirs et Papilles", "2", ""],
        ["25/11/2025", " Regards d'Experts ", "1", "1"],
    ]
    .iter()
    .map(|r| r.iter().map(|s| s.to_string()).collect())
    .collect();
    let source = Arc::new(MemorySource::new(RawTable::from_rows(rows)));
    Arc::new(AppState::new(DashboardConfig::default(), PASSWORD, source).unwrap())
}

async fn send(state: &Arc<AppState>, request: Request<Body>) -> Response {
    router(state.clone()).oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn login_request(password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("password={}", password)))
        .unwrap()
}

/// Log in and return the `session=...` pair for the Cookie header
async fn login(state: &Arc<AppState>) -> String {
    let response = send(state, login_request(PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn dashboard_requires_a_session() {
    let state = state();
    let response = send(&state, get("/", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");

    let response = send(&state, get("/", Some("session=forged"))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn wrong_password_prompts_again() {
    let state = state();
    let response = send(&state, login_request("nope")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let body = body_text(response).await;
    assert!(body.contains("Mot de passe incorrect."));
    assert!(state.sessions.is_empty());
}

#[tokio::test]
async fn correct_password_opens_the_dashboard() {
    let state = state();
    let cookie = login(&state).await;
    assert!(cookie.starts_with("session="));

    let response = send(&state, get("/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Campagne : Plaisirs et Papilles"));
    assert!(body.contains("Campagne : Portraits Féminins"));
    assert!(body.contains("Aucune donnée trouvée pour"));

    // already logged in: the form is skipped
    let response = send(&state, get("/login", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let state = state();
    let cookie = login(&state).await;

    let request = Request::builder()
        .method("POST")
        .uri("/logout")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = send(&state, request).await;
    assert_eq!(response.headers()[header::LOCATION], "/login");
    assert!(state.sessions.is_empty());

    let response = send(&state, get("/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn campaigns_api_returns_long_form() {
    let state = state();
    let cookie = login(&state).await;

    let response = send(&state, get("/api/campaigns", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();

    let campaigns = json.as_array().unwrap();
    assert_eq!(campaigns.len(), 4);
    assert_eq!(campaigns[0]["campaign"], "Plaisirs et Papilles");
    assert_eq!(campaigns[0]["records"].as_array().unwrap().len(), 4);
    assert_eq!(campaigns[2]["near_misses"][0], " Regards d'Experts ");
}

#[tokio::test]
async fn export_as_csv() {
    let state = state();
    let cookie = login(&state).await;

    let response = send(
        &state,
        get("/export/Plaisirs%20et%20Papilles?format=csv", Some(&cookie)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    let body = body_text(response).await;
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("24/11/2025,Plaisirs et Papilles,3"));

    let response = send(&state, get("/export/Inconnue", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &state,
        get("/export/Plaisirs%20et%20Papilles?format=pdf", Some(&cookie)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_is_public() {
    let state = state();
    let response = send(&state, get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}
