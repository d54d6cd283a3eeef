use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Local;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use envwatch::auth::hash_password;
use envwatch::mail::NoopMailer;
use envwatch::{build_app, AppState, Config, MailError, MailTransport, OutgoingMail, RefreshRate};

// ---

const PASSWORD: &str = "correct horse";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    success: bool,
    token: String,
    refresh_rate: u32,
}

#[derive(Debug, Deserialize)]
struct ParameterLine {
    label: String,
    severity: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct DashboardView {
    tick: u64,
    parameters: Vec<ParameterLine>,
    history: Vec<serde_json::Value>,
    air_quality: String,
    sound_allowed: bool,
}

#[derive(Debug, Deserialize)]
struct ReportMetadata {
    id: String,
    report_type: String,
    format: String,
    size_bytes: usize,
    email_sent: bool,
}

/// Relay that answers every submission with an error after `delay`.
struct FailingMailer {
    delay: Duration,
}

impl MailTransport for FailingMailer {
    fn send(&self, _mail: &OutgoingMail) -> Result<(), MailError> {
        std::thread::sleep(self.delay);
        Err(MailError::Transport("relay unavailable".into()))
    }
}

/// Serve the app on an ephemeral port and return its base URL.
async fn spawn_app() -> Result<String> {
    spawn_app_with(Arc::new(NoopMailer)).await
}

async fn spawn_app_with(mailer: Arc<dyn MailTransport>) -> Result<String> {
    // ---
    let config = Config {
        bind_addr: "127.0.0.1:0".parse()?,
        dashboard_user: "admin".to_string(),
        dashboard_password_sha256: hash_password(PASSWORD),
        location: "Test Bench".to_string(),
        default_refresh: RefreshRate::default(),
        session_idle_minutes: 30,
        mail: None,
    };
    let app = build_app(AppState::new(config, mailer));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok(format!("http://{}", addr))
}

async fn login(client: &Client, base: &str) -> Result<String> {
    // ---
    let res: LoginResponse = client
        .post(format!("{}/api/login", base))
        .json(&json!({ "username": "admin", "password": PASSWORD }))
        .send()
        .await?
        .json()
        .await?;
    assert!(res.success);
    assert_eq!(res.refresh_rate, 2);
    Ok(res.token)
}

#[tokio::test]
async fn health_and_shell_are_public() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();

    let health: serde_json::Value = client.get(format!("{}/health", base)).send().await?.json().await?;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["mail_configured"], false);

    let page = client.get(format!("{}/", base)).send().await?.text().await?;
    assert!(page.contains("/api/dashboard"));

    let beep = client.get(format!("{}/assets/beep.wav?n=1", base)).send().await?;
    assert_eq!(beep.headers()["content-type"], "audio/wav");
    assert!(beep.bytes().await?.starts_with(b"RIFF"));

    Ok(())
}

#[tokio::test]
async fn login_rejects_bad_credentials() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();

    let res = client
        .post(format!("{}/api/login", base))
        .json(&json!({ "username": "admin", "password": "wrong" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid credentials");

    let res = client.get(format!("{}/api/dashboard", base)).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn dashboard_ticks_and_keeps_twenty_samples() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();
    let token = login(&client, &base).await?;

    let mut last = None;
    for _ in 0..25 {
        let view: DashboardView = client
            .get(format!("{}/api/dashboard", base))
            .header("x-session-token", &token)
            .send()
            .await?
            .json()
            .await?;
        last = Some(view);
    }
    let view = last.unwrap();

    assert_eq!(view.tick, 25);
    assert_eq!(view.history.len(), 20);
    assert_eq!(view.parameters.len(), 6);
    assert_eq!(view.parameters[0].label, "Temperature");
    assert!(["NORMAL", "WARN", "CRITICAL"].contains(&view.parameters[0].severity.as_str()));
    assert!(!view.parameters[5].status.is_empty());
    assert!(["Good", "Moderate", "Poor"].contains(&view.air_quality.as_str()));
    assert!(view.sound_allowed);

    let csv = client
        .get(format!("{}/api/dashboard/export.csv", base))
        .header("x-session-token", &token)
        .send()
        .await?
        .text()
        .await?;
    assert!(csv.starts_with("timestamp,temperature,humidity,pressure,co2,pm25,noise\n"));

    let pdf = client
        .get(format!("{}/api/dashboard/export.pdf", base))
        .header("x-session-token", &token)
        .send()
        .await?
        .bytes()
        .await?;
    assert!(pdf.starts_with(b"%PDF"));

    Ok(())
}

#[tokio::test]
async fn settings_mute_the_alarm() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();
    let token = login(&client, &base).await?;

    let res = client
        .post(format!("{}/api/dashboard/settings", base))
        .header("x-session-token", &token)
        .json(&json!({ "refresh_rate": 4 }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let settings: serde_json::Value = client
        .post(format!("{}/api/dashboard/settings", base))
        .header("x-session-token", &token)
        .json(&json!({ "sound_allowed": false, "refresh_rate": 5 }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(settings["refresh_rate"], 5);
    assert_eq!(settings["sound_allowed"], false);

    for _ in 0..10 {
        let view: serde_json::Value = client
            .get(format!("{}/api/dashboard", base))
            .header("x-session-token", &token)
            .send()
            .await?
            .json()
            .await?;
        assert!(view["audio"].is_null());
    }

    let alarm: serde_json::Value = client
        .post(format!("{}/api/dashboard/test-alarm", base))
        .header("x-session-token", &token)
        .send()
        .await?
        .json()
        .await?;
    assert!(alarm["audio"].is_null());

    Ok(())
}

#[tokio::test]
async fn analytics_filters_by_range() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();
    let token = login(&client, &base).await?;

    let all: serde_json::Value = client
        .get(format!("{}/api/analytics", base))
        .header("x-session-token", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(all["records"].as_array().map(Vec::len), Some(30));
    assert_eq!(all["correlation"]["metrics"].as_array().map(Vec::len), Some(5));
    assert_eq!(all["alerts"].as_array().map(Vec::len), Some(5));
    assert_eq!(all["alerts"][0]["label"], "Temperature");

    let today = Local::now().date_naive();
    let start = today - chrono::Duration::days(6);
    let week: serde_json::Value = client
        .get(format!("{}/api/analytics?start={}&end={}", base, start, today))
        .header("x-session-token", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(week["records"].as_array().map(Vec::len), Some(7));

    let res = client
        .get(format!("{}/api/analytics?start={}&end={}", base, today, start))
        .header("x-session-token", &token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn analytics_range_exports_and_mail() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();
    let token = login(&client, &base).await?;

    let today = Local::now().date_naive();
    let start = today - chrono::Duration::days(6);

    let csv = client
        .get(format!("{}/api/analytics/export.csv?start={}&end={}", base, start, today))
        .header("x-session-token", &token)
        .send()
        .await?;
    assert_eq!(
        csv.headers()["content-disposition"],
        format!("attachment; filename=\"Analytics_Data_{}_{}.csv\"", start, today).as_str()
    );
    let csv = csv.text().await?;
    assert_eq!(csv.lines().count(), 8);
    assert!(csv.starts_with("Date,Temperature,Humidity,Pressure,PM2.5,CO2,Noise,Energy_Consumption\n"));

    let xlsx = client
        .get(format!("{}/api/analytics/export.xlsx?start={}", base, start))
        .header("x-session-token", &token)
        .send()
        .await?;
    assert_eq!(xlsx.status(), StatusCode::OK);
    assert!(xlsx.bytes().await?.starts_with(b"PK"));

    let mail: serde_json::Value = client
        .post(format!("{}/api/analytics/email?start={}&end={}", base, start, today))
        .header("x-session-token", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(mail["success"], true);
    assert!(mail["message"].as_str().unwrap_or("").starts_with("Analytics report sent"));

    let res = client
        .get(format!("{}/api/analytics/export.csv?start={}&end={}", base, today, start))
        .header("x-session-token", &token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn reports_are_generated_and_listed() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();
    let token = login(&client, &base).await?;
    let today = Local::now().date_naive().to_string();

    let pdf = client
        .post(format!("{}/api/reports", base))
        .header("x-session-token", &token)
        .json(&json!({
            "report_type": "Daily Summary",
            "report_date": today,
            "time_period": "Last 7 days",
            "sections": ["Executive Summary", "Alert History", "Energy Consumption"],
            "format": "pdf",
            "send_email": true
        }))
        .send()
        .await?;
    assert_eq!(pdf.status(), StatusCode::OK);
    assert_eq!(pdf.headers()["content-type"], "application/pdf");
    assert_eq!(pdf.headers()["x-email-sent"], "true");
    assert!(pdf.headers().get("x-report-warning").is_none());
    assert!(pdf.bytes().await?.starts_with(b"%PDF"));

    let xlsx = client
        .post(format!("{}/api/reports", base))
        .header("x-session-token", &token)
        .json(&json!({
            "report_type": "Monthly Review",
            "report_date": today,
            "time_period": "Last 30 days",
            "format": "excel"
        }))
        .send()
        .await?;
    assert_eq!(xlsx.status(), StatusCode::OK);
    assert!(xlsx.bytes().await?.starts_with(b"PK"));

    let empty = client
        .post(format!("{}/api/reports", base))
        .header("x-session-token", &token)
        .json(&json!({
            "report_type": "Custom Report",
            "report_date": today,
            "time_period": "Custom range",
            "sections": [],
            "format": "pdf"
        }))
        .send()
        .await?;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let history: Vec<ReportMetadata> = client
        .get(format!("{}/api/reports", base))
        .header("x-session-token", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].report_type, "Monthly Review");
    assert_eq!(history[0].format, "excel");
    assert!(!history[0].email_sent);
    assert_eq!(history[1].report_type, "Daily Summary");
    assert!(history[1].email_sent);
    assert!(history.iter().all(|r| r.size_bytes > 0 && r.id.len() == 14));

    Ok(())
}

async fn create_report(client: &Client, base: &str, token: &str, send_email: bool) -> Result<reqwest::Response> {
    // ---
    let res = client
        .post(format!("{}/api/reports", base))
        .header("x-session-token", token)
        .json(&json!({
            "report_type": "Incident Report",
            "report_date": Local::now().date_naive().to_string(),
            "time_period": "Last 7 days",
            "format": "pdf",
            "send_email": send_email
        }))
        .send()
        .await?;
    Ok(res)
}

#[tokio::test]
async fn report_history_actions() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();
    let token = login(&client, &base).await?;

    for _ in 0..22 {
        let res = create_report(&client, &base, &token, false).await?;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let csv = client
        .get(format!("{}/api/reports/export.csv", base))
        .header("x-session-token", &token)
        .send()
        .await?
        .text()
        .await?;
    assert_eq!(csv.lines().count(), 23);
    assert!(csv.lines().skip(1).all(|l| l.contains(",Incident Report,")));

    let cleared: serde_json::Value = client
        .post(format!("{}/api/reports/clear", base))
        .header("x-session-token", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(cleared["removed"], 2);
    assert_eq!(cleared["remaining"], 20);

    let history: Vec<ReportMetadata> = client
        .get(format!("{}/api/reports", base))
        .header("x-session-token", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(history.len(), 20);
    assert!(!history[0].email_sent);

    let resent: serde_json::Value = client
        .post(format!("{}/api/reports/{}/resend", base, history[0].id))
        .header("x-session-token", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(resent["success"], true);

    let history: Vec<ReportMetadata> = client
        .get(format!("{}/api/reports", base))
        .header("x-session-token", &token)
        .send()
        .await?
        .json()
        .await?;
    assert!(history[0].email_sent);

    let res = client
        .post(format!("{}/api/reports/19990101000000/resend", base))
        .header("x-session-token", &token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_report_mail_keeps_the_file_and_settings_stay_responsive() -> Result<()> {
    // ---
    let base = spawn_app_with(Arc::new(FailingMailer {
        delay: Duration::from_millis(1500),
    }))
    .await?;
    let client = Client::new();
    let token = login(&client, &base).await?;

    let pending = {
        let (client, base, token) = (client.clone(), base.clone(), token.clone());
        tokio::spawn(async move { create_report(&client, &base, &token, true).await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = Instant::now();
    let res = client
        .post(format!("{}/api/dashboard/settings", base))
        .header("x-session-token", &token)
        .json(&json!({ "sound_allowed": false }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(
        started.elapsed() < Duration::from_millis(1000),
        "settings waited {:?} for the mail relay",
        started.elapsed()
    );

    let report = pending.await??;
    assert_eq!(report.status(), StatusCode::OK);
    assert_eq!(report.headers()["x-email-sent"], "false");
    let warning = report.headers()["x-report-warning"].to_str()?.to_string();
    assert!(warning.starts_with("Failed to send report email: "), "{}", warning);
    assert!(warning.contains("relay unavailable"));
    assert!(report.bytes().await?.starts_with(b"%PDF"));

    let history: Vec<ReportMetadata> = client
        .get(format!("{}/api/reports", base))
        .header("x-session-token", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(history.len(), 1);
    assert!(!history[0].email_sent);

    let resent: serde_json::Value = client
        .post(format!("{}/api/reports/{}/resend", base, history[0].id))
        .header("x-session-token", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(resent["success"], false);
    assert!(resent["message"].as_str().unwrap_or("").contains("relay unavailable"));

    Ok(())
}

#[tokio::test]
async fn mail_actions_and_logout() -> Result<()> {
    // ---
    let base = spawn_app().await?;
    let client = Client::new();
    let token = login(&client, &base).await?;

    let res = client
        .post(format!("{}/api/mail/daily-summary", base))
        .header("x-session-token", &token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    client
        .get(format!("{}/api/dashboard", base))
        .header("x-session-token", &token)
        .send()
        .await?;

    for path in ["/api/mail/test", "/api/mail/daily-summary"] {
        let body: serde_json::Value = client
            .post(format!("{}{}", base, path))
            .header("x-session-token", &token)
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(body["success"], true, "{} failed: {}", path, body);
        assert!(body["message"].as_str().unwrap_or("").contains("not configured"));
    }

    let res = client
        .post(format!("{}/api/logout", base))
        .header("x-session-token", &token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/api/dashboard", base))
        .header("x-session-token", &token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}
