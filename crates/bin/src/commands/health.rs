//! Health command - asks a running Folio server which backend it serves.

use std::time::Duration;

use serde::Deserialize;

use crate::cli::HealthArgs;

/// Body of `GET /health`.
#[derive(Debug, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub backend: String,
}

/// The server's `/health` URL, given either its base URL or the endpoint itself.
fn health_url(url: &str) -> String {
    let base = url.trim_end_matches('/');
    if base.ends_with("/health") {
        base.to_string()
    } else {
        format!("{base}/health")
    }
}

/// Fetch the report; anything but a healthy answer is an error.
pub async fn check(args: &HealthArgs) -> Result<HealthReport, Box<dyn std::error::Error>> {
    let url = health_url(&args.url);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("unhealthy: failed to connect to {url}: {e}"))?;
    if !response.status().is_success() {
        return Err(format!("unhealthy: {url} answered HTTP {}", response.status()).into());
    }
    let report: HealthReport = response.json().await?;
    if report.status != "healthy" {
        return Err(format!("unhealthy: {} backend reports '{}'", report.backend, report.status).into());
    }
    Ok(report)
}

/// Run the health check command
pub async fn run(args: &HealthArgs) -> Result<(), Box<dyn std::error::Error>> {
    let report = check(args).await?;
    println!("healthy ({} backend)", report.backend);
    Ok(())
}
