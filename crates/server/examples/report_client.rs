//! Submit one report of each type to a running server.
//!
//! ```sh
//! cargo run -p perfreport-server --example report_client
//! ```

use reqwest::Client;
use serde_json::json;

const SERVER_URL: &str = "http://localhost:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = Client::new();

    // 1. Health check
    println!("1. Health Check:");
    let resp = client.get(format!("{SERVER_URL}/health")).send().await?;
    println!("Status: {}", resp.status());
    println!("Body: {}", resp.text().await?);
    println!();

    let reports = [
        json!({
            "type": "envData",
            "guid": "example-env",
            "envData": {
                "userAgent": "Mozilla/5.0 (X11; Linux x86_64)",
                "pageUrl": "https://example.com/watch/1",
                "playerAdapter": "html5",
                "playerVersion": "7.1.0",
                "adBlockerPresent": false
            }
        }),
        json!({
            "type": "adData",
            "guid": "example-ad",
            "adData": {
                "adRequestStart": 100.0,
                "adRequestEnd": 142.5,
                "adRequestUrl": "https://ads.example.com/vast",
                "hasPreroll": true,
                "preroll": { "adId": "a1", "creativeId": "c1", "creativeRenditionId": "r1", "slotCustomId": "s1" }
            }
        }),
        json!({
            "type": "assetData",
            "guid": "example-asset",
            "assetData": { "assetUrl": "https://cdn.example.com/v.m3u8", "assetMpxId": "mpx-1", "assetGuid": "asset-1", "ccType": "608" }
        }),
        json!({
            "type": "eventLog",
            "guid": "example-events",
            "eventLog": [{ "type": "load", "timestamp": 1.0 }, { "type": "play", "timestamp": 2.5 }]
        }),
    ];

    // 2. One report per type
    for (n, report) in reports.iter().enumerate() {
        println!("2.{}. Submit {}:", n + 1, report["type"]);
        let resp = client
            .post(format!("{SERVER_URL}/perfReport"))
            .body(report.to_string())
            .send()
            .await?;
        println!("Status: {}", resp.status());
        println!();
    }

    // 3. Wrong method
    println!("3. GET /perfReport:");
    let resp = client.get(format!("{SERVER_URL}/perfReport")).send().await?;
    println!("Status: {}", resp.status());
    println!("Body: {}", resp.text().await?);
    println!();

    // 4. Readiness with queue depth
    println!("4. Readiness:");
    let resp = client.get(format!("{SERVER_URL}/ready")).send().await?;
    println!("Status: {}", resp.status());
    println!("Body: {}", resp.text().await?);

    Ok(())
}
