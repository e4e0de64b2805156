// src/main.rs

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::env;
use std::error::Error;
use std::time::Instant;

// Response types
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(rename = "sheetApiConfigured")]
    sheet_api_configured: bool,
}

#[derive(Debug, Deserialize)]
struct SheetList {
    sheets: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Summary {
    attended: u32,
    expected: u32,
    rate: f64,
}

#[derive(Debug, Deserialize)]
struct RankedEmployee {
    name: String,
    summary: Summary,
}

#[derive(Debug, Deserialize)]
struct RankingResponse {
    worst: Vec<RankedEmployee>,
    best: Vec<RankedEmployee>,
}

fn print_ranked(label: &str, entries: &[RankedEmployee]) {
    println!("{}:", label);
    for entry in entries {
        println!(
            "  {} {:.0}% ({}/{})",
            entry.name,
            entry.summary.rate * 100.0,
            entry.summary.attended,
            entry.summary.expected
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url = env::var("ATTENDANCE_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let warehouse = env::var("TEST_WAREHOUSE").unwrap_or_else(|_| "TP01".to_string());
    let client = Client::new();

    // Test 1: Health check
    println!("\n🔍 Testing health check endpoint...");
    let health = client
        .get(format!("{}/health", base_url))
        .send()
        .await?
        .json::<HealthResponse>()
        .await?;
    println!("Health check response: {:?}", health);
    if !health.sheet_api_configured {
        println!("⚠️ SHEET_API_URL is not set on the server; remote calls will fail with 500.");
    }

    // Test 2: Sheet listing
    println!("\n🔍 Testing sheet listing for warehouse {}...", warehouse);
    let response = client
        .get(format!("{}/api/sheets", base_url))
        .query(&[("warehouse", warehouse.as_str())])
        .send()
        .await?;
    println!("Sheet listing status: {}", response.status());
    if !response.status().is_success() {
        println!("Failed to list sheets: {}", response.text().await?);
        return Ok(());
    }
    let listing = response.json::<SheetList>().await?;
    println!("Sheets: {:?}", listing.sheets);

    // Prefer an explicit sheet, else the first schedule sheet
    let sheet = match env::var("TEST_SHEET")
        .ok()
        .or_else(|| listing.sheets.iter().find(|s| s.contains("班表")).cloned())
    {
        Some(sheet) => sheet,
        None => {
            println!("No schedule sheet found; set TEST_SHEET to pick one.");
            return Ok(());
        }
    };

    // Test 3: Sheet query
    println!("\n🔍 Testing sheet query for '{}'...", sheet);
    let params = [("warehouse", warehouse.as_str()), ("sheet", sheet.as_str())];
    let started = Instant::now();
    let response = client
        .get(format!("{}/api/sheet", base_url))
        .query(&params)
        .send()
        .await?;
    println!("Sheet query status: {} in {:?}", response.status(), started.elapsed());
    if response.status().is_success() {
        let body = response.json::<Value>().await?;
        let rows = body["rows"].as_array().map(|r| r.len()).unwrap_or(0);
        println!("Rows returned: {}", rows);
    } else {
        println!("Failed to query sheet: {}", response.text().await?);
    }

    // Test 4: Cached repeat
    println!("\n🔍 Testing cached repeat of the same query...");
    let started = Instant::now();
    let response = client
        .get(format!("{}/api/sheet", base_url))
        .query(&params)
        .send()
        .await?;
    println!("Repeat query status: {} in {:?}", response.status(), started.elapsed());

    // Test 5: Rankings
    println!("\n🔍 Testing attendance ranking...");
    let response = client
        .get(format!("{}/api/attendance/ranking", base_url))
        .query(&params)
        .send()
        .await?;
    println!("Ranking status: {}", response.status());
    if response.status().is_success() {
        let ranking = response.json::<RankingResponse>().await?;
        print_ranked("Lowest", &ranking.worst);
        print_ranked("Highest", &ranking.best);
    } else {
        println!("Failed to get ranking: {}", response.text().await?);
    }

    // Test 6: Concurrent identical requests
    println!("\n🔍 Testing 10 concurrent identical requests...");
    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        let url = format!("{}/api/attendance/all", base_url);
        let params = params.map(|(k, v)| (k.to_string(), v.to_string()));
        handles.push(tokio::spawn(async move {
            client
                .get(url)
                .query(&params)
                .send()
                .await
                .map(|r| r.status())
        }));
    }

    let mut success_count = 0;
    let mut failure_count = 0;
    for handle in handles {
        match handle.await? {
            Ok(StatusCode::OK) => success_count += 1,
            Ok(status) => {
                failure_count += 1;
                println!("Request failed with status {}", status);
            }
            Err(e) => {
                failure_count += 1;
                println!("Request error: {}", e);
            }
        }
    }
    println!("Concurrent results: {} succeeded, {} failed", success_count, failure_count);

    // Test 7: Unknown date returns 404
    println!("\n🔍 Testing single-day statistics for an unknown date...");
    let response = client
        .get(format!("{}/api/attendance/day", base_url))
        .query(&params)
        .query(&[("date", "1900-01-01")])
        .send()
        .await?;
    println!("Unknown date status: {} (expected 404)", response.status());

    println!("\n✅ Smoke test finished");
    Ok(())
}
