use crate::katalog::ScrapeData;
use chrono::Utc;
use log::{error, info};
use std::fs;
use std::path::Path;

/// Dump the full scrape result as timestamped JSON for local inspection.
/// Dev-only convenience; failures are logged and never fatal.
pub fn save_local(data: &ScrapeData, output_dir: &str) {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let path = Path::new(output_dir).join(format!("katalog_data_{}.json", stamp));

    let json = match serde_json::to_string_pretty(data) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize scrape data: {}", e);
            return;
        }
    };
    if let Err(e) = fs::create_dir_all(output_dir) {
        error!("Failed to create output directory {}: {}", output_dir, e);
        return;
    }
    match fs::write(&path, json) {
        Ok(()) => info!("Data saved to {}", path.display()),
        Err(e) => error!("Failed to save local output files: {}", e),
    }
}
