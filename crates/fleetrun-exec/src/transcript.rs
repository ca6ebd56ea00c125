//! Plain-text command transcript

use std::path::Path;

use chrono::Local;
use tokio::io::AsyncWriteExt;

/// Append `text` to the file at `path`, creating it if needed
///
/// # Errors
/// Returns the I/O error if the file cannot be opened or written
pub async fn append(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}

/// Timestamped transcript line
#[must_use]
pub fn line(message: &str) -> String {
    format!("[{}] {message}\n", Local::now().format("%Y-%m-%d %H:%M:%S"))
}
