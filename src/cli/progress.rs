//! Progress display module
//!
//! Handles displaying download progress in the CLI.

use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Download statistics for progress display
#[derive(Debug, Clone, Default)]
pub struct DownloadStats {
    /// Total bytes downloaded
    pub downloaded: u64,
    /// Download speed in bytes per second
    pub download_speed: f64,
    /// Number of connected peers
    pub peers: usize,
    /// Pieces verified so far
    pub pieces_verified: usize,
    /// Total pieces in the torrent
    pub total_pieces: usize,
    /// Download progress (0.0 to 1.0)
    pub progress: f64,
}

impl DownloadStats {
    /// Create new download stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Format bytes to human readable string
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_index])
    }

    /// Format speed to human readable string
    pub fn format_speed(bytes_per_sec: f64) -> String {
        format!("{}/s", Self::format_bytes(bytes_per_sec as u64))
    }

    /// Format duration to human readable string
    pub fn format_duration(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Calculate ETA based on download speed and remaining bytes
    pub fn calculate_eta(downloaded: u64, total: u64, speed: f64) -> Option<Duration> {
        if speed <= 0.0 || downloaded >= total {
            return None;
        }

        let remaining = total.saturating_sub(downloaded) as f64;
        Some(Duration::from_secs_f64(remaining / speed))
    }
}

/// Progress display for CLI
pub struct ProgressDisplay {
    /// Start time of the download
    start_time: Instant,
    /// Last update time
    last_update: Instant,
    /// Update interval
    update_interval: Duration,
    /// Quiet mode (no progress output)
    quiet: bool,
}

impl ProgressDisplay {
    /// Create a new progress display
    pub fn new(quiet: bool) -> Self {
        Self {
            start_time: Instant::now(),
            last_update: Instant::now(),
            update_interval: Duration::from_millis(500),
            quiet,
        }
    }

    /// Update the progress display
    pub fn update(&mut self, stats: &DownloadStats, total: u64) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        if self.last_update.elapsed() < self.update_interval {
            return Ok(());
        }
        self.last_update = Instant::now();

        self.print_progress(stats, total)?;
        io::stdout().flush()?;

        Ok(())
    }

    /// Print progress bar
    pub fn print_progress(&mut self, stats: &DownloadStats, total: u64) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        // Clear the current line
        print!("\r\x1b[2K");

        let progress_percent = stats.progress * 100.0;

        let bar_width: usize = 40;
        let filled = (progress_percent / 100.0 * bar_width as f64) as usize;
        let empty = bar_width.saturating_sub(filled);
        let bar: String = "=".repeat(filled) + &" ".repeat(empty);

        let eta = DownloadStats::calculate_eta(stats.downloaded, total, stats.download_speed);
        let eta_str = eta
            .map(DownloadStats::format_duration)
            .unwrap_or_else(|| "∞".to_string());

        print!(
            "[{}] {:.1}% | {} / {} | {} | Pieces: {}/{} | Peers: {} | ETA: {}",
            bar,
            progress_percent,
            DownloadStats::format_bytes(stats.downloaded),
            DownloadStats::format_bytes(total),
            DownloadStats::format_speed(stats.download_speed),
            stats.pieces_verified,
            stats.total_pieces,
            stats.peers,
            eta_str,
        );

        Ok(())
    }

    /// Print completion message
    pub fn print_complete(&self, stats: &DownloadStats, total: u64) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        print!("\r\x1b[2K");
        io::stdout().flush()?;

        println!();
        println!("Download Complete!");
        println!(
            "  Downloaded: {} / {}",
            DownloadStats::format_bytes(stats.downloaded),
            DownloadStats::format_bytes(total)
        );
        println!("  Pieces: {}/{}", stats.pieces_verified, stats.total_pieces);
        println!("  Elapsed Time: {}", DownloadStats::format_duration(self.start_time.elapsed()));

        Ok(())
    }

    /// Print a status message
    pub fn print_status(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        println!("\r\x1b[2K{}", message);
        Ok(())
    }

    /// Print an error message
    pub fn print_error(&self, message: &str) -> io::Result<()> {
        eprintln!("\r\x1b[2KError: {}", message);
        Ok(())
    }

    /// Get the elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(DownloadStats::format_bytes(0), "0.00 B");
        assert_eq!(DownloadStats::format_bytes(1024), "1.00 KB");
        assert_eq!(DownloadStats::format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(DownloadStats::format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(DownloadStats::format_speed(1024.0), "1.00 KB/s");
        assert_eq!(DownloadStats::format_speed(1024.0 * 1024.0), "1.00 MB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(DownloadStats::format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(DownloadStats::format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(DownloadStats::format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_calculate_eta() {
        let eta = DownloadStats::calculate_eta(50, 100, 10.0);
        assert_eq!(eta, Some(Duration::from_secs(5)));

        let eta = DownloadStats::calculate_eta(100, 100, 10.0);
        assert_eq!(eta, None);

        let eta = DownloadStats::calculate_eta(50, 100, 0.0);
        assert_eq!(eta, None);
    }

    #[test]
    fn test_download_stats_default() {
        let stats = DownloadStats::default();
        assert_eq!(stats.downloaded, 0);
        assert_eq!(stats.download_speed, 0.0);
        assert_eq!(stats.peers, 0);
        assert_eq!(stats.pieces_verified, 0);
        assert_eq!(stats.progress, 0.0);
    }

    #[test]
    fn test_progress_display_quiet() {
        let display = ProgressDisplay::new(true);
        assert!(display.is_quiet());
    }
}
