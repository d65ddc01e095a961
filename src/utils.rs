//! Console helpers shared by the binary: human-readable sizes, the sizes
//! report printed after every transform, and the progress spinner.

use crate::constants::{
    COMPRESSION_RATIO_PREFIX, ORIGINAL_SIZE_PREFIX, PROGRESS_SPINNER_TEMPLATE,
    RESULT_SIZE_PREFIX, SUCCESS_PREFIX, WARNING_PREFIX,
};
use indicatif::{ProgressBar, ProgressStyle};

/// Source and result sizes of a completed transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeReport {
    pub original: u64,
    pub result: u64,
}

impl SizeReport {
    pub fn new(original: u64, result: u64) -> Self {
        Self { original, result }
    }

    /// Positive when the result is smaller than the source
    pub fn ratio(&self) -> f64 {
        calculate_compression_ratio(self.original, self.result)
    }

    pub fn lines(&self) -> Vec<String> {
        let ratio = self.ratio();
        let mut lines = vec![
            format!(
                "{} {} ({})",
                ORIGINAL_SIZE_PREFIX,
                self.original,
                format_file_size(self.original)
            ),
            format!(
                "{} {} ({})",
                RESULT_SIZE_PREFIX,
                self.result,
                format_file_size(self.result)
            ),
            format!("{} {:.1}%", COMPRESSION_RATIO_PREFIX, ratio),
        ];
        if ratio > 0.0 {
            lines.push(format!("{} Reduced file size by {:.1}%", SUCCESS_PREFIX, ratio));
        } else if ratio < 0.0 {
            lines.push(format!(
                "{}  File size increased by {:.1}%",
                WARNING_PREFIX,
                ratio.abs()
            ));
        }
        lines
    }
}

/// Create a progress spinner with consistent styling
pub fn create_progress_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template(PROGRESS_SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Format file size in human-readable format (e.g. "1.2 MB", "512 B")
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Size change as a percentage (positive means reduction, negative means increase)
pub fn calculate_compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    ((original_size as f64 - compressed_size as f64) / original_size as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_file_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn test_calculate_compression_ratio() {
        assert_eq!(calculate_compression_ratio(1000, 800), 20.0);
        assert_eq!(calculate_compression_ratio(1000, 1200), -20.0);
        assert_eq!(calculate_compression_ratio(1000, 1000), 0.0);
        assert_eq!(calculate_compression_ratio(0, 500), 0.0);
    }

    #[test]
    fn test_size_report_lines() {
        let shrunk = SizeReport::new(2048, 1024).lines();
        assert_eq!(shrunk.len(), 4);
        assert!(shrunk[0].ends_with("2048 (2.0 KB)"));
        assert!(shrunk[1].ends_with("1024 (1.0 KB)"));
        assert!(shrunk[3].contains("50.0%"));

        let grown = SizeReport::new(100, 150).lines();
        assert!(grown[3].contains("increased by 50.0%"));

        assert_eq!(SizeReport::new(10, 10).lines().len(), 3);
    }
}
