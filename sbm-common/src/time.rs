//! Timestamp utilities

use chrono::{DateTime, Local, Utc};

/// Render a timestamp the way exports and progress messages show it
///
/// Local wall-clock time, second precision: `2024-05-01 13:45:09`.
pub fn display_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_timestamp_shape() {
        let rendered = display_timestamp(&Utc::now());
        // YYYY-MM-DD HH:MM:SS
        assert_eq!(rendered.len(), 19);
        assert_eq!(&rendered[4..5], "-");
        assert_eq!(&rendered[10..11], " ");
        assert_eq!(&rendered[13..14], ":");
    }
}
