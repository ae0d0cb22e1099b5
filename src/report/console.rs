//! Human readable console output

use crate::proxy::checker::CheckConfig;
use crate::proxy::models::{CheckResult, CheckStatus};
use crate::report::summary::Summary;
use crossterm::style::{Color, Stylize};

const RULE_WIDTH: usize = 50;

fn status_color(status: CheckStatus) -> Color {
    match status {
        CheckStatus::Ok => Color::Green,
        CheckStatus::Slow => Color::Yellow,
        CheckStatus::TlsFreeze => Color::Magenta,
        CheckStatus::Timeout | CheckStatus::AuthFailed | CheckStatus::Error => Color::Red,
    }
}

/// Indented detail lines for a result. Shown for anything that is not OK,
/// or for everything when verbose.
pub fn detail_lines(result: &CheckResult, verbose: bool) -> Vec<String> {
    if !verbose && result.status == CheckStatus::Ok {
        return Vec::new();
    }

    let mut lines = Vec::new();
    if let Some(ip) = &result.external_ip {
        lines.push(format!("  └─ IP: {}", ip));
    }
    lines.push(format!("  └─ Elapsed: {:.2}s", result.elapsed.as_secs_f64()));
    if result.bytes_transferred > 0 {
        lines.push(format!("  └─ Received: {} bytes", result.bytes_transferred));
    }
    if let Some(speed) = result.speed_kbps() {
        lines.push(format!("  └─ Download speed: {:.1} KB/s", speed));
    }
    if let Some(detail) = &result.detail_message {
        lines.push(format!("  └─ Detail: {}", detail));
    }
    lines
}

pub fn print_result(result: &CheckResult, verbose: bool) {
    let tag = format!("[{}]", result.status.label()).with(status_color(result.status));
    println!("{}: {}", result.proxy, tag);
    for line in detail_lines(result, verbose) {
        println!("{}", line);
    }
}

pub fn print_header(count: usize, config: &CheckConfig) {
    println!("Loaded {} proxies for checking", count);
    println!(
        "Parameters: concurrency={}, timeout={}s, connect timeout={}s",
        config.concurrency,
        config.total_timeout.as_secs_f64(),
        config.connect_timeout.as_secs_f64()
    );
    println!(
        "Censorship thresholds: time>={}s or speed<={:.1}KB/s",
        config.slow_time.as_secs_f64(),
        config.slow_speed / 1024.0
    );
    println!(
        "Freeze signature: {}s silence within {}-{} bytes",
        config.stall_silence.as_secs_f64(),
        config.stall_window.low,
        config.stall_window.high
    );
    println!("{}", "-".repeat(RULE_WIDTH));
}

/// Summary rows as (label, status) in display order
fn summary_rows() -> [(&'static str, CheckStatus); 6] {
    [
        ("Working (OK):    ", CheckStatus::Ok),
        ("Slow (SLOW):     ", CheckStatus::Slow),
        ("Frozen (FREEZE): ", CheckStatus::TlsFreeze),
        ("Timeout:         ", CheckStatus::Timeout),
        ("Auth failed:     ", CheckStatus::AuthFailed),
        ("Errors:          ", CheckStatus::Error),
    ]
}

pub fn print_summary(summary: &Summary) {
    println!();
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("SUMMARY:");
    println!("  Total checked: {}", summary.total);
    for line in summary_lines(summary) {
        println!("{}", line);
    }
    println!("{}", "=".repeat(RULE_WIDTH));
}

/// Summary body: one coloured row per status, then the flagged total
fn summary_lines(summary: &Summary) -> Vec<String> {
    let mut lines: Vec<String> = summary_rows()
        .into_iter()
        .map(|(label, status)| {
            let line = format!("{}{}", label, summary.count(status));
            format!("  {}", line.with(status_color(status)))
        })
        .collect();
    lines.push(format!("  Flagged (SLOW + FREEZE): {}", summary.flagged()));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::ProxyRecord;
    use std::time::Duration;

    fn result(status: CheckStatus) -> CheckResult {
        CheckResult::new(
            ProxyRecord::with_auth("proxy1.example.com", 8080, "user", "pass"),
            status,
            Duration::from_millis(5_250),
        )
    }

    #[test]
    fn test_ok_hidden_unless_verbose() {
        let ok = result(CheckStatus::Ok)
            .with_external_ip(Some("203.0.113.7".to_string()))
            .with_transfer(51_200, Some(102_400.0));

        assert!(detail_lines(&ok, false).is_empty());
        assert_eq!(
            detail_lines(&ok, true),
            vec![
                "  └─ IP: 203.0.113.7",
                "  └─ Elapsed: 5.25s",
                "  └─ Received: 51200 bytes",
                "  └─ Download speed: 100.0 KB/s",
            ]
        );
    }

    #[test]
    fn test_freeze_details() {
        let frozen = result(CheckStatus::TlsFreeze)
            .with_transfer(18_000, None)
            .with_detail("Stream froze after 18000 bytes (5s without data)");
        let lines = detail_lines(&frozen, false);

        assert!(lines.contains(&"  └─ Received: 18000 bytes".to_string()));
        assert_eq!(
            lines.last().map(String::as_str),
            Some("  └─ Detail: Stream froze after 18000 bytes (5s without data)")
        );
    }

    #[test]
    fn test_summary_lines_include_flagged() {
        let results = vec![
            result(CheckStatus::Ok),
            result(CheckStatus::Slow),
            result(CheckStatus::TlsFreeze),
            result(CheckStatus::TlsFreeze),
            result(CheckStatus::Error),
        ];
        let lines = summary_lines(&Summary::from_results(&results));

        assert_eq!(lines.len(), summary_rows().len() + 1);
        assert_eq!(lines.last().map(String::as_str), Some("  Flagged (SLOW + FREEZE): 3"));
        assert!(lines[2].contains("Frozen (FREEZE): 2"));
    }

    #[test]
    fn test_every_status_has_a_summary_row() {
        let rows = summary_rows();
        for status in CheckStatus::ALL {
            assert!(rows.iter().any(|(_, s)| *s == status));
        }
    }
}
