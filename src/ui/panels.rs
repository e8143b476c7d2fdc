//! Terminal response panels
//!
//! Plain string builders for the per-model panels, the fused-response
//! banner, and the fallback banner. Timestamps are passed in by the caller
//! so these stay pure.

use crate::ui::format::{BOLD, DIM, ITALIC, RESET};

const PANEL_RULE: &str = "────────────────────────────────";

pub fn typing_line(icon: &str, name: &str) -> String {
    format!("{DIM}{icon} {name} is thinking…{RESET}")
}

pub fn response_panel(icon: &str, name: &str, time_label: &str, body: &str) -> String {
    let mut out = format!("{BOLD}{icon} {name}{RESET} {DIM}{time_label}{RESET}\n{PANEL_RULE}\n");
    out.push_str(body);
    out.push('\n');
    out
}

/// A panel for one failed model request; replaces that model's response
/// without affecting siblings.
pub fn error_panel(icon: &str, name: &str, failure: &str) -> String {
    format!("{BOLD}{icon} {name}{RESET}\n{PANEL_RULE}\n⚠ {failure}\n")
}

pub fn substitution_note(original: &str, served_by: &str) -> String {
    format!("{DIM}({original} was rate limited; answered by {served_by}){RESET}")
}

pub fn fused_banner(fusion_model_name: &str, time_label: &str, body: &str) -> String {
    let mut out = format!(
        "{BOLD}✨ Fused Response ({fusion_model_name}){RESET} {DIM}{time_label}{RESET}\n{PANEL_RULE}\n"
    );
    out.push_str(body);
    out.push('\n');
    out
}

/// The fallback view shown when fusion fails: the original responses,
/// concatenated, with a visible notice explaining why.
pub fn fallback_banner(notice: &str, labeled_bodies: &[(String, String)]) -> String {
    let mut out = format!("{BOLD}Combined Response (fallback){RESET}\n{PANEL_RULE}\n");
    for (index, (label, body)) in labeled_bodies.iter().enumerate() {
        if index > 0 {
            out.push_str(&format!("{DIM}{PANEL_RULE}{RESET}\n"));
        }
        out.push_str(&format!("{BOLD}{label}{RESET}\n{body}\n"));
    }
    out.push_str(&format!("{ITALIC}{notice}{RESET}\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panels_carry_name_and_body() {
        let panel = response_panel("✦", "Gemini 2.0 Flash", "12:34", "the answer");
        assert!(panel.contains("Gemini 2.0 Flash"));
        assert!(panel.contains("12:34"));
        assert!(panel.contains("the answer"));
    }

    #[test]
    fn error_panel_flags_the_failure() {
        let panel = error_panel("🌀", "Qwen 3 32B", "rate_limited: slow down");
        assert!(panel.contains("Qwen 3 32B"));
        assert!(panel.contains("⚠"));
        assert!(panel.contains("rate_limited: slow down"));
    }

    #[test]
    fn fallback_banner_lists_every_source_and_the_notice() {
        let banner = fallback_banner(
            "Fusion model rate limit or quota exceeded. Showing individual responses.",
            &[
                ("Gemini 2.0 Flash".to_string(), "answer a".to_string()),
                ("Qwen 3 32B".to_string(), "answer b".to_string()),
            ],
        );
        assert!(banner.contains("answer a"));
        assert!(banner.contains("answer b"));
        assert!(banner.contains("rate limit"));
        let a = banner.find("answer a").unwrap();
        let b = banner.find("answer b").unwrap();
        assert!(a < b);
    }
}
