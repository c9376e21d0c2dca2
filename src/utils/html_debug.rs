// src/utils/html_debug.rs
use crate::utils::error::ExtractError;
use crate::utils::AppError;
use regex::Regex;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Wraps each highlighted byte range in a styled span. Overlapping ranges after
/// the first are dropped.
pub fn annotate(html: &str, highlights: &[(usize, usize, &str)]) -> String {
    let mut debug_html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<style>\n");
    debug_html.push_str(".highlight-label { background-color: #90EE90; }\n");
    debug_html.push_str(".highlight-caption { background-color: #ADD8E6; }\n");
    debug_html.push_str(".highlight-table { background-color: #FFFF00; }\n");
    debug_html.push_str(".highlight-custom { background-color: #FFC0CB; }\n");
    debug_html.push_str("</style>\n</head>\n<body>\n");

    let mut sorted_highlights = highlights.to_vec();
    sorted_highlights.sort_by_key(|h| h.0);

    let mut last_pos = 0;
    for (start, end, highlight_type) in sorted_highlights {
        if start < last_pos || end > html.len() {
            continue;
        }
        debug_html.push_str(&html[last_pos..start]);

        let css_class = match highlight_type {
            "label" => "highlight-label",
            "caption" => "highlight-caption",
            "table" => "highlight-table",
            _ => "highlight-custom",
        };
        debug_html.push_str(&format!(
            "<span class=\"{}\" title=\"Position: {}-{}, Type: {}\">",
            css_class, start, end, highlight_type
        ));
        debug_html.push_str(&html[start..end]);
        debug_html.push_str("</span>");

        last_pos = end;
    }
    debug_html.push_str(&html[last_pos..]);
    debug_html.push_str("\n</body>\n</html>");
    debug_html
}

/// Regex patterns marking where each label, table caption, and table opening sits.
pub fn harvest_patterns(labels: &[String]) -> Vec<(String, &'static str)> {
    let mut patterns: Vec<(String, &'static str)> = labels
        .iter()
        .map(|label| (regex::escape(label.trim()), "label"))
        .collect();
    patterns.push((r"(?is)<caption[^>]*>.*?</caption>".to_string(), "caption"));
    patterns.push((r"(?i)<table[^>]*>".to_string(), "table"));
    patterns
}

/// Writes an annotated copy of `html` with every pattern match highlighted.
pub fn create_debug_html<P: AsRef<Path>>(
    html: &str,
    filename: P,
    patterns: &[(String, &str)],
) -> Result<(), AppError> {
    let mut highlights = Vec::new();
    for (pattern, highlight_type) in patterns {
        let re = Regex::new(pattern).map_err(|e| ExtractError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        for mat in re.find_iter(html) {
            highlights.push((mat.start(), mat.end(), *highlight_type));
        }
    }

    let path = filename.as_ref();
    let mut file = File::create(path)?;
    file.write_all(annotate(html, &highlights).as_bytes())?;

    tracing::info!("Saved debug HTML with {} highlights to {}", highlights.len(), path.display());
    Ok(())
}
