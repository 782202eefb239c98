//! Small helpers shared across prediction, export, and job modules.

use std::path::Path;

/// Strips the characters netMHCpan allele names carry that are unsafe in
/// file names (`:` and `*`).
#[must_use]
pub fn sanitize_allele(allele: &str) -> String {
    allele.replace([':', '*'], "")
}

/// Returns the file stem as a `String`, falling back to the whole file name
/// and then to `"input"` for pathological paths.
#[must_use]
pub fn file_stem_string(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map_or_else(|| "input".to_owned(), |s| s.to_string_lossy().into_owned())
}

/// Returns the last `n` lines of `text`, preserving order. `None` returns
/// the whole text unchanged.
#[must_use]
pub fn tail_lines(text: &str, n: Option<usize>) -> String {
    match n {
        None => text.to_owned(),
        Some(n) => {
            let lines: Vec<&str> = text.lines().collect();
            let start = lines.len().saturating_sub(n);
            let mut out = lines[start..].join("\n");
            if !out.is_empty() {
                out.push('\n');
            }
            out
        }
    }
}

/// Formats a duration in seconds the way progress summaries print it.
#[must_use]
pub fn format_secs(secs: f64) -> String {
    format!("{secs:.2}s")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn sanitize_strips_colon_and_star() {
        assert_eq!(sanitize_allele("HLA-A*02:01"), "HLA-A0201");
        assert_eq!(sanitize_allele("HLA-B07:02"), "HLA-B0702");
        assert_eq!(sanitize_allele("plain"), "plain");
    }

    #[test]
    fn stem_handles_usual_paths() {
        assert_eq!(file_stem_string(&PathBuf::from("data/test.pep")), "test");
        assert_eq!(file_stem_string(&PathBuf::from("noext")), "noext");
    }

    #[test]
    fn tail_returns_last_n() {
        let text = "a\nb\nc\nd\n";
        assert_eq!(tail_lines(text, Some(2)), "c\nd\n");
        assert_eq!(tail_lines(text, Some(10)), "a\nb\nc\nd\n");
        assert_eq!(tail_lines(text, None), text);
        assert_eq!(tail_lines("", Some(3)), "");
    }
}
