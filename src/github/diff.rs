use tracing::debug;

use super::client::PullFile;

/// Default number of patch lines kept per file
pub const DEFAULT_MAX_PATCH_LINES: usize = 100;

/// A file patch cut down to a bounded number of lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncatedPatch {
    pub text: String,
    /// Number of lines dropped from the end of the patch
    pub omitted: usize,
}

impl TruncatedPatch {
    pub fn is_truncated(&self) -> bool {
        self.omitted > 0
    }
}

/// Marker line appended after a truncated patch
pub fn truncation_marker(omitted: usize) -> String {
    format!("... [truncated {} more lines]", omitted)
}

/// Keep the first `max_lines` lines of a patch
pub fn truncate_patch(patch: &str, max_lines: usize) -> TruncatedPatch {
    let lines: Vec<&str> = patch.lines().collect();

    if lines.len() <= max_lines {
        return TruncatedPatch {
            text: patch.trim_end_matches('\n').to_string(),
            omitted: 0,
        };
    }

    let mut text = lines[..max_lines].join("\n");
    text.push('\n');
    text.push_str(&truncation_marker(lines.len() - max_lines));

    TruncatedPatch {
        text,
        omitted: lines.len() - max_lines,
    }
}

/// Render one changed file as a prompt section
pub fn render_file(file: &PullFile, max_lines: usize) -> String {
    let header = format!(
        "### {} ({}, +{} -{})",
        file.filename, file.status, file.additions, file.deletions
    );

    match file.patch.as_deref() {
        Some(patch) => {
            let truncated = truncate_patch(patch, max_lines);
            if truncated.is_truncated() {
                debug!(file = %file.filename, omitted = truncated.omitted, "Truncated patch");
            }
            format!("{}\n```diff\n{}\n```\n", header, truncated.text)
        }
        None => format!("{}\n(no textual diff available)\n", header),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_patch(lines: usize) -> String {
        (1..=lines)
            .map(|i| format!("+line {}", i))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_short_patch_untouched() {
        let patch = "@@ -1,2 +1,3 @@\n fn main() {\n+    run();\n }\n";
        let truncated = truncate_patch(patch, DEFAULT_MAX_PATCH_LINES);
        assert!(!truncated.is_truncated());
        assert_eq!(truncated.text, patch.trim_end());
    }

    #[test]
    fn test_long_patch_keeps_first_lines_then_marker() {
        let patch = numbered_patch(250);
        let truncated = truncate_patch(&patch, 100);

        assert_eq!(truncated.omitted, 150);

        let lines: Vec<&str> = truncated.text.lines().collect();
        assert_eq!(lines.len(), 101);
        assert_eq!(lines[0], "+line 1");
        assert_eq!(lines[99], "+line 100");
        assert_eq!(lines[100], truncation_marker(150));
        assert!(!truncated.text.contains("+line 101"));
    }

    #[test]
    fn test_exact_limit_not_truncated() {
        let truncated = truncate_patch(&numbered_patch(100), 100);
        assert!(!truncated.is_truncated());
    }

    #[test]
    fn test_render_binary_file() {
        let file = PullFile {
            filename: "logo.png".to_string(),
            status: "added".to_string(),
            additions: 0,
            deletions: 0,
            patch: None,
        };

        let section = render_file(&file, 100);
        assert!(section.starts_with("### logo.png (added, +0 -0)"));
        assert!(section.contains("no textual diff available"));
    }

    #[test]
    fn test_render_long_file_is_truncated() {
        let file = PullFile {
            filename: "src/big.rs".to_string(),
            status: "modified".to_string(),
            additions: 120,
            deletions: 0,
            patch: Some(numbered_patch(120)),
        };

        let section = render_file(&file, 100);
        assert!(section.contains("+line 100\n"));
        assert!(section.contains(&truncation_marker(20)));
        assert!(!section.contains("+line 101"));
    }
}
