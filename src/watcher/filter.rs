//! Ignore rules and trackable-file checks.
//!
//! Rules are a simplified gitignore dialect: a trailing `/` restricts a rule to
//! directories, wildcard rules are globs, and plain rules match a path
//! segment at any depth. There is no negation or anchoring.

use std::borrow::Cow;
use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};

/// Ignore file read from the watch root.
pub const IGNORE_FILE: &str = ".gitignore";

/// Rules that are always active.
pub const DEFAULT_RULES: &[&str] = &[
    ".git/",
    ".carya/",
    "node_modules/",
    "__pycache__/",
    ".cache/",
    ".vscode/",
    ".idea/",
];

/// Extensions treated as binary and never tracked.
const BINARY_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "bin", "out", "o", "a", "jpg", "jpeg", "png", "gif", "pdf", "zip", "tar",
    "gz",
];

#[derive(Debug)]
enum Pattern {
    Glob(GlobMatcher),
    Literal(String),
}

#[derive(Debug)]
struct IgnoreRule {
    pattern: Pattern,
    dir_only: bool,
}

impl IgnoreRule {
    fn parse(line: &str) -> Option<Self> {
        let (body, dir_only) = match line.strip_suffix('/') {
            Some(body) => (body, true),
            None => (line, false),
        };
        if body.is_empty() {
            return None;
        }

        let pattern = if body.contains(&['*', '?', '['][..]) {
            match GlobBuilder::new(body).literal_separator(true).build() {
                Ok(glob) => Pattern::Glob(glob.compile_matcher()),
                Err(e) => {
                    tracing::warn!(rule = line, error = %e, "Skipping invalid ignore rule");
                    return None;
                }
            }
        } else {
            Pattern::Literal(body.to_string())
        };

        Some(Self { pattern, dir_only })
    }

    fn matches(&self, segments: &[Cow<'_, str>], full: &str, is_dir: bool) -> bool {
        // Directories this rule may match: every ancestor, plus the path itself if it is one.
        let dir_count = if is_dir {
            segments.len()
        } else {
            segments.len().saturating_sub(1)
        };
        let dirs = &segments[..dir_count];
        let whole_path_eligible = is_dir || !self.dir_only;

        match &self.pattern {
            Pattern::Glob(glob) => {
                (whole_path_eligible && glob.is_match(full))
                    || dirs.iter().any(|name| glob.is_match(&**name))
            }
            Pattern::Literal(name) => {
                if whole_path_eligible && full == name {
                    return true;
                }
                let candidates = if self.dir_only { dirs } else { segments };
                candidates.iter().any(|segment| segment == name)
            }
        }
    }
}

/// Ordered ignore rules for one watch session.
#[derive(Debug)]
pub struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    /// Only the built-in rules.
    #[must_use]
    pub fn defaults() -> Self {
        Self::with_patterns(std::iter::empty::<&str>())
    }

    /// Built-in rules followed by `patterns`.
    ///
    /// Blank lines and lines starting with `#` or `!` are skipped.
    pub fn with_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules: Vec<IgnoreRule> = DEFAULT_RULES
            .iter()
            .filter_map(|rule| IgnoreRule::parse(rule))
            .collect();

        for line in patterns {
            let line = line.as_ref().trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('!') {
                tracing::debug!(rule = line, "Negated ignore rules are not supported, skipping");
                continue;
            }
            rules.extend(IgnoreRule::parse(line));
        }

        Self { rules }
    }

    /// Built-in rules plus the ignore file in `root`, if there is one.
    pub fn load(root: impl AsRef<Path>) -> Self {
        let path = root.as_ref().join(IGNORE_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let rules = Self::with_patterns(content.lines());
                tracing::debug!(path = %path.display(), rules = rules.len(), "Loaded ignore rules");
                rules
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::defaults(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read ignore file, using defaults");
                Self::defaults()
            }
        }
    }

    /// Check whether a path relative to the watch root is ignored.
    #[must_use]
    pub fn should_ignore(&self, relative: &Path, is_dir: bool) -> bool {
        let segments: Vec<Cow<'_, str>> = relative
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(s) => Some(s.to_string_lossy()),
                _ => None,
            })
            .collect();
        if segments.is_empty() {
            return false;
        }
        let full = segments.join("/");

        self.rules
            .iter()
            .any(|rule| rule.matches(&segments, &full, is_dir))
    }

    /// Number of active rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Check whether a file is worth tracking: not binary, not an editor temp or lock file.
#[must_use]
pub fn is_trackable_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    let editor_temp = name.ends_with('~')
        || name.ends_with(".swp")
        || name.ends_with(".swo")
        || name.contains(".tmp")
        || name.starts_with(".#");
    if editor_temp {
        return false;
    }

    !path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn ignored(rules: &IgnoreRules, path: &str, is_dir: bool) -> bool {
        rules.should_ignore(Path::new(path), is_dir)
    }

    #[test]
    fn test_default_rules() {
        let rules = IgnoreRules::defaults();
        assert!(ignored(&rules, ".git", true));
        assert!(ignored(&rules, "node_modules", true));
        assert!(ignored(&rules, "web/node_modules", true));
        assert!(ignored(&rules, ".carya", true));
        assert!(!ignored(&rules, "src", true));
        assert!(!ignored(&rules, "src/main.rs", false));
    }

    #[test]
    fn test_directory_rule_prunes_subtree() {
        let rules = IgnoreRules::with_patterns(["node_modules/"]);
        assert!(ignored(&rules, "node_modules", true));
        assert!(ignored(&rules, "node_modules/pkg", true));
        assert!(ignored(&rules, "node_modules/pkg/index.js", false));
    }

    #[test]
    fn test_directory_rule_skips_files_of_same_name() {
        let rules = IgnoreRules::with_patterns(["build/"]);
        assert!(ignored(&rules, "build", true));
        assert!(!ignored(&rules, "build", false));
        assert!(!ignored(&rules, "scripts/build", false));
        assert!(ignored(&rules, "build/out.txt", false));
    }

    #[test]
    fn test_plain_rule_matches_any_segment() {
        let rules = IgnoreRules::with_patterns(["secrets"]);
        assert!(ignored(&rules, "secrets", false));
        assert!(ignored(&rules, "config/secrets", false));
        assert!(ignored(&rules, "a/secrets/b.txt", false));
        assert!(!ignored(&rules, "secrets.txt", false));
    }

    #[test]
    fn test_glob_matches_full_path_then_ancestors() {
        let rules = IgnoreRules::with_patterns(["*.log", "build-*"]);
        assert!(ignored(&rules, "debug.log", false));
        // `*` does not cross separators, and the file itself is not an ancestor.
        assert!(!ignored(&rules, "logs/debug.log", false));
        assert!(ignored(&rules, "build-x", true));
        assert!(ignored(&rules, "pkg/build-x", true));
        assert!(ignored(&rules, "pkg/build-x/out/a.txt", false));
    }

    #[test]
    fn test_glob_with_separator() {
        let rules = IgnoreRules::with_patterns(["docs/*.html"]);
        assert!(ignored(&rules, "docs/index.html", false));
        assert!(!ignored(&rules, "docs/api/index.html", false));
    }

    #[test]
    fn test_comments_negations_and_blanks_skipped() {
        let rules = IgnoreRules::with_patterns(["# comment", "", "   ", "!keep.txt", "tmp/"]);
        assert_eq!(rules.len(), DEFAULT_RULES.len() + 1);
        assert!(!ignored(&rules, "keep.txt", false));
    }

    #[test]
    fn test_root_is_never_ignored() {
        let rules = IgnoreRules::with_patterns(["*"]);
        assert!(!ignored(&rules, "", true));
    }

    #[test]
    fn test_load_reads_ignore_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(IGNORE_FILE), "*.log\ntarget/\n").unwrap();

        let rules = IgnoreRules::load(tmp.path());
        assert_eq!(rules.len(), DEFAULT_RULES.len() + 2);
        assert!(ignored(&rules, "target", true));
        assert!(ignored(&rules, "app.log", false));
    }

    #[test]
    fn test_load_without_ignore_file() {
        let tmp = TempDir::new().unwrap();
        let rules = IgnoreRules::load(tmp.path());
        assert_eq!(rules.len(), DEFAULT_RULES.len());
    }

    #[test]
    fn test_trackable_files() {
        assert!(is_trackable_file(Path::new("src/main.rs")));
        assert!(is_trackable_file(Path::new("README")));
        assert!(!is_trackable_file(Path::new("logo.PNG")));
        assert!(!is_trackable_file(Path::new("lib.so")));
        assert!(!is_trackable_file(Path::new("main.rs~")));
        assert!(!is_trackable_file(Path::new(".main.rs.swp")));
        assert!(!is_trackable_file(Path::new(".main.rs.swo")));
        assert!(!is_trackable_file(Path::new("file.tmp")));
        assert!(!is_trackable_file(Path::new("file.tmp.1234")));
        assert!(!is_trackable_file(Path::new(".#main.rs")));
    }
}
