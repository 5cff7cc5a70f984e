//! Ignore filter for watch targets
//!
//! Supports multiple sources of ignore patterns:
//! 1. Built-in patterns (VCS metadata, editor temp files, build dirs - always active)
//! 2. .nudgeignore patterns (nudge-specific, optional)
//! 3. .gitignore patterns (optional, enabled by default)
//! 4. Config-based patterns (gitignore syntax)

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Error as IgnoreError;
use nudge_core::IgnoreConfig;
use std::path::{Component, Path, PathBuf};

/// Directories never worth scanning for directives
const BUILTIN_DIRS: &[&str] = &[
    ".git",
    ".jj",
    ".hg",
    ".svn",
    ".nudge",
    ".idea",
    ".vscode",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "venv",
];

/// Ignore rule set for one watch target
///
/// Precedence, highest first: built-in, .nudgeignore, .gitignore, config.
pub struct IgnoreRules {
    /// Target root directory
    root: PathBuf,

    gitignore: Option<Gitignore>,

    nudgeignore: Option<Gitignore>,

    /// Compiled `additional_patterns`
    extra: Option<Gitignore>,

    config: IgnoreConfig,
}

impl IgnoreRules {
    /// Load ignore rules for a target root
    pub fn load(root: &Path, config: IgnoreConfig) -> Result<Self, IgnoreError> {
        let mut rules = Self {
            root: root.to_path_buf(),
            gitignore: None,
            nudgeignore: None,
            extra: None,
            config,
        };

        rules.reload()?;
        Ok(rules)
    }

    /// Rebuild every pattern source from disk and config
    pub fn reload(&mut self) -> Result<(), IgnoreError> {
        self.gitignore = if self.config.use_gitignore {
            self.build_from_file(".gitignore")?
        } else {
            None
        };

        self.nudgeignore = if self.config.use_nudgeignore {
            self.build_from_file(".nudgeignore")?
        } else {
            None
        };

        self.extra = if self.config.additional_patterns.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new(&self.root);
            for pattern in &self.config.additional_patterns {
                builder.add_line(None, pattern)?;
            }
            Some(builder.build()?)
        };

        Ok(())
    }

    fn build_from_file(&self, name: &str) -> Result<Option<Gitignore>, IgnoreError> {
        let path = self.root.join(name);
        if !path.is_file() {
            return Ok(None);
        }

        let mut builder = GitignoreBuilder::new(&self.root);
        if let Some(err) = builder.add(&path) {
            return Err(err);
        }
        Ok(Some(builder.build()?))
    }

    /// Check if path should be ignored
    ///
    /// Accepts absolute paths under the root or root-relative paths.
    /// Absolute paths outside the root are never ignored here.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let relative = if path.is_absolute() {
            match path.strip_prefix(&self.root) {
                Ok(rel) => rel,
                Err(_) => return false,
            }
        } else {
            path
        };

        if relative.as_os_str().is_empty() {
            return false;
        }

        if is_builtin_ignored(relative) {
            return true;
        }

        let is_dir = self.root.join(relative).is_dir();

        [&self.nudgeignore, &self.gitignore, &self.extra]
            .into_iter()
            .flatten()
            .any(|rules| {
                rules
                    .matched_path_or_any_parents(relative, is_dir)
                    .is_ignore()
            })
    }

    /// Number of active ignore sources (built-in always counts)
    pub fn active_sources(&self) -> usize {
        1 + [&self.gitignore, &self.nudgeignore, &self.extra]
            .into_iter()
            .filter(|source| source.is_some())
            .count()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Built-in patterns, enforced regardless of configuration
fn is_builtin_ignored(relative: &Path) -> bool {
    let in_builtin_dir = relative.components().any(|component| match component {
        Component::Normal(name) => name
            .to_str()
            .map_or(false, |name| BUILTIN_DIRS.contains(&name)),
        _ => false,
    });

    if in_builtin_dir {
        return true;
    }

    relative
        .file_name()
        .and_then(|name| name.to_str())
        .map_or(false, is_editor_temp)
}

/// Editor swap, backup and lock files, plus OS droppings
fn is_editor_temp(filename: &str) -> bool {
    // Vim swap files and the probe file Vim writes before saving
    if [".swp", ".swo", ".swn", ".swm"]
        .iter()
        .any(|ext| filename.ends_with(ext))
        || filename == "4913"
    {
        return true;
    }

    // Vim/Emacs backups, Emacs auto-save and lock files
    if filename.ends_with('~')
        || (filename.len() > 1 && filename.starts_with('#') && filename.ends_with('#'))
        || filename.starts_with(".#")
    {
        return true;
    }

    // JetBrains safe-write temp files
    if filename.ends_with("___jb_tmp___") || filename.ends_with("___jb_old___") {
        return true;
    }

    matches!(filename, ".DS_Store" | "Thumbs.db" | "desktop.ini")
        || filename.starts_with("._")
        || filename.ends_with(".pyc")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn no_files() -> IgnoreConfig {
        IgnoreConfig {
            use_gitignore: false,
            use_nudgeignore: false,
            additional_patterns: vec![],
        }
    }

    #[test]
    fn test_builtin_patterns_always_enforced() {
        let temp_dir = TempDir::new().unwrap();
        let rules = IgnoreRules::load(temp_dir.path(), no_files()).unwrap();

        assert!(rules.should_ignore(Path::new(".git/objects/ab/cd")));
        assert!(rules.should_ignore(Path::new("web/node_modules/pkg/index.js")));
        assert!(rules.should_ignore(Path::new("target/debug/app")));
        assert!(rules.should_ignore(Path::new("src/.main.rs.swp")));
        assert!(rules.should_ignore(Path::new("src/main.rs~")));
        assert!(rules.should_ignore(Path::new("src/#main.rs#")));
        assert!(rules.should_ignore(Path::new("src/4913")));
        assert!(rules.should_ignore(Path::new("pkg/mod.cpython-311.pyc")));

        assert!(!rules.should_ignore(Path::new("src/main.rs")));
        assert!(!rules.should_ignore(Path::new("README.md")));
        assert!(!rules.should_ignore(Path::new("src/targets.rs")));
    }

    #[test]
    fn test_absolute_paths_are_made_relative() {
        let temp_dir = TempDir::new().unwrap();
        let rules = IgnoreRules::load(temp_dir.path(), no_files()).unwrap();

        assert!(rules.should_ignore(&temp_dir.path().join(".git/HEAD")));
        assert!(!rules.should_ignore(&temp_dir.path().join("app.py")));
        // Outside the root: not ours to judge
        assert!(!rules.should_ignore(Path::new("/somewhere/else/.git/HEAD")));
    }

    #[test]
    fn test_gitignore_parsing() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".gitignore"), "*.log\ndist/\n*.tmp\n").unwrap();
        fs::create_dir_all(temp_dir.path().join("dist")).unwrap();

        let config = IgnoreConfig {
            use_gitignore: true,
            use_nudgeignore: false,
            additional_patterns: vec![],
        };
        let rules = IgnoreRules::load(temp_dir.path(), config).unwrap();

        assert!(rules.should_ignore(Path::new("test.log")));
        assert!(rules.should_ignore(Path::new("dist")));
        assert!(rules.should_ignore(Path::new("dist/bundle.js")));
        assert!(rules.should_ignore(Path::new("file.tmp")));
        assert!(!rules.should_ignore(Path::new("src/main.rs")));
    }

    #[test]
    fn test_gitignore_disabled() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".gitignore"), "*.log\n").unwrap();

        let rules = IgnoreRules::load(temp_dir.path(), no_files()).unwrap();

        assert!(!rules.should_ignore(Path::new("test.log")));
        assert!(rules.should_ignore(Path::new(".git/config")));
    }

    #[test]
    fn test_nudgeignore_patterns() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".nudgeignore"), "vendor/\n").unwrap();

        let config = IgnoreConfig {
            use_gitignore: false,
            use_nudgeignore: true,
            additional_patterns: vec![],
        };
        let rules = IgnoreRules::load(temp_dir.path(), config).unwrap();

        assert!(rules.should_ignore(Path::new("vendor/lib.py")));
        assert!(!rules.should_ignore(Path::new("src/lib.py")));
    }

    #[test]
    fn test_additional_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let config = IgnoreConfig {
            use_gitignore: false,
            use_nudgeignore: false,
            additional_patterns: vec!["*.lock".to_string(), "build/".to_string()],
        };
        let rules = IgnoreRules::load(temp_dir.path(), config).unwrap();

        assert!(rules.should_ignore(Path::new("Cargo.lock")));
        assert!(rules.should_ignore(Path::new("build/output.txt")));
        assert!(!rules.should_ignore(Path::new("src/build.rs")));
    }

    #[test]
    fn test_active_sources_count() {
        let temp_dir = TempDir::new().unwrap();

        let rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default()).unwrap();
        assert_eq!(rules.active_sources(), 1);

        fs::write(temp_dir.path().join(".gitignore"), "*.log\n").unwrap();
        let config = IgnoreConfig {
            additional_patterns: vec!["*.tmp".to_string()],
            ..IgnoreConfig::default()
        };
        let rules = IgnoreRules::load(temp_dir.path(), config).unwrap();
        assert_eq!(rules.active_sources(), 3);
    }

    #[test]
    fn test_reload_picks_up_new_gitignore() {
        let temp_dir = TempDir::new().unwrap();
        let mut rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default()).unwrap();

        assert!(!rules.should_ignore(Path::new("test.log")));

        fs::write(temp_dir.path().join(".gitignore"), "*.log\n").unwrap();
        rules.reload().unwrap();

        assert!(rules.should_ignore(Path::new("test.log")));
    }
}
