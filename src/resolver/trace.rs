//! Parser for saved `bitbake -e` output.
//!
//! The trace is a hint: it records the final value of every variable, the
//! files and lines that contributed to it, and the concrete files BitBake
//! parsed. Anything the parser does not recognise is ignored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::Result;

static VARIABLE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^# \$([A-Za-z0-9_\-.+/~:${}]+)(?:\s+\[\d+ operations?\])?\s*$")
        .expect("valid header regex")
});

static OPERATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#\s+([A-Za-z_?:\[\]\-.+]+)\s+(\S+):(\d+)(?:\s+\[.*\])?\s*$").expect("valid operation regex")
});

static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:export\s+)?([A-Za-z0-9_\-.+/~:${}]+)\s*=\s*(["'])(.*)$"#).expect("valid assignment regex")
});

static FUNCTION_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:python\s+)?[A-Za-z0-9_\-.+:${}]+\s*\(\)\s*\{\s*$").expect("valid function regex")
});

/// One recorded contribution to a variable's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceOrigin {
    pub path: PathBuf,
    /// One-based line number
    pub line: u32,
    pub operation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanTrace {
    values: HashMap<String, String>,
    history: HashMap<String, Vec<TraceOrigin>>,
    includes: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    IncludeHistory,
    Variables,
}

impl ScanTrace {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let trace = Self::parse(&content).without_stale();
        tracing::info!(
            "loaded trace {}: {} values, {} included files",
            path.display(),
            trace.values.len(),
            trace.includes.len()
        );
        Ok(trace)
    }

    pub fn parse(text: &str) -> Self {
        let mut trace = ScanTrace::default();
        let mut section = Section::Preamble;
        let mut current: Option<String> = None;
        let mut lines = text.lines();

        while let Some(line) = lines.next() {
            if line.starts_with("# INCLUDE HISTORY") {
                section = Section::IncludeHistory;
                continue;
            }
            if let Some(caps) = VARIABLE_HEADER.captures(line) {
                section = Section::Variables;
                current = Some(caps[1].to_string());
                continue;
            }

            if section == Section::IncludeHistory {
                match line.strip_prefix('#') {
                    Some(rest) => {
                        let path = rest.trim().trim_end_matches(" includes:").trim();
                        if path.starts_with('/') {
                            trace.includes.push(PathBuf::from(path));
                        }
                        continue;
                    }
                    None => section = Section::Variables,
                }
            }

            if let Some(caps) = OPERATION.captures(line) {
                if let (Some(name), Ok(number)) = (&current, caps[3].parse::<u32>()) {
                    trace.history.entry(name.clone()).or_default().push(TraceOrigin {
                        path: PathBuf::from(&caps[2]),
                        line: number,
                        operation: caps[1].to_string(),
                    });
                }
                continue;
            }
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }

            if FUNCTION_START.is_match(line) {
                // body ends at a line holding only `}`
                for body in lines.by_ref() {
                    if body.trim_end() == "}" {
                        break;
                    }
                }
                current = None;
                continue;
            }
            if line.starts_with("def ") {
                current = None;
                continue;
            }

            if let Some(caps) = ASSIGNMENT.captures(line) {
                let name = caps[1].to_string();
                let quote = caps[2].chars().next().unwrap_or('"');
                let mut value = caps[3].to_string();
                while !closes_value(&value, quote) {
                    match lines.next() {
                        Some(next) => {
                            value.push('\n');
                            value.push_str(next);
                        }
                        None => break,
                    }
                }
                let value = value
                    .trim_end()
                    .strip_suffix(quote)
                    .unwrap_or(value.trim_end())
                    .replace("\\\n", "");
                trace.values.insert(name, value);
                current = None;
            }
        }
        trace
    }

    /// Drops origins and included files that no longer exist on disk.
    pub fn without_stale(mut self) -> Self {
        self.includes.retain(|p| p.exists());
        for origins in self.history.values_mut() {
            origins.retain(|o| o.path.is_absolute() && o.path.exists());
        }
        self.history.retain(|_, origins| !origins.is_empty());
        self
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn history(&self, name: &str) -> &[TraceOrigin] {
        self.history.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Files BitBake parsed, in the order it parsed them.
    pub fn include_history(&self) -> &[PathBuf] {
        &self.includes
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.history.is_empty() && self.includes.is_empty()
    }
}

fn closes_value(value: &str, quote: char) -> bool {
    let trimmed = value.trim_end();
    trimmed.ends_with(quote) && !trimmed.ends_with(&format!("\\{quote}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"# INCLUDE HISTORY:
#
# /work/build/conf/bblayers.conf
# conf/bitbake.conf includes:
#   /work/poky/meta/conf/abi_version.conf
#   conf/site.conf
#
# $DISTRO [2 operations]
#   set /work/build/conf/local.conf:37
#     "poky"
#   set? /work/poky/meta/conf/distro/defaultsetup.conf:12
#     "nodistro"
# pre-expansion value:
#   "poky"
DISTRO="poky"
#
# $SRC_URI [1 operations]
#   set /work/meta-x/recipes/foo/foo_1.0.bb:5
#     "file://a"
SRC_URI="file://a \
    file://b"
#
# $do_install
#   set /work/poky/meta/classes/base.bbclass:300
do_install() {
	echo "}"
	true
}
export PATH="/usr/bin"
TUNE = 'core2'
"#;

    #[test]
    fn test_parse_values_and_history() {
        let trace = ScanTrace::parse(SAMPLE);
        assert_eq!(trace.value("DISTRO"), Some("poky"));
        assert_eq!(trace.value("PATH"), Some("/usr/bin"));
        assert_eq!(trace.value("TUNE"), Some("core2"));
        assert_eq!(trace.value("SRC_URI"), Some("file://a     file://b"));
        assert_eq!(trace.value("do_install"), None);

        let history = trace.history("DISTRO");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].path, PathBuf::from("/work/build/conf/local.conf"));
        assert_eq!(history[0].line, 37);
        assert_eq!(history[1].operation, "set?");
        assert_eq!(trace.history("do_install").len(), 1);
    }

    #[test]
    fn test_include_history_keeps_absolute_paths() {
        let trace = ScanTrace::parse(SAMPLE);
        assert_eq!(
            trace.include_history(),
            &[
                PathBuf::from("/work/build/conf/bblayers.conf"),
                PathBuf::from("/work/poky/meta/conf/abi_version.conf"),
            ]
        );
    }

    #[test]
    fn test_stale_entries_are_dropped() {
        let dir = TempDir::new().unwrap();
        let conf = dir.path().join("local.conf");
        std::fs::write(&conf, "").unwrap();
        let text = format!(
            "# INCLUDE HISTORY:\n# {}\n# /nope/missing.conf\n#\n# $A [2 operations]\n#   set {}:1\n#   set /nope/x.conf:2\nA=\"1\"\n",
            conf.display(),
            conf.display()
        );
        let trace = ScanTrace::parse(&text).without_stale();
        assert_eq!(trace.include_history(), &[conf.clone()]);
        assert_eq!(trace.history("A").len(), 1);
        assert_eq!(trace.value("A"), Some("1"));
    }

    #[test]
    fn test_garbage_is_ignored() {
        let trace = ScanTrace::parse("random text\n### nothing\n");
        assert!(trace.is_empty());
    }
}
