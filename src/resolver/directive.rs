//! Resolves `inherit`, `include` and `require` arguments to files.
//!
//! Resolution never fails: a directive that matches nothing resolves to an
//! empty list.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::analysis::{DeclarationKind, DeclarationTable, Directive, DirectiveKind};
use crate::resolver::inventory::{ElementInfo, ProjectInventory};
use crate::resolver::trace::ScanTrace;

static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_\-.+~:/]+)\}").expect("valid reference regex"));

/// Nested references are expanded this many times at most.
const MAX_EXPANSION_PASSES: usize = 8;

/// Everything a directive is resolved against.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Path of the document holding the directive, if it is a file
    pub document: Option<&'a Path>,
    pub declarations: &'a DeclarationTable,
    pub inventory: &'a ProjectInventory,
    pub trace: Option<&'a ScanTrace>,
}

impl<'a> ResolveContext<'a> {
    fn value_of(&self, name: &str) -> Option<&'a str> {
        if let Some(value) = self.trace.and_then(|t| t.value(name)) {
            return Some(value);
        }
        self.declarations
            .get(name)
            .filter(|d| d.kind == DeclarationKind::Variable && d.flag.is_none())
            .and_then(|d| d.value.as_deref())
    }

    fn include_history(&self) -> &'a [PathBuf] {
        self.trace.map(|t| t.include_history()).unwrap_or(&[])
    }
}

/// Expands every `${VAR}` with a known value. References with no value are
/// left in place.
pub fn expand(text: &str, ctx: &ResolveContext<'_>) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_EXPANSION_PASSES {
        let next = REFERENCE
            .replace_all(&current, |caps: &regex::Captures<'_>| {
                ctx.value_of(&caps[1])
                    .map(str::to_string)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn has_references(text: &str) -> bool {
    REFERENCE.is_match(text) || text.contains("${@")
}

/// Builds a regex matching concrete paths for a partially expanded argument.
/// Unresolved references match anything.
fn history_pattern(expanded: &str) -> Option<Regex> {
    let mut pattern = String::from(r"^(?:.*/)?");
    let mut last = 0;
    for m in REFERENCE.find_iter(expanded) {
        pattern.push_str(&regex::escape(&expanded[last..m.start()]));
        pattern.push_str(".*");
        last = m.end();
    }
    pattern.push_str(&regex::escape(&expanded[last..]));
    pattern.push('$');
    Regex::new(&pattern).ok()
}

fn history_matches(expanded: &str, ctx: &ResolveContext<'_>) -> Vec<PathBuf> {
    let Some(pattern) = history_pattern(expanded) else {
        return Vec::new();
    };
    ctx.include_history()
        .iter()
        .filter(|path| pattern.is_match(&path.to_string_lossy()))
        .cloned()
        .collect()
}

/// Every file `directive` pulls in.
pub fn resolve(directive: &Directive, ctx: &ResolveContext<'_>) -> Vec<PathBuf> {
    resolve_argument(directive.kind, &directive.argument, ctx)
}

pub fn resolve_argument(kind: DirectiveKind, argument: &str, ctx: &ResolveContext<'_>) -> Vec<PathBuf> {
    let expanded = expand(argument.trim(), ctx);
    let mut found = Vec::new();

    if kind.is_class() {
        for name in expanded.split_whitespace() {
            resolve_class(name, ctx, &mut found);
        }
    } else if has_references(&expanded) {
        found.extend(history_matches(&expanded, ctx));
    } else {
        resolve_file(&expanded, ctx, &mut found);
    }

    let mut unique: Vec<PathBuf> = Vec::with_capacity(found.len());
    for path in found {
        if !unique.contains(&path) {
            unique.push(path);
        }
    }
    with_appends(unique, ctx.inventory)
}

fn resolve_class(name: &str, ctx: &ResolveContext<'_>, found: &mut Vec<PathBuf>) {
    let name = name.strip_suffix(".bbclass").unwrap_or(name);
    if has_references(name) {
        found.extend(history_matches(&format!("{name}.bbclass"), ctx));
        return;
    }
    let classes = ctx.inventory.classes_named(name);
    if !classes.is_empty() {
        found.extend(classes.into_iter().map(|c| c.path.to_path()));
        return;
    }
    let file = format!("{name}.bbclass");
    found.extend(
        ctx.include_history()
            .iter()
            .filter(|path| path.file_name().is_some_and(|f| f.to_string_lossy() == file))
            .cloned(),
    );
}

fn resolve_file(argument: &str, ctx: &ResolveContext<'_>, found: &mut Vec<PathBuf>) {
    if argument.is_empty() {
        return;
    }
    let relative = Path::new(argument);

    // concrete paths recorded by BitBake come first
    found.extend(
        ctx.include_history()
            .iter()
            .filter(|path| path.ends_with(relative))
            .cloned(),
    );

    if relative.is_absolute() {
        if relative.exists() || ctx.inventory.element_at(relative).is_some() {
            found.push(relative.to_path_buf());
        }
        return;
    }

    if let Some(dir) = ctx.document.and_then(Path::parent) {
        let candidate = dir.join(relative);
        if candidate.is_file() {
            found.push(candidate);
        }
    }
    for layer in &ctx.inventory.layers {
        let candidate = layer.path.join(relative);
        if candidate.is_file() {
            found.push(candidate);
        }
    }
    found.extend(
        ctx.inventory
            .elements_with_suffix(argument)
            .into_iter()
            .map(|e| e.path.to_path()),
    );
}

/// Adds the appends of every recipe in `paths`.
fn with_appends(paths: Vec<PathBuf>, inventory: &ProjectInventory) -> Vec<PathBuf> {
    let mut result = paths.clone();
    for path in &paths {
        if path.extension().map_or(true, |e| e != "bb") {
            continue;
        }
        let recipe = inventory
            .element_at(path)
            .cloned()
            .unwrap_or_else(|| ElementInfo::from_path(path, None));
        for append in inventory.appends_for(&recipe) {
            let append = append.path.to_path();
            if !result.contains(&append) {
                result.push(append);
            }
        }
    }
    result
}

/// Names close to an unresolved argument, best first.
pub fn suggestions(kind: DirectiveKind, argument: &str, inventory: &ProjectInventory, limit: usize) -> Vec<String> {
    use strsim::jaro_winkler;

    const THRESHOLD: f64 = 0.8;
    let candidates: Vec<String> = if kind.is_class() {
        inventory.class_names().into_iter().map(str::to_string).collect()
    } else {
        inventory.includes.iter().map(|e| e.path.base.clone()).collect()
    };
    let needle = if kind.is_class() {
        argument.trim()
    } else {
        argument.trim().rsplit('/').next().unwrap_or(argument)
    };

    let mut scored: Vec<(f64, String)> = candidates
        .into_iter()
        .map(|c| (jaro_winkler(needle, &c), c))
        .filter(|(score, _)| *score >= THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored.into_iter().take(limit).map(|(_, name)| name).collect()
}
