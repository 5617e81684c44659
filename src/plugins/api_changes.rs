//! Breaking-change detection between two source snapshots.
//!
//! Symbol extraction sits behind [`ApiAnalyzer`]. The default
//! [`LexicalAnalyzer`] is a pattern matcher, not a parser: it has no notion of
//! comments, strings or nesting, so it can both miss and invent symbols. In
//! particular the method pattern (`name(params) {`) also matches plain
//! functions and control constructs such as `if (ready) {`. Because the same
//! heuristic runs on both snapshots, those false positives mostly cancel out,
//! but a rewritten condition does show up as a "modified" method.

use crate::core::error::SmartOpsError;
use crate::core::rpc::ToolResult;
use crate::core::time;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SymbolKind {
    Function,
    Class,
    Method,
    ExportList,
}

impl SymbolKind {
    pub const ALL: [SymbolKind; 4] = [
        SymbolKind::Function,
        SymbolKind::Class,
        SymbolKind::Method,
        SymbolKind::ExportList,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::ExportList => "exportList",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSymbol {
    #[serde(rename = "type")]
    pub kind: SymbolKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub params: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedSymbol {
    #[serde(rename = "type")]
    pub kind: SymbolKind,
    pub name: String,
    pub old_params: String,
    pub new_params: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakingChangeSet {
    pub removed: Vec<ApiSymbol>,
    pub modified: Vec<ModifiedSymbol>,
    pub deprecated_count: usize,
}

impl BreakingChangeSet {
    /// Deprecations alone never count as breaking.
    pub fn is_breaking(&self) -> bool {
        !self.removed.is_empty() || !self.modified.is_empty()
    }
}

/// Symbol table of one snapshot. Within a kind, the first symbol with a given
/// name wins; later duplicates are dropped.
#[derive(Debug, Clone, Default)]
pub struct ApiSurface {
    symbols: Vec<ApiSymbol>,
    index: FxHashMap<(SymbolKind, String), usize>,
}

impl ApiSurface {
    pub fn insert(&mut self, symbol: ApiSymbol) {
        let key = (symbol.kind, symbol.name.clone());
        if self.index.contains_key(&key) {
            return;
        }
        self.index.insert(key, self.symbols.len());
        self.symbols.push(symbol);
    }

    pub fn get(&self, kind: SymbolKind, name: &str) -> Option<&ApiSymbol> {
        self.index
            .get(&(kind, name.to_string()))
            .map(|&i| &self.symbols[i])
    }

    pub fn symbols(&self) -> &[ApiSymbol] {
        &self.symbols
    }

    pub fn of_kind(&self, kind: SymbolKind) -> impl Iterator<Item = &ApiSymbol> {
        self.symbols.iter().filter(move |s| s.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Turns source text into an [`ApiSurface`].
pub trait ApiAnalyzer {
    fn name(&self) -> &'static str;
    fn extract(&self, source: &str) -> ApiSurface;
    fn deprecation_count(&self, source: &str) -> usize;
}

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:export\s+)?(?:async\s+)?function\s+(\w+)\s*\(([^)]*)\)").unwrap()
});
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:export\s+)?class\s+(\w+)(?:\s+extends\s+\w+)?\s*\{").unwrap()
});
static METHOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\s*\(([^)]*)\)\s*\{").unwrap());
static EXPORT_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"export\s+\{([^}]+)\}").unwrap());
static DEPRECATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)@deprecated").unwrap());

/// Regex-driven extraction for JavaScript/TypeScript-shaped sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalAnalyzer;

impl ApiAnalyzer for LexicalAnalyzer {
    fn name(&self) -> &'static str {
        "lexical"
    }

    fn extract(&self, source: &str) -> ApiSurface {
        let mut surface = ApiSurface::default();
        for kind in SymbolKind::ALL {
            match kind {
                SymbolKind::Function | SymbolKind::Method => {
                    let re = if kind == SymbolKind::Function {
                        &*FUNCTION_RE
                    } else {
                        &*METHOD_RE
                    };
                    for caps in re.captures_iter(source) {
                        surface.insert(ApiSymbol {
                            kind,
                            name: caps[1].to_string(),
                            params: Some(caps[2].to_string()),
                        });
                    }
                }
                SymbolKind::Class => {
                    for caps in CLASS_RE.captures_iter(source) {
                        surface.insert(ApiSymbol {
                            kind,
                            name: caps[1].to_string(),
                            params: None,
                        });
                    }
                }
                SymbolKind::ExportList => {
                    for caps in EXPORT_LIST_RE.captures_iter(source) {
                        for name in caps[1].split(',').map(str::trim).filter(|n| !n.is_empty()) {
                            surface.insert(ApiSymbol {
                                kind,
                                name: name.to_string(),
                                params: None,
                            });
                        }
                    }
                }
            }
        }
        surface
    }

    fn deprecation_count(&self, source: &str) -> usize {
        DEPRECATED_RE.find_iter(source).count()
    }
}

/// Walk every symbol of `old`: gone from `new` means removed, different
/// parameter text means modified.
pub fn diff_surfaces(old: &ApiSurface, new: &ApiSurface) -> BreakingChangeSet {
    let mut changes = BreakingChangeSet::default();
    for symbol in old.symbols() {
        match new.get(symbol.kind, &symbol.name) {
            None => changes.removed.push(symbol.clone()),
            Some(found) => {
                if let (Some(old_params), Some(new_params)) = (&symbol.params, &found.params) {
                    if old_params != new_params {
                        changes.modified.push(ModifiedSymbol {
                            kind: symbol.kind,
                            name: symbol.name.clone(),
                            old_params: old_params.clone(),
                            new_params: new_params.clone(),
                        });
                    }
                }
            }
        }
    }
    changes
}

pub fn analyze(
    analyzer: &dyn ApiAnalyzer,
    old_source: &str,
    new_source: &str,
) -> BreakingChangeSet {
    let old = analyzer.extract(old_source);
    let new = analyzer.extract(new_source);
    let mut changes = diff_surfaces(&old, &new);
    changes.deprecated_count = analyzer.deprecation_count(new_source);
    changes
}

pub fn recommendation(has_breaking: bool, report_path: &Path) -> String {
    if has_breaking {
        let report = report_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| report_path.to_string_lossy().to_string());
        format!("STOP: Breaking changes detected. Review {}", report)
    } else {
        "Safe to proceed - no breaking changes detected".to_string()
    }
}

pub fn render_report(changes: &BreakingChangeSet, generated_at: &str) -> String {
    let removed = changes
        .removed
        .iter()
        .map(|s| format!("- {}: {}", s.kind, s.name))
        .collect::<Vec<_>>()
        .join("\n");
    let modified = changes
        .modified
        .iter()
        .map(|m| {
            format!(
                "- {}: {}\n  - Old: {}\n  - New: {}",
                m.kind, m.name, m.old_params, m.new_params
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "# Breaking Changes Detected\n\
         \n\
         Generated: {generated_at}\n\
         \n\
         ## Summary\n\
         - Removed: {} items\n\
         - Modified: {} items\n\
         - Deprecated: {} items\n\
         \n\
         ## Details\n\
         \n\
         ### Removed\n\
         {removed}\n\
         \n\
         ### Modified\n\
         {modified}\n\
         \n\
         ## Recommendation\n\
         1. Create migration guide\n\
         2. Update documentation\n\
         3. Consider major version bump\n\
         4. Notify dependent projects\n",
        changes.removed.len(),
        changes.modified.len(),
        changes.deprecated_count,
    )
}

fn read_snapshot(path: &str) -> Result<String, SmartOpsError> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            SmartOpsError::NotFound(format!("'{}' does not exist", path))
        }
        _ => SmartOpsError::IoError(e),
    })
}

pub fn detect_api_changes(
    analyzer: &dyn ApiAnalyzer,
    old_file: &str,
    new_file: &str,
    report_path: &Path,
) -> Result<ToolResult, SmartOpsError> {
    let old_source = read_snapshot(old_file)?;
    let new_source = read_snapshot(new_file)?;

    let changes = analyze(analyzer, &old_source, &new_source);
    let has_breaking = changes.is_breaking();
    let advice = recommendation(has_breaking, report_path);

    let mut result = ToolResult::ok(advice.clone());
    if has_breaking {
        if let Some(parent) = report_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(report_path, render_report(&changes, &time::now_iso()))?;
        result = result.with("reportPath", report_path.to_string_lossy());
        tracing::warn!(
            removed = changes.removed.len(),
            modified = changes.modified.len(),
            report = %report_path.display(),
            "breaking API changes detected"
        );
    }

    Ok(result
        .with("hasBreakingChanges", has_breaking)
        .with("details", &changes)
        .with("recommendation", advice)
        .with("analyzer", analyzer.name()))
}
