//! Root directory detection from repository file markers.
//!
//! The source repository collaborator hands over a flat list of file paths
//! (e.g. a recursive git tree). Directories holding a known marker file
//! become deployable root candidates, each with the most specific framework
//! its markers indicate.

use std::collections::BTreeMap;

use crate::model::Framework;
use crate::strategy::normalize_root;

/// Candidate directories deeper than this are ignored.
pub const MAX_ROOT_DEPTH: usize = 3;

/// Path segments that never contain a deployable root.
const IGNORED_SEGMENTS: &[&str] = &[
    "node_modules",
    ".git",
    ".next",
    ".output",
    "dist",
    "build",
    "vendor",
    "target",
    "__pycache__",
];

/// A directory that looks deployable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootCandidate {
    /// Normalized path; empty for the repository root.
    pub path: String,
    pub framework: Option<Framework>,
}

impl RootCandidate {
    pub fn new(path: &str, framework: Option<Framework>) -> Self {
        Self {
            path: normalize_root(path),
            framework,
        }
    }
}

/// Result of scanning a repository tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    /// Ordered: repository root first, then shallower before deeper,
    /// alphabetical within a depth.
    pub candidates: Vec<RootCandidate>,
    /// The root most likely to deploy: the shallowest candidate with a
    /// framework-specific marker, else the first candidate.
    pub primary: Option<String>,
}

fn marker_framework(file_name: &str) -> Option<Framework> {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    match stem {
        "next" if file_name.starts_with("next.config.") => Some(Framework::NextJs),
        "nuxt" if file_name.starts_with("nuxt.config.") => Some(Framework::Nuxt),
        "svelte" if file_name.starts_with("svelte.config.") => Some(Framework::SvelteKit),
        "astro" if file_name.starts_with("astro.config.") => Some(Framework::Astro),
        "vite" if file_name.starts_with("vite.config.") => Some(Framework::Vite),
        "app" if file_name == "app.json" || file_name.starts_with("app.config.") => {
            Some(Framework::Expo)
        }
        "eas" if file_name == "eas.json" => Some(Framework::Expo),
        _ => match file_name {
            "package.json" => Some(Framework::Node),
            "requirements.txt" | "pyproject.toml" => Some(Framework::Python),
            "index.html" => Some(Framework::Static),
            _ => None,
        },
    }
}

/// Rank used when a directory carries several markers; lower wins.
fn specificity(framework: Framework) -> u8 {
    match framework {
        Framework::NextJs | Framework::Nuxt | Framework::SvelteKit | Framework::Astro => 0,
        Framework::Expo => 1,
        Framework::Vite => 2,
        Framework::Node => 3,
        Framework::Python => 4,
        Framework::Static => 5,
    }
}

fn depth(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.split('/').count()
    }
}

/// Scan file paths for marker files and produce ordered root candidates.
pub fn detect_roots<I, S>(paths: I) -> Detection
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut roots: BTreeMap<String, Framework> = BTreeMap::new();

    for raw in paths {
        let path = normalize_root(raw.as_ref());
        let (dir, file_name) = match path.rsplit_once('/') {
            Some((dir, file)) => (dir.to_string(), file),
            None => (String::new(), path.as_str()),
        };
        if dir.split('/').any(|segment| IGNORED_SEGMENTS.contains(&segment)) {
            continue;
        }
        if depth(&dir) > MAX_ROOT_DEPTH {
            continue;
        }
        let Some(framework) = marker_framework(file_name) else {
            continue;
        };
        roots
            .entry(dir)
            .and_modify(|current| {
                if specificity(framework) < specificity(*current) {
                    *current = framework;
                }
            })
            .or_insert(framework);
    }

    let mut candidates: Vec<RootCandidate> = roots
        .into_iter()
        .map(|(path, framework)| RootCandidate {
            path,
            framework: Some(framework),
        })
        .collect();
    candidates.sort_by(|a, b| {
        depth(&a.path)
            .cmp(&depth(&b.path))
            .then_with(|| a.path.cmp(&b.path))
    });

    let primary = candidates
        .iter()
        .find(|c| c.framework.is_some_and(|f| f.is_specific()))
        .or_else(|| candidates.first())
        .map(|c| c.path.clone());

    Detection {
        candidates,
        primary,
    }
}
