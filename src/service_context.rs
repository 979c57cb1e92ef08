use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// How deep below the project root to look for service manifests.
const MAX_DEPTH: usize = 2;

const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "dist", "build", "vendor", "venv"];

/// Manifest file name → service kind.
const MANIFESTS: &[(&str, &str)] = &[
    ("Cargo.toml", "rust"),
    ("package.json", "node"),
    ("pyproject.toml", "python"),
    ("setup.py", "python"),
    ("go.mod", "go"),
    ("pom.xml", "java"),
    ("build.gradle", "java"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    /// Relative to the project root; `"."` for the root itself.
    pub path: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submodule {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Project topology handed to the subagent next to the transcript batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceContext {
    pub project_root: PathBuf,
    pub working_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_service: Option<String>,
    pub services: Vec<Service>,
    pub submodules: Vec<Submodule>,
}

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.') || SKIPPED_DIRS.contains(&name))
}

/// Scan for service manifests. One service per directory; when a directory
/// has several manifests the first in `MANIFESTS` order wins.
pub fn detect_services(project_root: &Path) -> Vec<Service> {
    let mut services: Vec<Service> = Vec::new();
    let walker = WalkDir::new(project_root)
        .max_depth(MAX_DEPTH + 1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e));

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(rank) = MANIFESTS.iter().position(|(m, _)| *m == file_name) else {
            continue;
        };
        let Some(dir) = entry.path().parent() else {
            continue;
        };
        let rel = dir.strip_prefix(project_root).unwrap_or(dir);
        let path = if rel.as_os_str().is_empty() {
            ".".to_string()
        } else {
            rel.to_string_lossy().replace('\\', "/")
        };
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        let kind = MANIFESTS[rank].1.to_string();

        match services.iter_mut().find(|s| s.path == path) {
            Some(existing) => {
                let existing_rank = MANIFESTS
                    .iter()
                    .position(|(_, k)| *k == existing.kind)
                    .unwrap_or(usize::MAX);
                if rank < existing_rank {
                    existing.kind = kind;
                }
            }
            None => services.push(Service { name, path, kind }),
        }
    }
    services.sort_by(|a, b| a.path.cmp(&b.path));
    services
}

/// Submodules registered in the repository, if there is one.
pub fn detect_submodules(repo: Option<&git2::Repository>) -> Vec<Submodule> {
    let Some(repo) = repo else {
        return Vec::new();
    };
    let submodules = match repo.submodules() {
        Ok(s) => s,
        Err(err) => {
            tracing::debug!("listing submodules failed: {err}");
            return Vec::new();
        }
    };
    let mut found: Vec<Submodule> = submodules
        .iter()
        .map(|s| Submodule {
            name: s.name().unwrap_or_default().to_string(),
            path: s.path().to_string_lossy().replace('\\', "/"),
            branch: s.branch().map(String::from),
        })
        .collect();
    found.sort_by(|a, b| a.path.cmp(&b.path));
    found
}

/// The deepest service whose directory contains `working_dir`.
fn current_service(
    services: &[Service],
    project_root: &Path,
    working_dir: &Path,
) -> Option<String> {
    services
        .iter()
        .filter(|s| s.path == "." || working_dir.starts_with(project_root.join(&s.path)))
        .max_by_key(|s| if s.path == "." { 0 } else { s.path.len() })
        .map(|s| s.name.clone())
}

/// Build the service context for a project.
pub fn detect(
    project_root: &Path,
    working_dir: &Path,
    repo: Option<&git2::Repository>,
) -> ServiceContext {
    let services = detect_services(project_root);
    let current_service = current_service(&services, project_root, working_dir);
    ServiceContext {
        project_root: project_root.to_path_buf(),
        working_dir: working_dir.to_path_buf(),
        current_service,
        services,
        submodules: detect_submodules(repo),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn finds_manifests_up_to_depth_two() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "Cargo.toml");
        touch(root, "web/package.json");
        touch(root, "services/api/pyproject.toml");
        touch(root, "services/api/deep/nested/go.mod");

        let services = detect_services(root);
        let paths: Vec<&str> = services.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec![".", "services/api", "web"]);
        assert_eq!(services[1].kind, "python");
        assert_eq!(services[1].name, "api");
        assert_eq!(services[2].kind, "node");
    }

    #[test]
    fn skips_hidden_and_dependency_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "node_modules/left-pad/package.json");
        touch(root, ".git/modules/x/Cargo.toml");
        touch(root, "target/debug/Cargo.toml");
        assert!(detect_services(root).is_empty());
    }

    #[test]
    fn one_service_per_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "tool/package.json");
        touch(root, "tool/Cargo.toml");
        let services = detect_services(root);
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].kind, "rust");
    }

    #[test]
    fn current_service_is_deepest_match() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "Cargo.toml");
        touch(root, "crates/core/Cargo.toml");
        let ctx = detect(root, &root.join("crates/core/src"), None);
        assert_eq!(ctx.current_service.as_deref(), Some("core"));

        let ctx = detect(root, &root.join("docs"), None);
        assert_eq!(
            ctx.current_service,
            root.file_name().map(|n| n.to_string_lossy().into_owned())
        );
        assert!(ctx.submodules.is_empty());
    }

    #[test]
    fn serializes_without_empty_optionals() {
        let ctx = ServiceContext {
            project_root: PathBuf::from("/p"),
            working_dir: PathBuf::from("/p"),
            current_service: None,
            services: vec![],
            submodules: vec![],
        };
        let v = serde_json::to_value(&ctx).unwrap();
        assert!(v.get("current_service").is_none());
        assert_eq!(v["services"], serde_json::json!([]));
    }
}
