//! YAML loader, validator, and hot-reload watcher for templates (spec §4.5
//! "Indexing" / §4.3's hot-reload discipline applied to templates).
//!
//! Mirrors `webdistill-routing`'s `RoutingStore`: an `ArcSwap`-backed
//! immutable snapshot, rebuilt on file-watch or explicit reload. Per-
//! template validation errors drop just that template (it becomes
//! unavailable, not process-fatal); the generic template's absence is the
//! one load error that aborts the whole load.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::template::Template;

/// Immutable set of currently-loaded templates, ready for
/// [`crate::matcher::match_template`].
#[derive(Debug, Clone, Default)]
pub struct TemplateSnapshot {
    pub templates: Vec<Template>,
    pub generation: u64,
}

pub struct TemplateStore {
    root: PathBuf,
    snapshot: Arc<ArcSwap<TemplateSnapshot>>,
    generation: AtomicU64,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl TemplateStore {
    /// Load every `*.yaml`/`*.yml` file under `root`, requiring at least one
    /// generic template (`domains: ["*"]`). Fails only if that invariant or
    /// the directory read itself fails — individual bad templates are
    /// logged and skipped.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, String> {
        let root = root.into();
        let snapshot = load_snapshot(&root, 0)?;
        Ok(Self {
            root,
            snapshot: Arc::new(ArcSwap::from_pointee(snapshot)),
            generation: AtomicU64::new(0),
            _watcher: None,
        })
    }

    pub fn current(&self) -> Arc<TemplateSnapshot> {
        self.snapshot.load_full()
    }

    pub fn reload(&self) -> Result<(), String> {
        let next_gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        match load_snapshot(&self.root, next_gen) {
            Ok(new_snapshot) => {
                self.snapshot.store(Arc::new(new_snapshot));
                tracing::info!(generation = next_gen, "template snapshot reloaded");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "template reload failed validation; keeping previous snapshot");
                Err(e)
            }
        }
    }

    /// Load `root` and start watching it for changes, returning a store
    /// that owns the watcher handle for its lifetime.
    pub fn load_with_watch(root: impl Into<PathBuf>) -> Result<Arc<Self>, String> {
        let root = root.into();
        let mut store = Self::load(root.clone())?;

        let snapshot_handle = store.snapshot.clone();
        let generation_start = store.generation.load(Ordering::SeqCst);
        let watch_root = root.clone();

        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                    let _ = tx.send(());
                }
            }
        })
        .map_err(|e| format!("failed to start template file watcher: {e}"))?;

        use notify::{RecursiveMode, Watcher};
        watcher
            .watch(&watch_root, RecursiveMode::Recursive)
            .map_err(|e| format!("failed to watch {watch_root:?}: {e}"))?;

        let generation = Arc::new(AtomicU64::new(generation_start));
        let reload_root = watch_root.clone();
        std::thread::spawn(move || {
            for _ in rx {
                std::thread::sleep(Duration::from_millis(50));
                let next_gen = generation.fetch_add(1, Ordering::SeqCst) + 1;
                match load_snapshot(&reload_root, next_gen) {
                    Ok(new_snapshot) => {
                        snapshot_handle.store(Arc::new(new_snapshot));
                        tracing::info!(generation = next_gen, "template snapshot reloaded");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "template reload failed validation; keeping previous snapshot");
                    }
                }
            }
        });

        store._watcher = Some(watcher);
        Ok(Arc::new(store))
    }
}

fn load_snapshot(root: &Path, generation: u64) -> Result<TemplateSnapshot, String> {
    let entries = std::fs::read_dir(root).map_err(|e| format!("failed to read template dir {root:?}: {e}"))?;

    let mut templates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| format!("failed to read template dir entry: {e}"))?;
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| ext == "yaml" || ext == "yml")
            .unwrap_or(false);
        if !is_yaml {
            continue;
        }
        match parse_template_file(&path) {
            Ok(template) => templates.push(template),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "template failed validation, skipping"),
        }
    }

    if !templates.iter().any(|t| t.is_generic()) {
        return Err(format!("no generic template (domains: [\"*\"]) found under {root:?}"));
    }
    validate_unique_names(&templates)?;

    Ok(TemplateSnapshot { templates, generation })
}

fn parse_template_file(path: &Path) -> Result<Template, String> {
    let contents = std::fs::read_to_string(path).map_err(|e| format!("failed to read {path:?}: {e}"))?;
    let template: Template =
        serde_yaml::from_str(&contents).map_err(|e| format!("template YAML parse error in {path:?}: {e}"))?;
    if template.domains.is_empty() {
        return Err(format!("template {:?} declares no domains", template.name));
    }
    Ok(template)
}

fn validate_unique_names(templates: &[Template]) -> Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    for t in templates {
        if !seen.insert(&t.name) {
            return Err(format!("duplicate template name {:?}", t.name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERIC_YAML: &str = r#"
name: generic
version: "1.0.0"
domains: ["*"]
priority: 0
selectors:
  title: "h1"
  content: "article"
"#;

    const SITE_YAML: &str = r#"
name: example_site
version: "1.0.0"
domains: ["example.com"]
priority: 10
selectors:
  title: ".headline"
"#;

    #[test]
    fn loads_generic_and_site_templates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("generic.yaml"), GENERIC_YAML).unwrap();
        std::fs::write(dir.path().join("example.yaml"), SITE_YAML).unwrap();

        let store = TemplateStore::load(dir.path()).unwrap();
        let snapshot = store.current();
        assert_eq!(snapshot.templates.len(), 2);
    }

    #[test]
    fn missing_generic_template_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("example.yaml"), SITE_YAML).unwrap();
        assert!(TemplateStore::load(dir.path()).is_err());
    }

    #[test]
    fn invalid_site_template_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("generic.yaml"), GENERIC_YAML).unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "not: [valid").unwrap();

        let store = TemplateStore::load(dir.path()).unwrap();
        let snapshot = store.current();
        assert_eq!(snapshot.templates.len(), 1);
        assert!(snapshot.templates[0].is_generic());
    }

    #[test]
    fn reload_picks_up_new_template_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("generic.yaml"), GENERIC_YAML).unwrap();

        let store = TemplateStore::load(dir.path()).unwrap();
        assert_eq!(store.current().templates.len(), 1);

        std::fs::write(dir.path().join("example.yaml"), SITE_YAML).unwrap();
        store.reload().unwrap();
        assert_eq!(store.current().templates.len(), 2);
    }
}
