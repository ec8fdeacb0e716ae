//! Named prompt templates with variable substitution.
//!
//! Templates are `<name>.txt` files in the configured directory; variable
//! slots use `{name}` syntax. Rendering is deterministic. With hot reload
//! enabled, a template whose file changed on disk is re-read on next use.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use parking_lot::RwLock;

use zipsa_domain::config::PromptsConfig;
use zipsa_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct CachedTemplate {
    body: String,
    modified: Option<SystemTime>,
}

pub struct PromptStore {
    dir: PathBuf,
    hot_reload: bool,
    cache: RwLock<HashMap<String, CachedTemplate>>,
}

impl PromptStore {
    /// Load every `.txt` template in the directory eagerly. A missing
    /// directory is allowed (templates may be registered in-memory, as
    /// tests do).
    pub fn load(config: &PromptsConfig) -> Result<Self> {
        let store = Self {
            dir: config.path.clone(),
            hot_reload: config.hot_reload,
            cache: RwLock::new(HashMap::new()),
        };

        if store.dir.is_dir() {
            let mut count = 0usize;
            for entry in std::fs::read_dir(&store.dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                    continue;
                }
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let body = std::fs::read_to_string(&path)?;
                let modified = entry.metadata().and_then(|m| m.modified()).ok();
                store
                    .cache
                    .write()
                    .insert(name.to_string(), CachedTemplate { body, modified });
                count += 1;
            }
            tracing::info!(templates = count, dir = %store.dir.display(), "prompt store loaded");
        } else {
            tracing::info!(dir = %store.dir.display(), "prompt directory missing; starting empty");
        }

        Ok(store)
    }

    /// Register a template directly (tests and built-in fallbacks).
    pub fn register(&self, name: impl Into<String>, body: impl Into<String>) {
        self.cache.write().insert(
            name.into(),
            CachedTemplate {
                body: body.into(),
                modified: None,
            },
        );
    }

    /// Render a named template with `{var}` substitution. Unknown
    /// variables in the template are left intact; extra vars are ignored.
    pub fn render(&self, name: &str, vars: &HashMap<&str, String>) -> Result<String> {
        if self.hot_reload {
            self.maybe_reload(name);
        }

        let cache = self.cache.read();
        let template = cache
            .get(name)
            .ok_or_else(|| Error::PromptNotFound(name.to_string()))?;

        let mut out = template.body.clone();
        for (key, value) in vars {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        Ok(out)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cache.read().contains_key(name)
    }

    /// Re-read the template when its file changed since the cached copy.
    fn maybe_reload(&self, name: &str) {
        let path = self.dir.join(format!("{name}.txt"));
        let Ok(meta) = std::fs::metadata(&path) else {
            return;
        };
        let Ok(modified) = meta.modified() else {
            return;
        };

        let stale = {
            let cache = self.cache.read();
            match cache.get(name) {
                Some(t) => t.modified.map_or(true, |m| m < modified),
                None => true,
            }
        };
        if !stale {
            return;
        }

        match std::fs::read_to_string(&path) {
            Ok(body) => {
                tracing::debug!(template = name, "hot-reloaded prompt template");
                self.cache.write().insert(
                    name.to_string(),
                    CachedTemplate {
                        body,
                        modified: Some(modified),
                    },
                );
            }
            Err(e) => {
                tracing::warn!(template = name, error = %e, "prompt reload failed; keeping cached copy");
            }
        }
    }
}

/// Convenience macro-free var map builder.
pub fn vars<const N: usize>(pairs: [(&'static str, String); N]) -> HashMap<&'static str, String> {
    pairs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn empty_store() -> PromptStore {
        PromptStore {
            dir: PathBuf::from("/nonexistent"),
            hot_reload: false,
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[test]
    fn render_substitutes_variables() {
        let store = empty_store();
        store.register("intent_analysis", "Classify: {query}\nVocabulary: {intents}");
        let out = store
            .render(
                "intent_analysis",
                &vars([
                    ("query", "전세금 인상".to_string()),
                    ("intents", "legal_consult, irrelevant".to_string()),
                ]),
            )
            .unwrap();
        assert!(out.contains("전세금 인상"));
        assert!(out.contains("legal_consult"));
    }

    #[test]
    fn render_unknown_template_errors() {
        let store = empty_store();
        let err = store.render("missing", &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::PromptNotFound(_)));
    }

    #[test]
    fn unknown_slots_are_left_intact() {
        let store = empty_store();
        store.register("t", "keep {unknown} as-is");
        let out = store.render("t", &HashMap::new()).unwrap();
        assert_eq!(out, "keep {unknown} as-is");
    }

    #[test]
    fn load_reads_txt_files_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversation_summary.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "Summarize: {{transcript}}").unwrap();

        let config = PromptsConfig {
            path: dir.path().to_path_buf(),
            hot_reload: false,
        };
        let store = PromptStore::load(&config).unwrap();
        assert!(store.contains("conversation_summary"));
        let out = store
            .render(
                "conversation_summary",
                &vars([("transcript", "user: hi".to_string())]),
            )
            .unwrap();
        assert!(out.contains("user: hi"));
    }

    #[test]
    fn hot_reload_picks_up_changed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greeting.txt");
        std::fs::write(&path, "v1").unwrap();

        let config = PromptsConfig {
            path: dir.path().to_path_buf(),
            hot_reload: true,
        };
        let store = PromptStore::load(&config).unwrap();
        assert_eq!(store.render("greeting", &HashMap::new()).unwrap(), "v1");

        // Backdate the cached mtime so the rewrite is always newer.
        store.cache.write().get_mut("greeting").unwrap().modified =
            Some(SystemTime::UNIX_EPOCH);
        std::fs::write(&path, "v2").unwrap();
        assert_eq!(store.render("greeting", &HashMap::new()).unwrap(), "v2");
    }
}
