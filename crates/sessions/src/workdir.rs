//! Sticky per-session working directory.
//!
//! A request that supplies a path overwrites the session's stored path; a
//! request that omits it reuses the last one. Concurrent requests on one
//! session are not serialized: the last write wins.

use std::collections::HashMap;

use parking_lot::RwLock;
use tg_domain::config::PathsConfig;

use crate::paths::PathResolver;

pub struct WorkdirStore {
    resolver: PathResolver,
    default_workdir: String,
    /// session id → last supplied (host-side, untranslated) path.
    paths: RwLock<HashMap<String, String>>,
}

impl WorkdirStore {
    pub fn new(resolver: PathResolver, default_workdir: impl Into<String>) -> Self {
        Self {
            resolver,
            default_workdir: default_workdir.into(),
            paths: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(cfg: &PathsConfig) -> Self {
        Self::new(PathResolver::from_config(cfg), cfg.default_workdir.clone())
    }

    /// The translated working directory for `session_id`.
    ///
    /// A non-empty `provided` path is stored first (sticky write).
    pub fn effective_path(&self, session_id: &str, provided: Option<&str>) -> String {
        let raw = match provided.filter(|p| !p.is_empty()) {
            Some(path) => {
                self.paths
                    .write()
                    .insert(session_id.to_owned(), path.to_owned());
                path.to_owned()
            }
            None => self
                .paths
                .read()
                .get(session_id)
                .cloned()
                .unwrap_or_else(|| self.default_workdir.clone()),
        };
        self.resolver.resolve(&raw)
    }

    /// Record the initial path for a new session; falls back to the default.
    pub fn seed(&self, session_id: &str, initial: Option<&str>) {
        let path = initial
            .filter(|p| !p.is_empty())
            .unwrap_or(self.default_workdir.as_str())
            .to_owned();
        self.paths.write().insert(session_id.to_owned(), path);
    }

    /// The stored (untranslated) path, if the session has one.
    pub fn get(&self, session_id: &str) -> Option<String> {
        self.paths.read().get(session_id).cloned()
    }

    /// Drop a closed session's path.
    pub fn forget(&self, session_id: &str) {
        self.paths.write().remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.paths.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.read().is_empty()
    }
}
