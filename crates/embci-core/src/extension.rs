//! Extension loader: resolves `(file path, symbol)` pairs to task instances.
//!
//! Tasks are linked into the binary and registered in a table keyed by their
//! path relative to the application root and their exported symbol name.
//! Configuration keeps referring to tasks by path, so a new build target
//! needs only an implementation and one registry entry.
//!
//! Lookup ignores a trailing `.py`/`.rs` so pipeline paths written for
//! script-based tasks still resolve. An entry's init hook runs once per
//! process, on the first load of that `(path, symbol)` through any loader.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, Once, OnceLock};

use tracing::debug;

use crate::capability::{Build, Check, Test};
use crate::error::ConfigError;

/// A freshly constructed task, tagged with the capability it implements.
pub enum Extension {
    Build(Box<dyn Build>),
    Check(Box<dyn Check>),
    Test(Box<dyn Test>),
}

impl Extension {
    pub fn kind(&self) -> &'static str {
        match self {
            Extension::Build(_) => "build",
            Extension::Check(_) => "check",
            Extension::Test(_) => "test",
        }
    }
}

impl std::fmt::Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Extension::{}", self.kind())
    }
}

/// Zero-argument task constructor.
pub type ExtensionCtor = fn() -> Extension;

struct Entry {
    ctor: ExtensionCtor,
    init: Option<fn()>,
}

type InitKey = (String, String);

/// Init state of every `(path, symbol)`, shared by all loaders.
static INIT_STATES: OnceLock<Mutex<HashMap<InitKey, Arc<Once>>>> = OnceLock::new();

fn run_init_once(key: InitKey, init: fn()) {
    let once = {
        let states = INIT_STATES.get_or_init(Default::default);
        let mut states = states.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(states.entry(key).or_insert_with(|| Arc::new(Once::new())))
    };
    // Outside the lock: a hook may itself load extensions.
    once.call_once(init);
}

/// Registry of linked-in tasks.
pub struct ExtensionLoader {
    app_root: PathBuf,
    entries: HashMap<(String, String), Entry>,
}

impl ExtensionLoader {
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        Self {
            app_root: app_root.into(),
            entries: HashMap::new(),
        }
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    /// Register `symbol` at `path` (relative to the application root).
    pub fn register(&mut self, path: &str, symbol: &str, ctor: ExtensionCtor) -> &mut Self {
        self.insert(path, symbol, ctor, None)
    }

    /// Register with a one-time initialisation hook, run on first load.
    pub fn register_with_init(
        &mut self,
        path: &str,
        symbol: &str,
        init: fn(),
        ctor: ExtensionCtor,
    ) -> &mut Self {
        self.insert(path, symbol, ctor, Some(init))
    }

    fn insert(
        &mut self,
        path: &str,
        symbol: &str,
        ctor: ExtensionCtor,
        init: Option<fn()>,
    ) -> &mut Self {
        let key = normalize_relative(Path::new(path)).unwrap_or_else(|| path.to_string());
        self.entries.insert((key, symbol.to_string()), Entry { ctor, init });
        self
    }

    /// Canonical key for `file_path`, or `None` when it escapes the root.
    pub fn resolve_key(&self, file_path: &Path) -> Option<String> {
        let relative = if file_path.is_absolute() {
            file_path.strip_prefix(&self.app_root).ok()?
        } else {
            file_path
        };
        normalize_relative(relative)
    }

    /// Load `symbol` from `file_path`, returning a new instance.
    pub fn load_symbol(&self, file_path: &Path, symbol: &str) -> Result<Extension, ConfigError> {
        let not_found = || ConfigError::ExtensionNotFound {
            path: file_path.display().to_string(),
            symbol: symbol.to_string(),
        };
        let key = self.resolve_key(file_path).ok_or_else(not_found)?;
        let entry = self
            .entries
            .get(&(key.clone(), symbol.to_string()))
            .ok_or_else(not_found)?;
        if let Some(init) = entry.init {
            run_init_once((key.clone(), symbol.to_string()), init);
        }
        debug!(extension = %key, symbol = %symbol, "loaded extension");
        Ok((entry.ctor)())
    }

    pub fn load_build(&self, file_path: &Path, symbol: &str) -> Result<Box<dyn Build>, ConfigError> {
        match self.load_symbol(file_path, symbol)? {
            Extension::Build(b) => Ok(b),
            other => Err(mismatch(file_path, symbol, "build", other.kind())),
        }
    }

    pub fn load_check(&self, file_path: &Path, symbol: &str) -> Result<Box<dyn Check>, ConfigError> {
        match self.load_symbol(file_path, symbol)? {
            Extension::Check(c) => Ok(c),
            other => Err(mismatch(file_path, symbol, "check", other.kind())),
        }
    }

    pub fn load_test(&self, file_path: &Path, symbol: &str) -> Result<Box<dyn Test>, ConfigError> {
        match self.load_symbol(file_path, symbol)? {
            Extension::Test(t) => Ok(t),
            other => Err(mismatch(file_path, symbol, "test", other.kind())),
        }
    }

    /// Registered keys, sorted. Used by `--help` listings.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .entries
            .keys()
            .map(|(path, symbol)| format!("{}::{}", path, symbol))
            .collect();
        keys.sort();
        keys
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

fn mismatch(path: &Path, symbol: &str, expected: &'static str, found: &'static str) -> ConfigError {
    ConfigError::CapabilityMismatch {
        path: path.display().to_string(),
        symbol: symbol.to_string(),
        expected,
        found,
    }
}

fn normalize_relative(path: &Path) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(os) => parts.push(os.to_str()?.to_string()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    let last = parts.pop()?;
    let stem = match last.rsplit_once('.') {
        Some((stem, "py" | "rs")) if !stem.is_empty() => stem.to_string(),
        _ => last,
    };
    parts.push(stem);
    Some(parts.join("/"))
}
