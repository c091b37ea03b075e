//! Extractor configuration.
//!
//! Layering, lowest first: built-in defaults, programmatic overrides (JSON),
//! then `extractor.toml` at the workspace root. Layers are deep-merged as
//! JSON before deserializing, so a file only needs the keys it changes.

use crate::analysis::{
    ComponentMatchers, EvalContext, EvalFlags, EvaluationOptions, ExtractRequest, FunctionMatchers,
    TaggedTemplateMatchers,
};
use crate::constants::{CONFIG_FILE_NAME, SOURCE_EXTENSIONS};
use crate::error::{ExtractError, Result};
use glob::Pattern;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub flags: EvalFlags,
    pub sandbox: EvaluationOptions,
    pub matchers: MatcherConfig,
    pub workspace: WorkspaceConfig,
}

/// Glob patterns selecting what to extract. An empty `functions`,
/// `components` or `tagged_templates` list disables that kind of site; an
/// empty `props` list accepts every prop.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub functions: Vec<String>,
    pub components: Vec<String>,
    pub props: Vec<String>,
    pub tagged_templates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub root: Option<PathBuf>,
    /// File extensions picked up when walking directories
    pub extensions: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            extensions: SOURCE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl ExtractorConfig {
    pub fn eval_context(&self) -> EvalContext {
        EvalContext::default()
            .with_flags(self.flags)
            .with_sandbox_options(self.sandbox.clone())
    }

    /// Build an extraction request from the matcher globs.
    pub fn request(&self) -> Result<ExtractRequest> {
        let matchers = &self.matchers;
        let functions = PatternSet::compile(&matchers.functions)?;
        let components = PatternSet::compile(&matchers.components)?;
        let tagged = PatternSet::compile(&matchers.tagged_templates)?;
        let props = PatternSet::compile(&matchers.props)?;

        let prop_filter = {
            let props = props.clone();
            move |_: &str, prop: &str| props.is_empty() || props.matches(prop)
        };

        Ok(ExtractRequest {
            functions: (!functions.is_empty()).then(|| {
                FunctionMatchers::new(move |name| functions.matches(name), prop_filter.clone(), |_, _| true)
            }),
            components: (!components.is_empty()).then(|| {
                ComponentMatchers::new(move |tag, _| components.matches(tag), prop_filter.clone())
            }),
            tagged_templates: (!tagged.is_empty())
                .then(|| TaggedTemplateMatchers::new(move |name| tagged.matches(name))),
            context: self.eval_context(),
        })
    }

    /// Whether `path` has one of the configured source extensions.
    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.workspace.extensions.iter().any(|e| e == ext))
    }
}

#[derive(Debug, Clone, Default)]
struct PatternSet(Arc<Vec<Pattern>>);

impl PatternSet {
    fn compile(patterns: &[String]) -> Result<Self> {
        patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| ExtractError::Config(format!("invalid pattern `{}`: {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()
            .map(|patterns| PatternSet(Arc::new(patterns)))
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn matches(&self, name: &str) -> bool {
        self.0.iter().any(|p| p.matches(name))
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<ExtractorConfig>>,
    overrides: Arc<RwLock<Option<serde_json::Value>>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(ExtractorConfig::default())),
            overrides: Arc::new(RwLock::new(None)),
        }
    }

    pub fn get_config(&self) -> ExtractorConfig {
        self.config.read().clone()
    }

    /// JSON layered between the defaults and the config file.
    pub fn set_overrides(&self, overrides: Option<serde_json::Value>) {
        *self.overrides.write() = overrides;
    }

    /// Load `extractor.toml` from `root`, if present.
    pub fn load_from_workspace(&self, root: &Path) -> Result<ExtractorConfig> {
        let path = root.join(CONFIG_FILE_NAME);
        let file = path.exists().then_some(path.as_path());
        let mut config = self.load(file)?;
        if config.workspace.root.is_none() {
            config.workspace.root = Some(root.to_path_buf());
            *self.config.write() = config.clone();
        }
        Ok(config)
    }

    /// Load an explicit config file.
    pub fn load_file(&self, path: &Path) -> Result<ExtractorConfig> {
        self.load(Some(path))
    }

    fn load(&self, file: Option<&Path>) -> Result<ExtractorConfig> {
        let mut config_json = serde_json::to_value(ExtractorConfig::default())
            .map_err(|e| ExtractError::Config(format!("Failed to serialize defaults: {}", e)))?;

        if let Some(overrides) = self.overrides.read().as_ref() {
            merge_json(&mut config_json, overrides);
        }

        if let Some(path) = file {
            let toml_content = fs::read_to_string(path).map_err(|e| ExtractError::io(path, e))?;
            let toml_value: toml::Value = toml::from_str(&toml_content)
                .map_err(|e| ExtractError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
            merge_json(&mut config_json, &toml_to_json(&toml_value));
            debug!(path = %path.display(), "Loaded config file");
        }

        let config: ExtractorConfig = serde_json::from_value(config_json)
            .map_err(|e| ExtractError::Config(format!("Failed to deserialize merged config: {}", e)))?;

        *self.config.write() = config.clone();
        Ok(config)
    }

    pub fn update(&self, new_config: ExtractorConfig) {
        *self.config.write() = new_config;
    }

    pub fn set_flags(&self, flags: EvalFlags) {
        self.config.write().flags = flags;
    }
}

fn toml_to_json(toml: &toml::Value) -> serde_json::Value {
    match toml {
        toml::Value::String(s) => serde_json::Value::String(s.clone()),
        toml::Value::Integer(i) => serde_json::Value::Number((*i).into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        toml::Value::Boolean(b) => serde_json::Value::Bool(*b),
        toml::Value::Array(arr) => serde_json::Value::Array(arr.iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_json(v)))
                .collect(),
        ),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
    }
}

fn merge_json(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                if overlay_val.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(base_val) => merge_json(base_val, overlay_val),
                    None => {
                        base_map.insert(key.clone(), overlay_val.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            if !overlay.is_null() {
                *base = overlay.clone();
            }
        }
    }
}
