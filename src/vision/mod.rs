//! Vision/OCR Layer
//!
//! Recognition engines are opaque capabilities behind [`MrzEngine`]. Each
//! engine is registered by name in an [`EngineRegistry`] together with the
//! factory that builds it, and is constructed at most once per process the
//! first time it is needed.
//!
//! Built-in engines:
//! - `tesseract`: the Tesseract CLI driven as an external process

pub mod ocr;
pub mod tesseract;

pub use ocr::{
    convert_ocr_result_to_ground_truth, convert_ocr_results_to_ground_truth, DetectionResult,
    GroundTruth, OcrResult, Point,
};
pub use tesseract::{TesseractEngine, TesseractFactory};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{BenchError, Result};

/// How a setting is edited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    /// Free-form text
    #[default]
    String,
    /// One of the values returned by [`EngineFactory::setting_options`]
    Select,
}

/// A named engine setting value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub name: String,
    pub value: String,
    #[serde(rename = "type", default)]
    pub kind: SettingKind,
}

impl Setting {
    pub fn new(name: impl Into<String>, value: impl Into<String>, kind: SettingKind) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            kind,
        }
    }
}

/// A setting an engine understands
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingDef {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: SettingKind,
}

/// Recognition capability every engine provides
#[async_trait]
pub trait MrzEngine: Send + Sync {
    /// Registry name of the engine
    fn name(&self) -> &str;

    /// Recognize the MRZ lines in an encoded image
    async fn detect(&self, image: &[u8]) -> Result<DetectionResult>;

    /// Replace the runtime settings. An empty list restores defaults.
    async fn apply_settings(&mut self, settings: &[Setting]) -> Result<()>;
}

/// Describes and constructs one kind of engine
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Registry name of the engine this factory builds
    fn name(&self) -> &'static str;

    /// Settings the engine accepts
    fn supported_settings(&self) -> Vec<SettingDef>;

    /// Settings a fresh engine runs with
    fn default_settings(&self) -> Vec<Setting> {
        Vec::new()
    }

    /// Allowed values for a `select` setting
    fn setting_options(&self, _key: &str, _settings: &[Setting]) -> Vec<String> {
        Vec::new()
    }

    /// Build and initialize an engine instance
    async fn create(&self) -> Result<Box<dyn MrzEngine>>;
}

/// Shared handle to an initialized engine
pub type EngineHandle = Mutex<Box<dyn MrzEngine>>;

struct EngineSlot {
    factory: Box<dyn EngineFactory>,
    instance: OnceCell<EngineHandle>,
}

/// Named engine implementations with lazily created shared instances
#[derive(Default)]
pub struct EngineRegistry {
    slots: Vec<EngineSlot>,
}

impl EngineRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in engine
    pub fn with_builtin(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TesseractFactory::from_config(config)));
        registry
    }

    /// Register a factory, replacing any previous one with the same name
    pub fn register(&mut self, factory: Box<dyn EngineFactory>) {
        let slot = EngineSlot {
            factory,
            instance: OnceCell::new(),
        };
        match self
            .slots
            .iter_mut()
            .find(|s| s.factory.name() == slot.factory.name())
        {
            Some(existing) => *existing = slot,
            None => self.slots.push(slot),
        }
    }

    /// Registered engine names in registration order
    pub fn engines(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.factory.name()).collect()
    }

    /// Whether an engine with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.slot(name).is_ok()
    }

    /// Look up the factory for an engine
    pub fn factory(&self, name: &str) -> Result<&dyn EngineFactory> {
        self.slot(name).map(|s| s.factory.as_ref())
    }

    /// Whether the shared instance has been built
    #[cfg(test)]
    pub fn is_initialized(&self, name: &str) -> bool {
        self.slot(name)
            .map(|s| s.instance.initialized())
            .unwrap_or(false)
    }

    /// Build the shared instance on first use and return it.
    ///
    /// Concurrent callers wait on the same initialization; a failed
    /// initialization leaves the slot empty so a later call retries.
    pub async fn ensure_initialized(&self, name: &str) -> Result<&EngineHandle> {
        let slot = self.slot(name)?;
        slot.instance
            .get_or_try_init(|| async move {
                info!("Initializing {} engine", name);
                let engine = slot.factory.create().await?;
                info!("{} engine initialized successfully", name);
                Ok::<_, BenchError>(Mutex::new(engine))
            })
            .await
    }

    fn slot(&self, name: &str) -> Result<&EngineSlot> {
        self.slots
            .iter()
            .find(|s| s.factory.name() == name)
            .ok_or_else(|| BenchError::UnknownEngine(name.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedFactory;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_ensure_initialized_is_idempotent() {
        let factory = ScriptedFactory::new("scripted");
        let created = factory.created.clone();

        let mut registry = EngineRegistry::new();
        registry.register(Box::new(factory));
        assert!(!registry.is_initialized("scripted"));

        registry.ensure_initialized("scripted").await.unwrap();
        registry.ensure_initialized("scripted").await.unwrap();

        assert!(registry.is_initialized("scripted"));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_initialization_is_single_flight() {
        let factory = ScriptedFactory::new("scripted");
        let created = factory.created.clone();

        let mut registry = EngineRegistry::new();
        registry.register(Box::new(factory));

        let (a, b) = tokio::join!(
            registry.ensure_initialized("scripted"),
            registry.ensure_initialized("scripted")
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_initialization_retries() {
        let mut factory = ScriptedFactory::new("broken");
        factory.fail = true;
        let created = factory.created.clone();

        let mut registry = EngineRegistry::new();
        registry.register(Box::new(factory));

        assert!(registry.ensure_initialized("broken").await.is_err());
        assert!(registry.ensure_initialized("broken").await.is_err());
        assert!(!registry.is_initialized("broken"));
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_engine() {
        let registry = EngineRegistry::new();
        let result = registry.ensure_initialized("nope").await;
        assert!(matches!(result, Err(BenchError::UnknownEngine(name)) if name == "nope"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = EngineRegistry::new();
        registry.register(Box::new(ScriptedFactory::new("a")));
        registry.register(Box::new(ScriptedFactory::new("b")));
        registry.register(Box::new(ScriptedFactory::new("a")));

        assert_eq!(registry.engines(), vec!["a", "b"]);
        assert!(registry.contains("b"));
        assert!(!registry.contains("c"));
    }

    #[test]
    fn test_builtin_registry() {
        let registry = EngineRegistry::with_builtin(&EngineConfig::default());
        assert_eq!(registry.engines(), vec!["tesseract"]);
        let factory = registry.factory("tesseract").unwrap();
        assert!(factory
            .supported_settings()
            .iter()
            .any(|def| def.name == "psm" && def.kind == SettingKind::Select));
    }

    #[test]
    fn test_setting_json_uses_type_field() {
        let setting = Setting::new("psm", "6", SettingKind::Select);
        let value = serde_json::to_value(&setting).unwrap();
        assert_eq!(value["type"], "select");

        // "type" is optional in stored settings
        let parsed: Setting = serde_json::from_str(r#"{"name":"template","value":"MRZ"}"#).unwrap();
        assert_eq!(parsed.kind, SettingKind::String);
    }
}
