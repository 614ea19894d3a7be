//! Update type handlers and their registry.
//!
//! Every payload declares an update type. The registry maps that tag to an
//! [`UpdateHandler`] which decodes the payload's provides, depends and
//! metadata sections and reads its files. A type with no handler fails the
//! read; a payload is never skipped.

use std::collections::BTreeMap;
use std::io::Read;

use serde_json::Value;

use crate::artifact::{FileEntry, MetaData, UpdateDepends, UpdateProvides};
use crate::config::HandlerConfig;
use crate::error::{ConfigError, ReadError, SectionError, SectionKind};
use crate::payload::{read_payload_files, PayloadContext};

/// Update type of full root filesystem images.
pub const ROOTFS_IMAGE: &str = "rootfs-image";

/// Update module types registered by [`HandlerRegistry::with_defaults`].
pub const DEFAULT_MODULE_TYPES: [&str; 6] =
    ["single-file", "directory", "deb", "rpm", "docker", "script"];

/// Decodes the sections of one update type.
///
/// Section decoders return [`SectionError`], which the reader records on the
/// update before carrying on. Only [`decode_files`](Self::decode_files) can
/// fail the read.
pub trait UpdateHandler: Send + Sync {
    /// The type tag this handler is registered under.
    fn update_type(&self) -> &str;

    /// Most payload files this type allows, if limited.
    fn max_files(&self) -> Option<usize> {
        None
    }

    /// Decode `artifact_provides` from the payload's type-info.
    fn decode_provides(&self, raw: &Value) -> Result<UpdateProvides, SectionError> {
        decode_string_map(raw)
    }

    /// Decode `artifact_depends` from the payload's type-info.
    fn decode_depends(&self, raw: &Value) -> Result<UpdateDepends, SectionError> {
        decode_set_map(raw)
    }

    /// Decode the payload's `meta-data` entry.
    fn decode_meta_data(&self, raw: &[u8]) -> Result<MetaData, SectionError> {
        decode_json_object(raw)
    }

    /// Read and verify the payload's files from its data section.
    fn decode_files(
        &self,
        stream: &mut dyn Read,
        ctx: &PayloadContext<'_>,
    ) -> Result<Vec<FileEntry>, ReadError> {
        let ctx = PayloadContext {
            max_files: self.max_files(),
            ..*ctx
        };
        read_payload_files(stream, &ctx)
    }
}

/// Full filesystem image updates. A payload carries at most one image.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootfsImageHandler;

impl UpdateHandler for RootfsImageHandler {
    fn update_type(&self) -> &str {
        ROOTFS_IMAGE
    }

    fn max_files(&self) -> Option<usize> {
        Some(1)
    }
}

/// Generic update module handler, one instance per module type name.
#[derive(Debug, Clone)]
pub struct ModuleImageHandler {
    update_type: String,
}

impl ModuleImageHandler {
    pub fn new(update_type: impl Into<String>) -> Self {
        Self {
            update_type: update_type.into(),
        }
    }
}

impl UpdateHandler for ModuleImageHandler {
    fn update_type(&self) -> &str {
        &self.update_type
    }

    fn decode_meta_data(&self, raw: &[u8]) -> Result<MetaData, SectionError> {
        let meta_data = decode_json_object(raw)?;
        if meta_data.keys().any(|key| key.is_empty()) {
            return Err(SectionError::new(
                SectionKind::MetaData,
                "metadata keys must not be empty",
            ));
        }
        Ok(meta_data)
    }
}

/// Handlers keyed by update type.
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Box<dyn UpdateHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Registry with `rootfs-image` and the standard update modules.
    pub fn with_defaults() -> Self {
        let mut handlers: BTreeMap<String, Box<dyn UpdateHandler>> = BTreeMap::new();
        handlers.insert(ROOTFS_IMAGE.to_string(), Box::new(RootfsImageHandler));
        for module_type in DEFAULT_MODULE_TYPES {
            handlers.insert(module_type.to_string(), Box::new(ModuleImageHandler::new(module_type)));
        }
        Self { handlers }
    }

    /// Defaults plus every extra module type named in the configuration.
    pub fn from_config(config: &HandlerConfig) -> Result<Self, ConfigError> {
        let mut registry = Self::with_defaults();
        for module_type in &config.module_types {
            registry.register(Box::new(ModuleImageHandler::new(module_type.trim())))?;
        }
        Ok(registry)
    }

    /// Register a handler for its update type.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DuplicateHandler` if the type already has one.
    pub fn register(&mut self, handler: Box<dyn UpdateHandler>) -> Result<(), ConfigError> {
        let update_type = handler.update_type().to_string();
        if self.handlers.contains_key(&update_type) {
            return Err(ConfigError::DuplicateHandler(update_type));
        }
        tracing::debug!(update_type = %update_type, "Registered update handler");
        self.handlers.insert(update_type, handler);
        Ok(())
    }

    /// Find the handler for `update_type`.
    ///
    /// # Errors
    ///
    /// Returns `ReadError::UnsupportedUpdateType` for unregistered types.
    pub fn lookup(&self, update_type: &str) -> Result<&dyn UpdateHandler, ReadError> {
        self.handlers
            .get(update_type)
            .map(|handler| handler.as_ref())
            .ok_or_else(|| ReadError::UnsupportedUpdateType(update_type.to_string()))
    }

    /// Registered update types in sorted order.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn decode_string_map(raw: &Value) -> Result<UpdateProvides, SectionError> {
    let object = raw.as_object().ok_or_else(|| {
        SectionError::new(SectionKind::Provides, format!("expected an object, got {}", kind_of(raw)))
    })?;

    object
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key.clone(), s.clone())),
            other => Err(SectionError::new(
                SectionKind::Provides,
                format!("value of {key} must be a string, got {}", kind_of(other)),
            )),
        })
        .collect()
}

fn decode_set_map(raw: &Value) -> Result<UpdateDepends, SectionError> {
    let object = raw.as_object().ok_or_else(|| {
        SectionError::new(SectionKind::Depends, format!("expected an object, got {}", kind_of(raw)))
    })?;

    let mut depends = UpdateDepends::new();
    for (key, value) in object {
        let values = match value {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        SectionError::new(
                            SectionKind::Depends,
                            format!("values of {key} must be strings, got {}", kind_of(item)),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => {
                return Err(SectionError::new(
                    SectionKind::Depends,
                    format!("value of {key} must be a string or a list, got {}", kind_of(other)),
                ))
            }
        };
        depends.insert(key.clone(), values);
    }
    Ok(depends)
}

fn decode_json_object(raw: &[u8]) -> Result<MetaData, SectionError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| SectionError::new(SectionKind::MetaData, e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(SectionError::new(
            SectionKind::MetaData,
            format!("expected an object, got {}", kind_of(&other)),
        )),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
