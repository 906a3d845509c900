//! Loosely-typed configuration values with deep merge support
//!
//! A configuration document may be split over several files (a base file
//! plus per-environment overlays) and patched from the command line with
//! `--set`. All of that happens on untyped JSON values; only the merged
//! result is deserialized into the typed [`ConfigDocument`](crate::ConfigDocument).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Values container with deep merge capability
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load and merge several files, later files winning
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut result = Values::new();
        for path in paths {
            let layer = Self::from_file(path)?;
            tracing::debug!(path = %path.as_ref().display(), "merged configuration layer");
            result.merge(&layer);
        }
        Ok(result)
    }

    /// Parse values from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        // An empty file parses as null; treat it as an empty layer
        if value.is_null() {
            return Ok(Self::new());
        }
        Ok(Self(value))
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Objects: recursive merge
    /// - Arrays: overlay replaces base (not appended)
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Set a value by dotted path (e.g., "workloads.api.replicas")
    ///
    /// A literal dot inside a key is written `\.`, so
    /// `workloads.api.nodeSelector.kubernetes\.io/os` addresses the
    /// `kubernetes.io/os` key.
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let parts = split_path(path);
        if parts.iter().any(String::is_empty) {
            return Err(CoreError::ValuesMerge {
                message: format!("Invalid path '{}': empty segment", path),
            });
        }
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        set_nested(&mut self.0, &parts, value)
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts = split_path(path);
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        get_nested(&self.0, &parts)
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }

    /// Deserialize the merged values into a typed document
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.0).map_err(|e| CoreError::InvalidDocument {
            message: e.to_string(),
        })
    }
}

/// Split a dotted path, honouring `\.` escapes
fn split_path(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => parts.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    parts.push(current);
    parts
}

/// Deep merge two JSON values
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Set a nested value by path
fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) -> Result<()> {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return Ok(());
    };

    if !value.is_object() {
        *value = JsonValue::Object(serde_json::Map::new());
    }

    let map = value.as_object_mut().ok_or_else(|| CoreError::ValuesMerge {
        message: format!("Cannot set '{}' on a non-object value", key),
    })?;

    if remaining.is_empty() {
        map.insert((*key).to_string(), new_value);
    } else {
        let entry = map
            .entry((*key).to_string())
            .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
        set_nested(entry, remaining, new_value)?;
    }

    Ok(())
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let Some((key, remaining)) = path.split_first() else {
        return Some(value);
    };

    match value {
        JsonValue::Object(map) => map.get(*key).and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}

/// Parse --set arguments (key=value format)
pub fn parse_set_values(set_args: &[String]) -> Result<Values> {
    let mut values = Values::new();

    for arg in set_args {
        let (key, val) = arg.split_once('=').ok_or_else(|| CoreError::ValuesMerge {
            message: format!("Invalid --set format: '{}'. Expected key=value", arg),
        })?;

        let json_value = if val == "true" {
            JsonValue::Bool(true)
        } else if val == "false" {
            JsonValue::Bool(false)
        } else if val == "null" {
            JsonValue::Null
        } else if let Ok(num) = val.parse::<i64>() {
            JsonValue::Number(num.into())
        } else if let Ok(num) = val.parse::<f64>() {
            serde_json::Number::from_f64(num)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(val.to_string()))
        } else if val.starts_with('[') || val.starts_with('{') {
            serde_json::from_str(val).unwrap_or_else(|_| JsonValue::String(val.to_string()))
        } else {
            JsonValue::String(val.to_string())
        };

        values.set(key, json_value)?;
    }

    Ok(values)
}
