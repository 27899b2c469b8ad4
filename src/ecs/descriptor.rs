//! Deployment descriptor discovery and parsing.
use crate::error::{Result, ScopeError};
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Container-service resource exactly as written in a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EcsResource {
    #[serde(default, deserialize_with = "scalar_string")]
    pub cluster: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub service: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub image: Option<String>,
    /// Build context. Absent or empty marks the resource inactive.
    #[serde(default, deserialize_with = "scalar_string")]
    pub context: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub dockerfile: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub tag: Option<String>,
}

impl EcsResource {
    pub fn is_active(&self) -> bool {
        self.context
            .as_deref()
            .is_some_and(|context| !context.trim().is_empty())
    }
}

/// `type: ecs` resources of one descriptor, in file order.
pub type Resources = Vec<(String, EcsResource)>;

/// Find descriptor files under `code_paths`, depth-first in name order.
///
/// Missing code paths are skipped. Symlinked directories are not followed.
pub fn find_descriptors(
    repo_root: &Path,
    code_paths: &[String],
    file_names: &[String],
) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for code_path in code_paths {
        let dir = repo_root.join(code_path);
        if dir.is_dir() {
            walk(&dir, file_names, &mut found)?;
        }
    }
    Ok(found)
}

fn walk(dir: &Path, file_names: &[String], found: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .map_err(|err| ScopeError::io(format!("read {}", dir.display()), err))?
        .filter_map(|entry| entry.ok())
        .collect();
    entries.sort_by_key(|entry| entry.file_name());

    for name in file_names {
        let matching = entries
            .iter()
            .find(|entry| entry.file_name().to_str() == Some(name.as_str()));
        if let Some(entry) = matching {
            if entry.file_type().is_ok_and(|kind| kind.is_file()) {
                found.push(entry.path());
            }
        }
    }
    for entry in &entries {
        if entry.file_type().is_ok_and(|kind| kind.is_dir()) {
            walk(&entry.path(), file_names, found)?;
        }
    }
    Ok(())
}

/// Parse a descriptor, keeping only `type: ecs` resources.
pub fn load_descriptor(path: &Path) -> Result<Resources> {
    let text = fs::read_to_string(path)
        .map_err(|err| ScopeError::io(format!("read {}", path.display()), err))?;
    parse_descriptor(path, &text)
}

pub fn parse_descriptor(path: &Path, text: &str) -> Result<Resources> {
    let invalid = |detail: String| ScopeError::Descriptor {
        path: path.to_path_buf(),
        detail,
    };
    let root: Value =
        serde_yaml::from_str(text).map_err(|err| invalid(format!("parse YAML: {err}")))?;
    let resources = root
        .get("resources")
        .and_then(Value::as_mapping)
        .ok_or_else(|| invalid("missing resources mapping".to_string()))?;

    let mut ecs = Vec::new();
    for (name, definition) in resources {
        let name = name
            .as_str()
            .ok_or_else(|| invalid(format!("resource name {name:?} is not a string")))?;
        if definition.get("type").and_then(Value::as_str) != Some("ecs") {
            continue;
        }
        let resource: EcsResource = serde_yaml::from_value(definition.clone())
            .map_err(|err| invalid(format!("resource {name}: {err}")))?;
        ecs.push((name.to_string(), resource));
    }
    Ok(ecs)
}

/// Accept any YAML scalar as a string so `tag: 1.2` reads as `"1.2"`.
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(Value::Bool(flag)) => Ok(Some(flag.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a scalar, found {other:?}"
        ))),
    }
}
