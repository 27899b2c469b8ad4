use std::collections::BTreeMap;
use std::ffi::OsString;

/// Key/value run configuration captured once at startup.
///
/// Registrations are read from here instead of from the live process
/// environment, so the mapper sees one consistent snapshot.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    vars: BTreeMap<String, String>,
}

/// `name -> artifact path` binding for one deployment target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRegistration {
    pub name: String,
    pub artifact_path: String,
}

/// Kind of artifact a registration points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind<'a> {
    /// Handler script, matched by extension (`.py`).
    Handler { extension: &'a str },
    /// Shared layer, matched by manifest filename (`requirements.txt`).
    Layer { manifest: &'a str },
}

impl TargetKind<'_> {
    fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Handler { extension } => value.ends_with(extension),
            Self::Layer { manifest } => value.ends_with(manifest),
        }
    }
}

impl RunConfig {
    pub fn from_env() -> Self {
        Self::from_os_vars(std::env::vars_os())
    }

    /// Keep the UTF-8 entries; anything else cannot name a target.
    fn from_os_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        vars.into_iter()
            .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (key, _) => {
                    tracing::debug!(key = ?key, "skipping non-UTF-8 environment entry");
                    None
                }
            })
            .collect()
    }

    /// Registrations for `env_code` of the given kind, in key order.
    ///
    /// A key belongs to an environment when its second `_`-separated segment
    /// equals the environment code, ignoring case (`LAMBDA_DEV_ORDERS`).
    pub fn registrations(&self, env_code: &str, kind: TargetKind<'_>) -> Vec<TargetRegistration> {
        self.vars
            .iter()
            .filter(|(key, _)| {
                key.split('_')
                    .nth(1)
                    .is_some_and(|segment| segment.eq_ignore_ascii_case(env_code))
            })
            .filter(|(_, value)| kind.accepts(value))
            .map(|(key, value)| TargetRegistration {
                name: key.clone(),
                artifact_path: value.clone(),
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RunConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}
