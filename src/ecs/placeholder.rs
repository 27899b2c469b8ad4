use crate::environment::EnvironmentSpec;
use crate::error::{Result, ScopeError};
use std::collections::BTreeMap;

/// Named `${...}` tokens a descriptor may reference, bound to one track.
#[derive(Debug, Clone)]
pub struct Placeholders {
    values: BTreeMap<&'static str, String>,
}

impl Placeholders {
    pub fn for_environment(env: &EnvironmentSpec) -> Self {
        let mut values = BTreeMap::new();
        values.insert("DEPLOY_STAGE", env.code.clone());
        values.insert("AWS_ACCOUNT_ID", env.account_id.clone());
        values.insert("AWS_REGION", env.region.clone());
        Self { values }
    }

    /// Replace every token in `text`; any unknown or unterminated token fails.
    pub fn resolve(&self, field: &str, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(ScopeError::UnresolvedPlaceholder {
                    field: field.to_string(),
                    token: after.to_string(),
                });
            };
            let token = &after[..end];
            let value = self
                .values
                .get(token)
                .ok_or_else(|| ScopeError::UnresolvedPlaceholder {
                    field: field.to_string(),
                    token: token.to_string(),
                })?;
            out.push_str(value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}
