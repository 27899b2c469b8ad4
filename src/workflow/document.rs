//! Typed access to a CircleCI-style pipeline document.
//!
//! The document is kept as a YAML value so keys this crate never touches
//! survive a rewrite unchanged and in their original order. Lookups go by
//! job name; a missing key is a `DocumentSchema` error naming its path.
use crate::environment::JobSlot;
use crate::error::{Result, ScopeError};
use serde_yaml::{Mapping, Value};

/// Outcome of adding a job invocation to a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAppend {
    Appended,
    /// An invocation with the same key existed and was overwritten in place.
    Replaced,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDocument {
    root: Value,
}

impl WorkflowDocument {
    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(text)?;
        if !root.is_mapping() {
            return Err(ScopeError::schema("top-level mapping"));
        }
        Ok(Self { root })
    }

    /// Serialize with insertion-ordered keys.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    /// Set `parameters.<flag>.default` to true. Returns whether it changed.
    pub fn activate_feature(&mut self, flag: &str) -> Result<bool> {
        let path = format!("parameters.{flag}");
        let parameter = mapping_at(&mut self.root, &["parameters", flag], &path)?;
        let enabled = Value::Bool(true);
        if parameter.get("default") == Some(&enabled) {
            return Ok(false);
        }
        parameter.insert(Value::from("default"), enabled);
        Ok(true)
    }

    /// Set a matrix parameter on every slot of a workflow.
    ///
    /// Slots are found by job name. A slot found away from its conventional
    /// offset is still updated, but the drift is logged.
    pub fn inject_matrix_parameter(
        &mut self,
        workflow: &str,
        slots: &[JobSlot],
        parameter: &str,
        values: &[String],
    ) -> Result<()> {
        for slot in slots {
            let position = self.job_position(workflow, &slot.name)?;
            if position != slot.offset {
                tracing::warn!(
                    workflow,
                    job = %slot.name,
                    expected = slot.offset,
                    found = position,
                    "job found away from its conventional position"
                );
            }
            self.set_matrix_parameter(workflow, &slot.name, parameter, values)?;
        }
        Ok(())
    }

    /// Set `matrix.parameters.<parameter>` on one job of a workflow.
    pub fn set_matrix_parameter(
        &mut self,
        workflow: &str,
        job: &str,
        parameter: &str,
        values: &[String],
    ) -> Result<()> {
        let job_path = format!("workflows.{workflow}.jobs[{job}]");
        let position = self.job_position(workflow, job)?;
        let jobs = self.workflow_jobs_mut(workflow)?;
        let body = jobs
            .get_mut(position)
            .and_then(Value::as_mapping_mut)
            .and_then(|entry| entry.values_mut().next())
            .ok_or_else(|| ScopeError::schema(format!("{job_path} body")))?;
        let matrix_params = mapping_at(
            body,
            &["matrix", "parameters"],
            &format!("{job_path}.matrix.parameters"),
        )?;
        matrix_params.insert(
            Value::from(parameter),
            Value::Sequence(values.iter().map(|value| Value::from(value.as_str())).collect()),
        );
        Ok(())
    }

    /// Add `{name: body}` to a workflow's job list, replacing an existing
    /// invocation with the same key where it stands.
    pub fn append_job(&mut self, workflow: &str, name: &str, body: Mapping) -> Result<JobAppend> {
        let jobs = self.workflow_jobs_mut(workflow)?;
        let mut entry = Mapping::new();
        entry.insert(Value::from(name), Value::Mapping(body));
        let entry = Value::Mapping(entry);

        let existing = jobs.iter().position(|job| entry_key(job) == Some(name));
        match existing {
            Some(idx) => {
                jobs[idx] = entry;
                Ok(JobAppend::Replaced)
            }
            None => {
                jobs.push(entry);
                Ok(JobAppend::Appended)
            }
        }
    }

    /// Copy `jobs.<template>` to `jobs.<name>`, overriding parameters.
    ///
    /// A parameter declared as a mapping gets its `default` overridden; any
    /// other declaration is replaced by the value. Returns true when `name`
    /// already existed.
    pub fn clone_job_template(
        &mut self,
        template: &str,
        name: &str,
        overrides: &[(&str, Value)],
    ) -> Result<bool> {
        let template_path = format!("jobs.{template}");
        let mut job = mapping_at(&mut self.root, &["jobs", template], &template_path)?.clone();
        if !overrides.is_empty() {
            let params = job
                .get_mut("parameters")
                .and_then(Value::as_mapping_mut)
                .ok_or_else(|| ScopeError::schema(format!("{template_path}.parameters")))?;
            for (key, value) in overrides {
                match params.get_mut(*key).and_then(Value::as_mapping_mut) {
                    Some(declaration) => {
                        declaration.insert(Value::from("default"), value.clone());
                    }
                    None => {
                        params.insert(Value::from(*key), value.clone());
                    }
                }
            }
        }
        let jobs = mapping_at(&mut self.root, &["jobs"], "jobs")?;
        Ok(jobs.insert(Value::from(name), Value::Mapping(job)).is_some())
    }

    fn job_position(&self, workflow: &str, job: &str) -> Result<usize> {
        let jobs = self
            .root
            .get("workflows")
            .and_then(|workflows| workflows.get(workflow))
            .and_then(|wf| wf.get("jobs"))
            .and_then(Value::as_sequence)
            .ok_or_else(|| ScopeError::schema(format!("workflows.{workflow}.jobs")))?;
        jobs.iter()
            .position(|entry| entry_key(entry) == Some(job) || entry_alias(entry) == Some(job))
            .ok_or_else(|| ScopeError::schema(format!("workflows.{workflow}.jobs[{job}]")))
    }

    fn workflow_jobs_mut(&mut self, workflow: &str) -> Result<&mut Vec<Value>> {
        let path = format!("workflows.{workflow}.jobs");
        self.root
            .get_mut("workflows")
            .and_then(|workflows| workflows.get_mut(workflow))
            .and_then(|wf| wf.get_mut("jobs"))
            .and_then(Value::as_sequence_mut)
            .ok_or_else(|| ScopeError::schema(path))
    }
}

/// Walk `keys` from `value`, requiring a mapping at the end.
fn mapping_at<'v>(value: &'v mut Value, keys: &[&str], path: &str) -> Result<&'v mut Mapping> {
    let mut current = value;
    for key in keys {
        current = current
            .get_mut(*key)
            .ok_or_else(|| ScopeError::schema(path))?;
    }
    current
        .as_mapping_mut()
        .ok_or_else(|| ScopeError::schema(path))
}

/// Key of a job invocation: `- build` or `- build: {...}`.
fn entry_key(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(name) => Some(name.as_str()),
        Value::Mapping(map) if map.len() == 1 => map.keys().next().and_then(Value::as_str),
        _ => None,
    }
}

/// Explicit `name:` given to a job invocation.
fn entry_alias(entry: &Value) -> Option<&str> {
    entry
        .as_mapping()?
        .values()
        .next()?
        .get("name")?
        .as_str()
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;
