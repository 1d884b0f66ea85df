//! Environment preparation lines placed before the job commands.

use crate::error::{ManagerError, Result};
use camino::Utf8Path;
use qbatch_core::QResources;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

/// What a job needs loaded before it runs.
///
/// Rendered in a fixed order: modules, sourced files, conda environment,
/// then exported variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSetup {
    pub modules: Vec<String>,
    pub source_files: Vec<String>,
    pub conda_environment: Option<String>,
    /// Exported in key order.
    pub environ: BTreeMap<String, String>,
}

impl EnvironmentSetup {
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
            && self.source_files.is_empty()
            && self.conda_environment.is_none()
            && self.environ.is_empty()
    }

    pub fn render(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        lines.extend(self.modules.iter().map(|m| format!("module load {m}")));
        lines.extend(self.source_files.iter().map(|f| format!("source {f}")));
        if let Some(env) = &self.conda_environment {
            lines.push(format!("conda activate {env}"));
        }
        lines.extend(self.environ.iter().map(|(k, v)| format!("export {k}={v}")));
        lines.join("\n")
    }

    pub fn from_file(path: &Utf8Path) -> Result<Self> {
        load_json(path)
    }
}

/// Read a JSON file into `T`.
pub fn load_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| ManagerError::io(path, e))?;
    serde_json::from_str(&content).map_err(|source| ManagerError::Json {
        path: path.to_owned(),
        source,
    })
}

/// Read a resource request from JSON and infer its process placement.
pub fn load_resources(path: &Utf8Path) -> Result<QResources> {
    let resources: QResources = load_json(path)?;
    Ok(resources.validated()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbatch_core::ProcessPlacement;
    use tempfile::TempDir;

    #[test]
    fn test_render() {
        let env = EnvironmentSetup {
            modules: vec!["gcc/12".into(), "openmpi".into()],
            source_files: vec!["~/.venv/bin/activate".into()],
            conda_environment: Some("chem".into()),
            environ: BTreeMap::from([
                ("OMP_NUM_THREADS".to_string(), "4".to_string()),
                ("A".to_string(), "1".to_string()),
            ]),
        };
        assert_eq!(
            env.render(),
            "module load gcc/12\n\
             module load openmpi\n\
             source ~/.venv/bin/activate\n\
             conda activate chem\n\
             export A=1\n\
             export OMP_NUM_THREADS=4"
        );
        assert!(!env.is_empty());
        assert_eq!(EnvironmentSetup::default().render(), "");
    }

    #[test]
    fn test_from_file() {
        let temp = TempDir::new().unwrap();
        let path = Utf8Path::from_path(temp.path()).unwrap().join("env.json");
        fs::write(&path, r#"{"modules": ["vasp"], "environ": {"X": "y"}}"#).unwrap();

        let env = EnvironmentSetup::from_file(&path).unwrap();
        assert_eq!(env.modules, vec!["vasp"]);
        assert_eq!(env.conda_environment, None);
        assert_eq!(env.render(), "module load vasp\nexport X=y");

        fs::write(&path, "{not json").unwrap();
        let err = EnvironmentSetup::from_file(&path).unwrap_err();
        assert!(matches!(err, ManagerError::Json { .. }));

        let err = EnvironmentSetup::from_file(&path.with_file_name("nope.json")).unwrap_err();
        assert!(matches!(err, ManagerError::Io { .. }));
    }

    #[test]
    fn test_load_resources() {
        let temp = TempDir::new().unwrap();
        let path = Utf8Path::from_path(temp.path()).unwrap().join("resources.json");

        fs::write(&path, r#"{"nodes": 2, "processes_per_node": 8, "priority": 5}"#).unwrap();
        let res = load_resources(&path).unwrap();
        assert_eq!(res.process_placement, Some(ProcessPlacement::EvenlyDistributed));
        assert_eq!(res.priority.as_deref(), Some("5"));

        fs::write(&path, r#"{"nodes": 2, "processes": 8}"#).unwrap();
        let err = load_resources(&path).unwrap_err();
        assert!(matches!(err, ManagerError::Scheduler(_)));
    }
}
