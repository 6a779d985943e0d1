use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::template::{ParameterSet, Template};

pub const BASE_TEMPLATE_NAME: &str = "base_apply";
const EXTENSION: &str = "yaml";

/// Directory of named parameter sets plus the base template.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create config directory {}", root.display()))?;
        Ok(Self { root })
    }

    /// Stored configuration names, sorted. The base template is never listed.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("failed to read config directory {}", self.root.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to read entry in {}", self.root.display()))?
                .path();
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION)
            {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|stem| stem.to_str())
                && name != BASE_TEMPLATE_NAME
            {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Writes `params` under `name`, replacing any existing configuration.
    pub fn save(&self, name: &str, params: &ParameterSet) -> Result<()> {
        let path = self.config_path(name)?;
        let body = params.to_yaml()?;
        fs::write(&path, body)
            .with_context(|| format!("failed to write configuration {}", path.display()))?;
        debug!("saved configuration {name} to {}", path.display());
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<ParameterSet> {
        let path = self.config_path(name)?;
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        let params = serde_yaml::from_str::<Option<ParameterSet>>(&raw)
            .with_context(|| format!("failed to parse configuration {}", path.display()))?;
        Ok(params.unwrap_or_default())
    }

    /// Loads `name` and reconciles it with the template defaults.
    pub fn load_reconciled(&self, name: &str, defaults: &ParameterSet) -> Result<ParameterSet> {
        let saved = self.load(name)?;
        let (params, dropped) = ParameterSet::reconcile(defaults, saved);
        if !dropped.is_empty() {
            info!(
                "configuration {name}: ignoring parameters not in template: {}",
                dropped.join(", ")
            );
        }
        Ok(params)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.config_path(name)?;
        fs::remove_file(&path)
            .with_context(|| format!("failed to delete configuration {}", path.display()))
    }

    pub fn base_template(&self) -> Result<Template> {
        let path = self.base_template_path();
        let raw = fs::read_to_string(&path).with_context(|| {
            format!(
                "failed to read base template {} (install one with --base-template)",
                path.display()
            )
        })?;
        Template::parse(&raw)
            .with_context(|| format!("failed to parse base template {}", path.display()))
    }

    /// Copies `source` into the store as the base template once it parses.
    pub fn install_base_template(&self, source: &Path) -> Result<()> {
        let raw = fs::read_to_string(source)
            .with_context(|| format!("failed to read template {}", source.display()))?;
        let template = Template::parse(&raw)
            .with_context(|| format!("failed to parse template {}", source.display()))?;

        let target = self.base_template_path();
        fs::write(&target, raw)
            .with_context(|| format!("failed to write base template {}", target.display()))?;
        info!(
            "installed base template from {} ({} parameters)",
            source.display(),
            template.extract_parameters().len()
        );
        Ok(())
    }

    fn base_template_path(&self) -> PathBuf {
        self.root.join(format!("{BASE_TEMPLATE_NAME}.{EXTENSION}"))
    }

    fn config_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(format!("{name}.{EXTENSION}")))
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("configuration name cannot be empty");
    }
    if trimmed != name {
        bail!("configuration name cannot start or end with whitespace");
    }
    if name == BASE_TEMPLATE_NAME {
        bail!("{BASE_TEMPLATE_NAME} is reserved for the base template");
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        bail!("configuration name cannot contain path separators");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{BASE_TEMPLATE_NAME, ConfigStore, validate_name};
    use crate::template::ParameterSet;
    use std::fs;

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::open(dir.path().join("configs")).expect("store opens");
        (dir, store)
    }

    #[test]
    fn save_then_load_returns_same_values() {
        let (_dir, store) = store();
        let params = ParameterSet::from_pairs([("IMAGE", "nginx"), ("EPOCHS", "10")]);
        store.save("train", &params).expect("saved");
        assert_eq!(store.load("train").expect("loaded"), params);
    }

    #[test]
    fn save_overwrites_existing_name() {
        let (_dir, store) = store();
        store
            .save("train", &ParameterSet::from_pairs([("IMAGE", "nginx")]))
            .expect("saved");
        store
            .save("train", &ParameterSet::from_pairs([("IMAGE", "busybox")]))
            .expect("saved");
        assert_eq!(
            store.load("train").expect("loaded").get("IMAGE"),
            Some("busybox")
        );
        assert_eq!(store.list().expect("listed"), vec!["train".to_string()]);
    }

    #[test]
    fn list_skips_base_template_and_other_files() {
        let (_dir, store) = store();
        let params = ParameterSet::from_pairs([("IMAGE", "nginx")]);
        store.save("zeta", &params).expect("saved");
        store.save("alpha", &params).expect("saved");
        fs::write(
            store.root.join(format!("{BASE_TEMPLATE_NAME}.yaml")),
            "a: 1\n",
        )
        .expect("write base");
        fs::write(store.root.join("notes.txt"), "x").expect("write notes");
        fs::create_dir(store.root.join("nested.yaml")).expect("mkdir");

        assert_eq!(
            store.list().expect("listed"),
            vec!["alpha".to_string(), "zeta".to_string()]
        );
    }

    #[test]
    fn delete_removes_the_document() {
        let (_dir, store) = store();
        store
            .save("old", &ParameterSet::from_pairs([("IMAGE", "nginx")]))
            .expect("saved");
        store.delete("old").expect("deleted");
        assert!(store.list().expect("listed").is_empty());
        assert!(store.delete("old").is_err());
    }

    #[test]
    fn names_are_validated() {
        assert!(validate_name("train-a100").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("  ").is_err());
        assert!(validate_name(" padded").is_err());
        assert!(validate_name(BASE_TEMPLATE_NAME).is_err());
        assert!(validate_name("../escape").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("..").is_err());
    }

    #[test]
    fn reserved_name_cannot_be_saved() {
        let (_dir, store) = store();
        let params = ParameterSet::from_pairs([("IMAGE", "nginx")]);
        assert!(store.save(BASE_TEMPLATE_NAME, &params).is_err());
    }

    #[test]
    fn empty_document_loads_as_empty_set() {
        let (_dir, store) = store();
        fs::write(store.root.join("blank.yaml"), "").expect("write");
        assert!(store.load("blank").expect("loaded").is_empty());
    }

    #[test]
    fn installed_template_becomes_base() {
        let (dir, store) = store();
        let source = dir.path().join("job.yaml");
        fs::write(&source, "image: ${IMAGE:-nginx}\n").expect("write template");
        store.install_base_template(&source).expect("installed");

        let template = store.base_template().expect("base template");
        assert_eq!(template.extract_parameters().get("IMAGE"), Some("nginx"));
        assert!(store.list().expect("listed").is_empty());
    }

    #[test]
    fn unparsable_template_is_not_installed() {
        let (dir, store) = store();
        let source = dir.path().join("bad.yaml");
        fs::write(&source, "a: [unclosed\n").expect("write template");
        assert!(store.install_base_template(&source).is_err());
        assert!(store.base_template().is_err());
    }

    #[test]
    fn load_reconciled_applies_template_defaults() {
        let (_dir, store) = store();
        store
            .save(
                "legacy",
                &ParameterSet::from_pairs([("IMAGE", "busybox"), ("REMOVED", "1")]),
            )
            .expect("saved");
        let defaults = ParameterSet::from_pairs([("IMAGE", "nginx"), ("EPOCHS", "10")]);
        let params = store
            .load_reconciled("legacy", &defaults)
            .expect("loaded");
        assert_eq!(
            params,
            ParameterSet::from_pairs([("IMAGE", "busybox"), ("EPOCHS", "10")])
        );
    }
}
