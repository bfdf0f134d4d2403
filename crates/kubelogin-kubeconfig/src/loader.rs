//! Kubeconfig loading rules and atomic saving.

use crate::model::{Context, Kubeconfig};
use kubelogin_core::env::{self, EnvSource};
use kubelogin_core::{Error, Result};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Where kubeconfig files are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadingRules {
    /// A single file named with `--kubeconfig`; it must exist.
    Explicit(PathBuf),
    /// Candidate files in precedence order; missing ones are skipped.
    Precedence(Vec<PathBuf>),
}

impl LoadingRules {
    /// Resolve the rules: explicit path, else `$KUBECONFIG`, else
    /// `<home>/.kube/config`.
    pub fn new(explicit: &str, env: &dyn EnvSource, home: Option<&Path>) -> Result<Self> {
        if !explicit.is_empty() {
            return Ok(Self::Explicit(PathBuf::from(explicit)));
        }
        if let Some(list) = env.get(env::KUBECONFIG) {
            let paths: Vec<PathBuf> = std::env::split_paths(&list)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            if !paths.is_empty() {
                return Ok(Self::Precedence(paths));
            }
        }
        let home = home.ok_or_else(|| {
            Error::config("cannot locate a kubeconfig: no --kubeconfig, KUBECONFIG or home directory")
        })?;
        Ok(Self::Precedence(vec![home.join(".kube").join("config")]))
    }

    /// Read every file the rules select.
    pub fn load(&self) -> Result<KubeconfigSet> {
        let mut files = Vec::new();
        match self {
            Self::Explicit(path) => files.push(KubeconfigFile::read(path)?),
            Self::Precedence(paths) => {
                let mut seen = HashSet::new();
                for path in paths {
                    if !seen.insert(path.clone()) {
                        continue;
                    }
                    match KubeconfigFile::read(path) {
                        Ok(file) => files.push(file),
                        Err(e) if e.is_not_found() => {
                            debug!(path = %path.display(), "Skipping missing kubeconfig");
                        }
                        Err(e) => return Err(e),
                    }
                }
                if files.is_empty() {
                    let first = paths.first().cloned().unwrap_or_default();
                    return Err(Error::io_at(
                        first,
                        std::io::Error::new(std::io::ErrorKind::NotFound, "no kubeconfig file found"),
                    ));
                }
            }
        }
        Ok(KubeconfigSet { files })
    }
}

/// One kubeconfig document and the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct KubeconfigFile {
    pub path: PathBuf,
    pub config: Kubeconfig,
}

impl KubeconfigFile {
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
        let config = Kubeconfig::from_yaml(&content).map_err(|e| {
            Error::Serialization(format!("failed to parse {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), users = config.auth_infos.len(), "Loaded kubeconfig");
        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }
}

/// The merged view over all loaded files.
///
/// Lookups follow kubectl merge semantics: the first file defining a name wins.
#[derive(Debug, Clone, PartialEq)]
pub struct KubeconfigSet {
    pub files: Vec<KubeconfigFile>,
}

impl KubeconfigSet {
    pub fn context(&self, name: &str) -> Option<&Context> {
        self.files.iter().find_map(|f| f.config.context(name))
    }
}

/// Write `files` atomically.
///
/// All temp files are staged before any rename so a serialization or write
/// failure leaves every original untouched.
pub fn save(files: &[KubeconfigFile]) -> Result<()> {
    let mut staged = Vec::with_capacity(files.len());
    for file in files {
        staged.push((stage(&file.path, &file.config.to_yaml()?)?, &file.path));
    }
    for (tmp, path) in staged {
        tmp.persist(path).map_err(|e| Error::io_at(path, e.error))?;
        debug!(path = %path.display(), "Saved kubeconfig");
    }
    Ok(())
}

fn stage(path: &Path, content: &str) -> Result<NamedTempFile> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io_at(dir, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| Error::io_at(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io_at(tmp.path(), e))?;
    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubelogin_core::env::env_from;
    use pretty_assertions::assert_eq;

    const CONTEXT_A: &str = "contexts:\n- name: a\n  context:\n    cluster: c\n    user: user-a\n";
    const CONTEXT_A_OTHER: &str =
        "contexts:\n- name: a\n  context:\n    cluster: c\n    user: shadowed\n";

    #[test]
    fn test_explicit_path_wins() {
        let env = env_from([("KUBECONFIG", "/from/env")]);
        let rules = LoadingRules::new("/explicit", &env, Some(Path::new("/home/u"))).unwrap();
        assert_eq!(rules, LoadingRules::Explicit(PathBuf::from("/explicit")));
    }

    #[test]
    fn test_kubeconfig_env_list() {
        let list = std::env::join_paths(["/one", "/two"]).unwrap();
        let env = env_from([("KUBECONFIG", list.to_string_lossy().into_owned())]);
        let rules = LoadingRules::new("", &env, None).unwrap();
        assert_eq!(
            rules,
            LoadingRules::Precedence(vec![PathBuf::from("/one"), PathBuf::from("/two")])
        );
    }

    #[test]
    fn test_home_default() {
        let env = env_from::<_, String, String>([]);
        let rules = LoadingRules::new("", &env, Some(Path::new("/home/u"))).unwrap();
        assert_eq!(
            rules,
            LoadingRules::Precedence(vec![PathBuf::from("/home/u/.kube/config")])
        );
        assert!(LoadingRules::new("", &env, None).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let rules = LoadingRules::Explicit(dir.path().join("absent"));
        assert!(rules.load().unwrap_err().is_not_found());
    }

    #[test]
    fn test_precedence_skips_missing_and_first_context_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        std::fs::write(&first, CONTEXT_A).unwrap();
        std::fs::write(&second, CONTEXT_A_OTHER).unwrap();

        let rules = LoadingRules::Precedence(vec![
            dir.path().join("missing"),
            first.clone(),
            second,
        ]);
        let set = rules.load().unwrap();
        assert_eq!(set.files.len(), 2);
        assert_eq!(set.files[0].path, first);
        assert_eq!(set.context("a").unwrap().user, "user-a");
        assert!(set.context("b").is_none());
    }

    #[test]
    fn test_no_existing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let rules = LoadingRules::Precedence(vec![dir.path().join("missing")]);
        assert!(rules.load().unwrap_err().is_not_found());
    }

    #[test]
    fn test_save_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, CONTEXT_A).unwrap();

        let mut file = KubeconfigFile::read(&path).unwrap();
        file.config.contexts[0].name = "renamed".to_string();
        save(&[file]).unwrap();

        let reread = KubeconfigFile::read(&path).unwrap();
        assert_eq!(reread.config.contexts[0].name, "renamed");
    }

    #[test]
    fn test_invalid_yaml_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "users: [unterminated").unwrap();
        assert!(matches!(
            KubeconfigFile::read(&path).unwrap_err(),
            Error::Serialization(_)
        ));
    }

    #[test]
    fn test_null_collections_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty");
        let users = dir.path().join("users");
        std::fs::write(&empty, "apiVersion: v1\nkind: Config\ncontexts: null\nusers: null\n").unwrap();
        std::fs::write(
            &users,
            "contexts: null\nusers:\n- name: u\n  user:\n    exec:\n      command: kubelogin\n      args: null\n    auth-provider:\n      name: azure\n      config: null\n",
        )
        .unwrap();

        let set = LoadingRules::Precedence(vec![empty, users]).load().unwrap();
        assert_eq!(set.files.len(), 2);
        assert!(set.files[0].config.auth_infos.is_empty());
        assert!(set.files[0].config.contexts.is_empty());

        let user = set.files[1].config.auth_infos[0].auth_info.as_ref().unwrap();
        assert!(user.exec.as_ref().unwrap().args.is_empty());
        assert!(user.auth_provider.as_ref().unwrap().config.is_empty());
    }
}
