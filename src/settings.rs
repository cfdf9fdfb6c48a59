//! Browser settings: a small YAML file plus bookmark management.
//!
//! Parse failure is never fatal; defaults are installed instead and the
//! user is told through the status bar. Bookmark uids are assigned on load
//! as the bookmark's index and are not persisted.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

pub const DEFAULT_VAULT_PASS_ENV_VAR: &str = "UGGSECP";
pub const DEFAULT_VAULT_FILE: &str = "cookies.json.encrypted";
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// The ENV var that stores the vault encryption password.
    #[serde(rename = "vaultPassEnvVar")]
    pub vault_pass_env_var: String,
    #[serde(rename = "vaultFile")]
    pub vault_file: String,
    #[serde(rename = "bookMarks", default)]
    pub bookmarks: Vec<Bookmark>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    pub ugri: String,
    #[serde(rename = "shortName")]
    pub short_name: String,
    #[serde(skip)]
    pub uid: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_pass_env_var: DEFAULT_VAULT_PASS_ENV_VAR.to_string(),
            vault_file: DEFAULT_VAULT_FILE.to_string(),
            bookmarks: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file. Missing or malformed files install
    /// the defaults. Bookmark uids are (re)assigned by index.
    pub fn load(path: &Path) -> Self {
        info!(target: "settings", path = %path.display(), "loading settings");
        let mut settings = match std::fs::read_to_string(path) {
            Ok(data) => match serde_yaml::from_str::<Settings>(&data) {
                Ok(s) => s,
                Err(e) => {
                    error!(
                        target: "settings",
                        path = %path.display(),
                        "error parsing settings file, loading defaults instead: {}",
                        e
                    );
                    Settings::default()
                }
            },
            Err(e) => {
                error!(
                    target: "settings",
                    path = %path.display(),
                    "error reading settings file, loading defaults instead: {}",
                    e
                );
                Settings::default()
            }
        };
        settings.uidify_bookmarks();
        settings
    }

    /// Rewrite the whole settings file.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        info!(target: "settings", path = %path.display(), "writing settings to disk");
        std::fs::write(path, yaml)
    }

    /// Reassign bookmark uids as their current index.
    pub fn uidify_bookmarks(&mut self) {
        for (i, bm) in self.bookmarks.iter_mut().enumerate() {
            bm.uid = i;
        }
    }

    pub fn add_bookmark(&mut self, short_name: &str, ugri: &str) {
        let short_name = if short_name.is_empty() {
            "added"
        } else {
            short_name
        };
        self.bookmarks.push(Bookmark {
            ugri: ugri.to_string(),
            short_name: short_name.to_string(),
            uid: 0,
        });
        self.uidify_bookmarks();
    }

    /// Delete the bookmark with the given uid. Returns whether one was found.
    pub fn delete_bookmark(&mut self, uid: usize) -> bool {
        let before = self.bookmarks.len();
        self.bookmarks.retain(|bm| bm.uid != uid);
        let found = self.bookmarks.len() != before;
        if found {
            self.uidify_bookmarks();
        }
        found
    }

    /// Apply a settings form submission field-by-field, updating only the
    /// fields that changed. Returns whether anything changed.
    ///
    /// Bookmark fields arrive as `bookmark_<field>_<uid>`.
    pub fn apply_form(&mut self, contents: &HashMap<String, String>) -> bool {
        let mut changed = false;
        for (k, v) in contents {
            debug!(target: "settings", field = %k, "form data");
            match k.as_str() {
                "VaultPassEnvVar" => {
                    if self.vault_pass_env_var != *v {
                        self.vault_pass_env_var = v.clone();
                        changed = true;
                    }
                }
                "VaultFile" => {
                    if self.vault_file != *v {
                        self.vault_file = v.clone();
                        changed = true;
                    }
                }
                _ => {
                    if let Some((field, uid)) = parse_bookmark_field(k) {
                        if let Some(bm) = self.bookmarks.iter_mut().find(|bm| bm.uid == uid) {
                            let slot = match field {
                                "ugri" => &mut bm.ugri,
                                "shortname" => &mut bm.short_name,
                                _ => continue,
                            };
                            if *slot != *v {
                                *slot = v.clone();
                                changed = true;
                            }
                        }
                    }
                }
            }
        }
        changed
    }
}

/// Split a `bookmark_<field>_<uid>` form key.
fn parse_bookmark_field(key: &str) -> Option<(&str, usize)> {
    let rest = key.strip_prefix("bookmark_")?;
    let (field, uid) = rest.split_once('_')?;
    Some((field, uid.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_config(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "uggcli_settings_{}_{}",
            name,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("config.yml")
    }

    #[test]
    fn missing_file_installs_defaults() {
        let s = Settings::load(Path::new("/no/such/config.yml"));
        assert_eq!(s.vault_pass_env_var, DEFAULT_VAULT_PASS_ENV_VAR);
        assert_eq!(s.vault_file, DEFAULT_VAULT_FILE);
        assert!(s.bookmarks.is_empty());
    }

    #[test]
    fn malformed_yaml_installs_defaults() {
        let path = temp_config("malformed");
        std::fs::write(&path, ": [:::").unwrap();
        let s = Settings::load(&path);
        assert_eq!(s.vault_file, DEFAULT_VAULT_FILE);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn save_then_load_round_trips() {
        let path = temp_config("roundtrip");
        let mut s = Settings::default();
        s.add_bookmark("home", "ugtp://example.test:8888/home");
        s.add_bookmark("", "ugtps://other.test:8443/feed");
        s.save(&path).unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded.bookmarks.len(), 2);
        assert_eq!(loaded.bookmarks[0].short_name, "home");
        assert_eq!(loaded.bookmarks[1].short_name, "added");
        // uids come from load order, not the file
        assert_eq!(loaded.bookmarks[0].uid, 0);
        assert_eq!(loaded.bookmarks[1].uid, 1);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn delete_reassigns_uids() {
        let mut s = Settings::default();
        s.add_bookmark("a", "ugtp://a.test:1/a");
        s.add_bookmark("b", "ugtp://b.test:1/b");
        s.add_bookmark("c", "ugtp://c.test:1/c");
        assert!(s.delete_bookmark(1));
        assert_eq!(s.bookmarks.len(), 2);
        assert_eq!(s.bookmarks[1].short_name, "c");
        assert_eq!(s.bookmarks[1].uid, 1);
        assert!(!s.delete_bookmark(99));
    }

    #[test]
    fn apply_form_diffs_field_by_field() {
        let mut s = Settings::default();
        s.add_bookmark("home", "ugtp://a.test:1/a");

        let unchanged = HashMap::from([
            ("VaultFile".to_string(), s.vault_file.clone()),
            ("VaultPassEnvVar".to_string(), s.vault_pass_env_var.clone()),
        ]);
        assert!(!s.apply_form(&unchanged));

        let contents = HashMap::from([
            ("VaultFile".to_string(), "other.encrypted".to_string()),
            ("bookmark_shortname_0".to_string(), "renamed".to_string()),
            ("bookmark_ugri_0".to_string(), "ugtp://a.test:1/a".to_string()),
        ]);
        assert!(s.apply_form(&contents));
        assert_eq!(s.vault_file, "other.encrypted");
        assert_eq!(s.bookmarks[0].short_name, "renamed");
    }
}
