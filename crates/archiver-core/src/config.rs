//! User configuration: archive directory and filename preference.

use serde::{Deserialize, Serialize};

fn default_prefer_original() -> bool {
    true
}

/// Active configuration as stored under the `directory` and
/// `preferOriginalFilename` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(default = "default_prefer_original")]
    pub prefer_original_filename: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            directory: None,
            prefer_original_filename: true,
        }
    }
}

impl Configuration {
    /// The configured directory, treating an empty string as unset.
    pub fn directory(&self) -> Option<&str> {
        self.directory.as_deref().filter(|d| !d.is_empty())
    }

    pub fn has_directory(&self) -> bool {
        self.directory().is_some()
    }

    /// Pick the filename sent with a `set` request.
    pub fn choose_filename<'a>(&self, original: &'a str, current: &'a str) -> &'a str {
        if self.prefer_original_filename {
            original
        } else {
            current
        }
    }

    /// Apply a partial update. Returns true if anything changed.
    pub fn apply(&mut self, update: &ConfigUpdate) -> bool {
        let before = self.clone();
        if let Some(directory) = &update.directory {
            self.directory = if directory.is_empty() {
                None
            } else {
                Some(directory.clone())
            };
        }
        if let Some(prefer) = update.prefer_original_filename {
            self.prefer_original_filename = prefer;
        }
        *self != before
    }
}

/// Partial configuration change from the options surface.
///
/// `directory: Some("")` clears the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefer_original_filename: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_prefer_original() {
        let config: Configuration = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Configuration::default());
        assert!(config.prefer_original_filename);
        assert!(!config.has_directory());
    }

    #[test]
    fn camel_case_keys() {
        let config: Configuration =
            serde_json::from_str(r#"{"directory":"/srv/archive","preferOriginalFilename":false}"#)
                .unwrap();
        assert_eq!(config.directory(), Some("/srv/archive"));
        assert!(!config.prefer_original_filename);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["preferOriginalFilename"], false);
    }

    #[test]
    fn empty_directory_counts_as_unset() {
        let config = Configuration {
            directory: Some(String::new()),
            prefer_original_filename: true,
        };
        assert!(!config.has_directory());
    }

    #[test]
    fn choose_filename_follows_preference() {
        let mut config = Configuration::default();
        assert_eq!(config.choose_filename("cat.png", "1699.png"), "cat.png");
        config.prefer_original_filename = false;
        assert_eq!(config.choose_filename("cat.png", "1699.png"), "1699.png");
    }

    #[test]
    fn apply_reports_changes() {
        let mut config = Configuration::default();
        let update = ConfigUpdate {
            directory: Some("/a".into()),
            prefer_original_filename: None,
        };
        assert!(config.apply(&update));
        assert!(!config.apply(&update), "same update twice is a no-op");

        let clear = ConfigUpdate {
            directory: Some(String::new()),
            prefer_original_filename: None,
        };
        assert!(config.apply(&clear));
        assert_eq!(config.directory, None);
    }
}
