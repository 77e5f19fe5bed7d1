use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Insert display text when `|` is typed at the end of a wikilink
    pub enable_auto_display_text: bool,
    /// Lowercase the first character of inserted display text
    pub lowercase_first_char: bool,
    /// Normalize the current document when it is saved
    pub normalize_on_save: bool,
    /// Never add display text to links whose note does not exist
    pub only_match_existing_notes: bool,
}

impl Settings {
    pub fn new(root_dir: &Path) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/wikinorm/settings");
        let settings = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.wikinorm",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .add_source(Environment::with_prefix("WIKINORM").try_parsing(true))
            .set_default("enable_auto_display_text", true)?
            .set_default("lowercase_first_char", true)?
            .set_default("normalize_on_save", false)?
            .set_default("only_match_existing_notes", true)?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;

        anyhow::Ok(settings)
    }

    /// Where `save` persists the vault's settings.
    pub fn vault_file(root_dir: &Path) -> PathBuf {
        root_dir.join(".wikinorm.json")
    }

    pub fn save(&self, root_dir: &Path) -> anyhow::Result<()> {
        let path = Settings::vault_file(root_dir);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))
    }

    /// Sets one option by its key.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let value: bool = value
            .parse()
            .map_err(|_| anyhow!("{key} expects true or false, got {value:?}"))?;

        match key {
            "enable_auto_display_text" => self.enable_auto_display_text = value,
            "lowercase_first_char" => self.lowercase_first_char = value,
            "normalize_on_save" => self.normalize_on_save = value,
            "only_match_existing_notes" => self.only_match_existing_notes = value,
            _ => bail!("unknown setting {key:?}"),
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enable_auto_display_text: true,
            lowercase_first_char: true,
            normalize_on_save: false,
            only_match_existing_notes: true,
        }
    }
}
