use std::path::Path;

use spritevault_core::SpriteVaultConfig;

pub(crate) fn load_file_config(path: &Path) -> SpriteVaultConfig {
    match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "ignoring unparsable config file");
                SpriteVaultConfig::default()
            }
        },
        Err(_) => SpriteVaultConfig::default(),
    }
}

pub(crate) fn save_file_config(
    path: &Path,
    config: &SpriteVaultConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
