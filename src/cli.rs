use std::{env, path::PathBuf};

use anyhow::{Result, anyhow};

const DEFAULT_CONFIG_FILE: &str = "catalyst.jsonc";

pub fn config_path_from_args() -> Result<PathBuf> {
    config_path_from(env::args().skip(1))
}

/// Accepts either `<path>` or `--config <path>`; no arguments means
/// `./catalyst.jsonc`.
pub fn config_path_from(args: impl IntoIterator<Item = String>) -> Result<PathBuf> {
    let mut args = args.into_iter();
    let path = match args.next() {
        None => {
            let mut path = env::current_dir()?;
            path.push(DEFAULT_CONFIG_FILE);
            return Ok(path);
        }
        Some(flag) if flag == "--config" => args
            .next()
            .ok_or_else(|| anyhow!("--config requires a path. Usage: catalyst [--config <path>]"))?,
        Some(path) => path,
    };

    if args.next().is_some() {
        return Err(anyhow!(
            "unexpected extra arguments. Usage: catalyst [--config <path>]"
        ));
    }
    Ok(PathBuf::from(path))
}
