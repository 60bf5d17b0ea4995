use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Regular files under `location` matching `globstr`. Dotfiles only match a literal leading dot
/// and symlinks are skipped.
pub(crate) fn globvec(location: &Path, globstr: &str) -> Result<Vec<PathBuf>> {
    let mut globoptions = glob::MatchOptions::new();
    globoptions.require_literal_leading_dot = true;

    Ok(glob::glob_with(
        location
            .join(globstr)
            .to_str()
            .with_context(|| format!("non-unicode path {} while globbing {:?}", globstr, location))?,
        globoptions,
    )?
    .collect::<Result<Vec<_>, _>>()?
    .into_iter()
    .filter(|path| !path.is_symlink())
    .filter(|path| !path.is_dir())
    .collect::<Vec<_>>())
}
