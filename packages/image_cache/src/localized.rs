//! Lookup of translated image variants.
//!
//! A translated variant of `<dir>/<name>` lives at
//! `<dir>/l10n/<lang>/<name>`. Translations that are out of date are listed
//! as `fuzzy` in `<dir>/l10n/<lang>/l10n-track`, one `<state>¦<name>` entry
//! per line, and are not used.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};


const TRACK_FILE: &'static str = "l10n-track";
const FIELD_SEP: char = '¦';
const OVERLAY_SUFFIX: &'static str = "--overlay";


fn l10n_dir(path: &Path, lang: &str) -> Option<PathBuf> {
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    if lang.is_empty() {
        None
    } else {
        Some(dir.join("l10n").join(lang))
    }
}

// whether the track file marks this file name as fuzzy
fn is_fuzzy(l10n_dir: &Path, name: &str) -> bool {
    let track = l10n_dir.join(TRACK_FILE);
    let contents = match fs::read_to_string(&track) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return false,
        Err(e) => {
            error!(%e, track=%track.display(), "unable to read l10n track file");
            return false;
        }
    };
    for (i, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split(FIELD_SEP);
        let state = fields.next().unwrap_or("").trim();
        let file = match fields.next() {
            Some(file) => file.trim(),
            None => {
                warn!(track=%track.display(), line=%(i + 1), "malformed l10n track line");
                continue;
            }
        };
        if file == name {
            return state == "fuzzy";
        }
    }
    false
}

/// The translated replacement for `path`, if there is an up to date one.
pub fn find_localized(path: &Path, lang: &str) -> Option<PathBuf> {
    let dir = l10n_dir(path, lang)?;
    let name = path.file_name()?.to_str()?;
    let candidate = dir.join(name);
    if !candidate.is_file() {
        return None;
    }
    if is_fuzzy(&dir, name) {
        debug!(path=%candidate.display(), "ignoring fuzzy translated image");
        return None;
    }
    Some(candidate)
}

/// A translated image to be drawn over `path`, if there is one.
pub fn find_overlay(path: &Path, lang: &str) -> Option<PathBuf> {
    let dir = l10n_dir(path, lang)?;
    let stem = path.file_stem()?.to_str()?;
    let name = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{}{}.{}", stem, OVERLAY_SUFFIX, ext),
        None => format!("{}{}", stem, OVERLAY_SUFFIX),
    };
    let candidate = dir.join(&name);
    if !candidate.is_file() || is_fuzzy(&dir, &name) {
        return None;
    }
    Some(candidate)
}


#[cfg(test)]
pub(crate) fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join(format!("image_cache-test-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_find_localized_skips_fuzzy() {
    let dir = test_dir("l10n");
    let l10n = dir.join("l10n").join("de");
    fs::create_dir_all(&l10n).unwrap();
    for name in ["title.png", "logo.png", "logo--overlay.png"] {
        fs::write(dir.join(name), b"x").unwrap();
    }
    fs::write(l10n.join("title.png"), b"x").unwrap();
    fs::write(l10n.join("logo.png"), b"x").unwrap();
    fs::write(l10n.join("logo--overlay.png"), b"x").unwrap();
    fs::write(
        l10n.join(TRACK_FILE),
        "ok¦title.png\nfuzzy¦logo.png¦extra\ngarbage line\n",
    ).unwrap();

    assert_eq!(find_localized(&dir.join("title.png"), "de"), Some(l10n.join("title.png")));
    assert_eq!(find_localized(&dir.join("logo.png"), "de"), None);
    assert_eq!(find_localized(&dir.join("title.png"), "fr"), None);
    assert_eq!(find_localized(&dir.join("title.png"), ""), None);
    assert_eq!(find_overlay(&dir.join("logo.png"), "de"), Some(l10n.join("logo--overlay.png")));
    assert_eq!(find_overlay(&dir.join("title.png"), "de"), None);
}
