//! Utility functions.

pub mod archive;
pub mod error;
pub mod lock;
pub mod path;
pub mod shell;

use std::{
    fs,
    path::{Component, Path, PathBuf},
    process::Output,
    str::FromStr,
};

use failure::bail;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use walkdir::{DirEntry, WalkDir};

use crate::util::error::Result;

/// A relative path with no `..` components, used for values that must stay
/// rooted under the project directory (e.g. a `develop` entry).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubPath(pub PathBuf);

impl SubPath {
    pub fn is_subpath(p: &Path) -> bool {
        p.is_relative() && p.components().all(|x| x != Component::ParentDir)
    }

    pub fn from_path(p: &Path) -> Result<Self> {
        if SubPath::is_subpath(p) {
            Ok(SubPath(p.to_path_buf()))
        } else {
            bail!("p {} isn't a strict subdirectory", p.display())
        }
    }
}

impl FromStr for SubPath {
    type Err = failure::Error;

    fn from_str(s: &str) -> Result<Self> {
        let path = PathBuf::from(s);
        SubPath::from_path(&path)
    }
}

impl Serialize for SubPath {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.to_string_lossy().as_ref())
    }
}

impl<'de> Deserialize<'de> for SubPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

pub fn copy_dir_iter(walker: impl Iterator<Item = DirEntry>, from: &Path, to: &Path) -> Result<()> {
    for entry in walker {
        let to_p = to.join(entry.path().strip_prefix(from).unwrap());
        fs::create_dir_all(to_p.parent().unwrap())?;
        let _ = fs::copy(entry.path(), &to_p)?;
    }

    Ok(())
}

pub fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    let walker = WalkDir::new(from)
        .follow_links(true)
        .into_iter()
        .filter_entry(|x| x.path() != to)
        .filter_map(|x| x.ok().filter(|x| valid_file(x)));

    copy_dir_iter(walker, from, to)
}

pub fn clear_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        remove_dir_all::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

pub fn valid_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
}

/// Render a completed sub-process's captured output for inclusion in a
/// `RecipeError`/`InternalError` message.
pub fn fmt_output(c: &Output) -> String {
    let mut res = String::new();
    if !c.stdout.is_empty() {
        res.push_str(&format!("--- stdout\n{}\n", String::from_utf8_lossy(&c.stdout)));
    }
    if !c.stderr.is_empty() {
        res.push_str(&format!("--- stderr\n{}\n", String::from_utf8_lossy(&c.stderr)));
    }
    if res.ends_with('\n') {
        res.pop();
    }
    res
}
