//! The configuration engine (§4.F/§4.G): layered sectioned files, `extends`
//! merging, and lazy cross-section interpolation.

pub mod interp;
pub mod parser;

use crate::util::error::{Error, Result};
use crate::util::path::realpath;
use indexmap::IndexMap;
use parser::{merge_documents, RawDocument, RawSection};
use std::{
    cell::RefCell,
    collections::HashSet,
    path::{Path, PathBuf},
};

/// A section's option bag, in the three layers §4.G specifies: `raw` (as
/// parsed, may still contain `${...}`), `cooked` (memoized once resolved),
/// and `data` (explicit writes from the CLI or a recipe, which shadow
/// everything else).
#[derive(Debug)]
pub struct Section {
    pub raw: RawSection,
    cooked: RefCell<IndexMap<String, String>>,
    data: RefCell<IndexMap<String, String>>,
    used: RefCell<HashSet<String>>,
}

impl Section {
    pub fn new(raw: RawSection) -> Self {
        Section {
            raw,
            cooked: RefCell::new(IndexMap::new()),
            data: RefCell::new(IndexMap::new()),
            used: RefCell::new(HashSet::new()),
        }
    }

    /// Explicit write (CLI override, or a recipe setting a default during
    /// its own `install`). Always lands in `data`, the top layer.
    pub fn set(&self, option: &str, value: String) {
        self.data.borrow_mut().insert(option.to_string(), value);
    }

    pub fn remove(&self, option: &str) {
        self.data.borrow_mut().shift_remove(option);
        self.cooked.borrow_mut().shift_remove(option);
        self.used.borrow_mut().remove(option);
    }

    /// All keys this section knows about: raw keys first (declaration
    /// order), then any keys only present because of a `data`-layer write.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.raw.keys().cloned().collect();
        for k in self.data.borrow().keys() {
            if !self.raw.contains_key(k) {
                keys.push(k.clone());
            }
        }
        keys
    }

    /// Options declared in `raw` that were never read through the public
    /// accessor (§4.G unused-option warning).
    pub fn unused(&self) -> Vec<String> {
        let used = self.used.borrow();
        self.raw
            .keys()
            .filter(|k| !used.contains(*k))
            .cloned()
            .collect()
    }
}

/// The loaded, `extends`-merged configuration: one [`Section`] per section
/// name, always containing `buildout` (§3 `ConfigTree` invariant).
#[derive(Debug, Default)]
pub struct ConfigTree {
    pub order: Vec<String>,
    pub sections: IndexMap<String, Section>,
}

impl ConfigTree {
    fn from_raw(doc: RawDocument) -> Self {
        let mut sections = IndexMap::new();
        for (name, raw) in doc.sections {
            sections.insert(name, Section::new(raw));
        }
        ConfigTree {
            order: doc.order,
            sections,
        }
    }

    /// Resolve `${section:option}`, applying the three-layer read order and
    /// marking the option used.
    pub fn get(&self, section: &str, option: &str) -> Result<String> {
        let mut seen = HashSet::new();
        interp::resolve(self, section, option, &mut seen)
    }

    /// Direct read of `buildout:<option>`, the tool's own knob section.
    pub fn buildout(&self, option: &str) -> Result<String> {
        self.get("buildout", option)
    }

    /// `buildout:parts`, split on whitespace, preserving declared order
    /// (§5 ordering, §8 invariant 10).
    pub fn parts(&self) -> Result<Vec<String>> {
        Ok(self
            .buildout("parts")
            .unwrap_or_default()
            .split_whitespace()
            .map(|s| s.to_string())
            .collect())
    }

    pub fn set(&mut self, section: &str, option: &str, value: String) {
        if !self.sections.contains_key(section) {
            self.order.push(section.to_string());
            self.sections
                .insert(section.to_string(), Section::new(RawSection::new()));
        }
        self.sections[section].set(option, value);
    }

    fn ensure_defaults(&mut self, root: &Path) {
        let defaults: &[(&str, &str)] = &[
            ("eggs-directory", "eggs"),
            ("develop-eggs-directory", "develop-eggs"),
            ("bin-directory", "bin"),
            ("parts-directory", "parts"),
            ("installed", ".installed.cfg"),
        ];

        if !self.sections.contains_key("buildout") {
            self.order.push("buildout".to_string());
            self.sections
                .insert("buildout".to_string(), Section::new(RawSection::new()));
        }

        let section = &self.sections["buildout"];
        for (key, value) in defaults {
            if !section.raw.contains_key(*key) && section.data.borrow().get(*key).is_none() {
                section.set(key, (*value).to_string());
            }
        }
        if section.data.borrow().get("directory").is_none() && !section.raw.contains_key("directory")
        {
            section.set("directory", root.to_string_lossy().into_owned());
        }
    }
}

/// Recursively load a single file and its `extends`/`extended-by` chain.
/// `stack` holds the files currently being loaded (not a global visited
/// set) so that diamond includes are fine but a true cycle is rejected with
/// `RecursiveInclude`.
fn load_document(path: &Path, stack: &mut Vec<PathBuf>) -> Result<RawDocument> {
    let canon = realpath(path)
        .map_err(|_| Error::RecursiveInclude(format!("{} (not found)", path.display())))?;

    if stack.contains(&canon) {
        return Err(Error::RecursiveInclude(path.display().to_string()).into());
    }
    stack.push(canon.clone());

    let text = std::fs::read_to_string(path)?;
    let doc = parser::parse(&text)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut merged = RawDocument::default();

    if let Some(buildout) = doc.section("buildout") {
        if let Some(extends) = buildout.get("extends") {
            for rel in extends.split_whitespace() {
                let parent = load_document(&dir.join(rel), stack)?;
                merged = merge_documents(merged, &parent);
            }
        }
    }

    merged = merge_documents(merged, &doc);

    if let Some(buildout) = doc.section("buildout") {
        if let Some(extended_by) = buildout.get("extended-by") {
            for rel in extended_by.split_whitespace() {
                let child = load_document(&dir.join(rel), stack)?;
                merged = merge_documents(merged, &child);
            }
        }
    }

    stack.pop();
    Ok(merged)
}

/// Load the full configuration: an optional user-defaults file first, then
/// the project file, then CLI `section:option=value` overrides (§4.F).
pub fn load(
    project_root: &Path,
    project_file: &Path,
    user_defaults: Option<&Path>,
    cli_overrides: &[(String, String, String)],
) -> Result<ConfigTree> {
    let mut doc = RawDocument::default();

    if let Some(defaults) = user_defaults {
        if defaults.exists() {
            let mut stack = Vec::new();
            let defaults_doc = load_document(defaults, &mut stack)?;
            doc = merge_documents(doc, &defaults_doc);
        }
    }

    let mut stack = Vec::new();
    let project_doc = load_document(project_file, &mut stack)?;
    doc = merge_documents(doc, &project_doc);

    let mut tree = ConfigTree::from_raw(doc);

    for (section, option, value) in cli_overrides {
        tree.set(section, option, value.clone());
    }

    tree.ensure_defaults(project_root);

    Ok(tree)
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn substitution() {
        let dir = TempDir::new("config-test").unwrap();
        let file = write(
            dir.path(),
            "buildout.cfg",
            "[buildout]\nparts =\n[a]\nx = 1\n[b]\ny = ${a:x}${a:x}\n",
        );
        let tree = load(dir.path(), &file, None, &[]).unwrap();
        assert_eq!(tree.get("b", "y").unwrap(), "11");
    }

    #[test]
    fn cycle_detection() {
        let dir = TempDir::new("config-test").unwrap();
        let file = write(
            dir.path(),
            "buildout.cfg",
            "[buildout]\nparts =\n[b]\nx = ${b:y}\ny = ${b:x}\n",
        );
        let tree = load(dir.path(), &file, None, &[]).unwrap();
        let err = tree.get("b", "x").unwrap_err();
        assert!(err.downcast_ref::<Error>().is_some());
    }

    #[test]
    fn extends_merge() {
        let dir = TempDir::new("config-test").unwrap();
        write(dir.path(), "base.cfg", "[buildout]\nparts =\n[a]\nx = base\n");
        let file = write(
            dir.path(),
            "buildout.cfg",
            "[buildout]\nextends = base.cfg\nparts =\n[a]\nx = override\n",
        );
        let tree = load(dir.path(), &file, None, &[]).unwrap();
        assert_eq!(tree.get("a", "x").unwrap(), "override");
    }

    #[test]
    fn recursive_include_rejected() {
        let dir = TempDir::new("config-test").unwrap();
        write(dir.path(), "a.cfg", "[buildout]\nextends = b.cfg\nparts =\n");
        let file = write(dir.path(), "b.cfg", "[buildout]\nextends = a.cfg\nparts =\n");
        assert!(load(dir.path(), &file, None, &[]).is_err());
    }

    #[test]
    fn cli_override_wins() {
        let dir = TempDir::new("config-test").unwrap();
        let file = write(dir.path(), "buildout.cfg", "[a]\nx = 1\n[buildout]\nparts =\n");
        let overrides = vec![("a".to_string(), "x".to_string(), "2".to_string())];
        let tree = load(dir.path(), &file, None, &overrides).unwrap();
        assert_eq!(tree.get("a", "x").unwrap(), "2");
    }
}
