//! The installed manifest codec (`.installed.cfg`, §3/§6): same sectioned
//! format as configuration, with a whitespace-preserving token encoding so
//! that a frozen option set round-trips byte-for-byte (§8 invariant 7).
//!
//! Grounded on `elba::package::lockfile`'s "round-trip through a
//! serializable shape" pattern, adapted from TOML to the sectioned format
//! `config::parser` already knows how to read and write.

use crate::config::parser::{self, RawDocument, RawSection};
use crate::util::error::Result;
use indexmap::IndexMap;
use std::{fs, path::Path};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledPart {
    /// The part's frozen options, including `recipe`, excluding the two
    /// derived fields below (which get their own struct fields instead).
    pub options: IndexMap<String, String>,
    /// `__buildout_installed__`: paths the recipe created, project-root
    /// relative where possible.
    pub installed: Vec<String>,
    /// `__buildout_signature__`.
    pub signature: String,
}

#[derive(Debug, Clone, Default)]
pub struct InstalledManifest {
    /// Part names in install order (§5 ordering).
    pub order: Vec<String>,
    pub parts: IndexMap<String, InstalledPart>,
    pub installed_develop_eggs: Vec<String>,
}

const SPACE_TOKEN: &str = "%(__buildout_space__)s";
const TAB_TOKEN: &str = "%(__buildout_tab__)s";

fn encode_value(v: &str) -> String {
    let mut out = String::new();
    let mut chars = v.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ' ' => {
                let mut run = 1;
                while chars.peek() == Some(&' ') {
                    chars.next();
                    run += 1;
                }
                if run == 1 {
                    out.push_str(SPACE_TOKEN);
                } else {
                    out.push_str(&format!("%(__buildout_space_{}__)s", run));
                }
            }
            '\t' => out.push_str(TAB_TOKEN),
            '%' => out.push_str("%%"),
            _ => out.push(c),
        }
    }
    out
}

fn decode_value(v: &str) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < v.len() {
        if v[i..].starts_with(SPACE_TOKEN) {
            out.push(' ');
            i += SPACE_TOKEN.len();
            continue;
        }
        if v[i..].starts_with(TAB_TOKEN) {
            out.push('\t');
            i += TAB_TOKEN.len();
            continue;
        }
        if v[i..].starts_with("%(__buildout_space_") {
            if let Some(end) = v[i..].find("__)s") {
                let num_str = &v[i + "%(__buildout_space_".len()..i + end];
                if let Ok(n) = num_str.parse::<usize>() {
                    out.push_str(&" ".repeat(n));
                    i += end + "__)s".len();
                    continue;
                }
            }
        }
        if v[i..].starts_with("%%") {
            out.push('%');
            i += 2;
            continue;
        }
        let ch = v[i..].chars().next().expect("i < v.len()");
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

const INSTALLED_KEY: &str = "__buildout_installed__";
const SIGNATURE_KEY: &str = "__buildout_signature__";

impl InstalledManifest {
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let text = fs::read_to_string(path)?;
        let doc = parser::parse(&text)?;

        let mut manifest = InstalledManifest::default();

        if let Some(buildout) = doc.section("buildout") {
            manifest.order = buildout
                .get("parts")
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default();
            manifest.installed_develop_eggs = buildout
                .get("installed_develop_eggs")
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default();
        }

        for name in &manifest.order {
            if let Some(section) = doc.section(name) {
                let part = decode_section(section);
                manifest.parts.insert(name.clone(), part);
            }
        }

        Ok(Some(manifest))
    }

    /// Persist atomically (temp file + rename) so a crash mid-write never
    /// leaves a half-written manifest (§4.H crash safety); delete the file
    /// entirely once no parts or develop-eggs remain (§4.H step 10).
    pub fn save(&self, path: &Path) -> Result<()> {
        if self.parts.is_empty() && self.installed_develop_eggs.is_empty() {
            if path.exists() {
                fs::remove_file(path)?;
            }
            return Ok(());
        }

        let mut doc = RawDocument::default();
        doc.order.push("buildout".to_string());
        let mut buildout = RawSection::new();
        buildout.insert("parts".to_string(), self.order.join(" "));
        buildout.insert(
            "installed_develop_eggs".to_string(),
            self.installed_develop_eggs.join(" "),
        );
        doc.sections.insert("buildout".to_string(), buildout);

        for name in &self.order {
            if let Some(part) = self.parts.get(name) {
                doc.order.push(name.clone());
                doc.sections.insert(name.clone(), encode_section(part));
            }
        }

        let rendered = parser::render(&doc);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, rendered)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn decode_section(section: &RawSection) -> InstalledPart {
    let mut options = IndexMap::new();
    let mut installed = Vec::new();
    let mut signature = String::new();

    for (key, value) in section {
        let value = decode_value(value);
        match key.as_str() {
            INSTALLED_KEY => {
                installed = value.lines().map(String::from).collect();
            }
            SIGNATURE_KEY => signature = value,
            _ => {
                options.insert(key.clone(), value);
            }
        }
    }

    InstalledPart {
        options,
        installed,
        signature,
    }
}

fn encode_section(part: &InstalledPart) -> RawSection {
    let mut section = RawSection::new();
    for (key, value) in &part.options {
        section.insert(key.clone(), encode_value(value));
    }
    section.insert(
        INSTALLED_KEY.to_string(),
        encode_value(&part.installed.join("\n")),
    );
    section.insert(SIGNATURE_KEY.to_string(), encode_value(&part.signature));
    section
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn round_trip_whitespace_and_percent() {
        let dir = TempDir::new("manifest-test").unwrap();
        let path = dir.path().join(".installed.cfg");

        let mut manifest = InstalledManifest::default();
        manifest.order.push("part-a".to_string());
        let mut options = IndexMap::new();
        options.insert("recipe".to_string(), "demo.recipe".to_string());
        options.insert(
            "odd-value".to_string(),
            "has  two spaces\tand a tab and 100% coverage".to_string(),
        );
        manifest.parts.insert(
            "part-a".to_string(),
            InstalledPart {
                options,
                installed: vec!["parts/part-a/out.txt".to_string()],
                signature: "demo.recipe-1.0.0".to_string(),
            },
        );

        manifest.save(&path).unwrap();
        let loaded = InstalledManifest::load(&path).unwrap().unwrap();
        let part = loaded.parts.get("part-a").unwrap();
        assert_eq!(
            part.options.get("odd-value").unwrap(),
            "has  two spaces\tand a tab and 100% coverage"
        );
        assert_eq!(part.signature, "demo.recipe-1.0.0");
        assert_eq!(part.installed, vec!["parts/part-a/out.txt".to_string()]);
    }

    #[test]
    fn empty_manifest_deletes_file() {
        let dir = TempDir::new("manifest-test").unwrap();
        let path = dir.path().join(".installed.cfg");
        fs::write(&path, "[buildout]\nparts = x\n").unwrap();

        let manifest = InstalledManifest::default();
        manifest.save(&path).unwrap();
        assert!(!path.exists());
    }
}
