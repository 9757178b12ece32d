//! Grammar for the sectioned key/value file format (§6): `[section]` headers,
//! `key = value` assignments with indented continuation lines, and the
//! `key+`/`key-` merge-operator suffixes. Shared by the project
//! configuration loader and the installed-manifest codec.

use crate::util::error::{Error, Result};
use indexmap::IndexMap;
use nom::{bytes::complete::take_till1, character::complete::char, sequence::delimited, IResult};

pub type RawSection = IndexMap<String, String>;

/// A parsed (but not yet `extends`-merged) file: section bodies in the
/// order they first appeared.
#[derive(Debug, Clone, Default)]
pub struct RawDocument {
    pub order: Vec<String>,
    pub sections: IndexMap<String, RawSection>,
}

impl RawDocument {
    pub fn section(&self, name: &str) -> Option<&RawSection> {
        self.sections.get(name)
    }
}

fn header(input: &str) -> IResult<&str, &str> {
    delimited(char('['), take_till1(|c| c == ']'), char(']'))(input)
}

/// Parse a document. Keys are case-sensitive; blank lines and lines whose
/// first non-whitespace character is `#` or `;` are ignored; a line that
/// begins with whitespace continues the previous `key = value` assignment.
pub fn parse(text: &str) -> Result<RawDocument> {
    let mut doc = RawDocument::default();
    let mut current_section: Option<String> = None;
    let mut pending: Option<(String, String)> = None;

    fn flush(
        doc: &mut RawDocument,
        current_section: &Option<String>,
        pending: &mut Option<(String, String)>,
    ) -> Result<()> {
        if let Some((key, val)) = pending.take() {
            let section_name = current_section.clone().ok_or_else(|| {
                Error::BadConfigValue(
                    String::new(),
                    key.clone(),
                    "option outside of any section".to_string(),
                )
            })?;
            doc.sections
                .entry(section_name)
                .or_insert_with(IndexMap::new)
                .insert(key, val);
        }
        Ok(())
    }

    for raw_line in text.lines() {
        let trimmed_start = raw_line.trim_start();

        if trimmed_start.is_empty() || trimmed_start.starts_with('#') || trimmed_start.starts_with(';')
        {
            continue;
        }

        let is_continuation = raw_line.starts_with(' ') || raw_line.starts_with('\t');

        if !is_continuation {
            if let Ok((_, name)) = header(raw_line.trim_end()) {
                flush(&mut doc, &current_section, &mut pending)?;
                let name = name.to_string();
                if !doc.sections.contains_key(&name) {
                    doc.order.push(name.clone());
                    doc.sections.insert(name.clone(), IndexMap::new());
                }
                current_section = Some(name);
                continue;
            }

            if let Some(idx) = raw_line.find('=') {
                flush(&mut doc, &current_section, &mut pending)?;
                let key = raw_line[..idx].trim().to_string();
                let val = raw_line[idx + 1..].trim_start().to_string();
                pending = Some((key, val));
                continue;
            }

            return Err(Error::BadConfigValue(
                current_section.clone().unwrap_or_default(),
                String::new(),
                format!("couldn't parse line: {}", raw_line),
            )
            .into());
        }

        match pending.as_mut() {
            Some((_, val)) => {
                val.push('\n');
                val.push_str(trimmed_start);
            }
            None => {
                return Err(Error::BadConfigValue(
                    current_section.clone().unwrap_or_default(),
                    String::new(),
                    format!("unexpected continuation line: {}", raw_line),
                )
                .into());
            }
        }
    }

    flush(&mut doc, &current_section, &mut pending)?;

    Ok(doc)
}

/// Serialize a document back to the sectioned format, indenting embedded
/// newlines as continuation lines. Used to persist the installed manifest.
pub fn render(doc: &RawDocument) -> String {
    let mut out = String::new();
    for name in &doc.order {
        let section = match doc.sections.get(name) {
            Some(s) => s,
            None => continue,
        };
        out.push_str(&format!("[{}]\n", name));
        for (key, value) in section {
            let mut lines = value.split('\n');
            if let Some(first) = lines.next() {
                out.push_str(&format!("{} = {}\n", key, first));
            } else {
                out.push_str(&format!("{} = \n", key));
            }
            for line in lines {
                out.push_str(&format!("\t{}\n", line));
            }
        }
        out.push('\n');
    }
    out
}

/// Merge `overlay` onto `base`: plain keys override, `key+` appends
/// newline-joined lines, `key-` removes matching lines (§4.F, invariant 8).
pub fn merge_documents(base: RawDocument, overlay: &RawDocument) -> RawDocument {
    let mut result = base;

    for name in &overlay.order {
        if !result.sections.contains_key(name) {
            result.order.push(name.clone());
            result.sections.insert(name.clone(), IndexMap::new());
        }
    }

    for (name, overlay_section) in &overlay.sections {
        let base_section = result
            .sections
            .entry(name.clone())
            .or_insert_with(IndexMap::new);

        for (key, value) in overlay_section {
            if key.len() > 1 && key.ends_with('+') {
                let stripped = &key[..key.len() - 1];
                let existing = base_section.get(stripped).cloned().unwrap_or_default();
                let merged = if existing.is_empty() {
                    value.clone()
                } else {
                    format!("{}\n{}", existing, value)
                };
                base_section.insert(stripped.to_string(), merged);
                continue;
            }

            if key.len() > 1 && key.ends_with('-') {
                let stripped = &key[..key.len() - 1];
                let existing = base_section.get(stripped).cloned().unwrap_or_default();
                let remove: std::collections::HashSet<&str> = value.lines().collect();
                let kept: Vec<&str> = existing
                    .lines()
                    .filter(|line| !remove.contains(line))
                    .collect();
                base_section.insert(stripped.to_string(), kept.join("\n"));
                continue;
            }

            base_section.insert(key.clone(), value.clone());
        }
    }

    result
}
