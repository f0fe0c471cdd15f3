//! A line-preserving reader/writer for Firefox's `profiles.ini` and
//! `installs.ini`.
//!
//! Lines the engine does not touch are written back byte-for-byte, so
//! comments, unknown keys and section order survive an edit.

const BOM: char = '\u{feff}';

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// Blank, comment or unparseable line.
    Raw(String),
    Section {
        name: String,
        raw: String,
    },
    Entry {
        key: String,
        value: String,
        /// `None` once the value has been changed.
        raw: Option<String>,
    },
}

/// One `[section]` and its `key=value` pairs, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniSection {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl IniSection {
    /// The last value for `key`; later duplicates win.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniDocument {
    lines: Vec<Line>,
    bom: bool,
    crlf: bool,
    trailing_newline: bool,
}

impl IniDocument {
    pub fn parse(content: &str) -> Self {
        let (bom, body) = match content.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, content),
        };
        let crlf = body.contains("\r\n");
        let trailing_newline = body.ends_with('\n');

        let mut raw_lines: Vec<&str> = body.split('\n').collect();
        if trailing_newline {
            raw_lines.pop();
        }

        let lines = if body.is_empty() {
            Vec::new()
        } else {
            raw_lines
                .into_iter()
                .map(|line| parse_line(line.strip_suffix('\r').unwrap_or(line)))
                .collect()
        };

        Self {
            lines,
            bom,
            crlf,
            trailing_newline,
        }
    }

    /// Every section in file order. Entries before the first header are
    /// ignored.
    pub fn sections(&self) -> Vec<IniSection> {
        let mut sections: Vec<IniSection> = Vec::new();
        for line in &self.lines {
            match line {
                Line::Section { name, .. } => sections.push(IniSection {
                    name: name.clone(),
                    entries: Vec::new(),
                }),
                Line::Entry { key, value, .. } => {
                    if let Some(current) = sections.last_mut() {
                        current.entries.push((key.clone(), value.clone()));
                    }
                }
                Line::Raw(_) => {}
            }
        }
        sections
    }

    /// Set `key` in the `ordinal`-th section (as returned by `sections`).
    ///
    /// Updates the last existing occurrence in place, or inserts the pair
    /// after the section's last entry. Returns false if there is no such
    /// section.
    pub fn set(&mut self, ordinal: usize, key: &str, value: &str) -> bool {
        let Some((start, end)) = self.section_bounds(ordinal) else {
            return false;
        };

        let existing = (start + 1..end).rev().find(
            |&i| matches!(&self.lines[i], Line::Entry { key: k, .. } if k == key),
        );
        if let Some(index) = existing {
            self.lines[index] = Line::Entry {
                key: key.to_string(),
                value: value.to_string(),
                raw: None,
            };
            return true;
        }

        let insert_at = (start + 1..end)
            .rev()
            .find(|&i| matches!(self.lines[i], Line::Entry { .. }))
            .map(|i| i + 1)
            .unwrap_or(start + 1);
        self.lines.insert(
            insert_at,
            Line::Entry {
                key: key.to_string(),
                value: value.to_string(),
                raw: None,
            },
        );
        true
    }

    /// Append a new section at the end of the document.
    pub fn append_section(&mut self, name: &str, entries: &[(&str, &str)]) {
        let ends_blank = matches!(self.lines.last(), Some(Line::Raw(raw)) if raw.trim().is_empty());
        if !self.lines.is_empty() && !ends_blank {
            self.lines.push(Line::Raw(String::new()));
        }

        self.lines.push(Line::Section {
            name: name.to_string(),
            raw: format!("[{}]", name),
        });
        for (key, value) in entries {
            self.lines.push(Line::Entry {
                key: key.to_string(),
                value: value.to_string(),
                raw: None,
            });
        }
        self.lines.push(Line::Raw(String::new()));
        self.trailing_newline = true;
    }

    pub fn render(&self) -> String {
        let newline = if self.crlf { "\r\n" } else { "\n" };
        let mut out = String::new();
        if self.bom {
            out.push(BOM);
        }

        let rendered: Vec<String> = self
            .lines
            .iter()
            .map(|line| match line {
                Line::Raw(raw) => raw.clone(),
                Line::Section { raw, .. } => raw.clone(),
                Line::Entry {
                    raw: Some(raw), ..
                } => raw.clone(),
                Line::Entry {
                    key,
                    value,
                    raw: None,
                } => format!("{}={}", key, value),
            })
            .collect();
        out.push_str(&rendered.join(newline));

        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(newline);
        }
        out
    }

    /// Line range `[header, next header)` of a section.
    fn section_bounds(&self, ordinal: usize) -> Option<(usize, usize)> {
        let headers: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| matches!(line, Line::Section { .. }))
            .map(|(i, _)| i)
            .collect();

        let start = *headers.get(ordinal)?;
        let end = headers.get(ordinal + 1).copied().unwrap_or(self.lines.len());
        Some((start, end))
    }
}

fn parse_line(line: &str) -> Line {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
        return Line::Raw(line.to_string());
    }

    if trimmed.starts_with('[') && trimmed.ends_with(']') && trimmed.len() >= 2 {
        return Line::Section {
            name: trimmed[1..trimmed.len() - 1].trim().to_string(),
            raw: line.to_string(),
        };
    }

    match trimmed.split_once('=') {
        Some((key, value)) => Line::Entry {
            key: key.trim().to_string(),
            value: value.trim().to_string(),
            raw: Some(line.to_string()),
        },
        None => Line::Raw(line.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILES: &str = "\u{feff}[General]\r\nStartWithLastProfile=1\r\n; keep me\r\n\r\n[Profile0]\r\nName=default\r\nIsRelative=1\r\nPath=Profiles/abc.default\r\n\r\n";

    #[test]
    fn test_parse_sections_with_bom_and_crlf() {
        let doc = IniDocument::parse(PROFILES);
        let sections = doc.sections();

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, "General");
        assert_eq!(sections[1].get("Path"), Some("Profiles/abc.default"));
        assert_eq!(sections[1].get("Missing"), None);
    }

    #[test]
    fn test_untouched_document_renders_identically() {
        let doc = IniDocument::parse(PROFILES);
        assert_eq!(doc.render(), PROFILES);

        let plain = "# comment\n[A]\nx = 1\nweird line\n";
        assert_eq!(IniDocument::parse(plain).render(), plain);
    }

    #[test]
    fn test_set_replaces_value_in_place() {
        let mut doc = IniDocument::parse(PROFILES);
        assert!(doc.set(1, "Name", "Work"));

        let rendered = doc.render();
        assert!(rendered.contains("[Profile0]\r\nName=Work\r\nIsRelative=1"));
        assert!(rendered.contains("; keep me"));
        assert!(rendered.starts_with('\u{feff}'));
    }

    #[test]
    fn test_set_inserts_missing_key_after_last_entry() {
        let mut doc = IniDocument::parse("[A]\nx=1\n\n[B]\ny=2\n");
        assert!(doc.set(0, "z", "3"));
        assert_eq!(doc.render(), "[A]\nx=1\nz=3\n\n[B]\ny=2\n");
        assert!(!doc.set(5, "z", "3"));
    }

    #[test]
    fn test_append_section_keeps_existing_content() {
        let mut doc = IniDocument::parse("[General]\nVersion=2");
        doc.append_section("Profile1", &[("Name", "Copy"), ("IsRelative", "1")]);

        assert_eq!(
            doc.render(),
            "[General]\nVersion=2\n\n[Profile1]\nName=Copy\nIsRelative=1\n\n"
        );
        let sections = doc.sections();
        assert_eq!(sections[1].get("Name"), Some("Copy"));
    }

    #[test]
    fn test_entries_before_first_section_are_ignored() {
        let doc = IniDocument::parse("orphan=1\n[A]\nkey=value=with=equals\n");
        let sections = doc.sections();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].get("key"), Some("value=with=equals"));
    }
}
