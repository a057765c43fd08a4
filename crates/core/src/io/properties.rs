//! Flat `key=value` properties files
//!
//! Used both as an input format for run configurations and as the run
//! snapshot written next to outputs on success. Lines starting with `#` are
//! comments; set values are written `{a;b;c}`.

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Ordered key/value pairs; keys keep their insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Vec<(String, String)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, replacing an earlier value in place
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Set a key to a `{a;b;c}` set value
    pub fn set_list<I, S>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let items: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
        self.set(key, format!("{{{}}}", items.join(";")));
    }

    /// Raw value of a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a key, failing with a configuration error when absent
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::config(format!("missing property '{key}'")))
    }

    /// Items of a set value; a plain value is a one-item set
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(parse_list)
    }

    /// Parse a value with `FromStr`
    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .parse::<T>()
                .map(Some)
                .map_err(|_| Error::config(format!("invalid value '{v}' for property '{key}'"))),
        }
    }

    /// Parse a `true`/`false` flag
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(None),
            Some(v) if v == "true" => Ok(Some(true)),
            Some(v) if v == "false" => Ok(Some(false)),
            Some(v) => Err(Error::config(format!("invalid flag '{v}' for property '{key}'"))),
        }
    }

    /// All entries in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse properties text
    pub fn parse(text: &str, source_name: &str) -> Result<Self> {
        let mut props = Properties::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::parse(source_name, idx + 1, "expected key=value"))?;
            props.set(key.trim(), value.trim());
        }
        Ok(props)
    }

    /// Read a properties file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Write the properties with a `#` comment header
    pub fn write_to<W: Write>(&self, mut out: W, header: &str) -> Result<()> {
        for line in header.lines() {
            writeln!(out, "#{line}")?;
        }
        for (k, v) in &self.entries {
            writeln!(out, "{k}={v}")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Write a properties file
    pub fn write<P: AsRef<Path>>(&self, path: P, header: &str) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_to(BufWriter::new(file), header)
    }
}

/// Split `{a;b;c}` into its items; a plain value yields itself
pub fn parse_list(value: &str) -> Vec<String> {
    let v = value.trim();
    let inner = v
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(v);
    inner
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sets_and_comments() {
        let text = "#run\ntreatment=sliding\nsizes={3;5}\nmetrics={SHDI; HET}\n\ninterpolation=true\n";
        let props = Properties::parse(text, "run.properties").unwrap();
        assert_eq!(props.get("treatment"), Some("sliding"));
        assert_eq!(props.get_list("sizes").unwrap(), vec!["3", "5"]);
        assert_eq!(props.get_list("metrics").unwrap(), vec!["SHDI", "HET"]);
        assert_eq!(props.get_bool("interpolation").unwrap(), Some(true));
        assert_eq!(props.get_parsed::<usize>("missing").unwrap(), None);
    }

    #[test]
    fn test_malformed_line() {
        let err = Properties::parse("treatment\n", "bad").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
    }

    #[test]
    fn test_write_keeps_order() {
        let mut props = Properties::new();
        props.set("treatment", "map");
        props.set_list("metrics", ["SHDI", "NP"]);
        props.set("treatment", "grid");

        let mut buf = Vec::new();
        props.write_to(&mut buf, "landgrid run").unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "#landgrid run\ntreatment=grid\nmetrics={SHDI;NP}\n"
        );
    }
}
