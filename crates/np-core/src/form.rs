//! Text fields collected from a multipart form.
//!
//! Payload types pull the fields they know with the `take`-style accessors
//! and call [`FormFields::finish`] last, which rejects anything left over.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::models::{BoolFlag, RecordId};

#[derive(Debug, Clone, Default)]
pub struct FormFields {
    values: BTreeMap<String, String>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut form = Self::new();
        for (name, value) in pairs {
            form.insert(name, value)?;
        }
        Ok(form)
    }

    /// Adds a field. A repeated field name is a validation error.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.values.contains_key(&name) {
            return Err(AppError::validation(format!("field '{name}' given more than once")));
        }
        self.values.insert(name, value.into());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Required text; a missing field reads as empty so validation can
    /// report it alongside the others.
    pub fn text(&mut self, name: &str) -> String {
        self.values.remove(name).unwrap_or_default()
    }

    pub fn optional_text(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    /// Parses a field with `FromStr`. Missing and blank fields are `None`.
    pub fn parsed<T>(&mut self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.values.remove(name) {
            Some(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| AppError::validation(format!("{name}: invalid value '{raw}': {e}"))),
            _ => Ok(None),
        }
    }

    pub fn flag(&mut self, name: &str) -> Result<Option<bool>> {
        match self.values.remove(name) {
            Some(raw) => BoolFlag::parse(&raw)
                .map(|flag| Some(flag.into()))
                .map_err(|e| AppError::validation(format!("{name}: {e}"))),
            None => Ok(None),
        }
    }

    pub fn id(&mut self) -> Result<Option<RecordId>> {
        match self.values.remove("id") {
            Some(raw) if !raw.is_empty() => RecordId::parse(&raw).map(Some),
            _ => Ok(None),
        }
    }

    /// Fails if any field was not consumed.
    pub fn finish(self) -> Result<()> {
        if self.values.is_empty() {
            return Ok(());
        }
        let unknown: Vec<&str> = self.values.keys().map(String::as_str).collect();
        Err(AppError::validation(format!(
            "unknown field(s): {}",
            unknown.join(", ")
        )))
    }
}
