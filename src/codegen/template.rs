//! Code fragment templates with register labels.

use crate::codegen::CodeFragment;
use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use regex::Regex;
use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
};

/// A code template whose `{{label}}` placeholders are resolved to register
/// operands when a node emits its fragment.
#[derive(Clone, Debug)]
pub struct CodeTemplate<'a> {
    source_code: &'a str,
    replacement_regexes: HashMap<&'a str, Regex>,
}

lazy_static! {
    static ref REPLACEMENT_LABEL_CAPTURE_REGEX: Regex = Regex::new(r"\{\{(\w+)\}\}").unwrap();
}

impl<'a> CodeTemplate<'a> {
    /// Creates a new template from the given template source code.
    pub fn new(source_code: &'a str) -> Self {
        let replacement_regexes = find_replacement_labels(source_code)
            .into_iter()
            .map(|label| {
                (
                    label,
                    Regex::new(&format!("\\{{\\{{{}\\}}\\}}", label)).unwrap(),
                )
            })
            .collect();
        Self {
            source_code,
            replacement_regexes,
        }
    }

    /// Returns the set of labels occurring in the template.
    pub fn labels(&self) -> HashSet<&'a str> {
        self.replacement_regexes.keys().copied().collect()
    }

    /// Resolves the template with the given replacements, each giving a label
    /// and the operand string to substitute for every occurrence of
    /// `{{label}}`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - A label in `replacements` does not exist in the template.
    /// - The same label occurs multiple times in `replacements`.
    /// - Not all labels in the template are included in `replacements`.
    pub fn resolve<'b>(
        &self,
        replacements: impl IntoIterator<Item = (&'b str, String)>,
    ) -> Result<String> {
        let mut resolved_source_code = Cow::Borrowed(self.source_code);
        let mut replaced_labels = HashSet::new();

        for (label, replacement) in replacements {
            let replacement_regex = self
                .replacement_regexes
                .get(label)
                .ok_or_else(|| anyhow!("No label `{}` to replace in code template", label))?;

            if !replaced_labels.insert(label) {
                return Err(anyhow!(
                    "Tried to replace label `{}` multiple times",
                    label
                ));
            }

            resolved_source_code = Cow::Owned(
                replacement_regex
                    .replace_all(&resolved_source_code, replacement.as_str())
                    .into_owned(),
            );
        }

        if replaced_labels.len() < self.replacement_regexes.len() {
            let mut missing: Vec<_> = self
                .replacement_regexes
                .keys()
                .filter(|label| !replaced_labels.contains(**label))
                .copied()
                .collect();
            missing.sort_unstable();
            return Err(anyhow!(
                "Not all labels replaced in code template (missing: {})",
                missing.join(", ")
            ));
        }

        Ok(resolved_source_code.into_owned())
    }

    /// Resolves the template (see [`Self::resolve`]) into a
    /// [`CodeFragment`].
    ///
    /// # Errors
    /// See [`Self::resolve`].
    pub fn resolve_fragment<'b>(
        &self,
        replacements: impl IntoIterator<Item = (&'b str, String)>,
    ) -> Result<CodeFragment> {
        self.resolve(replacements)
            .map(|source| CodeFragment::from_source(&source))
    }
}

fn find_replacement_labels(source_code: &str) -> HashSet<&str> {
    REPLACEMENT_LABEL_CAPTURE_REGEX
        .captures_iter(source_code)
        .filter_map(|captures| captures.get(1))
        .map(|label| label.as_str())
        .collect()
}
