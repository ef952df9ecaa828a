//! Markup stripping for string leaves.
//!
//! No tag survives: disallowed tags are unwrapped to their text, `<script>`
//! and `<style>` lose their content entirely, and because no tag is kept no
//! attribute is kept either, `on*` handlers included. The output is escaped
//! HTML text, so running it through the cleaner again yields the same string.

use std::collections::HashSet;

use ammonia::Builder;
use serde_json::Value;

use crate::sanitize::form::FormPairs;

/// Fails-open sanitizer: it rewrites, it never rejects.
pub struct MarkupSanitizer {
    cleaner: Builder<'static>,
}

impl MarkupSanitizer {
    pub fn new() -> Self {
        let mut cleaner = Builder::empty();
        cleaner.clean_content_tags(HashSet::from(["script", "style"]));
        Self { cleaner }
    }

    /// Clean a single string.
    pub fn clean(&self, input: &str) -> String {
        if !needs_cleaning(input) {
            return input.to_string();
        }
        self.cleaner.clean(input).to_string()
    }

    /// Sanitize every string leaf below `value`, returning whether anything changed.
    ///
    /// Keys are never touched.
    pub fn sanitize_value(&self, value: &mut Value) -> bool {
        match value {
            Value::String(text) => {
                if !needs_cleaning(text) {
                    return false;
                }
                let cleaned = self.clean(text);
                if cleaned == *text {
                    return false;
                }
                *text = cleaned;
                true
            }
            Value::Array(items) => items
                .iter_mut()
                .fold(false, |changed, item| self.sanitize_value(item) | changed),
            Value::Object(map) => map
                .values_mut()
                .fold(false, |changed, item| self.sanitize_value(item) | changed),
            Value::Null | Value::Bool(_) | Value::Number(_) => false,
        }
    }

    /// Sanitize the values of urlencoded pairs. Keys are never touched.
    pub fn sanitize_pairs(&self, pairs: &mut FormPairs) -> bool {
        pairs.map_values(|value| needs_cleaning(value).then(|| self.clean(value)))
    }
}

impl Default for MarkupSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

fn needs_cleaning(text: &str) -> bool {
    text.contains(|c| matches!(c, '<' | '>' | '&'))
}
