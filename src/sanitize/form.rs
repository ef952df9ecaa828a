//! Bracket-notation urlencoded payloads.
//!
//! Query strings and form bodies arrive flat (`user[name]=a&tags[]=x`), but
//! operator keys hide inside the brackets (`user[$ne]=`), so both are expanded
//! into nested mappings and sequences before the operator check sees them.
//! Expansion never drops a pair: when shapes collide the earlier value is
//! wrapped instead of replaced.
//!
//! The expanded tree is only ever read. Cleaning works on the flat pairs, and
//! re-encoding writes untouched pairs back byte for byte, so keys, repeats and
//! order survive exactly as the client sent them.

use serde_json::{Map, Value};
use url::form_urlencoded;

/// Nesting deeper than this keeps the remaining brackets as a literal key.
const MAX_DEPTH: usize = 20;

/// One `key=value` segment of a urlencoded string.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FormPair {
    /// The segment as received.
    raw: String,
    key: String,
    value: String,
    dirty: bool,
}

impl FormPair {
    fn raw_key(&self) -> &str {
        self.raw.split_once('=').map_or(self.raw.as_str(), |(key, _)| key)
    }
}

/// The decoded pairs of a query string or form body, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormPairs {
    pairs: Vec<FormPair>,
}

impl FormPairs {
    pub fn parse(input: &str) -> Self {
        let pairs = input
            .split('&')
            .filter(|segment| !segment.is_empty())
            .filter_map(|segment| {
                let (key, value) = form_urlencoded::parse(segment.as_bytes()).next()?;
                Some(FormPair {
                    raw: segment.to_string(),
                    key: key.into_owned(),
                    value: value.into_owned(),
                    dirty: false,
                })
            })
            .collect();
        Self { pairs }
    }

    /// Decoded `(key, value)` pairs in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|p| (p.key.as_str(), p.value.as_str()))
    }

    /// Rewrite every value through `f`. Returns whether any value changed.
    pub fn map_values(&mut self, mut f: impl FnMut(&str) -> Option<String>) -> bool {
        let mut changed = false;
        for pair in &mut self.pairs {
            if let Some(cleaned) = f(&pair.value) {
                if cleaned != pair.value {
                    pair.value = cleaned;
                    pair.dirty = true;
                    changed = true;
                }
            }
        }
        changed
    }

    /// The pairs as a nested mapping, expanding bracket notation.
    pub fn expand(&self) -> Value {
        let mut root = Map::new();
        for (key, value) in self.iter() {
            let (head, segments) = split_key(key);
            insert(&mut root, head, &segments, Value::String(value.to_string()));
        }
        Value::Object(root)
    }

    /// Urlencoded text with every untouched pair exactly as received and each
    /// rewritten value re-encoded under its original key.
    pub fn encode(&self) -> String {
        let segments: Vec<String> = self
            .pairs
            .iter()
            .map(|pair| {
                if pair.dirty {
                    let value: String =
                        form_urlencoded::byte_serialize(pair.value.as_bytes()).collect();
                    format!("{}={}", pair.raw_key(), value)
                } else {
                    pair.raw.clone()
                }
            })
            .collect();
        segments.join("&")
    }
}

/// Parse urlencoded text into a mapping, expanding bracket notation.
pub fn parse_urlencoded(input: &str) -> Value {
    FormPairs::parse(input).expand()
}

fn split_key(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };
    if open == 0 {
        return (key, Vec::new());
    }

    let head = &key[..open];
    let mut segments = Vec::new();
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            break;
        };
        if segments.len() == MAX_DEPTH {
            break;
        }
        segments.push(&stripped[..close]);
        rest = &stripped[close + 1..];
    }

    if !rest.is_empty() {
        // Unbalanced or over-deep keys: the unparsed tail becomes one literal segment.
        if segments.is_empty() {
            return (key, Vec::new());
        }
        segments.push(rest);
    }
    (head, segments)
}

fn insert(target: &mut Map<String, Value>, key: &str, rest: &[&str], value: Value) {
    let Some((next, deeper)) = rest.split_first() else {
        match target.get_mut(key) {
            None => {
                target.insert(key.to_string(), value);
            }
            Some(existing) => append(existing, value),
        }
        return;
    };

    let slot = target.entry(key.to_string()).or_insert_with(|| {
        if next.is_empty() {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        }
    });

    if next.is_empty() {
        let items = as_array(slot);
        if deeper.is_empty() {
            items.push(value);
        } else {
            let mut element = Map::new();
            let (inner, innermost) = deeper.split_first().map_or(("", &[][..]), |(k, r)| (*k, r));
            insert(&mut element, inner, innermost, value);
            items.push(Value::Object(element));
        }
    } else {
        insert(as_object(slot), next, deeper, value);
    }
}

fn append(existing: &mut Value, value: Value) {
    match existing {
        Value::Array(items) => items.push(value),
        Value::Object(map) => {
            let index = map.len().to_string();
            map.insert(index, value);
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, value]);
        }
    }
}

fn as_array(slot: &mut Value) -> &mut Vec<Value> {
    if !slot.is_array() {
        let previous = slot.take();
        *slot = match previous {
            Value::Object(map) => Value::Array(map.into_iter().map(|(_, v)| v).collect()),
            scalar => Value::Array(vec![scalar]),
        };
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot was just converted to an array"),
    }
}

fn as_object(slot: &mut Value) -> &mut Map<String, Value> {
    if !slot.is_object() {
        let previous = slot.take();
        *slot = match previous {
            Value::Array(items) => Value::Object(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v))
                    .collect(),
            ),
            scalar => {
                let mut map = Map::new();
                map.insert("0".to_string(), scalar);
                Value::Object(map)
            }
        };
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("slot was just converted to an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_pairs() {
        assert_eq!(
            parse_urlencoded("name=alice&age=30"),
            json!({ "name": "alice", "age": "30" })
        );
    }

    #[test]
    fn test_bracket_expansion() {
        assert_eq!(
            parse_urlencoded("user[name]=bob&user[$ne]=x&tags[]=a&tags[]=b"),
            json!({
                "user": { "name": "bob", "$ne": "x" },
                "tags": ["a", "b"]
            })
        );
    }

    #[test]
    fn test_percent_encoded_brackets() {
        assert_eq!(
            parse_urlencoded("filter%5B%24gt%5D=1"),
            json!({ "filter": { "$gt": "1" } })
        );
    }

    #[test]
    fn test_repeated_key_becomes_sequence() {
        assert_eq!(parse_urlencoded("a=1&a=2&a=3"), json!({ "a": ["1", "2", "3"] }));
    }

    #[test]
    fn test_collisions_keep_every_key() {
        let parsed = parse_urlencoded("a=plain&a[$gt]=1");
        assert_eq!(parsed, json!({ "a": { "0": "plain", "$gt": "1" } }));

        let parsed = parse_urlencoded("a[$gt]=1&a=plain");
        assert_eq!(parsed, json!({ "a": { "$gt": "1", "1": "plain" } }));
    }

    #[test]
    fn test_unbalanced_brackets_stay_literal() {
        assert_eq!(parse_urlencoded("a[b=1"), json!({ "a[b": "1" }));
        assert_eq!(parse_urlencoded("[x]=1"), json!({ "[x]": "1" }));
    }

    #[test]
    fn test_trailing_text_after_brackets() {
        assert_eq!(parse_urlencoded("a[b]c=1"), json!({ "a": { "b": { "c": "1" } } }));
    }

    #[test]
    fn test_untouched_pairs_encode_verbatim() {
        let input = "tag=a&&tag=b&q=x+y&user%5Bname%5D=bob&flag";
        let pairs = FormPairs::parse(input);
        assert_eq!(pairs.encode(), "tag=a&tag=b&q=x+y&user%5Bname%5D=bob&flag");
    }

    #[test]
    fn test_rewritten_values_keep_key_and_order() {
        let mut pairs = FormPairs::parse("tag=a&tag=b&q=%3Cb%3Ehi%3C%2Fb%3E&ids%5B%5D=1");
        let changed = pairs.map_values(|v| Some(v.replace("<b>", "").replace("</b>", "")));
        assert!(changed);
        assert_eq!(pairs.encode(), "tag=a&tag=b&q=hi&ids%5B%5D=1");

        let mut pairs = FormPairs::parse("note=two words&n=<i>");
        pairs.map_values(|v| (v == "<i>").then(|| "&".to_string()));
        assert_eq!(pairs.encode(), "note=two words&n=%26");
    }

    #[test]
    fn test_unchanged_rewrite_is_not_dirty() {
        let mut pairs = FormPairs::parse("a=1&b=2");
        assert!(!pairs.map_values(|v| Some(v.to_string())));
        assert!(!pairs.map_values(|_| None));
        assert_eq!(pairs.encode(), "a=1&b=2");
    }
}
