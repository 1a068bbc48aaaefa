//! Ordered header lists.
//!
//! Lambda events carry headers as JSON objects, and the order of the keys
//! matters to us (query strings are rebuilt from them, and responses should
//! come back out in the order the local service produced them). So instead
//! of a hash map we keep a plain vector of pairs with case-insensitive
//! lookup, and deserialize JSON objects straight into vectors.

use serde::{
    de::{self, MapAccess, Visitor},
    ser::Serializer,
    Deserialize, Deserializer, Serialize,
};
use std::{fmt, marker::PhantomData};

/// Header names mapped to single (already joined) values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        HeaderList(Vec::new())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.0[i].1.as_str())
    }

    /// Replace the value of `name`, keeping its position if it is already
    /// present.
    pub fn set<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(i) => self.0[i].1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Add a value for `name`, joining it onto any existing value with
    /// `separator`.
    pub fn append_joined(&mut self, name: &str, value: &str, separator: &str) {
        match self.position(name) {
            Some(i) => {
                let existing = &mut self.0[i].1;
                existing.push_str(separator);
                existing.push_str(value);
            }
            None => self.0.push((name.to_owned(), value.to_owned())),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.0.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

impl Serialize for HeaderList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// Serialize a vector of pairs as a JSON object, in vector order.
pub fn serialize_pairs<S, V>(pairs: &[(String, V)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    serializer.collect_map(pairs.iter().map(|(k, v)| (k, v)))
}

/// Deserialize a JSON object into a vector of pairs, in document order. A
/// JSON `null` yields an empty vector, same as a missing field.
pub fn deserialize_pairs<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct PairsVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for PairsVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a JSON object or null")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));

            while let Some((k, v)) = map.next_entry::<String, V>()? {
                pairs.push((k, v));
            }

            Ok(pairs)
        }
    }

    deserializer.deserialize_any(PairsVisitor(PhantomData))
}

/// Canonical `Header-Case` form of a header name: the first letter and
/// every letter following a hyphen are upper-cased, the rest lower-cased.
/// Names containing anything other than token characters are returned
/// unchanged.
pub fn canonical_header_key(name: &str) -> String {
    if !name.bytes().all(is_token_byte) {
        return name.to_owned();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let c = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            c
        })
        .collect()
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
