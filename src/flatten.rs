//! Structured event payloads and their flattened, path-keyed view.
//!
//! A payload is a closed tree of [`FieldValue`]s. Flattening produces a deep copy
//! of the tree plus a [`FlatFields`] map from path keys to the scalar leaves, for
//! sinks that cannot render nested structures.
//!
//! Path keys join record field names and mapping keys with `.` and append `[i]`
//! for sequence elements, e.g. `request.headers[0].name`.

use crate::config::FlattenConfig;
use derive_more::{Display, From};
use fxhash::FxHashMap;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Write},
    ops::Index,
};
use tracing::warn;

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize)]
pub enum ScalarValue {
    #[default]
    Null,
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Float(OrderedFloat<f64>),
    String(String),
}

impl ScalarValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(v) => Some(*v),
            Self::Signed(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
        }
    }
}

/// A named, ordered set of fields. The closest analogue of a user struct.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field<K: Into<String>, V: Into<FieldValue>>(mut self, key: K, value: V) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize, From)]
pub enum FieldValue {
    Scalar(ScalarValue),
    Sequence(Vec<FieldValue>),
    Mapping(BTreeMap<String, FieldValue>),
    Record(Record),
}

impl Default for FieldValue {
    fn default() -> Self {
        Self::Scalar(ScalarValue::Null)
    }
}

impl FieldValue {
    pub fn sequence<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Self::Sequence(items.into_iter().map(Into::into).collect())
    }

    pub fn mapping<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        Self::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Convert any serializable value into a field tree.
    ///
    /// Structs and maps become mappings, enum variants carrying data become
    /// records named after the variant. Mapping keys that are not strings are
    /// stringified. Never fails: a value that refuses to serialize is
    /// represented by its error text.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_yaml::to_value(value) {
            Ok(v) => v.into(),
            Err(e) => {
                warn!(error = %e, "Field value could not be serialized");
                ScalarValue::String(e.to_string()).into()
            }
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Scalar(_) => ValueKind::Scalar,
            Self::Sequence(_) => ValueKind::Sequence,
            Self::Mapping(_) => ValueKind::Mapping,
            Self::Record(_) => ValueKind::Record,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{s}"),
            Self::Sequence(items) => write!(f, "[{}]", items.iter().join(", ")),
            Self::Mapping(m) => write!(
                f,
                "{{{}}}",
                m.iter().map(|(k, v)| format!("{k}: {v}")).join(", ")
            ),
            Self::Record(r) => write!(
                f,
                "{}{{{}}}",
                r.name,
                r.fields
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .join(", ")
            ),
        }
    }
}

macro_rules! scalar_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for ScalarValue {
                fn from(v: $t) -> Self {
                    ScalarValue::$variant(v.into())
                }
            }

            impl From<$t> for FieldValue {
                fn from(v: $t) -> Self {
                    FieldValue::Scalar(v.into())
                }
            }
        )*
    };
}

scalar_from!(
    bool => Bool,
    u8 => Unsigned,
    u16 => Unsigned,
    u32 => Unsigned,
    u64 => Unsigned,
    i8 => Signed,
    i16 => Signed,
    i32 => Signed,
    i64 => Signed,
    f64 => Float,
    String => String,
    &str => String,
);

impl From<f32> for ScalarValue {
    fn from(v: f32) -> Self {
        ScalarValue::Float(OrderedFloat(f64::from(v)))
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Scalar(v.into())
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::Scalar(ScalarValue::Unsigned(u64::try_from(v).unwrap_or(u64::MAX)))
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

impl<V: Into<FieldValue>> From<HashMap<String, V>> for FieldValue {
    fn from(m: HashMap<String, V>) -> Self {
        FieldValue::mapping(m)
    }
}

impl From<serde_yaml::Value> for FieldValue {
    fn from(v: serde_yaml::Value) -> Self {
        use serde_yaml::Value;
        match v {
            Value::Null => ScalarValue::Null.into(),
            Value::Bool(b) => b.into(),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    u.into()
                } else if let Some(i) = n.as_i64() {
                    i.into()
                } else {
                    n.as_f64().unwrap_or(f64::NAN).into()
                }
            }
            Value::String(s) => s.into(),
            Value::Sequence(items) => FieldValue::sequence(items),
            Value::Mapping(m) => FieldValue::Mapping(
                m.into_iter()
                    .map(|(k, v)| (yaml_key(k), FieldValue::from(v)))
                    .collect(),
            ),
            Value::Tagged(t) => {
                let name = t.tag.to_string().trim_start_matches('!').to_owned();
                let fields = match t.value {
                    Value::Mapping(m) => m
                        .into_iter()
                        .map(|(k, v)| (yaml_key(k), FieldValue::from(v)))
                        .collect(),
                    other => vec![("0".to_owned(), other.into())],
                };
                FieldValue::Record(Record { name, fields })
            }
        }
    }
}

fn yaml_key(k: serde_yaml::Value) -> String {
    match k {
        serde_yaml::Value::String(s) => s,
        other => FieldValue::from(other).to_string(),
    }
}

/// Shape of a payload root.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Serialize, Deserialize)]
pub enum ValueKind {
    Scalar,
    Sequence,
    Mapping,
    Record,
}

/// Path-keyed scalar leaves of a payload.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct FlatFields(FxHashMap<String, ScalarValue>);

impl FlatFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ScalarValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ScalarValue)> {
        self.0.iter()
    }

    /// Entries ordered by key, for rendering.
    pub fn sorted(&self) -> Vec<(&String, &ScalarValue)> {
        self.0.iter().sorted_by_key(|(k, _)| k.as_str()).collect()
    }

    pub(crate) fn insert(&mut self, key: String, value: ScalarValue) {
        self.0.insert(key, value);
    }
}

impl Index<&str> for FlatFields {
    type Output = ScalarValue;

    fn index(&self, key: &str) -> &Self::Output {
        &self.0[key]
    }
}

/// Result of flattening a payload.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Flattened {
    /// Deep copy of the input, with subtrees beyond the depth bound collapsed.
    pub copy: FieldValue,
    pub kind: ValueKind,
    /// Empty when the root is a scalar.
    pub flat: FlatFields,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Flattener {
    max_depth: usize,
}

impl Default for Flattener {
    fn default() -> Self {
        Self::new(&FlattenConfig::default())
    }
}

impl Flattener {
    pub fn new(cfg: &FlattenConfig) -> Self {
        Self {
            max_depth: cfg.max_depth,
        }
    }

    pub fn flatten(&self, value: &FieldValue) -> Flattened {
        let mut flat = FlatFields::new();
        let mut path = String::new();
        let copy = self.walk(value, &mut path, 0, &mut flat);
        Flattened {
            copy,
            kind: value.kind(),
            flat,
        }
    }

    fn walk(
        &self,
        value: &FieldValue,
        path: &mut String,
        depth: usize,
        flat: &mut FlatFields,
    ) -> FieldValue {
        match value {
            FieldValue::Scalar(s) => {
                if depth != 0 {
                    flat.insert(path.clone(), s.clone());
                }
                FieldValue::Scalar(s.clone())
            }
            _ if depth >= self.max_depth => {
                warn!(
                    path = %path,
                    max_depth = self.max_depth,
                    "Collapsing field subtree at the depth bound"
                );
                let collapsed = ScalarValue::String(value.to_string());
                if depth != 0 {
                    flat.insert(path.clone(), collapsed.clone());
                }
                FieldValue::Scalar(collapsed)
            }
            FieldValue::Sequence(items) => FieldValue::Sequence(
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| {
                        let mark = path.len();
                        // Writing to a String can't fail
                        let _ = write!(path, "[{idx}]");
                        let copy = self.walk(item, path, depth + 1, flat);
                        path.truncate(mark);
                        copy
                    })
                    .collect(),
            ),
            FieldValue::Mapping(m) => FieldValue::Mapping(
                m.iter()
                    .map(|(key, item)| {
                        let copy = self.walk_member(key, item, path, depth, flat);
                        (key.clone(), copy)
                    })
                    .collect(),
            ),
            FieldValue::Record(r) => FieldValue::Record(Record {
                name: r.name.clone(),
                fields: r
                    .fields
                    .iter()
                    .map(|(key, item)| {
                        let copy = self.walk_member(key, item, path, depth, flat);
                        (key.clone(), copy)
                    })
                    .collect(),
            }),
        }
    }

    fn walk_member(
        &self,
        key: &str,
        item: &FieldValue,
        path: &mut String,
        depth: usize,
        flat: &mut FlatFields,
    ) -> FieldValue {
        let mark = path.len();
        if !path.is_empty() {
            path.push('.');
        }
        path.push_str(key);
        let copy = self.walk(item, path, depth + 1, flat);
        path.truncate(mark);
        copy
    }
}

/// Flatten with the default depth bound.
pub fn flatten(value: &FieldValue) -> Flattened {
    Flattener::default().flatten(value)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn request() -> FieldValue {
        FieldValue::Record(
            Record::new("Request")
                .field("method", "GET")
                .field("status", 200_u16)
                .field(
                    "headers",
                    FieldValue::sequence([
                        FieldValue::mapping([("name", "host"), ("value", "example.org")]),
                        FieldValue::mapping([("name", "accept"), ("value", "*/*")]),
                    ]),
                )
                .field("latency", 0.25_f64)
                .field("user", Option::<&str>::None),
        )
    }

    #[test]
    fn path_keys() {
        let f = flatten(&request());
        assert_eq!(f.kind, ValueKind::Record);
        let keys: Vec<&str> = f.flat.sorted().into_iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "headers[0].name",
                "headers[0].value",
                "headers[1].name",
                "headers[1].value",
                "latency",
                "method",
                "status",
                "user",
            ]
        );
        assert_eq!(f.flat["status"], ScalarValue::Unsigned(200));
        assert_eq!(f.flat["headers[1].value"], ScalarValue::String("*/*".to_owned()));
        assert_eq!(f.flat["user"], ScalarValue::Null);
    }

    #[test]
    fn copy_matches_input() {
        let input = request();
        let f = flatten(&input);
        assert_eq!(f.copy, input);
    }

    #[test]
    fn usize_scalars() {
        assert_eq!(
            FieldValue::from(usize::MAX),
            FieldValue::Scalar(ScalarValue::Unsigned(usize::MAX as u64))
        );
        assert_eq!(FieldValue::from(7_usize).to_string(), "7");
    }

    #[test]
    fn idempotent() {
        let input = request();
        let a = flatten(&input);
        let b = flatten(&input);
        assert_eq!(a.flat, b.flat);
        assert_eq!(flatten(&a.copy).flat, a.flat);
    }

    #[test]
    fn copy_is_detached_from_input() {
        let mut input = FieldValue::mapping([("inner", FieldValue::sequence([1_u8, 2, 3]))]);
        let f = flatten(&input);
        if let FieldValue::Mapping(m) = &mut input {
            m.insert("inner".to_owned(), FieldValue::from("changed"));
        }
        assert_eq!(
            f.copy,
            FieldValue::mapping([("inner", FieldValue::sequence([1_u8, 2, 3]))])
        );
        assert_eq!(f.flat.len(), 3);
    }

    #[test]
    fn scalar_root_has_no_flat_entries() {
        let f = flatten(&FieldValue::from(42_i32));
        assert_eq!(f.kind, ValueKind::Scalar);
        assert_eq!(f.copy, FieldValue::from(42_i32));
        assert!(f.flat.is_empty());

        let f = flatten(&FieldValue::default());
        assert!(f.flat.is_empty());
    }

    #[test]
    fn root_sequence_uses_index_keys() {
        let f = flatten(&FieldValue::sequence(["a", "b"]));
        assert_eq!(f.kind, ValueKind::Sequence);
        assert_eq!(f.flat["[0]"], ScalarValue::from("a"));
        assert_eq!(f.flat["[1]"], ScalarValue::from("b"));
    }

    #[test]
    fn empty_containers_contribute_nothing() {
        let f = flatten(&FieldValue::mapping([
            ("none", FieldValue::Sequence(vec![])),
            ("x", FieldValue::from(1_u8)),
        ]));
        assert_eq!(f.flat.len(), 1);
        assert!(f.flat.contains_key("x"));
    }

    #[test]
    fn depth_bound_collapses_subtree() {
        let mut deep = FieldValue::from("leaf");
        for _ in 0..5 {
            deep = FieldValue::mapping([("n", deep)]);
        }
        let flattener = Flattener::new(&FlattenConfig { max_depth: 3 });
        let f = flattener.flatten(&deep);
        assert_eq!(f.flat.len(), 1);
        assert_eq!(
            f.flat["n.n.n"],
            ScalarValue::String("{n: {n: leaf}}".to_owned())
        );
        // Stable under repetition
        assert_eq!(flattener.flatten(&deep), f);
    }

    #[derive(Serialize)]
    enum Outcome {
        Retry { attempts: u32 },
        Failed(String),
        Done,
    }

    #[derive(Serialize)]
    struct Job {
        id: u64,
        tags: Vec<&'static str>,
        outcome: Outcome,
        previous: Outcome,
        last: Outcome,
        weights: BTreeMap<u8, f64>,
    }

    #[test]
    fn from_serialize_struct() {
        let job = Job {
            id: 7,
            tags: vec!["nightly", "db"],
            outcome: Outcome::Retry { attempts: 3 },
            previous: Outcome::Failed("timeout".to_owned()),
            last: Outcome::Done,
            weights: BTreeMap::from([(1, 0.5)]),
        };
        let value = FieldValue::from_serialize(&job);
        assert_eq!(value.kind(), ValueKind::Mapping);
        let f = flatten(&value);
        assert_eq!(f.flat["id"], ScalarValue::Unsigned(7));
        assert_eq!(f.flat["tags[1]"], ScalarValue::from("db"));
        assert_eq!(f.flat["outcome.attempts"], ScalarValue::Unsigned(3));
        assert_eq!(f.flat["previous.0"], ScalarValue::from("timeout"));
        assert_eq!(f.flat["last"], ScalarValue::from("Done"));
        assert_eq!(f.flat["weights.1"], ScalarValue::from(0.5_f64));
    }
}
