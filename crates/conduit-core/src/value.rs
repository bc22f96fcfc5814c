//! Dynamically-typed JSON values carried inside bridge payloads.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// Key/value map held by [`DynamicValue::Object`].
///
/// Sorted by key so encoding is deterministic; equality ignores insertion order.
pub type Object = BTreeMap<String, DynamicValue>;

/// Failure to decode JSON text into a value or record.
#[derive(Debug, thiserror::Error)]
#[error("invalid JSON: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Failure to encode a value or record as JSON text.
#[derive(Debug, thiserror::Error)]
#[error("cannot encode as JSON: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// A JSON value as a tagged union with non-panicking accessors.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum DynamicValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<DynamicValue>),
    Object(Object),
}

impl DynamicValue {
    /// Decode JSON text.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as compact JSON text. Fails only for non-finite doubles.
    pub fn encode(&self) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Build a value from any serializable type.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, EncodeError> {
        Ok(serde_json::to_value(value)?.into())
    }

    /// Deserialize this value into a concrete type.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        Ok(serde_json::from_value(serde_json::Value::from(self.clone()))?)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Integers, and doubles with no fractional part that fit in an `i64`.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Self::Int(i) => Some(i),
            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            Self::Double(d)
                if d.is_finite()
                    && d.fract() == 0.0
                    && d >= i64::MIN as f64
                    && d < i64::MAX as f64 =>
            {
                Some(d as i64)
            }
            _ => None,
        }
    }

    /// Doubles, and integers widened to `f64`.
    pub fn as_double(&self) -> Option<f64> {
        match *self {
            Self::Double(d) => Some(d),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[DynamicValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key. `None` if this is not an object or the key is missing.
    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Index into an array. `None` if this is not an array, or the index is
    /// negative or out of bounds.
    pub fn at(&self, index: i64) -> Option<&DynamicValue> {
        let index = usize::try_from(index).ok()?;
        self.as_array().and_then(|items| items.get(index))
    }

    /// Whether every number in the tree is finite, i.e. `encode` will succeed.
    pub fn is_encodable(&self) -> bool {
        match self {
            Self::Double(d) => d.is_finite(),
            Self::Array(items) => items.iter().all(Self::is_encodable),
            Self::Object(map) => map.values().all(Self::is_encodable),
            _ => true,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Non-finite doubles render as null here rather than failing the formatter.
        write!(f, "{}", serde_json::Value::from(self.clone()))
    }
}

// ── Serde ───────────────────────────────────────────────────────────

impl Serialize for DynamicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Double(d) if d.is_finite() => serializer.serialize_f64(*d),
            Self::Double(d) => Err(ser::Error::custom(format!(
                "non-finite double {d} has no JSON representation"
            ))),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for DynamicValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DynamicValueVisitor)
    }
}

struct DynamicValueVisitor;

impl<'de> Visitor<'de> for DynamicValueVisitor {
    type Value = DynamicValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<DynamicValue, D::Error> {
        DynamicValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Int(v))
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<DynamicValue, E> {
        Ok(i64::try_from(v).map_or(DynamicValue::Double(v as f64), DynamicValue::Int))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Double(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<DynamicValue, E> {
        Ok(DynamicValue::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<DynamicValue, E> {
        Ok(DynamicValue::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<DynamicValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(DynamicValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<DynamicValue, A::Error> {
        let mut out = Object::new();
        while let Some((key, value)) = map.next_entry::<String, DynamicValue>()? {
            out.insert(key, value);
        }
        Ok(DynamicValue::Object(out))
    }
}

// ── Conversions ─────────────────────────────────────────────────────

impl From<bool> for DynamicValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for DynamicValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for DynamicValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for DynamicValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for DynamicValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for DynamicValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for DynamicValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<DynamicValue>> From<Vec<T>> for DynamicValue {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<Object> for DynamicValue {
    fn from(v: Object) -> Self {
        Self::Object(v)
    }
}

impl<T: Into<DynamicValue>> From<Option<T>> for DynamicValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<K: Into<String>, V: Into<DynamicValue>> FromIterator<(K, V)> for DynamicValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Object(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<serde_json::Value> for DynamicValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<DynamicValue> for serde_json::Value {
    fn from(v: DynamicValue) -> Self {
        match v {
            DynamicValue::Null => Self::Null,
            DynamicValue::Bool(b) => Self::Bool(b),
            DynamicValue::Int(i) => Self::Number(i.into()),
            DynamicValue::Double(d) => serde_json::Number::from_f64(d).map_or(Self::Null, Self::Number),
            DynamicValue::String(s) => Self::String(s),
            DynamicValue::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            DynamicValue::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodable_walks_nested_values() {
        let ok = DynamicValue::from_iter([("a", DynamicValue::from(vec![1.5, 2.0]))]);
        assert!(ok.is_encodable());
        let bad = DynamicValue::from_iter([(
            "a",
            DynamicValue::from(vec![DynamicValue::from(1), DynamicValue::Double(f64::INFINITY)]),
        )]);
        assert!(!bad.is_encodable());
        assert!(bad.encode().is_err());
    }

    fn sample_tree() -> DynamicValue {
        DynamicValue::from_iter([
            ("name", DynamicValue::from("bridge")),
            ("count", DynamicValue::from(3)),
            ("ratio", DynamicValue::from(0.25)),
            ("whole", DynamicValue::from(2.0)),
            ("flag", DynamicValue::from(true)),
            ("nothing", DynamicValue::Null),
            (
                "items",
                DynamicValue::from(vec![
                    DynamicValue::from(1),
                    DynamicValue::from("two"),
                    DynamicValue::from_iter([("three", 3)]),
                ]),
            ),
            ("emoji", DynamicValue::from("héllo 👋\u{2028}")),
        ])
    }

    // ── Codec ───────────────────────────────────────────────────────

    #[test]
    fn roundtrip_preserves_tree() {
        let value = sample_tree();
        let text = value.encode().unwrap();
        assert_eq!(DynamicValue::decode(&text).unwrap(), value);
    }

    #[test]
    fn roundtrip_scalars() {
        for value in [
            DynamicValue::Null,
            DynamicValue::Bool(false),
            DynamicValue::Int(i64::MIN),
            DynamicValue::Int(i64::MAX),
            DynamicValue::Double(-1.5e-7),
            DynamicValue::Double(1.0),
            DynamicValue::String(String::new()),
            DynamicValue::Array(vec![]),
            DynamicValue::Object(Object::new()),
        ] {
            let text = value.encode().unwrap();
            assert_eq!(DynamicValue::decode(&text).unwrap(), value, "via {text}");
        }
    }

    #[test]
    fn roundtrip_doubles_exactly() {
        for d in [
            2.7917904547466506e-271,
            5.039425218697503e70,
            0.1 + 0.2,
            f64::MIN_POSITIVE,
            f64::MAX,
            -f64::EPSILON,
            5e-324,
        ] {
            let text = DynamicValue::Double(d).encode().unwrap();
            let back = DynamicValue::decode(&text).unwrap();
            assert_eq!(back.as_double().map(f64::to_bits), Some(d.to_bits()), "via {text}");
        }
    }

    #[test]
    fn encode_is_compact() {
        let value = DynamicValue::from_iter([("a", vec![1, 2])]);
        assert_eq!(value.encode().unwrap(), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn encode_rejects_non_finite_double() {
        assert!(DynamicValue::Double(f64::NAN).encode().is_err());
        let nested = DynamicValue::from(vec![DynamicValue::Double(f64::INFINITY)]);
        assert!(nested.encode().is_err());
    }

    #[test]
    fn decode_rejects_malformed_text() {
        assert!(DynamicValue::decode("{\"a\":").is_err());
        assert!(DynamicValue::decode("").is_err());
    }

    #[test]
    fn decode_large_unsigned_becomes_double() {
        let value = DynamicValue::decode("18446744073709551615").unwrap();
        assert!(matches!(value, DynamicValue::Double(_)));
    }

    // ── Accessors ───────────────────────────────────────────────────

    #[test]
    fn whole_double_reads_as_int() {
        let value = DynamicValue::decode("42.0").unwrap();
        assert_eq!(value.as_int(), Some(42));
        assert_eq!(value.as_double(), Some(42.0));
    }

    #[test]
    fn fractional_double_is_not_int() {
        assert_eq!(DynamicValue::Double(1.5).as_int(), None);
        assert_eq!(DynamicValue::Double(f64::NAN).as_int(), None);
        assert_eq!(DynamicValue::Double(1e300).as_int(), None);
    }

    #[test]
    fn int_widens_to_double() {
        assert_eq!(DynamicValue::Int(7).as_double(), Some(7.0));
    }

    #[test]
    fn mismatched_accessors_return_none() {
        let value = DynamicValue::from("text");
        assert_eq!(value.as_bool(), None);
        assert_eq!(value.as_int(), None);
        assert_eq!(value.as_double(), None);
        assert!(value.as_array().is_none());
        assert!(value.as_object().is_none());
        assert!(value.get("x").is_none());
        assert!(value.at(0).is_none());
        assert_eq!(value.as_str(), Some("text"));
    }

    #[test]
    fn get_and_at() {
        let value = sample_tree();
        assert_eq!(value.get("count").and_then(DynamicValue::as_int), Some(3));
        assert!(value.get("missing").is_none());

        let items = value.get("items").unwrap();
        assert_eq!(items.at(1).and_then(DynamicValue::as_str), Some("two"));
        assert_eq!(
            items.at(2).and_then(|v| v.get("three")).and_then(DynamicValue::as_int),
            Some(3)
        );
        assert!(items.at(3).is_none());
        assert!(items.at(-1).is_none());
    }

    #[test]
    fn null_checks() {
        assert!(DynamicValue::Null.is_null());
        assert!(!DynamicValue::Bool(false).is_null());
        assert!(sample_tree().get("nothing").unwrap().is_null());
    }

    // ── Equality ────────────────────────────────────────────────────

    #[test]
    fn object_equality_ignores_insertion_order() {
        let a = DynamicValue::decode(r#"{"x":1,"y":[true,null]}"#).unwrap();
        let b = DynamicValue::decode(r#"{"y":[true,null],"x":1}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn equality_is_by_variant() {
        assert_ne!(DynamicValue::Int(1), DynamicValue::Double(1.0));
        assert_ne!(DynamicValue::from("1"), DynamicValue::Int(1));
    }

    // ── Conversions ─────────────────────────────────────────────────

    #[test]
    fn serde_json_value_conversion_roundtrip() {
        let raw = json!({"a": 1, "b": [1.5, "s", null], "c": {"d": false}});
        let value = DynamicValue::from(raw.clone());
        assert_eq!(serde_json::Value::from(value), raw);
    }

    #[test]
    fn typed_roundtrip_through_serde() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Point {
            x: i32,
            y: i32,
        }

        let value = DynamicValue::from_serializable(&Point { x: 1, y: -2 }).unwrap();
        assert_eq!(value.get("y").and_then(DynamicValue::as_int), Some(-2));
        let back: Point = value.deserialize_into().unwrap();
        assert_eq!(back, Point { x: 1, y: -2 });
    }

    #[test]
    fn deserialize_into_reports_shape_mismatch() {
        let value = DynamicValue::from("not a number");
        assert!(value.deserialize_into::<u32>().is_err());
    }

    #[test]
    fn option_conversion() {
        assert!(DynamicValue::from(None::<i64>).is_null());
        assert_eq!(DynamicValue::from(Some(5)), DynamicValue::Int(5));
    }

    #[test]
    fn display_is_compact_json() {
        let value = DynamicValue::from_iter([("k", "v")]);
        assert_eq!(value.to_string(), r#"{"k":"v"}"#);
    }

    mod roundtrip_props {
        use super::*;
        use proptest::prelude::*;

        fn text() -> impl Strategy<Value = String> {
            prop_oneof![
                Just("line\u{2028}para\u{2029}".to_owned()),
                "\\PC{0,40}",
                any::<String>(),
            ]
        }

        fn finite_double() -> impl Strategy<Value = f64> {
            any::<f64>().prop_filter("finite", |d| d.is_finite())
        }

        fn dynamic_value() -> impl Strategy<Value = DynamicValue> {
            let leaf = prop_oneof![
                Just(DynamicValue::Null),
                any::<bool>().prop_map(DynamicValue::Bool),
                any::<i64>().prop_map(DynamicValue::Int),
                finite_double().prop_map(DynamicValue::Double),
                text().prop_map(DynamicValue::String),
            ];
            leaf.prop_recursive(4, 64, 8, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..6).prop_map(DynamicValue::Array),
                    prop::collection::btree_map(text(), inner, 0..6).prop_map(DynamicValue::Object),
                ]
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                .. ProptestConfig::default()
            })]

            #[test]
            fn decode_reverses_encode(value in dynamic_value()) {
                let text = value.encode().unwrap();
                prop_assert_eq!(DynamicValue::decode(&text).unwrap(), value);
            }

            #[test]
            fn doubles_keep_every_bit(d in finite_double()) {
                let text = DynamicValue::Double(d).encode().unwrap();
                let back = DynamicValue::decode(&text).unwrap();
                prop_assert_eq!(back.as_double().map(f64::to_bits), Some(d.to_bits()));
            }
        }
    }
}
