//! Wire and domain value models.
//!
//! Wire values are the schema-less trees handed over by the SOAP engine:
//! scalars, sequences and anonymous records. Domain values are what
//! controllers work with: scalars, collections and shared handles to typed
//! objects. Both records and objects carry an identity so that shared and
//! cyclic graphs survive a conversion.

use crate::error::BindError;
use chrono::{DateTime, FixedOffset, NaiveDate};
use indexmap::IndexMap;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::thread::LocalKey;

/// Name of the member carrying the elements of an array on the wire.
pub const ITEM: &str = "item";

/// A value as decoded from (or encoded to) a SOAP message.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum WireValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<WireValue>),
    Record(WireRecord),
}

impl WireValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Read a member of a record by name.
    pub fn member(&self, name: &str) -> Option<WireValue> {
        match self {
            Self::Record(record) => record.get(name),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&WireRecord> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Normalize the cardinality of a repeated element.
    ///
    /// Serializers collapse a single-element array to the element itself, so
    /// a lone value is treated as a one-element sequence and null as none.
    pub fn into_items(self) -> Vec<WireValue> {
        match self {
            Self::List(items) => items,
            Self::Null => Vec::new(),
            other => vec![other],
        }
    }

    /// Short description of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "sequence",
            Self::Record(_) => "record",
        }
    }

    /// Pass a primitive through into the domain model unchanged.
    ///
    /// Records without a schema become ordered maps.
    pub fn into_domain(self) -> DomainValue {
        match self {
            Self::Null => DomainValue::Null,
            Self::Bool(b) => DomainValue::Bool(b),
            Self::Int(i) => DomainValue::Int(i),
            Self::Float(f) => DomainValue::Float(f),
            Self::String(s) => DomainValue::String(s),
            Self::List(items) => {
                DomainValue::List(items.into_iter().map(WireValue::into_domain).collect())
            }
            Self::Record(record) => DomainValue::Map(
                record
                    .entries()
                    .into_iter()
                    .map(|(name, value)| (name, value.into_domain()))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for WireValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<WireRecord> for WireValue {
    fn from(value: WireRecord) -> Self {
        Self::Record(value)
    }
}

impl From<Vec<WireValue>> for WireValue {
    fn from(value: Vec<WireValue>) -> Self {
        Self::List(value)
    }
}

/// An anonymous, ordered key/value record.
///
/// Cloning a record yields another handle to the same record, which is how
/// a message encodes shared (and possibly cyclic) references.
#[derive(Clone, Default)]
pub struct WireRecord(Rc<RefCell<IndexMap<String, WireValue>>>);

impl WireRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from name/value pairs.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<WireValue>,
    {
        let record = Self::new();
        for (name, value) in fields {
            record.set(name, value);
        }
        record
    }

    pub fn get(&self, name: &str) -> Option<WireValue> {
        self.0.borrow().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    /// Set a member, keeping its position if it already exists.
    pub fn set(&self, name: impl Into<String>, value: impl Into<WireValue>) {
        self.0.borrow_mut().insert(name.into(), value.into());
    }

    pub fn remove(&self, name: &str) -> Option<WireValue> {
        self.0.borrow_mut().shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, WireValue)> {
        self.0
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Whether both handles point at the same record.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity token, stable while the record is alive.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

thread_local! {
    static EQ_PATH: RefCell<Vec<(usize, usize)>> = const { RefCell::new(Vec::new()) };
    static DEBUG_PATH: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    static SERIALIZE_PATH: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a record as entered by a recursive walk until dropped.
struct PathGuard<T: PartialEq + 'static> {
    path: &'static LocalKey<RefCell<Vec<T>>>,
}

impl<T: PartialEq + 'static> PathGuard<T> {
    /// Returns `None` when `node` is already on the path.
    fn enter(path: &'static LocalKey<RefCell<Vec<T>>>, node: T) -> Option<Self> {
        path.with(|nodes| {
            let mut nodes = nodes.borrow_mut();
            if nodes.contains(&node) {
                return None;
            }
            nodes.push(node);
            Some(Self { path })
        })
    }
}

impl<T: PartialEq + 'static> Drop for PathGuard<T> {
    fn drop(&mut self) {
        self.path.with(|nodes| {
            nodes.borrow_mut().pop();
        });
    }
}

/// Structural, order-sensitive equality. A pair of records met again on the
/// current path compares equal, so cyclic graphs of the same shape are equal.
impl PartialEq for WireRecord {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let Some(_guard) = PathGuard::enter(&EQ_PATH, (self.identity(), other.identity())) else {
            return true;
        };

        let (left, right) = (self.0.borrow(), other.0.borrow());
        left.len() == right.len()
            && left
                .iter()
                .zip(right.iter())
                .all(|((lk, lv), (rk, rv))| lk == rk && lv == rv)
    }
}

impl fmt::Debug for WireRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_guard) = PathGuard::enter(&DEBUG_PATH, self.identity()) else {
            return write!(f, "<cycle @ {:#x}>", self.identity());
        };
        f.debug_map().entries(self.0.borrow().iter()).finish()
    }
}

impl Serialize for WireValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Record(record) => {
                let Some(_guard) = PathGuard::enter(&SERIALIZE_PATH, record.identity()) else {
                    return Err(ser::Error::custom(format!(
                        "cyclic record @ {:#x} cannot be serialized",
                        record.identity()
                    )));
                };
                let fields = record.0.borrow();
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields.iter() {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

struct WireValueVisitor;

impl<'de> Visitor<'de> for WireValueVisitor {
    type Value = WireValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a SOAP message value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<WireValue, E> {
        Ok(WireValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<WireValue, E> {
        Ok(WireValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<WireValue, E> {
        i64::try_from(v)
            .map(WireValue::Int)
            .map_err(|_| E::custom(format!("integer {} is out of range", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<WireValue, E> {
        Ok(WireValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<WireValue, E> {
        Ok(WireValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<WireValue, E> {
        Ok(WireValue::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<WireValue, D::Error> {
        WireValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WireValue, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(WireValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<WireValue, A::Error> {
        let record = WireRecord::new();
        while let Some((key, value)) = map.next_entry::<String, WireValue>()? {
            record.set(key, value);
        }
        Ok(WireValue::Record(record))
    }
}

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(WireValueVisitor)
    }
}

/// A value in the controller's domain model.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DomainValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    List(Vec<DomainValue>),
    /// Associative array with string keys, in insertion order
    Map(IndexMap<String, DomainValue>),
    Object(ObjectRef),
}

impl DomainValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Short description of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::DateTime(_) => "dateTime",
            Self::List(_) => "sequence",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
        }
    }

    /// Key of an associative array entry.
    pub fn to_key(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            _ => None,
        }
    }

    /// Pass a primitive through onto the wire.
    pub fn to_wire(&self) -> Result<WireValue, BindError> {
        Ok(match self {
            Self::Null => WireValue::Null,
            Self::Bool(b) => WireValue::Bool(*b),
            Self::Int(i) => WireValue::Int(*i),
            Self::Float(f) => WireValue::Float(*f),
            Self::String(s) => WireValue::String(s.clone()),
            Self::Date(d) => WireValue::String(d.format("%Y-%m-%d").to_string()),
            Self::DateTime(dt) => WireValue::String(dt.to_rfc3339()),
            Self::List(items) => WireValue::List(
                items
                    .iter()
                    .map(DomainValue::to_wire)
                    .collect::<Result<_, _>>()?,
            ),
            Self::Map(pairs) => {
                let record = WireRecord::new();
                for (key, value) in pairs {
                    record.set(key.clone(), value.to_wire()?);
                }
                WireValue::Record(record)
            }
            Self::Object(object) => {
                return Err(BindError::InvalidArgument(format!(
                    "An instance of \"{}\" cannot be sent as a simple type.",
                    object.class_name()
                )))
            }
        })
    }
}

impl From<ObjectRef> for DomainValue {
    fn from(value: ObjectRef) -> Self {
        Self::Object(value)
    }
}

/// Shared handle to a domain object.
///
/// The object lives in an `Rc<RefCell<T>>`; the handle erases `T` so the
/// binders can carry objects of any registered type. Equality is identity.
#[derive(Clone)]
pub struct ObjectRef {
    inner: Rc<dyn Any>,
    type_name: &'static str,
}

impl ObjectRef {
    pub fn new<T: 'static>(value: T) -> Self {
        Self::from_rc(Rc::new(RefCell::new(value)))
    }

    pub fn from_rc<T: 'static>(rc: Rc<RefCell<T>>) -> Self {
        Self {
            inner: rc,
            type_name: type_name::<T>(),
        }
    }

    pub fn is<T: 'static>(&self) -> bool {
        (*self.inner).is::<RefCell<T>>()
    }

    pub fn downcast<T: 'static>(&self) -> Option<Rc<RefCell<T>>> {
        self.inner.clone().downcast::<RefCell<T>>().ok()
    }

    /// Rust type name of the wrapped object.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Declared class of the object: the configured name for dynamic
    /// objects, the Rust type name otherwise.
    pub fn class_name(&self) -> String {
        self.downcast::<DynamicObject>()
            .and_then(|object| {
                object
                    .try_borrow()
                    .ok()
                    .map(|object| object.type_name().to_string())
            })
            .unwrap_or_else(|| self.type_name.to_string())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }

    /// Identity token, stable while the object is alive.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({} @ {:#x})", self.type_name, self.identity())
    }
}

/// Domain object for complex types declared in configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicObject {
    type_name: String,
    fields: IndexMap<String, DomainValue>,
}

impl DynamicObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, name: &str) -> Option<&DomainValue> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: DomainValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn fields(&self) -> &IndexMap<String, DomainValue> {
        &self.fields
    }
}

/// Conversion between a Rust field type and [`DomainValue`].
pub trait DomainField: Sized {
    fn to_domain(&self) -> DomainValue;
    fn from_domain(value: DomainValue) -> Result<Self, BindError>;
}

fn mismatch(expected: &str, value: &DomainValue) -> BindError {
    BindError::InvalidArgument(format!("Expected {}, {} given.", expected, value.kind()))
}

impl DomainField for DomainValue {
    fn to_domain(&self) -> DomainValue {
        self.clone()
    }

    fn from_domain(value: DomainValue) -> Result<Self, BindError> {
        Ok(value)
    }
}

impl DomainField for String {
    fn to_domain(&self) -> DomainValue {
        DomainValue::String(self.clone())
    }

    fn from_domain(value: DomainValue) -> Result<Self, BindError> {
        match value {
            DomainValue::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl DomainField for bool {
    fn to_domain(&self) -> DomainValue {
        DomainValue::Bool(*self)
    }

    fn from_domain(value: DomainValue) -> Result<Self, BindError> {
        match value {
            DomainValue::Bool(b) => Ok(b),
            other => Err(mismatch("boolean", &other)),
        }
    }
}

macro_rules! integer_field {
    ($($t:ty),*) => {
        $(
            impl DomainField for $t {
                fn to_domain(&self) -> DomainValue {
                    DomainValue::Int(i64::from(*self))
                }

                fn from_domain(value: DomainValue) -> Result<Self, BindError> {
                    match value {
                        DomainValue::Int(i) => <$t>::try_from(i).map_err(|_| {
                            BindError::InvalidArgument(format!(
                                "Integer {} is out of range for {}.",
                                i,
                                stringify!($t)
                            ))
                        }),
                        other => Err(mismatch(stringify!($t), &other)),
                    }
                }
            }
        )*
    };
}

integer_field!(i8, i16, i32, i64, u8, u16, u32);

impl DomainField for f64 {
    fn to_domain(&self) -> DomainValue {
        DomainValue::Float(*self)
    }

    fn from_domain(value: DomainValue) -> Result<Self, BindError> {
        match value {
            DomainValue::Float(f) => Ok(f),
            DomainValue::Int(i) => Ok(i as f64),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl DomainField for NaiveDate {
    fn to_domain(&self) -> DomainValue {
        DomainValue::Date(*self)
    }

    fn from_domain(value: DomainValue) -> Result<Self, BindError> {
        match value {
            DomainValue::Date(d) => Ok(d),
            DomainValue::DateTime(dt) => Ok(dt.date_naive()),
            other => Err(mismatch("date", &other)),
        }
    }
}

impl DomainField for DateTime<FixedOffset> {
    fn to_domain(&self) -> DomainValue {
        DomainValue::DateTime(*self)
    }

    fn from_domain(value: DomainValue) -> Result<Self, BindError> {
        match value {
            DomainValue::DateTime(dt) => Ok(dt),
            other => Err(mismatch("dateTime", &other)),
        }
    }
}

impl<T: DomainField> DomainField for Option<T> {
    fn to_domain(&self) -> DomainValue {
        match self {
            Some(value) => value.to_domain(),
            None => DomainValue::Null,
        }
    }

    fn from_domain(value: DomainValue) -> Result<Self, BindError> {
        match value {
            DomainValue::Null => Ok(None),
            other => T::from_domain(other).map(Some),
        }
    }
}

impl<T: DomainField> DomainField for Vec<T> {
    fn to_domain(&self) -> DomainValue {
        DomainValue::List(self.iter().map(DomainField::to_domain).collect())
    }

    fn from_domain(value: DomainValue) -> Result<Self, BindError> {
        match value {
            DomainValue::List(items) => items.into_iter().map(T::from_domain).collect(),
            other => Err(mismatch("sequence", &other)),
        }
    }
}

impl<T: DomainField> DomainField for BTreeMap<String, T> {
    fn to_domain(&self) -> DomainValue {
        DomainValue::Map(
            self.iter()
                .map(|(key, value)| (key.clone(), value.to_domain()))
                .collect(),
        )
    }

    fn from_domain(value: DomainValue) -> Result<Self, BindError> {
        match value {
            DomainValue::Map(pairs) => pairs
                .into_iter()
                .map(|(key, value)| Ok((key, T::from_domain(value)?)))
                .collect(),
            other => Err(mismatch("map", &other)),
        }
    }
}

impl<T: DomainField> DomainField for HashMap<String, T> {
    fn to_domain(&self) -> DomainValue {
        let mut pairs: Vec<_> = self
            .iter()
            .map(|(key, value)| (key.clone(), value.to_domain()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        DomainValue::Map(pairs.into_iter().collect())
    }

    fn from_domain(value: DomainValue) -> Result<Self, BindError> {
        match value {
            DomainValue::Map(pairs) => pairs
                .into_iter()
                .map(|(key, value)| Ok((key, T::from_domain(value)?)))
                .collect(),
            other => Err(mismatch("map", &other)),
        }
    }
}

impl DomainField for ObjectRef {
    fn to_domain(&self) -> DomainValue {
        DomainValue::Object(self.clone())
    }

    fn from_domain(value: DomainValue) -> Result<Self, BindError> {
        match value {
            DomainValue::Object(object) => Ok(object),
            other => Err(mismatch("object", &other)),
        }
    }
}

impl<T: 'static> DomainField for Rc<RefCell<T>> {
    fn to_domain(&self) -> DomainValue {
        DomainValue::Object(ObjectRef::from_rc(self.clone()))
    }

    fn from_domain(value: DomainValue) -> Result<Self, BindError> {
        match value {
            DomainValue::Object(object) => object.downcast::<T>().ok_or_else(|| {
                BindError::instance_mismatch(type_name::<T>(), &object.class_name())
            }),
            other => Err(mismatch(type_name::<T>(), &other)),
        }
    }
}
