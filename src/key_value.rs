//! Key/value marker types.
//!
//! An array of a key/value type travels as a sequence of `{key, value}`
//! records and is bound to an associative map on the domain side.

use crate::error::BindError;
use crate::types::{ComplexType, TypeRepository};
use crate::value::DomainField;
use chrono::{DateTime, FixedOffset, NaiveDate};

/// A single key/value pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyValue<V> {
    pub key: String,
    pub value: V,
}

impl<V> KeyValue<V> {
    pub fn new(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Build a key/value complex type whose `value` field has type `value_type`.
pub fn key_value_type<V>(php_type: &str, value_type: &str) -> Result<ComplexType, BindError>
where
    V: DomainField + Default + 'static,
{
    ComplexType::builder::<KeyValue<V>>(php_type)
        .property("key", "string", |kv| &kv.key, |kv| &mut kv.key)
        .property("value", value_type, |kv| &kv.value, |kv| &mut kv.value)
        .key_value()
        .build()
}

/// Register the standard key/value types on a repository.
pub fn register_key_value_types(repository: &mut TypeRepository) -> Result<(), BindError> {
    repository.add_complex_type(key_value_type::<String>("KeyValue.String", "string")?);
    repository.add_complex_type(key_value_type::<i64>("KeyValue.Int", "int")?);
    repository.add_complex_type(key_value_type::<f64>("KeyValue.Float", "float")?);
    repository.add_complex_type(key_value_type::<bool>("KeyValue.Boolean", "boolean")?);
    repository.add_complex_type(key_value_type::<Option<NaiveDate>>("KeyValue.Date", "date")?);
    repository.add_complex_type(key_value_type::<Option<DateTime<FixedOffset>>>(
        "KeyValue.DateTime",
        "dateTime",
    )?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DomainValue;

    #[test]
    fn test_registered_types() {
        let mut repository = TypeRepository::with_defaults();
        register_key_value_types(&mut repository).unwrap();

        for name in [
            "KeyValue.String",
            "KeyValue.Int",
            "KeyValue.Float",
            "KeyValue.Boolean",
            "KeyValue.Date",
            "KeyValue.DateTime",
        ] {
            let found = repository.get_type(name).unwrap();
            let complex = found.as_complex().unwrap();
            assert!(complex.is_key_value(), "{} is not key/value", name);
            assert_eq!(complex.fields().len(), 2);
        }

        let array = repository.get_type("KeyValue.Int[]").unwrap();
        assert_eq!(array.xml_type(), "ArrayOfKeyValue.Int");
    }

    #[test]
    fn test_key_value_instance() {
        let complex = key_value_type::<i64>("KeyValue.Int", "int").unwrap();
        let object = complex.instantiate();
        complex
            .get("key")
            .unwrap()
            .write(&object, DomainValue::String("answer".into()))
            .unwrap();
        complex
            .get("value")
            .unwrap()
            .write(&object, DomainValue::Int(42))
            .unwrap();

        let pair = object.downcast::<KeyValue<i64>>().unwrap();
        assert_eq!(*pair.borrow(), KeyValue::new("answer", 42));
    }
}
