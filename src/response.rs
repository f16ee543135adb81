//! RPC/literal response binding.
//!
//! The mirror of request binding: the controller's return value is walked
//! against the declared return type and turned into anonymous wire records.
//! An object reached twice yields the same record.

use crate::binder::ResponseMessageBinder;
use crate::definition::Method;
use crate::error::BindError;
use crate::types::{ArrayOfType, ComplexType, SimpleType, Type, TypeRepository};
use crate::value::{DomainValue, ObjectRef, WireRecord, WireValue};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Binds RPC/literal responses from the `return` part of a method.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcLiteralResponseMessageBinder;

impl ResponseMessageBinder for RpcLiteralResponseMessageBinder {
    fn process_message(
        &self,
        method: &Method,
        value: &DomainValue,
        repository: &TypeRepository,
    ) -> Result<WireValue, BindError> {
        let Some(return_type) = method.return_type() else {
            return Err(BindError::InvalidArgument(format!(
                "The method \"{}\" does not declare a return type.",
                method.name()
            )));
        };

        let wire = ResponseBinding::new(repository)
            .process_message(return_type, value)
            .inspect_err(|e| {
                warn!(method = method.name(), error = %e, "Response binding failed")
            })?;

        debug!(method = method.name(), return_type, "Response bound");
        Ok(wire)
    }
}

/// State of a single response binding: the object-to-record table.
pub(crate) struct ResponseBinding<'a> {
    repository: &'a TypeRepository,
    // The object is kept alive so its identity cannot be reused
    refs: HashMap<usize, (ObjectRef, WireRecord)>,
}

impl<'a> ResponseBinding<'a> {
    pub(crate) fn new(repository: &'a TypeRepository) -> Self {
        Self {
            repository,
            refs: HashMap::new(),
        }
    }

    /// Bind a top-level value. A null return stays null.
    pub(crate) fn process_message(
        &mut self,
        type_name: &str,
        value: &DomainValue,
    ) -> Result<WireValue, BindError> {
        if value.is_null() {
            return Ok(WireValue::Null);
        }
        self.process_type(type_name, value)
    }

    fn process_type(&mut self, type_name: &str, value: &DomainValue) -> Result<WireValue, BindError> {
        let repository = self.repository;
        let resolved = repository.get_type(type_name)?;
        match resolved.as_ref() {
            Type::ArrayOf(array) => self.process_array(array, value),
            Type::Complex(complex) => self.check_complex_type(complex, value),
            Type::Simple(simple) => self.process_simple(simple, value),
        }
    }

    fn process_array(&mut self, array: &ArrayOfType, value: &DomainValue) -> Result<WireValue, BindError> {
        let repository = self.repository;
        let item_type = repository.get_type(array.item_type())?;
        let complex = item_type.as_complex();

        let expanded;
        let items: Vec<&DomainValue> = match value {
            DomainValue::Null => Vec::new(),
            DomainValue::List(items) => items.iter().collect(),
            DomainValue::Map(pairs) => match complex.filter(|c| c.is_key_value()) {
                Some(complex) => {
                    expanded = expand_key_values(complex, pairs)?;
                    expanded.iter().collect()
                }
                None => pairs.iter().map(|(_, value)| value).collect(),
            },
            other => {
                return Err(BindError::InvalidArgument(format!(
                    "\"{}\" expects a sequence, {} given.",
                    array.php_type(),
                    other.kind()
                )))
            }
        };

        let mut wire = Vec::with_capacity(items.len());
        for item in items {
            wire.push(match (complex, item) {
                (_, DomainValue::Null) => WireValue::Null,
                (Some(complex), item) => self.check_complex_type(complex, item)?,
                (None, item) => self.process_type(array.item_type(), item)?,
            });
        }

        Ok(WireValue::List(wire))
    }

    fn check_complex_type(
        &mut self,
        complex: &ComplexType,
        value: &DomainValue,
    ) -> Result<WireValue, BindError> {
        let object = match value {
            DomainValue::Object(object) if complex.is_instance(object) => object,
            DomainValue::Object(object) => {
                return Err(BindError::instance_mismatch(
                    complex.php_type(),
                    &object.class_name(),
                ))
            }
            other => return Err(BindError::instance_mismatch(complex.php_type(), other.kind())),
        };

        if let Some((_, record)) = self.refs.get(&object.identity()) {
            return Ok(WireValue::Record(record.clone()));
        }

        let record = WireRecord::new();
        self.refs
            .insert(object.identity(), (object.clone(), record.clone()));

        for field in complex.fields() {
            let value = field.read(object)?;
            if value.is_null() {
                if !field.is_nillable() {
                    return Err(BindError::null_field(complex.php_type(), field.name()));
                }
                record.set(field.name(), WireValue::Null);
                continue;
            }

            let wire = self.process_type(field.type_name(), &value)?;
            record.set(field.name(), wire);
        }

        Ok(WireValue::Record(record))
    }

    fn process_simple(&mut self, simple: &SimpleType, value: &DomainValue) -> Result<WireValue, BindError> {
        match self.repository.converter_for(simple) {
            Some(converter) if !value.is_null() => {
                converter.convert_domain_to_xml(value).map(WireValue::String)
            }
            _ => value.to_wire(),
        }
    }
}

/// Turn an associative map into fresh key/value objects.
fn expand_key_values(
    complex: &ComplexType,
    pairs: &IndexMap<String, DomainValue>,
) -> Result<Vec<DomainValue>, BindError> {
    let (Some(key_field), Some(value_field)) = (complex.get("key"), complex.get("value")) else {
        return Err(BindError::Config(format!(
            "Key/value type \"{}\" has no key or value field",
            complex.php_type()
        )));
    };

    pairs
        .iter()
        .map(|(key, value)| {
            let object = complex.instantiate();
            key_field.write(&object, DomainValue::String(key.clone()))?;
            value_field.write(&object, value.clone())?;
            Ok(DomainValue::Object(object))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ITEM;

    #[derive(Debug, Default)]
    struct Foo {
        bar: String,
        baz: Option<i64>,
    }

    #[derive(Debug, Default)]
    struct Other;

    fn repository() -> TypeRepository {
        let mut repository = TypeRepository::with_defaults();
        repository.add_complex_type(
            ComplexType::builder::<Foo>("Foo")
                .property("bar", "string", |f| &f.bar, |f| &mut f.bar)
                .property("baz", "int", |f| &f.baz, |f| &mut f.baz)
                .nillable()
                .build()
                .unwrap(),
        );
        repository
    }

    fn bind(return_type: &str, value: &DomainValue) -> Result<WireValue, BindError> {
        let method = Method::new("m", "c").with_output(return_type);
        RpcLiteralResponseMessageBinder.process_message(&method, value, &repository())
    }

    #[test]
    fn test_complex_return() {
        let foo = ObjectRef::new(Foo {
            bar: "hello".into(),
            baz: None,
        });
        let wire = bind("Foo", &DomainValue::Object(foo)).unwrap();
        assert_eq!(wire.member("bar"), Some(WireValue::from("hello")));
        assert_eq!(wire.member("baz"), Some(WireValue::Null));
        assert_eq!(wire.member(ITEM), None);
    }

    #[test]
    fn test_instance_mismatch() {
        let err = bind("Foo", &DomainValue::Object(ObjectRef::new(Other))).unwrap_err();
        assert!(!err.is_fault());
        assert!(err.to_string().contains("The instance class must be \"Foo\""));

        let err = bind("Foo", &DomainValue::Int(1)).unwrap_err();
        assert!(err.to_string().contains("\"integer\" given"));
    }

    #[test]
    fn test_primitive_array() {
        let value = DomainValue::List(vec![DomainValue::Int(1), DomainValue::Int(2)]);
        let wire = bind("int[]", &value).unwrap();
        assert_eq!(wire, WireValue::List(vec![WireValue::Int(1), WireValue::Int(2)]));

        assert!(bind("int[]", &DomainValue::Int(1)).is_err());
    }

    #[test]
    fn test_null_return() {
        assert_eq!(bind("Foo", &DomainValue::Null).unwrap(), WireValue::Null);
    }

    #[test]
    fn test_missing_return_type() {
        let method = Method::new("m", "c");
        let err = RpcLiteralResponseMessageBinder
            .process_message(&method, &DomainValue::Int(1), &repository())
            .unwrap_err();
        assert!(matches!(err, BindError::InvalidArgument(_)));
    }

    #[test]
    fn test_converted_date_time() {
        let dt = chrono::DateTime::parse_from_rfc3339("2002-10-10T12:00:00-05:00").unwrap();
        let wire = bind("dateTime", &DomainValue::DateTime(dt)).unwrap();
        assert_eq!(
            wire,
            WireValue::from("<dateTime>2002-10-10T12:00:00-05:00</dateTime>")
        );
    }
}
