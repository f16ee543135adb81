//! RPC/literal request binding.
//!
//! Walks the wire values of a request against the declared argument types
//! and builds the domain graph. Records seen twice in one message map to the
//! same domain object, so shared and cyclic structures survive binding.

use crate::binder::{Arguments, RequestHeaderMessageBinder, RequestMessageBinder};
use crate::definition::Method;
use crate::error::{BindError, FaultCode, SoapFault};
use crate::types::{ArrayOfType, ComplexType, SimpleType, Type, TypeRepository};
use crate::value::{DomainValue, ObjectRef, WireRecord, WireValue, ITEM};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Binds RPC/literal request bodies: one wire value per input argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcLiteralRequestMessageBinder;

impl RequestMessageBinder for RpcLiteralRequestMessageBinder {
    fn process_message(
        &self,
        method: &Method,
        message: &[WireValue],
        repository: &TypeRepository,
    ) -> Result<Arguments, BindError> {
        let mut binding = RequestBinding::new(repository);
        let mut arguments = Arguments::new();

        // Missing trailing arguments are omitted
        for (part, value) in method.input().all().iter().zip(message) {
            if value.is_null() {
                continue;
            }
            let bound = binding
                .process_type(part.type_name(), value.clone())
                .inspect_err(|e| {
                    warn!(method = method.name(), argument = part.name(), error = %e, "Request binding failed")
                })?;
            arguments.insert(part.name(), bound);
        }

        debug!(
            method = method.name(),
            declared = method.input().len(),
            bound = arguments.len(),
            "Request bound"
        );

        Ok(arguments)
    }
}

/// Binds a request header by its declared type.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcLiteralRequestHeaderMessageBinder;

impl RequestHeaderMessageBinder for RpcLiteralRequestHeaderMessageBinder {
    fn process_header(
        &self,
        method: &Method,
        header: &str,
        data: WireValue,
        repository: &TypeRepository,
    ) -> Result<DomainValue, BindError> {
        let part = method
            .header(header)
            .ok_or_else(|| BindError::HeaderNotFound {
                method: method.name().to_string(),
                header: header.to_string(),
            })?;

        if data.is_null() {
            return Ok(DomainValue::Null);
        }

        RequestBinding::new(repository).process_type(part.type_name(), data)
    }
}

/// State of a single request binding: the record-to-object table.
pub(crate) struct RequestBinding<'a> {
    repository: &'a TypeRepository,
    // The record is kept alive so its identity cannot be reused
    refs: HashMap<usize, (WireRecord, ObjectRef)>,
}

impl<'a> RequestBinding<'a> {
    pub(crate) fn new(repository: &'a TypeRepository) -> Self {
        Self {
            repository,
            refs: HashMap::new(),
        }
    }

    pub(crate) fn process_type(
        &mut self,
        type_name: &str,
        value: WireValue,
    ) -> Result<DomainValue, BindError> {
        let repository = self.repository;
        let resolved = repository.get_type(type_name)?;
        match resolved.as_ref() {
            Type::ArrayOf(array) => self.process_array(array, value),
            Type::Complex(complex) => self.check_complex_type(complex, value),
            Type::Simple(simple) => self.process_simple(simple, value),
        }
    }

    fn process_array(
        &mut self,
        array: &ArrayOfType,
        value: WireValue,
    ) -> Result<DomainValue, BindError> {
        let repository = self.repository;
        let item_type = repository.get_type(array.item_type())?;

        let items = match value {
            WireValue::Record(record) => record.get(ITEM).unwrap_or_default().into_items(),
            WireValue::List(items) => items,
            _ => Vec::new(),
        };

        let Some(complex) = item_type.as_complex() else {
            let bound = items
                .into_iter()
                .map(|item| match item {
                    WireValue::Null => Ok(DomainValue::Null),
                    item => self.process_type(array.item_type(), item),
                })
                .collect::<Result<_, _>>()?;
            return Ok(DomainValue::List(bound));
        };

        let mut bound = Vec::with_capacity(items.len());
        for item in items {
            bound.push(match item {
                WireValue::Null => DomainValue::Null,
                item => self.check_complex_type(complex, item)?,
            });
        }

        if complex.is_key_value() {
            return collapse_key_values(complex, bound);
        }

        Ok(DomainValue::List(bound))
    }

    fn check_complex_type(
        &mut self,
        complex: &ComplexType,
        value: WireValue,
    ) -> Result<DomainValue, BindError> {
        let record = match value {
            WireValue::Record(record) => record,
            other => {
                return Err(client_fault(format!(
                    "\"{}\" expects a record, {} given.",
                    complex.php_type(),
                    other.kind()
                )))
            }
        };

        if let Some((_, object)) = self.refs.get(&record.identity()) {
            return Ok(DomainValue::Object(object.clone()));
        }

        let object = complex.instantiate();
        self.refs
            .insert(record.identity(), (record.clone(), object.clone()));

        for field in complex.fields() {
            let bound = match record.get(field.name()) {
                Some(member) if !member.is_null() => self.process_type(field.type_name(), member)?,
                _ => DomainValue::Null,
            };

            // Scalar keys are stringified, as an associative array would
            let string_key =
                complex.is_key_value() && field.name() == "key" && field.type_name() == "string";
            let bound = if string_key {
                bound.to_key().map_or(bound, DomainValue::String)
            } else {
                bound
            };

            if bound.is_null() {
                if !field.is_nillable() {
                    return Err(BindError::complex_type_violation(
                        complex.php_type(),
                        field.name(),
                    ));
                }
                continue;
            }

            field.write(&object, bound).map_err(|e| match e {
                BindError::InvalidArgument(message) => client_fault(format!(
                    "\"{}:{}\": {}",
                    complex.php_type(),
                    field.name(),
                    message
                )),
                other => other,
            })?;
        }

        Ok(DomainValue::Object(object))
    }

    fn process_simple(
        &mut self,
        simple: &SimpleType,
        value: WireValue,
    ) -> Result<DomainValue, BindError> {
        match (self.repository.converter_for(simple), value) {
            (Some(converter), WireValue::String(xml)) => converter
                .convert_xml_to_domain(&xml)
                .map_err(|e| client_fault(e.to_string())),
            (_, value) => Ok(value.into_domain()),
        }
    }
}

/// Turn a sequence of key/value objects into an associative map.
fn collapse_key_values(
    complex: &ComplexType,
    pairs: Vec<DomainValue>,
) -> Result<DomainValue, BindError> {
    let (Some(key_field), Some(value_field)) = (complex.get("key"), complex.get("value")) else {
        return Err(BindError::Config(format!(
            "Key/value type \"{}\" has no key or value field",
            complex.php_type()
        )));
    };

    let mut map = IndexMap::with_capacity(pairs.len());
    for pair in pairs {
        let Some(object) = pair.as_object() else {
            return Err(client_fault(format!(
                "\"{}\" entries cannot be null.",
                complex.php_type()
            )));
        };

        let key = key_field.read(object)?;
        let key = key.to_key().ok_or_else(|| {
            client_fault(format!(
                "\"{}:key\" must be a scalar, {} given.",
                complex.php_type(),
                key.kind()
            ))
        })?;
        let value = value_field.read(object)?;

        // A repeated key keeps its first position and takes the last value
        map.insert(key, value);
    }

    Ok(DomainValue::Map(map))
}

fn client_fault(message: String) -> BindError {
    BindError::Fault(SoapFault::new(FaultCode::Client, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Foo {
        bar: String,
        baz: Option<i64>,
    }

    fn repository() -> TypeRepository {
        let mut repository = TypeRepository::with_defaults();
        repository.add_complex_type(
            ComplexType::builder::<Foo>("foo")
                .property("bar", "string", |f| &f.bar, |f| &mut f.bar)
                .property("baz", "int", |f| &f.baz, |f| &mut f.baz)
                .nillable()
                .build()
                .unwrap(),
        );
        repository
    }

    fn record(fields: Vec<(&str, WireValue)>) -> WireValue {
        WireValue::Record(WireRecord::from_fields(fields))
    }

    #[test]
    fn test_primitive_arguments() {
        let method = Method::new("add", "math:add")
            .with_input("a", "int")
            .with_input("b", "int");
        let arguments = RpcLiteralRequestMessageBinder
            .process_message(
                &method,
                &[WireValue::Int(1), WireValue::Int(2)],
                &repository(),
            )
            .unwrap();
        assert_eq!(arguments.get("a"), Some(&DomainValue::Int(1)));
        assert_eq!(arguments.get("b"), Some(&DomainValue::Int(2)));
    }

    #[test]
    fn test_null_and_missing_arguments_are_omitted() {
        let method = Method::new("m", "c")
            .with_input("a", "string")
            .with_input("b", "string")
            .with_input("c", "string");
        let arguments = RpcLiteralRequestMessageBinder
            .process_message(&method, &[WireValue::Null, WireValue::from("b")], &repository())
            .unwrap();
        assert_eq!(arguments.names(), vec!["b"]);
    }

    #[test]
    fn test_string_array() {
        let method = Method::new("m", "c").with_input("foo", "string[]");
        let message = record(vec![(
            ITEM,
            WireValue::List(vec!["foo".into(), "bar".into(), "barfoo".into()]),
        )]);
        let arguments = RpcLiteralRequestMessageBinder
            .process_message(&method, &[message], &repository())
            .unwrap();
        assert_eq!(
            arguments.get("foo"),
            Some(&DomainValue::List(vec![
                DomainValue::String("foo".into()),
                DomainValue::String("bar".into()),
                DomainValue::String("barfoo".into()),
            ]))
        );
    }

    #[test]
    fn test_array_without_item_is_empty() {
        let method = Method::new("m", "c").with_input("foo", "foo[]");
        let arguments = RpcLiteralRequestMessageBinder
            .process_message(&method, &[record(vec![])], &repository())
            .unwrap();
        assert_eq!(arguments.get("foo"), Some(&DomainValue::List(vec![])));
    }

    #[test]
    fn test_complex_type_violation() {
        let method = Method::new("m", "c").with_input("foo", "foo");
        let err = RpcLiteralRequestMessageBinder
            .process_message(&method, &[record(vec![("baz", 1i64.into())])], &repository())
            .unwrap_err();
        assert!(err.is_fault());
        assert_eq!(err.to_fault().message, "\"Foo:bar\" cannot be null.");
    }

    #[test]
    fn test_scalar_for_complex_type_is_client_fault() {
        let method = Method::new("m", "c").with_input("foo", "foo");
        let err = RpcLiteralRequestMessageBinder
            .process_message(&method, &[WireValue::from("oops")], &repository())
            .unwrap_err();
        assert_eq!(err.to_fault().code, FaultCode::Client);
    }

    #[test]
    fn test_mistyped_field_is_client_fault() {
        let method = Method::new("m", "c").with_input("foo", "foo");
        let message = record(vec![("bar", "x".into()), ("baz", "not a number".into())]);
        let err = RpcLiteralRequestMessageBinder
            .process_message(&method, &[message], &repository())
            .unwrap_err();
        assert_eq!(err.to_fault().code, FaultCode::Client);
        assert!(err.to_fault().message.starts_with("\"foo:baz\""));
    }

    #[test]
    fn test_unknown_type() {
        let method = Method::new("m", "c").with_input("x", "Nope");
        let err = RpcLiteralRequestMessageBinder
            .process_message(&method, &[WireValue::Int(1)], &repository())
            .unwrap_err();
        assert!(matches!(err, BindError::UnknownType(_)));
    }

    #[test]
    fn test_converted_date() {
        let method = Method::new("m", "c").with_input("when", "date");
        let arguments = RpcLiteralRequestMessageBinder
            .process_message(&method, &[WireValue::from("<date>2012-01-31</date>")], &repository())
            .unwrap();
        assert!(matches!(arguments.get("when"), Some(DomainValue::Date(_))));
    }

    #[test]
    fn test_header_binding() {
        let method = Method::new("m", "c").with_header("auth", "foo");
        let data = record(vec![("bar", "token".into())]);
        let bound = RpcLiteralRequestHeaderMessageBinder
            .process_header(&method, "auth", data, &repository())
            .unwrap();
        let foo = bound.as_object().unwrap().downcast::<Foo>().unwrap();
        assert_eq!(foo.borrow().bar, "token");

        let err = RpcLiteralRequestHeaderMessageBinder
            .process_header(&method, "other", WireValue::Null, &repository())
            .unwrap_err();
        assert!(matches!(err, BindError::HeaderNotFound { .. }));
    }
}
