//! Schema-driven SOAP message binding.
//!
//! Converts between the schema-less values a SOAP engine decodes from the
//! wire and typed domain objects, guided by a service definition and a type
//! repository.
//!
//! # Features
//!
//! - RPC/literal and document/literal wrapped request and response binding
//! - `ArrayOf` types with single-element and multi-element encodings
//! - Key/value arrays bound to associative maps
//! - Shared and cyclic object graphs preserved in both directions
//! - Nillable field enforcement, reported as a SOAP fault on input
//! - `xsd:date` / `xsd:dateTime` converters
//! - Service definitions built in code or loaded from YAML
//!
//! # Example
//!
//! ```ignore
//! use zentinel_soap_binding::{Method, ServiceBinder, ServiceDefinition, TypeRepository};
//!
//! let mut definition = ServiceDefinition::new("Users", "urn:users", TypeRepository::with_defaults());
//! definition.add_method(Method::new("greet", "users:greet").with_input("name", "string"))?;
//!
//! let binder = ServiceBinder::new(definition);
//! let arguments = binder.process_service_method_arguments("greet", &["world".into()])?;
//! ```

pub mod binder;
pub mod config;
pub mod converter;
pub mod definition;
pub mod document_literal;
pub mod error;
pub mod key_value;
pub mod request;
pub mod response;
pub mod service_binder;
pub mod types;
pub mod value;

pub use binder::{
    Arguments, RequestHeaderMessageBinder, RequestMessageBinder, ResponseMessageBinder,
    CONTROLLER_KEY,
};
pub use config::{BindingStyle, BodyUse, ServiceConfig, SoapVersion};
pub use converter::{DateTimeTypeConverter, DateTypeConverter, TypeConverter};
pub use definition::{DefinitionOptions, Message, Method, Part, ServiceDefinition};
pub use document_literal::{
    DocumentLiteralWrappedRequestMessageBinder, DocumentLiteralWrappedResponseMessageBinder,
};
pub use error::{soap_fault_response, BindError, FaultCode, SoapFault};
pub use key_value::{register_key_value_types, KeyValue};
pub use request::{RpcLiteralRequestHeaderMessageBinder, RpcLiteralRequestMessageBinder};
pub use response::RpcLiteralResponseMessageBinder;
pub use service_binder::{ServiceBinder, SoapHeader};
pub use types::{ArrayOfType, ComplexType, Field, FieldAccess, SimpleType, Type, TypeRepository};
pub use value::{DomainField, DomainValue, DynamicObject, ObjectRef, WireRecord, WireValue};
