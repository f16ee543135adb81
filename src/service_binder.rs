//! Service-level binding.
//!
//! Looks methods and headers up in the [`ServiceDefinition`] and hands the
//! message to the binders matching the service's binding style.

use crate::binder::{
    Arguments, RequestHeaderMessageBinder, RequestMessageBinder, ResponseMessageBinder,
    CONTROLLER_KEY,
};
use crate::config::BindingStyle;
use crate::definition::{Method, ServiceDefinition};
use crate::document_literal::{
    DocumentLiteralWrappedRequestMessageBinder, DocumentLiteralWrappedResponseMessageBinder,
};
use crate::error::BindError;
use crate::request::{RpcLiteralRequestHeaderMessageBinder, RpcLiteralRequestMessageBinder};
use crate::response::RpcLiteralResponseMessageBinder;
use crate::value::{DomainValue, WireValue};
use std::fmt;
use tracing::{debug, warn};

/// A bound SOAP header.
#[derive(Debug, Clone, PartialEq)]
pub struct SoapHeader {
    pub namespace: String,
    pub name: String,
    pub data: DomainValue,
}

/// Binds the messages of one service.
pub struct ServiceBinder {
    definition: ServiceDefinition,
    request_header_binder: Box<dyn RequestHeaderMessageBinder>,
    request_binder: Box<dyn RequestMessageBinder>,
    response_binder: Box<dyn ResponseMessageBinder>,
}

impl ServiceBinder {
    /// Create a binder using the binders for the definition's style.
    pub fn new(definition: ServiceDefinition) -> Self {
        let (request_binder, response_binder): (
            Box<dyn RequestMessageBinder>,
            Box<dyn ResponseMessageBinder>,
        ) = match definition.options().style {
            BindingStyle::Rpc => (
                Box::new(RpcLiteralRequestMessageBinder),
                Box::new(RpcLiteralResponseMessageBinder),
            ),
            BindingStyle::Document => (
                Box::new(DocumentLiteralWrappedRequestMessageBinder),
                Box::new(DocumentLiteralWrappedResponseMessageBinder),
            ),
        };

        Self::with_binders(
            definition,
            Box::new(RpcLiteralRequestHeaderMessageBinder),
            request_binder,
            response_binder,
        )
    }

    pub fn with_binders(
        definition: ServiceDefinition,
        request_header_binder: Box<dyn RequestHeaderMessageBinder>,
        request_binder: Box<dyn RequestMessageBinder>,
        response_binder: Box<dyn ResponseMessageBinder>,
    ) -> Self {
        Self {
            definition,
            request_header_binder,
            request_binder,
            response_binder,
        }
    }

    pub fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    pub fn is_service_method(&self, method: &str) -> bool {
        self.definition.get_method(method).is_some()
    }

    /// Whether `header` is declared on `method`.
    pub fn is_service_header(&self, method: &str, header: &str) -> Result<bool, BindError> {
        Ok(self.method(method)?.header(header).is_some())
    }

    pub fn process_service_header(
        &self,
        method: &str,
        header: &str,
        data: WireValue,
    ) -> Result<SoapHeader, BindError> {
        let definition = self.method(method)?;
        if definition.header(header).is_none() {
            return Err(BindError::HeaderNotFound {
                method: method.to_string(),
                header: header.to_string(),
            });
        }

        let data = self
            .request_header_binder
            .process_header(definition, header, data, self.definition.type_repository())
            .inspect_err(|e| log_failure(method, e))?;

        debug!(method, header, "Header bound");
        Ok(SoapHeader {
            namespace: self.definition.namespace().to_string(),
            name: header.to_string(),
            data,
        })
    }

    /// Bind the arguments of a call, with the controller under `_controller`.
    pub fn process_service_method_arguments(
        &self,
        method: &str,
        message: &[WireValue],
    ) -> Result<Arguments, BindError> {
        let definition = self.method(method)?;
        let mut arguments = self
            .request_binder
            .process_message(definition, message, self.definition.type_repository())
            .inspect_err(|e| log_failure(method, e))?;

        arguments.prepend(
            CONTROLLER_KEY,
            DomainValue::String(definition.controller().to_string()),
        );
        Ok(arguments)
    }

    pub fn process_service_method_return_value(
        &self,
        method: &str,
        value: &DomainValue,
    ) -> Result<WireValue, BindError> {
        let definition = self.method(method)?;
        self.response_binder
            .process_message(definition, value, self.definition.type_repository())
            .inspect_err(|e| log_failure(method, e))
    }

    fn method(&self, name: &str) -> Result<&Method, BindError> {
        self.definition
            .get_method(name)
            .ok_or_else(|| BindError::MethodNotFound(name.to_string()))
    }
}

impl fmt::Debug for ServiceBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBinder")
            .field("service", &self.definition.name())
            .field("style", &self.definition.options().style)
            .finish()
    }
}

fn log_failure(method: &str, error: &BindError) {
    if error.is_fault() {
        warn!(method, error = %error, "Message rejected with a SOAP fault");
    } else {
        warn!(method, error = %error, "Local binding error");
    }
}
