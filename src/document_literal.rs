//! Document/literal wrapped binding.
//!
//! The request body is a single wrapper element whose members are the
//! arguments; the response wraps the return value in `<method>Result`.

use crate::binder::{Arguments, RequestMessageBinder, ResponseMessageBinder};
use crate::definition::Method;
use crate::error::{BindError, FaultCode, SoapFault};
use crate::request::RequestBinding;
use crate::response::ResponseBinding;
use crate::types::TypeRepository;
use crate::value::{DomainValue, WireRecord, WireValue};
use tracing::debug;

/// Binds document/literal wrapped requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentLiteralWrappedRequestMessageBinder;

impl RequestMessageBinder for DocumentLiteralWrappedRequestMessageBinder {
    fn process_message(
        &self,
        method: &Method,
        message: &[WireValue],
        repository: &TypeRepository,
    ) -> Result<Arguments, BindError> {
        let wrapper = match message {
            [WireValue::Record(wrapper)] => wrapper,
            _ => {
                return Err(BindError::Fault(SoapFault::new(
                    FaultCode::Client,
                    format!(
                        "\"{}\" expects a single wrapper element, {} parts given.",
                        method.name(),
                        message.len()
                    ),
                )))
            }
        };

        let mut binding = RequestBinding::new(repository);
        let mut arguments = Arguments::new();

        for part in method.input().all() {
            match wrapper.get(part.name()) {
                Some(value) if !value.is_null() => {
                    let bound = binding.process_type(part.type_name(), value)?;
                    arguments.insert(part.name(), bound);
                }
                _ => {}
            }
        }

        debug!(method = method.name(), bound = arguments.len(), "Wrapped request bound");
        Ok(arguments)
    }
}

/// Binds document/literal wrapped responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentLiteralWrappedResponseMessageBinder;

impl ResponseMessageBinder for DocumentLiteralWrappedResponseMessageBinder {
    fn process_message(
        &self,
        method: &Method,
        value: &DomainValue,
        repository: &TypeRepository,
    ) -> Result<WireValue, BindError> {
        let result = match method.return_type() {
            Some(return_type) => ResponseBinding::new(repository).process_message(return_type, value)?,
            None => value.to_wire()?,
        };

        let wrapper = WireRecord::new();
        wrapper.set(format!("{}Result", method.name()), result);

        debug!(method = method.name(), "Wrapped response bound");
        Ok(WireValue::Record(wrapper))
    }
}
