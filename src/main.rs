//! Zentinel SOAP binding command line.
//!
//! Run with: `zentinel-soap-binding --config service.yaml check`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_soap_binding::{
    register_key_value_types, soap_fault_response, DomainValue, DynamicObject, ServiceBinder,
    ServiceConfig, ServiceDefinition, TypeRepository, WireValue,
};

/// SOAP message binder for Zentinel services.
///
/// Loads a service definition from YAML, checks that every type it uses
/// resolves, and binds sample request messages against it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the service definition (YAML)
    #[arg(short, long, default_value = "service.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the service definition
    Check,

    /// Bind a request message and print the arguments
    Bind {
        /// Method to bind
        #[arg(short, long)]
        method: String,

        /// Request message (YAML): a sequence holds one value per argument
        #[arg(long)]
        message: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Zentinel SOAP binding v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    let config = ServiceConfig::from_file(&args.config).context("Failed to load config file")?;

    let mut repository = TypeRepository::with_defaults();
    register_key_value_types(&mut repository).context("Failed to register key/value types")?;
    let definition = ServiceDefinition::from_config(&config, repository)
        .context("Invalid service definition")?;

    info!(
        service = definition.name(),
        namespace = definition.namespace(),
        version = definition.options().version.as_str(),
        style = definition.options().style.as_str(),
        methods = definition.methods().len(),
        "Service definition loaded"
    );

    match args.command {
        Command::Check => check(&definition),
        Command::Bind { method, message } => bind(definition, &method, &message),
    }
}

fn check(definition: &ServiceDefinition) -> Result<()> {
    let unresolved = definition.unresolved_types();
    for name in &unresolved {
        warn!(type_name = %name, "Unresolved type");
    }
    if !unresolved.is_empty() {
        anyhow::bail!("{} unresolved type(s)", unresolved.len());
    }

    for method in definition.methods() {
        info!(
            method = method.name(),
            soap_action = method.soap_action(),
            arguments = method.input().len(),
            headers = method.headers().len(),
            return_type = method.return_type().unwrap_or("-"),
            "Method"
        );
    }
    info!("Service definition is valid");
    Ok(())
}

fn bind(definition: ServiceDefinition, method: &str, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read message {}", path.display()))?;
    let message: WireValue =
        serde_yaml::from_str(&content).context("Failed to parse message")?;
    let parts = match message {
        WireValue::List(parts) => parts,
        other => vec![other],
    };

    let version = definition.options().version;
    let binder = ServiceBinder::new(definition);

    match binder.process_service_method_arguments(method, &parts) {
        Ok(arguments) => {
            let mut seen = HashSet::new();
            let mut output = Mapping::new();
            for (name, value) in arguments.iter() {
                output.insert(Value::from(name), to_yaml(value, &mut seen));
            }
            print!("{}", serde_yaml::to_string(&output)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", soap_fault_response(&e.to_fault(), Some(version)));
            Err(e).context("Binding failed")
        }
    }
}

/// Render a bound value. An object already printed is shown by reference.
fn to_yaml(value: &DomainValue, seen: &mut HashSet<usize>) -> Value {
    match value {
        DomainValue::Null => Value::Null,
        DomainValue::Bool(b) => Value::Bool(*b),
        DomainValue::Int(i) => Value::from(*i),
        DomainValue::Float(f) => Value::from(*f),
        DomainValue::String(s) => Value::from(s.as_str()),
        DomainValue::Date(d) => Value::from(d.format("%Y-%m-%d").to_string()),
        DomainValue::DateTime(dt) => Value::from(dt.to_rfc3339()),
        DomainValue::List(items) => {
            Value::Sequence(items.iter().map(|item| to_yaml(item, seen)).collect())
        }
        DomainValue::Map(pairs) => {
            let mut mapping = Mapping::new();
            for (key, value) in pairs {
                mapping.insert(Value::from(key.as_str()), to_yaml(value, seen));
            }
            Value::Mapping(mapping)
        }
        DomainValue::Object(object) => {
            if !seen.insert(object.identity()) {
                return Value::from(format!("*{:#x}", object.identity()));
            }

            let Some(dynamic) = object.downcast::<DynamicObject>() else {
                return Value::from(format!("<{}>", object.type_name()));
            };
            let fields = dynamic.borrow().fields().clone();

            let mut mapping = Mapping::new();
            mapping.insert(
                Value::from("@ref"),
                Value::from(format!("{:#x}", object.identity())),
            );
            mapping.insert(Value::from("@type"), Value::from(object.class_name()));
            for (name, value) in &fields {
                mapping.insert(Value::from(name.as_str()), to_yaml(value, seen));
            }
            Value::Mapping(mapping)
        }
    }
}
