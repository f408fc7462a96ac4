//! # mono-rs
//!
//! Inspect and call into assemblies through an embedded Mono runtime.
//!
//! ## Feature Flags
//!
//! - `multithreading`: Makes the runtime handles `Send + Sync` by backing the
//!   bridge's caches with `parking_lot` locks.
//!
//! ## Logging
//!
//! Diagnostics go to stderr through `tracing`. The filter is read from
//! `MONO_RS_LOG` (e.g. `MONO_RS_LOG=mono_runtime=debug`) and defaults to
//! `warn`.
use clap::{Parser, Subcommand};
use mono_runtime::{BridgeConfig, MonoAssembly, MonoClass, MonoRuntime, Result, Value};
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Inspect and call into assemblies through an embedded Mono runtime"
)]
pub struct Args {
    /// The Mono shared library (e.g. libmonosgen-2.0.so)
    #[arg(short, long, value_name = "LIBRARY")]
    pub mono_library: PathBuf,
    /// Name of the JIT domain to create
    #[arg(long, default_value = "mono-rs")]
    pub domain: String,
    #[arg(value_name = "DLL")]
    pub assembly: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the classes defined by the assembly
    Classes {
        /// Only list classes whose full name contains this
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Dump the layout and members of a class (e.g. Game.Player)
    Type { name: String },
    /// Call a static method; arguments are parsed as bool, integer, float,
    /// `null` or else taken as strings
    Invoke {
        class: String,
        method: String,
        args: Vec<String>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("MONO_RS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    // a subscriber may already be installed when embedded in another binary
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parses a command-line argument into a host value.
pub fn parse_argument(raw: &str) -> Value {
    match raw {
        "null" => return Value::Absent,
        "true" => return Value::from(true),
        "false" => return Value::from(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Value::from(u);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::from(f),
        _ => Value::from(raw),
    }
}

pub fn run_cli() -> ExitCode {
    init_logging();
    let args = Args::parse();

    let runtime = match MonoRuntime::from_library(&args.mono_library, BridgeConfig::from_env()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error binding Mono runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    match run(&runtime, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_not_found() => {
            eprintln!("{}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

fn run(runtime: &Arc<MonoRuntime>, args: &Args) -> Result<()> {
    let domain = runtime.init_jit(&args.domain)?;
    let assembly = domain.open_assembly(&args.assembly)?;

    match &args.command {
        Command::Classes { filter } => list_classes(&assembly, filter.as_deref()),
        Command::Type { name } => {
            let class = assembly.image()?.class_by_full_name(name)?;
            print_class(&class)
        }
        Command::Invoke {
            class,
            method,
            args: raw,
        } => {
            let class = assembly.image()?.class_by_full_name(class)?;
            let values: Vec<Value> = raw.iter().map(|a| parse_argument(a)).collect();
            let result = class.invoke_static(method, &values)?;
            match result {
                Value::ForeignRef(object) => println!("{}", object.display_string()),
                other => println!("{}", other),
            }
            Ok(())
        }
    }
}

fn list_classes(assembly: &MonoAssembly, filter: Option<&str>) -> Result<()> {
    let image = assembly.image()?;
    eprintln!(
        "Assembly: {}, Types: {}",
        assembly.name()?,
        image
            .type_def_rows()?
            .map_or_else(|| "?".to_string(), |rows| rows.to_string())
    );
    for class in image.enumerate_classes()? {
        let name = class.full_name()?;
        if filter.map_or(true, |f| name.contains(f)) {
            println!("  {}", name);
        }
    }
    Ok(())
}

fn print_class(class: &MonoClass) -> Result<()> {
    println!("{}", class.mono_type()?.describe()?);
    if let Some(parent) = class.parent()? {
        println!("  extends {}", parent.full_name()?);
    }
    for interface in class.interfaces()? {
        println!("  implements {}", interface.full_name()?);
    }

    println!("\nFields:");
    for field in class.fields()? {
        let modifier = if field.is_static()? { "static " } else { "" };
        println!(
            "  - {}{}: {} @ {:#x}",
            modifier,
            field.name()?,
            field.field_type()?.name()?,
            field.offset()?
        );
    }

    println!("\nMethods:");
    for method in class.methods()? {
        let signature = method.signature()?;
        let params = signature
            .params
            .iter()
            .map(|p| {
                let ty = p.ty.name()?;
                Ok(if p.is_out { format!("out {ty}") } else { ty.to_string() })
            })
            .collect::<Result<Vec<_>>>()?;
        let modifier = if method.is_static()? { "static " } else { "" };
        println!(
            "  - {}{} {}({})",
            modifier,
            signature.return_type.name()?,
            method.name()?,
            params.join(", ")
        );
    }

    println!("\nProperties:");
    for property in class.properties()? {
        println!(
            "  - {}: getter: {}, setter: {}",
            property.name()?,
            property.getter()?.is_some(),
            property.setter()?.is_some()
        );
    }
    Ok(())
}
