use clap::{Parser, Subcommand};
use roll20_sandbox::{handler, wrappers, ObjectKind, Payload, Sandbox, SandboxConfig};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Roll20 Sandbox - offline Roll20 API emulation
///
/// Builds a sandbox from a JSON fixture and exercises its scripting
/// surface from the command line.
#[derive(Parser)]
#[command(name = "roll20-sandbox")]
#[command(version = "0.1.0")]
#[command(about = "Offline Roll20 API sandbox", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Fixture file with GM ids, capabilities and seed objects
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List bound capabilities and where they came from
    Capabilities,
    /// List objects in the sandbox
    Objects {
        /// Only objects of this kind
        #[arg(short, long)]
        kind: Option<ObjectKind>,
    },
    /// Send a chat message and show what handlers receive
    Chat {
        /// Speaker, e.g. "GM" or "player|<id>"
        who: String,
        /// Message content
        message: String,
    },
    /// Look up a character attribute
    Attr {
        /// Character id
        character_id: String,
        /// Attribute name
        name: String,
        /// Read the max value instead of current
        #[arg(long)]
        max: bool,
    },
    /// Show sandbox status
    Status,
}

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let config = match &cli.config {
        Some(path) => match SandboxConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => SandboxConfig::default(),
    };

    let mut builder = Sandbox::builder().config(config);
    if cli.verbose {
        for name in roll20_sandbox::CapabilityName::ALL {
            builder = builder.wrap(name, wrappers::traced());
        }
    }

    let sandbox = match builder.build() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create sandbox: {}", e);
            std::process::exit(1);
        }
    };

    let result = match &cli.command {
        Commands::Capabilities => list_capabilities(&sandbox),
        Commands::Objects { kind } => list_objects(&sandbox, *kind),
        Commands::Chat { who, message } => send_chat(&sandbox, who, message),
        Commands::Attr {
            character_id,
            name,
            max,
        } => show_attribute(&sandbox, character_id, name, *max),
        Commands::Status => show_status(&sandbox),
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn list_capabilities(sandbox: &Sandbox) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n{}", "=".repeat(60));
    println!("Bound Capabilities");
    println!("{}", "=".repeat(60));

    for binding in sandbox.capabilities().bindings() {
        println!(
            "  {:<24} {:?} (wrappers: {})",
            binding.name.as_str(),
            binding.source,
            binding.wrappers
        );
    }

    println!("{}", "=".repeat(60));
    Ok(())
}

fn list_objects(sandbox: &Sandbox, kind: Option<ObjectKind>) -> Result<(), Box<dyn std::error::Error>> {
    let mut objects = sandbox.capabilities().get_all_objs()?;
    objects.retain(|obj| kind.map_or(true, |k| obj.kind() == k));
    objects.sort_by(|a, b| (a.kind(), a.id()).cmp(&(b.kind(), b.id())));

    println!("\n{}", "=".repeat(60));
    println!("Objects ({})", objects.len());
    println!("{}", "=".repeat(60));

    if objects.is_empty() {
        println!("No objects.");
    }
    for obj in &objects {
        println!("\n[{}] {}", obj.kind(), obj.id());
        println!("{}", serde_json::to_string_pretty(&obj.to_json())?);
    }

    println!("\n{}", "=".repeat(60));
    Ok(())
}

fn send_chat(sandbox: &Sandbox, who: &str, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    sandbox.capabilities().on(
        "chat:message",
        handler(move |payload: &[Payload]| {
            if let Some(value) = payload.first().and_then(Payload::as_value) {
                sink.borrow_mut().push(value.clone());
            }
        }),
    )?;

    info!("Sending chat as {}", who);
    sandbox.capabilities().send_chat(who, message)?;

    println!("\n{}", "=".repeat(60));
    println!("chat:message");
    println!("{}", "=".repeat(60));
    for value in received.borrow().iter() {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    println!("{}", "=".repeat(60));
    Ok(())
}

fn show_attribute(
    sandbox: &Sandbox,
    character_id: &str,
    name: &str,
    max: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let value_type = if max { "max" } else { "current" };
    let value = sandbox
        .capabilities()
        .get_attr_by_name(character_id, name, Some(value_type))?;
    println!("{}.{} ({}) = {}", character_id, name, value_type, value);
    Ok(())
}

fn show_status(sandbox: &Sandbox) -> Result<(), Box<dyn std::error::Error>> {
    let status = sandbox.status();

    println!("\n{}", "=".repeat(60));
    println!("Roll20 Sandbox Status");
    println!("{}", "=".repeat(60));
    println!("ID: {}", status.id);
    println!("Objects: {}", status.object_count);
    println!("Capabilities: {}", status.bound_count);
    println!("Host-provided: {}", status.host_bound_count);
    println!("Chat Messages: {}", status.chat_message_count);
    println!("{}", "=".repeat(60));

    Ok(())
}
