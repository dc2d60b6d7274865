//! fanjvm - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use fanjvm::fcode::opcode::{disassemble, format_instr};
use fanjvm::fcode::{FOpcode, FPod};
use fanjvm::util::config::{load_config, load_project_config};
use fanjvm::util::logger::{self, LogLevel};
use fanjvm::{emit_pod_file_in, open_pod, Namespace, NAME, VERSION};

/// Fantom fcode to JVM class file backend
#[derive(Parser, Debug)]
#[command(name = "fanjvm")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Emit class files for a pod
    Emit {
        /// Pod archive
        #[arg(value_name = "POD")]
        pod: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "classes")]
        out: PathBuf,

        /// Config file (defaults to ./fanjvm.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Emit T$Dynamic subclasses
        #[arg(long)]
        dynamic: bool,

        /// Dependency pod used to resolve base classes and mixins (repeatable)
        #[arg(short, long = "depend", value_name = "POD")]
        depends: Vec<PathBuf>,
    },

    /// Print pod meta, types and fcode
    Dump {
        /// Pod archive
        #[arg(value_name = "POD")]
        pod: PathBuf,
    },

    /// Print the fcode opcode table
    Ops,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = |configured: LogLevel| {
        if args.verbose {
            LogLevel::Debug
        } else {
            configured
        }
    };

    match args.command {
        Commands::Emit {
            pod,
            out,
            config,
            dynamic,
            depends,
        } => {
            let mut project = match &config {
                Some(path) => load_config(path)
                    .with_context(|| format!("Failed to load config: {}", path.display()))?,
                None => load_project_config(&std::env::current_dir()?)
                    .context("Failed to load fanjvm.toml")?,
            };
            logger::init_with_level(level(project.log.level));
            if dynamic {
                project.emit.emit_dynamic_subclasses = true;
            }
            let deps = depends
                .iter()
                .map(|p| open_pod(p))
                .collect::<Result<Vec<FPod>>>()?;
            let mut ns = Namespace::new();
            for dep in &deps {
                ns.add(dep);
            }
            let written = emit_pod_file_in(&pod, &out, &ns, &project.emit)?;
            println!("{} classes -> {}", written.len(), out.display());
        }
        Commands::Dump { pod } => {
            logger::init_with_level(level(LogLevel::Info));
            dump(&pod)?;
        }
        Commands::Ops => {
            for value in 0..=u8::MAX {
                if let Ok(op) = FOpcode::try_from(value) {
                    println!("{:3}  {:<20} {:?}", value, op.name(), op.shape());
                }
            }
        }
    }

    Ok(())
}

fn dump(path: &Path) -> Result<()> {
    let pod = open_pod(path)?;

    println!("=== Pod {} {} ===", pod.name, pod.version);
    println!("depends: {}", pod.depends.join(", "));
    println!("literals: {}\n", pod.literals.len());

    for t in &pod.types {
        let self_ref = pod.tables.type_ref(t.self_ref)?;
        println!("--- {} (flags 0x{:08X}) ---", self_ref, t.flags);
        if let Some(base) = t.base {
            println!("  base {}", pod.tables.type_ref(base)?);
        }
        for &m in &t.mixins {
            println!("  mixin {}", pod.tables.type_ref(m)?);
        }
        for f in &t.fields {
            println!("  field {}: {}", f.name, pod.tables.type_ref(f.type_ref)?);
        }
        for m in &t.methods {
            println!(
                "  method {} (params={}, locals={}, max_stack={})",
                m.name,
                m.params().len(),
                m.vars.len() - m.params().len(),
                m.max_stack
            );
            for instr in disassemble(&m.code)? {
                println!("    {}", format_instr(&instr));
            }
        }
        println!();
    }
    Ok(())
}
