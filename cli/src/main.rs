use std::io::Write as _;
use std::path::{Component, Path, PathBuf};
use std::sync::Once;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use qscript_core::{
    VmConfig,
    vm::{Frame, Image, Process, ProcessState, Program, World},
};

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "qscript::vm::process=debug,qscript::vm::fuse=debug,qscript_cli=info";

#[derive(Debug, Parser)]
#[command(name = "qscript", author, version, about = "Run and inspect qscript bytecode images", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Assemble an image and run its main subroutine.
    Run {
        /// Bytecode image (`.json` or `.toml`)
        #[arg(value_name = "IMAGE", value_parser = parse_sanitized_path)]
        image: PathBuf,
        /// VM limits (TOML)
        #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path)]
        config: Option<PathBuf>,
        /// Skip the fused-instruction pass
        #[arg(long)]
        no_fuse: bool,
    },
    /// Print the listing of every subroutine in an image.
    Disasm {
        #[arg(value_name = "IMAGE", value_parser = parse_sanitized_path)]
        image: PathBuf,
        /// Show the code after the fused-instruction pass
        #[arg(long)]
        fuse: bool,
    },
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        anyhow::bail!("Parent directory components ('..') are not allowed in file paths.");
    }
    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

/// `QSCRIPT_TRACE=1` uses `RUST_LOG` or the default filter; any other
/// enabled value is a filter expression itself.
fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("1") || trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("on") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let Ok(raw) = std::env::var("QSCRIPT_TRACE") else {
        return;
    };
    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());
        let builder = fmt().with_writer(std::io::stderr);
        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };
        let _ = builder.try_init();
    });
}

fn load_program(path: &Path, fuse: bool) -> anyhow::Result<(Image, Program)> {
    let image = Image::load(path)?;
    let program = image
        .assemble(fuse)
        .with_context(|| format!("Failed to assemble '{}'", path.display()))?;
    Ok((image, program))
}

fn flush_output(world: &mut World, out: &mut impl std::io::Write) -> anyhow::Result<()> {
    for line in world.take_output() {
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

/// Runs `process` to completion, resuming it each time it suspends.
fn drive(process: &mut Process, world: &mut World, out: &mut impl std::io::Write) -> anyhow::Result<ProcessState> {
    loop {
        let state = process.run(world);
        flush_output(world, out)?;
        if state != ProcessState::Suspended {
            return Ok(state);
        }
        tracing::debug!(target: "qscript_cli", pid = process.id(), "resuming suspended process");
    }
}

fn run_image(image_path: &Path, config: Option<&Path>, fuse: bool) -> anyhow::Result<bool> {
    let config = match config {
        Some(path) => VmConfig::load(path)?,
        None => VmConfig::default(),
    };
    let (image, program) = load_program(image_path, fuse)?;

    let mut world = World::new(config);
    image.define_structures(&mut world);
    world.set_loader(Box::new(program.loader()));

    let mut process = world.create_process(program.main.name());
    process.call_bco(program.main.clone(), Vec::new(), false)?;

    let stdout = std::io::stdout();
    let state = drive(&mut process, &mut world, &mut stdout.lock())?;
    process.finalize();

    if state == ProcessState::Failed {
        let location = process.frames().last().map(Frame::location).unwrap_or_default();
        match process.error() {
            Some(err) => eprintln!("Error: {err}\n  at {location}"),
            None => eprintln!("Error: process failed\n  at {location}"),
        }
        return Ok(false);
    }
    tracing::info!(target: "qscript_cli", %state, "process finished");
    Ok(true)
}

fn disasm_image(image_path: &Path, fuse: bool) -> anyhow::Result<()> {
    let (_, program) = load_program(image_path, fuse)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (i, sub) in program.subroutines.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        write!(out, "{sub}")?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    maybe_init_tracing();

    match CliArgs::parse().command {
        Commands::Run { image, config, no_fuse } => {
            if !run_image(&image, config.as_deref(), !no_fuse)? {
                std::process::exit(1);
            }
        }
        Commands::Disasm { image, fuse } => disasm_image(&image, fuse)?,
    }
    Ok(())
}
