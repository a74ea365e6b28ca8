#![allow(clippy::let_and_return, clippy::let_unit_value)]

mod args;

use std::fs;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;

use hipkern::bundle::is_bundle;
use hipkern::bundle::BundleEntryIter;
use hipkern::demangled_name;
use hipkern::Extractor;
use hipkern::KernelRecord;

use clap::Parser as _;

use tracing::subscriber::set_global_default as set_global_subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::FmtSubscriber;


fn print_kernel(name: &str, kernel: &KernelRecord) {
    let KernelRecord {
        bundle_offset,
        code_addr,
        code_size,
        desc_addr,
        desc_size,
        metadata,
    } = kernel;

    println!("{name}:");
    if *bundle_offset != 0 {
        println!("  bundle offset: {bundle_offset:#x}");
    }
    println!("  code:          {code_addr:#x} ({code_size} bytes)");
    println!("  descriptor:    {desc_addr:#x} ({desc_size} bytes)");

    if let Some(metadata) = metadata {
        let sgprs = metadata
            .sgpr_count
            .map(|count| count.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  registers:     {} VGPRs, {sgprs} SGPRs, wavefront size {}",
            metadata.vgpr_count, metadata.wavefront_size
        );
        print!("  segments:      group {} bytes", metadata.group_segment_size);
        if let Some(private) = metadata.private_segment_size {
            print!(", private {private} bytes");
        }
        println!(
            ", kernarg {} bytes (align {})",
            metadata.kernarg_segment_size, metadata.kernarg_segment_align
        );

        println!("  arguments:");
        for arg in &metadata.args {
            println!(
                "    {:#06x} {:>4} bytes  {:?}",
                arg.offset, arg.size, arg.kind
            );
        }
    }
}

/// The handler for the 'kernels' command.
fn kernels(kernels: args::Kernels) -> Result<()> {
    let args::Kernels {
        path,
        targets,
        no_demangle,
    } = kernels;

    let builder = Extractor::builder();
    let builder = if targets.is_empty() {
        builder
    } else {
        builder.targets(targets)
    };
    let catalog = builder
        .build()
        .extract_file(&path)
        .with_context(|| format!("failed to extract kernels from {}", path.display()))?;

    if catalog.is_empty() {
        println!("{}: no kernels", path.display());
    }

    for (name, kernel) in &catalog {
        let name = if no_demangle {
            name.into()
        } else {
            demangled_name(name)
        };
        let () = print_kernel(&name, kernel);
    }
    Ok(())
}

/// The handler for the 'bundle' command.
fn bundle(bundle: args::Bundle) -> Result<()> {
    let args::Bundle { path } = bundle;
    let data = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    if !is_bundle(&data) {
        bail!("{} is not a clang offload bundle", path.display())
    }

    for entry in BundleEntryIter::new(&data)? {
        let entry = entry.context("failed to read bundle entry")?;
        println!(
            "{:#010x} {:>10} bytes  {}",
            entry.offset, entry.size, entry.triple
        );
    }
    Ok(())
}


fn main() -> Result<()> {
    let args = args::Args::parse();
    let level = match args.verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_span_events(FmtSpan::FULL)
        .with_timer(SystemTime)
        .finish();

    let () =
        set_global_subscriber(subscriber).with_context(|| "failed to set tracing subscriber")?;

    match args.command {
        args::Command::Kernels(kernels) => self::kernels(kernels),
        args::Command::Bundle(bundle) => self::bundle(bundle),
    }
}
