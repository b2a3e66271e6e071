//! Parse a structure definition over a memory image and dump the decoded
//! tree as JSON.
//!
//! Usage: parse-dump <definition-file> <image-file> [offset]
//!
//! The offset accepts decimal or 0x-prefixed hex. Set RUST_LOG for layout
//! diagnostics (backward seeks, renamed duplicate fields, printoffset).

use anyhow::{bail, Context, Result};
use bitwise_rs::{parse, MemoryMap};
use std::fs;
use tracing_subscriber::EnvFilter;

fn parse_offset(arg: &str) -> Result<usize> {
    let value = match arg.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    value.with_context(|| format!("invalid offset `{}`", arg))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        bail!("usage: {} <definition-file> <image-file> [offset]", args[0]);
    }

    let definition = fs::read_to_string(&args[1])
        .with_context(|| format!("reading definition {}", args[1]))?;
    let image = fs::read(&args[2]).with_context(|| format!("reading image {}", args[2]))?;
    let offset = match args.get(3) {
        Some(arg) => parse_offset(arg)?,
        None => 0,
    };

    let mem = MemoryMap::new(image).into_shared();
    let root = parse(&definition, &mem, offset)
        .with_context(|| format!("parsing {} over {}", args[1], args[2]))?;

    let value = root.get_value()?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
