use std::{num::ParseIntError, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use kirindump::{
    cli::{config::Config, connect, save_dump, ConnectArgs, DumpProgress},
    logging::initialize_logger,
    Error, FramedStreamReceiver, PolledChunkReceiver,
};
use log::{debug, LevelFilter};
use miette::Result;

#[derive(Debug, Parser)]
#[command(about, propagate_version = true, version)]
struct Cli {
    #[command(subcommand)]
    subcommand: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Wait for the device to push a framed dump stream and save it
    Stream(StreamArgs),
    /// Pull an address range out of the device with patched inquiry
    /// commands
    Poll(PollArgs),
}

#[derive(Debug, Args)]
struct StreamArgs {
    #[clap(flatten)]
    connect_args: ConnectArgs,

    /// File to save the received dump to
    #[arg(short = 'o', long, default_value = "xloader_dump.bin")]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct PollArgs {
    #[clap(flatten)]
    connect_args: ConnectArgs,

    /// eMMC byte address to start reading from
    #[arg(short = 'a', long, value_parser = parse_uint32, default_value = "0x20000")]
    address: u32,
    /// Number of bytes to read; must be a whole number of 1024-byte chunks
    #[arg(short = 's', long, value_parser = parse_uint32, default_value = "0x30000")]
    size: u32,
    /// File to save the received dump to
    #[arg(short = 'o', long, default_value = "xloader_dump.bin")]
    output: PathBuf,
}

fn parse_uint32(input: &str) -> Result<u32, ParseIntError> {
    if let Some(hex) = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        input.parse()
    }
}

fn main() -> Result<()> {
    miette::set_panic_hook();
    initialize_logger(LevelFilter::Info);

    // Attempt to parse any provided command-line arguments, or print the
    // help message and terminate if the invocation is not correct.
    let args = Cli::parse().subcommand;
    debug!("{:#?}", args);

    // Load any user configuration, if present.
    let config = Config::load()?;

    match args {
        Commands::Stream(args) => stream(args, &config),
        Commands::Poll(args) => poll(args, &config),
    }
}

fn stream(args: StreamArgs, config: &Config) -> Result<()> {
    let connection = connect(&args.connect_args, config)?;

    let mut receiver = FramedStreamReceiver::new(connection);
    let mut progress = DumpProgress::default();
    let assembler = receiver.receive(Some(&mut progress))?;

    finish(&args.output, assembler)
}

fn poll(args: PollArgs, config: &Config) -> Result<()> {
    let connection = connect(&args.connect_args, config)?;

    let mut receiver = PolledChunkReceiver::new(connection, args.address, args.size)?;
    let mut progress = DumpProgress::default();
    let assembler = receiver.receive(Some(&mut progress))?;

    finish(&args.output, assembler)
}

fn finish(output: &std::path::Path, assembler: kirindump::DumpAssembler) -> Result<()> {
    let success = assembler.success();
    let (data, stats) = assembler.finalize();
    save_dump(output, &data, stats)?;

    // The dump was written either way, but let the exit status reflect
    // whether it can be trusted as-is.
    if success {
        Ok(())
    } else {
        Err(Error::CompletedWithWarnings(stats.errors).into())
    }
}
