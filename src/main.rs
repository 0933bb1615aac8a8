use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use turbine_dat::{Block, BlockChain, DatFile, Header, OpenOptions, TraversalLimits};

#[derive(Parser)]
#[command(name = "datdump", about = "Inspect legacy DAT asset containers")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the file header and whether it is consistent
    Header {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show one block
    Block {
        input: PathBuf,
        /// Block offset, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_offset)]
        offset: u32,
        #[arg(long)]
        json: bool,
    },
    /// Assemble a chain (the root chain unless --offset is given)
    Chain {
        input: PathBuf,
        #[arg(long, value_parser = parse_offset)]
        offset: Option<u32>,
        /// Write the assembled buffer here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Follow links without cycle or bounds checks
        #[arg(long)]
        unchecked: bool,
        #[arg(long)]
        max_blocks: Option<usize>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct HeaderReport<'a> {
    path:   String,
    valid:  bool,
    error:  Option<String>,
    header: &'a Header,
}

#[derive(Serialize)]
struct BlockReport {
    offset:            u32,
    size:              u32,
    next_block_offset: u32,
    data:              String,
}

impl From<&Block> for BlockReport {
    fn from(b: &Block) -> Self {
        BlockReport {
            offset:            b.offset,
            size:              b.size,
            next_block_offset: b.next_block_offset,
            data:              hex::encode(&b.data),
        }
    }
}

#[derive(Serialize)]
struct ChainReport {
    offset:      u32,
    size:        u64,
    block_count: usize,
    data_len:    usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Header ───────────────────────────────────────────────────────────
        Commands::Header { input, json } => {
            let header = turbine_dat::read_header(&input)?;
            let check  = header.validate();
            if json {
                let report = HeaderReport {
                    path:   input.display().to_string(),
                    valid:  check.is_ok(),
                    error:  check.as_ref().err().map(|e| e.to_string()),
                    header: &header,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("── DAT header ───────────────────────────────────────────");
                println!("  Path             {}", input.display());
                println!("  Magic            {:#x}", header.magic);
                println!("  Block size       {:#x}", header.block_size);
                println!("  File size        {:#x}", header.file_size);
                println!("  Version          {:#x} / {:#x}", header.file_version, header.file_version2);
                println!("  Free blocks      {} ({:#x} .. {:#x})",
                    header.free_block_count, header.first_free_block, header.last_free_block);
                println!("  Root offset      {:#x}", header.root_offset);
                match check {
                    Ok(())  => println!("  Valid            yes"),
                    Err(e)  => println!("  Valid            no ({e})"),
                }
            }
        }

        // ── Block ────────────────────────────────────────────────────────────
        Commands::Block { input, offset, json } => {
            let header = turbine_dat::read_header(&input)?;
            let block  = turbine_dat::read_block(&input, offset, header.block_size)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&BlockReport::from(&block))?);
            } else {
                println!("{block}");
            }
        }

        // ── Chain ────────────────────────────────────────────────────────────
        Commands::Chain { input, offset, output, unchecked, max_blocks, json } => {
            let limits = match (unchecked, max_blocks) {
                (false, None) => None,
                (true, cap)   => Some(TraversalLimits { max_blocks: cap, ..TraversalLimits::unchecked() }),
                (false, cap)  => Some(TraversalLimits { max_blocks: cap, ..TraversalLimits::default() }),
            };
            let opts = OpenOptions { validate_header: true, limits };
            let mut dat = DatFile::open_with(&input, opts)?;
            let start = offset.unwrap_or(dat.header().root_offset);
            let chain = dat.read_chain(start)?;

            if let Some(path) = &output {
                std::fs::write(path, &chain.data)?;
            }
            if json {
                let report = ChainReport {
                    offset:      start,
                    size:        chain.size,
                    block_count: chain.block_count,
                    data_len:    chain.data.len(),
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_chain(start, &chain, output.as_ref());
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter  = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_offset(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None      => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid offset '{s}': {e}"))
}

fn print_chain(start: u32, chain: &BlockChain, output: Option<&PathBuf>) {
    println!("Chain at {:#x}: {} block(s), {:#x} bytes on disk, {} payload bytes",
        start, chain.block_count, chain.size, chain.data.len());
    match output {
        Some(path) => println!("Written to: {}", path.display()),
        None => {
            for (i, line) in chain.data.chunks(32).enumerate() {
                println!("  {:08x}  {}", i * 32, hex::encode(line));
            }
        }
    }
}
