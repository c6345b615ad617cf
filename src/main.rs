
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use mrr::{ModRm, Toolchain};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mrr")]
#[command(about = "ModRM byte calculator and i386 blob helpers", long_about = None)]
struct Cli {
    /// Log every external command
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a ModRM byte (hex) into mod, reg and rm
    Split { byte: String },

    /// Pack mod, reg and rm (decimal) into a ModRM byte
    Combine {
        #[arg(value_name = "MOD")]
        mod_: u8,
        reg: u8,
        rm: u8,
    },

    /// Prompt for a byte to split, then for three fields to combine
    Calc,

    /// Compile a freestanding source file into a raw i386 blob
    Blob { source: PathBuf, output: PathBuf },

    /// Binarize a file and write its disassembly
    Disasm { source: PathBuf, output: PathBuf },
}

fn parse_byte(s: &str) -> Result<u8> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);

    u8::from_str_radix(digits, 16).with_context(|| format!("not a hex byte: {:?}", s))
}

fn parse_field(s: &str) -> Result<u8> {
    let s = s.trim();
    s.parse()
        .with_context(|| format!("not a field value: {:?}", s))
}

fn format_split(modrm: ModRm) -> String {
    format!(
        "{:#x} {:#x} {:#x}",
        modrm.mod_(),
        modrm.reg(),
        modrm.rm()
    )
}

fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<String> {
    write!(out, ">")?;
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        anyhow::bail!("unexpected end of input");
    }
    Ok(line)
}

fn calc<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<()> {
    let byte = parse_byte(&prompt(input, out)?)?;
    let modrm = ModRm(byte);
    debug!("{:#x} => {:?}", byte, modrm);
    writeln!(out, "{}", format_split(modrm))?;

    let mod_ = parse_field(&prompt(input, out)?)?;
    let reg = parse_field(&prompt(input, out)?)?;
    let rm = parse_field(&prompt(input, out)?)?;
    writeln!(out, "{}", ModRm::new(mod_, reg, rm)?)?;

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Split { byte } => {
            println!("{}", format_split(ModRm(parse_byte(&byte)?)));
        }
        Commands::Combine { mod_, reg, rm } => {
            println!("{}", ModRm::new(mod_, reg, rm)?);
        }
        Commands::Calc => {
            calc(&mut io::stdin().lock(), &mut io::stdout().lock())?;
        }
        Commands::Blob { source, output } => {
            Toolchain::from_env()
                .compile_blob(&source, &output)
                .with_context(|| format!("building {}", source.display()))?;
        }
        Commands::Disasm { source, output } => {
            Toolchain::from_env()
                .disassemble(&source, &output)
                .with_context(|| format!("disassembling {}", source.display()))?;
        }
    }

    Ok(())
}
