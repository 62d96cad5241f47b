mod audio;
mod runner;

use anyhow::{Context, Result, bail};
use machine_oric::{MachineConfig, Oric, RomVariant};
use runner::RunnerConfig;
use std::fs;
use std::path::PathBuf;

/// Parsed command line.
struct Args {
    tape: Option<PathBuf>,
    disk: Option<PathBuf>,
    rom: RomVariant,
    zoom: u32,
    verbose: bool,
}

const USAGE: &str = "usage: oric [options]
  --tape <path>   insert a TAP tape image
  --disk <path>   insert an MFM disk image
  --oric1         boot the BASIC 1.0 ROM
  --zoom <n>      window scale factor (default 2)
  --verbose       debug logging
  --help          this text";

fn parse_args() -> Result<Option<Args>> {
    let mut args = Args {
        tape: None,
        disk: None,
        rom: RomVariant::default(),
        zoom: 2,
        verbose: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--tape" => {
                args.tape = Some(iter.next().context("--tape needs a path")?.into());
            }
            "--disk" => {
                args.disk = Some(iter.next().context("--disk needs a path")?.into());
            }
            "--oric1" => args.rom = RomVariant::Basic10,
            "--zoom" => {
                let value = iter.next().context("--zoom needs a number")?;
                args.zoom = value.parse().context("--zoom needs a number")?;
                if args.zoom == 0 || args.zoom > 8 {
                    bail!("--zoom must be between 1 and 8");
                }
            }
            "--verbose" => args.verbose = true,
            "--help" | "-h" => {
                println!("{}", USAGE);
                return Ok(None);
            }
            other => bail!("unknown option '{}'\n{}", other, USAGE),
        }
    }

    Ok(Some(args))
}

fn build_machine(args: &Args) -> Result<Oric> {
    let mut oric = Oric::with_config(MachineConfig { rom: args.rom });

    let rom_path = format!("roms/{}", args.rom.rom_file());
    let rom = fs::read(&rom_path).with_context(|| format!("failed loading ROM {}", rom_path))?;
    oric.load_basic(&rom);

    if let Some(disk_path) = &args.disk {
        let disk_rom = fs::read("roms/microdis.rom")
            .context("failed loading disk drive ROM roms/microdis.rom")?;
        oric.load_disk_rom(&disk_rom);

        let image = fs::read(disk_path)
            .with_context(|| format!("failed reading disk image {}", disk_path.display()))?;
        oric.insert_disk(0, &image)
            .map_err(|e| anyhow::anyhow!("bad disk image: {}", e))?;
    }

    if let Some(tape_path) = &args.tape {
        let tape = fs::read(tape_path)
            .with_context(|| format!("failed reading tape image {}", tape_path.display()))?;
        oric.insert_tape(tape);
    }

    Ok(oric)
}

fn main() {
    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => return,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if args.verbose { "debug" } else { "info" },
    ))
    .init();

    let mut oric = match build_machine(&args) {
        Ok(oric) => oric,
        Err(err) => {
            eprintln!("Error initializing: {:#}", err);
            std::process::exit(1);
        }
    };

    use emu_core::Machine;
    oric.reset();

    let config = RunnerConfig {
        title: "Oric".to_string(),
        scale: args.zoom,
    };

    if let Err(err) = runner::run(oric, config) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
