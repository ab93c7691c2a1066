//! handson CLI - run the GPU compute exercises
//!
//! Every exercise checks its own answer; a failed check makes the process
//! exit with status 1.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use handson::errcode::{ErrorTable, OutputFormat};
use handson::life::{Board, LifeParams, LifeSimulation, FINAL_STATE_FILE};
use handson::matmul::{MatmulSession, MatmulVariant};
use handson::pi::{run_pi, VectorWidth};
use handson::{open_context, selector_from_config, vadd, LabConfig, LabError};
use handson_backend::{device_list, enumerate_devices, DeviceSelector, GpuContext};

#[derive(Parser)]
#[command(name = "handson")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "GPU compute exercises: vector add, matrix multiply, pi and Game of Life", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Device index (see --list); overrides HANDSON_DEVICE and the config
    #[arg(long, value_name = "INDEX", global = true)]
    device: Option<usize>,

    /// List available devices and exit
    #[arg(long)]
    list: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every device and its limits
    Devices,

    /// C = A + B
    Vadd,

    /// F = A + B + E + G as three chained adds
    VaddChain,

    /// R = A + B + C with one three-input kernel
    VaddAbc,

    /// Matrix multiply, one or more kernel variants
    Matmul {
        /// Matrix order
        #[arg(long, value_name = "N")]
        order: Option<usize>,

        /// Variant to run (repeatable); all variants when omitted
        #[arg(long = "variant", value_name = "V", value_parser = parse_variant)]
        variants: Vec<MatmulVariant>,
    },

    /// Integrate 4/(1+x^2) to estimate pi
    Pi {
        /// Steps per work-item loop iteration: 1, 4 or 8
        #[arg(long, default_value = "1", value_parser = parse_width)]
        width: VectorWidth,
    },

    /// Game of Life
    Life {
        /// Initial board, one `x y 1` line per live cell
        #[arg(value_name = "BOARD")]
        board: PathBuf,

        /// Params file: nx, ny and iterations on separate lines
        #[arg(value_name = "PARAMS")]
        params: PathBuf,

        /// Work-group width
        bx: u32,

        /// Work-group height
        by: u32,

        /// Where to write the final board
        #[arg(short, long, value_name = "FILE", default_value = FINAL_STATE_FILE)]
        output: PathBuf,

        /// Compare against the host reference
        #[arg(long)]
        verify: bool,
    },

    /// Generate an error-code lookup from a C header
    ErrCodes {
        /// Header containing a `/* Error Codes */` block
        #[arg(value_name = "HEADER")]
        header: PathBuf,

        /// Output language: c or rust
        #[arg(long, default_value = "c", value_parser = parse_format)]
        format: OutputFormat,
    },
}

fn parse_variant(s: &str) -> Result<MatmulVariant, String> {
    s.parse().map_err(|e: LabError| e.to_string())
}

fn parse_width(s: &str) -> Result<VectorWidth, String> {
    let width: u32 = s.parse().map_err(|_| format!("Invalid vector size '{}'", s))?;
    VectorWidth::try_from(width).map_err(|e| e.to_string())
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    s.parse().map_err(|e: LabError| e.to_string())
}

fn main() -> Result<ExitCode> {
    env_logger::init();

    let cli = Cli::parse();

    if cli.list {
        println!("{}", device_list(&enumerate_devices()));
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(ExitCode::FAILURE);
    };

    let config = match &cli.config {
        Some(path) => LabConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LabConfig::default(),
    };

    // --device, then HANDSON_DEVICE, then the config file.
    let selector = selector_from_config(&config.device)
        .with_index(DeviceSelector::from_env().index)
        .with_index(cli.device);

    let passed = match command {
        Commands::Devices => {
            print_devices();
            true
        }
        Commands::ErrCodes { header, format } => {
            err_codes(&header, format)?;
            true
        }
        Commands::Vadd => run_vadd(&open(&selector)?, &config, vadd::vadd)?,
        Commands::VaddChain => run_vadd(&open(&selector)?, &config, vadd::vadd_chain)?,
        Commands::VaddAbc => run_vadd(&open(&selector)?, &config, vadd::vadd_abc)?,
        Commands::Matmul { order, variants } => {
            let mut cfg = config.matmul.clone();
            if let Some(order) = order {
                cfg.order = order;
            }
            matmul(&open(&selector)?, &cfg, &variants)?
        }
        Commands::Pi { width } => {
            let report = run_pi(&open(&selector)?, &config.pi, width)?;
            println!("{}", report.plan);
            println!("{}", report);
            true
        }
        Commands::Life {
            board,
            params,
            bx,
            by,
            output,
            verify,
        } => life(&open(&selector)?, &board, &params, (bx, by), &output, verify)?,
    };

    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn open(selector: &DeviceSelector) -> Result<GpuContext> {
    open_context(selector).context("opening compute device")
}

fn print_devices() {
    let devices = enumerate_devices();
    println!("\nNumber of devices: {}", devices.len());
    for (i, device) in devices.iter().enumerate() {
        println!("\nDevice {}:", i);
        println!("{}", device);
    }
}

fn run_vadd(
    ctx: &GpuContext,
    config: &LabConfig,
    exercise: fn(&GpuContext, &handson::config::VaddConfig) -> handson::LabResult<vadd::VaddReport>,
) -> Result<bool> {
    let report = exercise(ctx, &config.vadd)?;
    println!("\n{}", report);
    Ok(report.is_success())
}

fn matmul(ctx: &GpuContext, cfg: &handson::config::MatmulConfig, variants: &[MatmulVariant]) -> Result<bool> {
    let session = MatmulSession::new(ctx, cfg.order)?;
    let runs = if variants.is_empty() {
        session.run_all(cfg)
    } else {
        variants.iter().map(|&v| (v, session.run(v, cfg))).collect()
    };

    let mut passed = true;
    for (variant, outcome) in runs {
        println!("{}", variant.heading(cfg.order));
        match outcome {
            Ok(results) => {
                for result in results {
                    println!("{}", result);
                    passed &= result.is_ok();
                }
            }
            // The device cannot run this shape; not a wrong answer.
            Err(LabError::InvalidParams(reason)) => println!(" skipped: {}", reason),
            Err(e) => {
                println!(" failed: {}", e);
                passed = false;
            }
        }
    }
    println!("\n===== End of matrix multiply =====");
    Ok(passed)
}

fn life(
    ctx: &GpuContext,
    board_path: &Path,
    params_path: &Path,
    (bx, by): (u32, u32),
    output: &Path,
    verify: bool,
) -> Result<bool> {
    let params = LifeParams::load(params_path)?;
    let board = Board::load(board_path, params.nx, params.ny)?;

    println!("Starting state");
    print!("{}", board.render());

    let sim = LifeSimulation::new(ctx, params.nx, params.ny, bx, by)?;
    let last = sim.run(&board, params.iterations)?;

    println!("Finished in {} iterations", params.iterations);
    println!("Final state");
    print!("{}", last.render());
    last.save(output)
        .with_context(|| format!("writing {}", output.display()))?;

    if !verify {
        return Ok(true);
    }
    let reference = (0..params.iterations).fold(board, |b, _| b.step());
    if reference == last {
        println!("Host reference agrees.");
        Ok(true)
    } else {
        let err = LabError::Verification(format!(
            "device board has {} live cells, host reference {}",
            last.alive_count(),
            reference.alive_count()
        ));
        log::error!("{}", err);
        Ok(false)
    }
}

fn err_codes(header: &Path, format: OutputFormat) -> Result<()> {
    let file = File::open(header).with_context(|| format!("opening {}", header.display()))?;
    let table = ErrorTable::parse(BufReader::new(file))?;
    print!("{}", table.render(format));
    Ok(())
}
