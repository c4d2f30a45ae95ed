use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use conv_figures::{
    compile_frame, compile_sequence, CompileOptions, CompileOutcome, FigureKind, Geometry, Mode,
    Templates,
};
use rand::{rngs::StdRng, SeedableRng};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "conv-figures", version, about = "Render convolution arithmetic animation frames")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,

    /// Directory receiving the compiled frames.
    #[arg(long, global = true, default_value = "pdf")]
    out_dir: PathBuf,

    /// LaTeX compiler to pipe the markup to.
    #[arg(long, global = true, default_value = "pdflatex")]
    latex: String,

    /// Seed of the random input and kernel values of numerical figures.
    #[arg(long, global = true, default_value_t = 1234)]
    seed: u64,

    /// Directory with numerical_figure.txt, arithmetic_figure.txt and unit.txt
    /// replacing the built-in templates.
    #[arg(long, global = true)]
    templates: Option<PathBuf>,

    /// Write `{name}_{step}.tex` instead of running the compiler.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Also write the input, kernel and output grids of numerical figures as .npy files.
    #[arg(long, global = true)]
    save_arrays: bool,

    /// More log output (repeat for more).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one frame of a geometry-only animation.
    Arithmetic(ArithmeticArgs),
    /// Render one frame of an animation with input, kernel and output values.
    Numerical(NumericalArgs),
    /// Render every frame of one animation.
    Batch(BatchArgs),
}

#[derive(Args, Debug)]
struct GeometryArgs {
    /// Input size.
    #[arg(short = 'i', long, default_value_t = 5)]
    input_size: usize,

    /// Output size.
    #[arg(short = 'o', long, default_value_t = 3)]
    output_size: usize,

    /// Zero padding.
    #[arg(short = 'p', long, default_value_t = 0)]
    padding: usize,

    /// Kernel size.
    #[arg(short = 'k', long, default_value_t = 3)]
    kernel_size: usize,

    /// Stride.
    #[arg(short = 's', long, default_value_t = 1)]
    stride: usize,

    /// Dilation.
    #[arg(short = 'd', long, default_value_t = 1)]
    dilation: usize,
}

impl From<&GeometryArgs> for Geometry {
    fn from(args: &GeometryArgs) -> Self {
        Geometry {
            input_size: args.input_size,
            output_size: args.output_size,
            padding: args.padding,
            kernel_size: args.kernel_size,
            stride: args.stride,
            dilation: args.dilation,
        }
    }
}

#[derive(Args, Debug)]
struct ArithmeticArgs {
    /// Name of the animation; frames are written as `{name}_{step:02}`.
    name: String,

    /// Frame index (0-based).
    step: usize,

    #[command(flatten)]
    geometry: GeometryArgs,

    /// Draw the transpose of the described convolution.
    #[arg(long)]
    transposed: bool,
}

#[derive(Args, Debug)]
struct NumericalArgs {
    /// Name of the animation; frames are written as `{name}_{step:02}`.
    name: String,

    /// Frame index (0-based).
    step: usize,

    #[command(flatten)]
    geometry: GeometryArgs,

    /// Reduction: convolution, average or max.
    #[arg(long, default_value = "convolution")]
    mode: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindChoice {
    Arithmetic,
    Numerical,
}

#[derive(Args, Debug)]
struct BatchArgs {
    kind: KindChoice,

    /// Name of the animation; frames are written as `{name}_{step:02}`.
    name: String,

    #[command(flatten)]
    geometry: GeometryArgs,

    /// Draw the transpose of the described convolution (arithmetic only).
    #[arg(long)]
    transposed: bool,

    /// Reduction: convolution, average or max (numerical only).
    #[arg(long, default_value = "convolution")]
    mode: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let opts = compile_options(&cli)?;
    let mut rng = StdRng::seed_from_u64(cli.seed);

    match &cli.cmd {
        Command::Arithmetic(args) => {
            let kind = FigureKind::Arithmetic {
                transposed: args.transposed,
            };
            cmd_frame(&kind, &args.name, args.step, &(&args.geometry).into(), &opts, &mut rng)
        }
        Command::Numerical(args) => {
            let mode: Mode = args.mode.parse()?;
            let kind = FigureKind::Numerical { mode };
            cmd_frame(&kind, &args.name, args.step, &(&args.geometry).into(), &opts, &mut rng)
        }
        Command::Batch(args) => cmd_batch(args, &opts, &rng),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn compile_options(cli: &Cli) -> anyhow::Result<CompileOptions> {
    let templates = match &cli.templates {
        Some(dir) => Templates::load(dir)
            .with_context(|| format!("load templates from '{}'", dir.display()))?,
        None => Templates::embedded(),
    };
    Ok(CompileOptions {
        out_dir: cli.out_dir.clone(),
        latex: cli.latex.clone(),
        templates,
        dry_run: cli.dry_run,
        save_arrays: cli.save_arrays,
        ..CompileOptions::default()
    })
}

fn cmd_frame(
    kind: &FigureKind,
    name: &str,
    step: usize,
    geometry: &Geometry,
    opts: &CompileOptions,
    rng: &mut StdRng,
) -> anyhow::Result<()> {
    let outcome = compile_frame(kind, name, step, geometry, opts, rng)
        .with_context(|| format!("render frame {} of '{}'", step, name))?;
    report(&outcome)
}

fn report(outcome: &CompileOutcome) -> anyhow::Result<()> {
    match outcome {
        CompileOutcome::Compiled { pdf } => eprintln!("wrote {}", pdf.display()),
        CompileOutcome::Written { tex } => eprintln!("wrote {}", tex.display()),
        CompileOutcome::Failed { log } => {
            anyhow::bail!("! LaTeX Error: check the log file in {}", log.display())
        }
    }
    Ok(())
}

fn cmd_batch(args: &BatchArgs, opts: &CompileOptions, rng: &StdRng) -> anyhow::Result<()> {
    let kind = match args.kind {
        KindChoice::Arithmetic => FigureKind::Arithmetic {
            transposed: args.transposed,
        },
        KindChoice::Numerical => FigureKind::Numerical {
            mode: args.mode.parse()?,
        },
    };
    let geometry: Geometry = (&args.geometry).into();
    let summary = compile_sequence(&kind, &args.name, &geometry, opts, rng)
        .with_context(|| format!("render frames of '{}'", args.name))?;

    let mut failed = 0usize;
    for (job, outcome) in &summary.outcomes {
        if let Err(e) = report(outcome) {
            eprintln!("{}: {}", job, e);
            failed += 1;
        }
    }
    anyhow::ensure!(
        failed == 0,
        "{} of {} frames failed to compile",
        failed,
        summary.outcomes.len()
    );
    Ok(())
}
