//! Turns rendered frames into documents by piping their markup to a LaTeX
//! compiler, one job per frame.

use std::{
    io::Write as _,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use rand::Rng;

use crate::{
    arithmetic::{render_arithmetic_frame, ArithmeticFrame, ArithmeticLayout},
    error::{FigureError, FigureResult},
    geometry::Geometry,
    numerical::{render_numerical_frame, NumericalFrame},
    reduction::Mode,
    template::Templates,
};

/// Substrings of the compiler's output that mark a failed job.
pub const ERROR_MARKERS: [&str; 2] = ["LaTeX Error", "Emergency stop"];

/// Which figure a job renders.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum FigureKind {
    Arithmetic { transposed: bool },
    Numerical { mode: Mode },
}

impl FigureKind {
    /// Number of frames in the animation of this kind for `geometry`.
    pub fn num_steps(&self, geometry: &Geometry) -> FigureResult<usize> {
        match *self {
            FigureKind::Arithmetic { transposed } => {
                let layout = ArithmeticLayout::new(geometry, transposed)?;
                Ok(layout.output_size * layout.output_size)
            }
            FigureKind::Numerical { .. } => Ok(geometry.num_steps()),
        }
    }
}

/// A rendered frame of either kind.
#[derive(Debug, Clone)]
pub enum Frame {
    Arithmetic(ArithmeticFrame),
    Numerical(NumericalFrame),
}

impl Frame {
    pub fn markup(&self) -> &str {
        match self {
            Frame::Arithmetic(frame) => &frame.markup,
            Frame::Numerical(frame) => &frame.markup,
        }
    }
}

/// Renders frame `step` of `kind`. Only numerical frames draw from `rng`.
pub fn render_frame<R: Rng + ?Sized>(
    kind: &FigureKind,
    step: usize,
    geometry: &Geometry,
    templates: &Templates,
    rng: &mut R,
) -> FigureResult<Frame> {
    match *kind {
        FigureKind::Arithmetic { transposed } => {
            render_arithmetic_frame(step, geometry, transposed, templates).map(Frame::Arithmetic)
        }
        FigureKind::Numerical { mode } => {
            render_numerical_frame(step, geometry, mode, templates, rng).map(Frame::Numerical)
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Directory receiving the documents (and, on failure, the compiler's logs).
    pub out_dir: PathBuf,
    /// Compiler executable.
    pub latex: String,
    /// Arguments placed before the job arguments.
    pub latex_args: Vec<String>,
    pub templates: Templates,
    /// Write `{job}.tex` instead of running the compiler.
    pub dry_run: bool,
    /// Also write the grids of numerical frames as `.npy` files.
    pub save_arrays: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            out_dir: PathBuf::from("pdf"),
            latex: "pdflatex".to_string(),
            latex_args: Vec::new(),
            templates: Templates::embedded(),
            dry_run: false,
            save_arrays: false,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum CompileOutcome {
    /// The compiler produced a document; auxiliary files were removed.
    Compiled { pdf: PathBuf },
    /// Dry run: the markup was written to disk.
    Written { tex: PathBuf },
    /// The compiler reported an error; its files are left for inspection.
    Failed { log: PathBuf },
}

impl CompileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CompileOutcome::Failed { .. })
    }
}

/// Job name of frame `step`: `{name}_{step:02}`.
pub fn job_name(name: &str, step: usize) -> String {
    format!("{}_{:02}", name, step)
}

pub fn has_error_marker(output: &str) -> bool {
    ERROR_MARKERS.iter().any(|marker| output.contains(marker))
}

/// Renders frame `step` and compiles it as job `{name}_{step:02}` in `opts.out_dir`.
///
/// A job the compiler reports as failed is not an error: it yields
/// [`CompileOutcome::Failed`] naming the retained log.
#[tracing::instrument(skip(geometry, opts, rng))]
pub fn compile_frame<R: Rng + ?Sized>(
    kind: &FigureKind,
    name: &str,
    step: usize,
    geometry: &Geometry,
    opts: &CompileOptions,
    rng: &mut R,
) -> FigureResult<CompileOutcome> {
    let frame = render_frame(kind, step, geometry, &opts.templates, rng)?;
    let job = job_name(name, step);

    std::fs::create_dir_all(&opts.out_dir)?;

    if opts.save_arrays {
        if let Frame::Numerical(numerical) = &frame {
            save_arrays(&opts.out_dir, &job, numerical)?;
        }
    }

    if opts.dry_run {
        let tex = opts.out_dir.join(format!("{}.tex", job));
        std::fs::write(&tex, frame.markup())?;
        tracing::info!(path = %tex.display(), "wrote markup");
        return Ok(CompileOutcome::Written { tex });
    }

    run_latex(opts, &job, frame.markup())
}

fn run_latex(opts: &CompileOptions, job: &str, markup: &str) -> FigureResult<CompileOutcome> {
    // The document check below must only see output of this run.
    let pdf = opts.out_dir.join(format!("{}.pdf", job));
    match std::fs::remove_file(&pdf) {
        Ok(()) => tracing::debug!(pdf = %pdf.display(), "removed stale document"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut cmd = Command::new(&opts.latex);
    cmd.args(&opts.latex_args)
        .arg(format!("-jobname={}", job))
        .arg("-interaction=nonstopmode")
        .arg("-output-directory")
        .arg(&opts.out_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| FigureError::Spawn {
        program: opts.latex.clone(),
        source,
    })?;

    {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to open {} stdin", opts.latex))?;
        // A compiler that stops reading early closes the pipe; its output says why.
        if let Err(e) = stdin.write_all(markup.as_bytes()) {
            tracing::debug!(error = %e, "compiler closed stdin early");
        }
    }

    let output = child.wait_with_output()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        tracing::warn!(status = %output.status, job, "compiler exited unsuccessfully");
    }

    let log = opts.out_dir.join(format!("{}.log", job));
    if has_error_marker(&stdout) {
        tracing::error!(log = %log.display(), "LaTeX error: check the log file");
        return Ok(CompileOutcome::Failed { log });
    }

    if !pdf.exists() {
        tracing::error!(pdf = %pdf.display(), log = %log.display(), "compiler produced no document");
        return Ok(CompileOutcome::Failed { log });
    }

    remove_auxiliary(&opts.out_dir, job)?;
    tracing::info!(path = %pdf.display(), "compiled frame");
    Ok(CompileOutcome::Compiled { pdf })
}

/// Side files the compiler writes next to the document.
pub const AUXILIARY_EXTENSIONS: [&str; 9] = [
    "aux",
    "log",
    "out",
    "toc",
    "nav",
    "snm",
    "fls",
    "fdb_latexmk",
    "synctex.gz",
];

/// Deletes the compiler side files of `job` in `dir`; returns what was removed.
/// Anything else sharing the job name, such as a dry-run `.tex`, is left alone.
pub(crate) fn remove_auxiliary(dir: &Path, job: &str) -> FigureResult<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for ext in AUXILIARY_EXTENSIONS {
        let path = dir.join(format!("{}.{}", job, ext));
        if path.is_file() {
            std::fs::remove_file(&path)?;
            removed.push(path);
        }
    }
    removed.sort();
    Ok(removed)
}

fn save_arrays(dir: &Path, job: &str, frame: &NumericalFrame) -> FigureResult<()> {
    let npy = |e: ndarray_npy::WriteNpyError| FigureError::Npy(e.to_string());
    ndarray_npy::write_npy(dir.join(format!("{}_input.npy", job)), &frame.input).map_err(npy)?;
    ndarray_npy::write_npy(dir.join(format!("{}_kernel.npy", job)), &frame.kernel).map_err(npy)?;
    ndarray_npy::write_npy(dir.join(format!("{}_output.npy", job)), &frame.output).map_err(npy)?;
    Ok(())
}

/// Result of compiling every frame of one animation.
#[derive(Debug, Clone, Default)]
pub struct SequenceReport {
    pub outcomes: Vec<(String, CompileOutcome)>,
}

impl SequenceReport {
    pub fn failures(&self) -> impl Iterator<Item = &(String, CompileOutcome)> {
        self.outcomes.iter().filter(|(_, outcome)| outcome.is_failure())
    }
}

/// Compiles frames `0..n` of one animation in order.
///
/// Every frame starts from a clone of `rng`, so all frames show the same input
/// and kernel values. A frame the compiler rejects is recorded and the
/// sequence continues; argument and process errors stop it.
pub fn compile_sequence<R: Rng + Clone>(
    kind: &FigureKind,
    name: &str,
    geometry: &Geometry,
    opts: &CompileOptions,
    rng: &R,
) -> FigureResult<SequenceReport> {
    let steps = kind.num_steps(geometry)?;
    let mut report = SequenceReport::default();
    for step in 0..steps {
        let mut frame_rng = rng.clone();
        let outcome = compile_frame(kind, name, step, geometry, opts, &mut frame_rng)?;
        report.outcomes.push((job_name(name, step), outcome));
    }
    tracing::info!(
        frames = steps,
        failed = report.failures().count(),
        "compiled sequence"
    );
    Ok(report)
}
