use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use signalcraft_export::{
    plan_pages, DirectorySink, ExportConfig, Exporter, HtmlSurface, Orientation, PageFormat, PaperSize,
};
use std::path::PathBuf;

/// Export SignalCraft report regions as PNG images or paginated PDFs.
#[derive(Parser, Debug)]
#[command(name = "signalcraft-export", version, about)]
struct Cli {
    /// JSON config file (missing fields use defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory receiving exported files
    #[arg(long, global = true, default_value = ".")]
    out_dir: PathBuf,

    /// Override the pixel-density multiplier
    #[arg(long, global = true)]
    pixel_ratio: Option<f32>,

    /// Override the background colour (e.g. "#ffffff")
    #[arg(long, global = true)]
    background: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture an element and save it as a PNG
    Image(ExportArgs),
    /// Capture an element and save it as a multi-page PDF
    Pdf(ExportArgs),
    /// Print the page plan for a snapshot size as JSON
    Plan {
        /// Snapshot width in pixels
        #[arg(long)]
        width: u32,
        /// Snapshot height in pixels
        #[arg(long)]
        height: u32,
        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Report document (HTML file)
    #[arg(long)]
    input: PathBuf,
    /// Id of the element to capture
    #[arg(long)]
    target: String,
    /// Name of the downloaded file
    #[arg(long)]
    filename: String,
    #[command(flatten)]
    page: PageArgs,
}

#[derive(Args, Debug)]
struct PageArgs {
    /// Paper size: a4 or letter
    #[arg(long)]
    format: Option<String>,
    /// Use landscape pages
    #[arg(long)]
    landscape: bool,
}

impl PageArgs {
    fn apply(&self, cfg: &mut ExportConfig) -> Result<()> {
        if let Some(f) = &self.format {
            cfg.paper = f.parse::<PaperSize>()?;
        }
        if self.landscape {
            cfg.orientation = Orientation::Landscape;
        }
        Ok(())
    }
}

fn load_config(cli: &Cli) -> Result<ExportConfig> {
    let mut cfg = match &cli.config {
        Some(path) => ExportConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ExportConfig::default(),
    };
    if let Some(r) = cli.pixel_ratio {
        cfg.pixel_ratio = r;
    }
    if let Some(bg) = &cli.background {
        cfg.background = bg.clone();
    }
    Ok(cfg)
}

fn export(cli: &Cli, args: &ExportArgs, pdf: bool) -> Result<()> {
    let mut cfg = load_config(cli)?;
    args.page.apply(&mut cfg)?;

    let surface = HtmlSurface::from_file(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let exporter = Exporter::new(surface, DirectorySink::new(&cli.out_dir), &cfg)?;
    let report = if pdf {
        exporter.export_pdf(&args.target, &args.filename)?
    } else {
        exporter.export_image(&args.target, &args.filename)?
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match &cli.command {
        Command::Image(args) => export(&cli, args, false),
        Command::Pdf(args) => export(&cli, args, true),
        Command::Plan { width, height, page } => {
            let mut cfg = load_config(&cli)?;
            page.apply(&mut cfg)?;
            let format: PageFormat = cfg.page_format();
            let plan = plan_pages(*width, *height, format)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
    }
}
