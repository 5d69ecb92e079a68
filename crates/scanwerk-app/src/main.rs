// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk — turn photographed pages into a single PDF.
//
// Entry point. Initialises logging, loads settings, applies command-line
// overrides and runs one scan.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use scanwerk_core::config::{MAX_DPI, MIN_DPI, PageFilter, PageLayout};
use scanwerk_core::human_errors::humanize_error;
use scanwerk_core::{PaperSize, Point, Quadrilateral, ScanError};

use services::app_services::{AppServices, DetectorKind, ScanOutcome, ScanPlan};

#[derive(Parser, Debug)]
#[command(name = "scanwerk")]
#[command(about = "Straighten photographed pages and bind them into one PDF")]
#[command(long_about = "Straighten photographed pages and bind them into one PDF.
Each image becomes one page, in the order given. Page outlines come from --corners
or from the chosen detector; pages are rectified, optionally cleaned up, and
streamed into the output file.")]
struct Args {
    /// Page photos, in page order
    #[arg(required = true)]
    images: Vec<PathBuf>,

    #[arg(short, long, default_value = "scan.pdf", help = "Output PDF path")]
    out: PathBuf,

    /// Page outline for the next image, clockwise from top-left
    #[arg(long = "corners", value_parser = parse_corners,
          help = "Outline of the next image as x1,y1,x2,y2,x3,y3,x4,y4 (clockwise from top-left); repeat once per image")]
    corners: Vec<Quadrilateral>,

    #[arg(long, value_enum, default_value_t = DetectorArg::Platform,
          help = "How to find the page in images without --corners")]
    detector: DetectorArg,

    #[arg(long, value_enum, help = "Clean-up filter applied to every page")]
    filter: Option<FilterArg>,

    #[arg(long, value_parser = parse_paper, conflicts_with = "dpi",
          help = "Fit pages on a paper size: a3, a4, a5, letter, legal")]
    paper: Option<PaperSize>,

    #[arg(long, value_parser = parse_dpi, help = "Size pages from their pixels at this resolution (1-2400)")]
    dpi: Option<f64>,

    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100),
          help = "JPEG quality for page images (1-100)")]
    quality: Option<u8>,

    #[arg(long, help = "Document title stored in the PDF")]
    title: Option<String>,

    #[arg(long, help = "Refuse more than this many pages (0 = no limit)")]
    max_pages: Option<usize>,

    #[arg(long = "move", value_parser = parse_move,
          help = "Move page FROM to position TO (1-based, e.g. 3:1); repeatable")]
    moves: Vec<(usize, usize)>,

    #[arg(long, help = "Also write each straightened page as a JPEG into this directory")]
    jpeg_dir: Option<PathBuf>,

    #[arg(long, help = "Settings file (default: <data dir>/scanwerk/config.json)")]
    config: Option<PathBuf>,

    #[arg(long, help = "Store the effective settings for next time")]
    save_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DetectorArg {
    /// The platform's own page detector
    Platform,
    /// Use the whole image
    Full,
    /// Find the page edges
    Hough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FilterArg {
    None,
    Grayscale,
    /// Adaptive black and white, for uneven lighting
    Binarize,
    /// Global black and white
    Otsu,
}

impl From<FilterArg> for PageFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::None => PageFilter::None,
            FilterArg::Grayscale => PageFilter::Grayscale,
            FilterArg::Binarize => PageFilter::Binarize {
                block_radius: 15,
                c: 10,
            },
            FilterArg::Otsu => PageFilter::Otsu,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::info!(images = args.images.len(), "Scanwerk starting");

    match run(args) {
        Ok(outcome) => {
            print_outcome(&outcome);
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "Scan failed");
            let human = humanize_error(&err);
            eprintln!("{}", human.message);
            eprintln!("{}", human.suggestion);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ScanOutcome, ScanError> {
    let mut services = AppServices::init(args.config.as_deref())?;
    apply_overrides(&args, services.config_mut());
    if args.save_config {
        services.save_config()?;
        println!("Settings saved to {}", services.config_path().display());
    }

    let plan = ScanPlan {
        images: args.images,
        corners: args.corners,
        detector: match args.detector {
            DetectorArg::Platform => DetectorKind::Platform,
            DetectorArg::Full => DetectorKind::FullFrame,
            DetectorArg::Hough => DetectorKind::Hough,
        },
        moves: args.moves,
        output: args.out,
        jpeg_dir: args.jpeg_dir,
    };
    services.run_scan(&plan)
}

fn apply_overrides(args: &Args, config: &mut scanwerk_core::ScanConfig) {
    if let Some(filter) = args.filter {
        config.filter = filter.into();
    }
    if let Some(paper) = args.paper {
        config.layout = PageLayout::Paper(paper);
    }
    if let Some(dpi) = args.dpi {
        config.layout = PageLayout::Native { dpi };
    }
    if let Some(quality) = args.quality {
        config.jpeg_quality = quality;
    }
    if let Some(max_pages) = args.max_pages {
        config.max_pages = max_pages;
    }
    if args.title.is_some() {
        config.title = args.title.clone();
    }
}

fn print_outcome(outcome: &ScanOutcome) {
    for (path, err) in &outcome.skipped {
        let human = humanize_error(err);
        eprintln!("skipped {}: {}", path.display(), human.message);
    }
    for page in &outcome.snapshot.pages {
        println!(
            "page {:>3}  {}x{} {:?}",
            page.index + 1,
            page.width,
            page.height,
            page.format
        );
    }
    for path in &outcome.exported {
        println!("wrote {}", path.display());
    }
    println!(
        "{} page(s), {} bytes, sha256 {}",
        outcome.report.page_count, outcome.report.bytes_written, outcome.report.sha256
    );
}

// -- Argument parsing -------------------------------------------------------------

fn parse_corners(s: &str) -> Result<Quadrilateral, String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|err| format!("{v:?}: {err}")))
        .collect::<Result<_, _>>()?;
    let [x1, y1, x2, y2, x3, y3, x4, y4] = values[..] else {
        return Err(format!("expected 8 numbers, got {}", values.len()));
    };
    Ok(Quadrilateral::new(
        Point::new(x1, y1),
        Point::new(x2, y2),
        Point::new(x3, y3),
        Point::new(x4, y4),
    ))
}

fn parse_paper(s: &str) -> Result<PaperSize, String> {
    PaperSize::from_name(s).ok_or_else(|| format!("unknown paper size {s:?}"))
}

fn parse_dpi(s: &str) -> Result<f64, String> {
    let dpi: f64 = s.trim().parse().map_err(|err| format!("{s:?}: {err}"))?;
    if (MIN_DPI..=MAX_DPI).contains(&dpi) {
        Ok(dpi)
    } else {
        Err(format!("{dpi} is outside {MIN_DPI}..={MAX_DPI}"))
    }
}

/// `FROM:TO`, 1-based on the command line, zero-based inside.
fn parse_move(s: &str) -> Result<(usize, usize), String> {
    let (from, to) = s
        .split_once(':')
        .ok_or_else(|| format!("expected FROM:TO, got {s:?}"))?;
    let position = |v: &str| -> Result<usize, String> {
        match v.trim().parse::<usize>() {
            Ok(0) => Err("page numbers start at 1".into()),
            Ok(n) => Ok(n - 1),
            Err(err) => Err(format!("{v:?}: {err}")),
        }
    };
    Ok((position(from)?, position(to)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_parse_in_clockwise_order() {
        let quad = parse_corners("10,20, 110,22,108,160,12,158").unwrap();
        assert_eq!(quad.corners[0], Point::new(10.0, 20.0));
        assert_eq!(quad.corners[2], Point::new(108.0, 160.0));
        assert!(parse_corners("1,2,3").is_err());
        assert!(parse_corners("1,2,3,4,5,6,7,x").is_err());
    }

    #[test]
    fn moves_are_one_based() {
        assert_eq!(parse_move("3:1").unwrap(), (2, 0));
        assert!(parse_move("0:1").is_err());
        assert!(parse_move("2-1").is_err());
    }

    #[test]
    fn flags_override_settings() {
        let args = Args::parse_from([
            "scanwerk",
            "a.jpg",
            "b.jpg",
            "--filter",
            "otsu",
            "--paper",
            "letter",
            "--quality",
            "70",
            "--title",
            "Invoices",
            "--corners",
            "0,0,100,0,100,140,0,140",
            "--move",
            "2:1",
        ]);
        let mut config = scanwerk_core::ScanConfig::default();
        apply_overrides(&args, &mut config);

        assert_eq!(config.filter, PageFilter::Otsu);
        assert_eq!(config.layout, PageLayout::Paper(PaperSize::Letter));
        assert_eq!(config.jpeg_quality, 70);
        assert_eq!(config.title.as_deref(), Some("Invoices"));
        assert_eq!(args.corners.len(), 1);
        assert_eq!(args.moves, vec![(1, 0)]);
        assert_eq!(args.detector, DetectorArg::Platform);
    }

    #[test]
    fn paper_and_dpi_conflict() {
        let result = Args::try_parse_from(["scanwerk", "a.jpg", "--paper", "a4", "--dpi", "300"]);
        assert!(result.is_err());
    }

    #[test]
    fn dpi_is_range_checked() {
        assert!(Args::try_parse_from(["scanwerk", "a.jpg", "--dpi", "1e-300"]).is_err());
        assert!(Args::try_parse_from(["scanwerk", "a.jpg", "--dpi", "5000"]).is_err());
        assert!(Args::try_parse_from(["scanwerk", "a.jpg", "--dpi", "NaN"]).is_err());
        let args = Args::try_parse_from(["scanwerk", "a.jpg", "--dpi", "300"]).unwrap();
        assert_eq!(args.dpi, Some(300.0));
    }

    #[test]
    fn quality_is_range_checked() {
        assert!(Args::try_parse_from(["scanwerk", "a.jpg", "--quality", "0"]).is_err());
        assert!(Args::try_parse_from(["scanwerk", "a.jpg", "--quality", "101"]).is_err());
    }
}
