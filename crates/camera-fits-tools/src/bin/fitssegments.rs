//! List the amplifier segments of a mosaic descriptor, optionally only those
//! under a point or overlapping a region, and render the region to a PPM.

use std::fs;
use std::path::PathBuf;
use std::process;

use camera_fits::{BiasCorrection, CameraReader, Region, RenderRequest, ScaleMode};
use clap::Parser;
use glam::DVec2;

#[derive(Parser, Debug)]
#[command(author, version, about = "List and inspect the segments of a camera mosaic")]
struct Args {
    /// Descriptor file listing the camera files, one per line
    descriptor: PathBuf,

    /// WCS letter selecting the placement keywords
    #[arg(long, default_value_t = 'Q')]
    wcs: char,

    /// Only segments under this mosaic point, as X,Y
    #[arg(long, value_parser = parse_point, conflicts_with = "region")]
    point: Option<(f64, f64)>,

    /// Only segments overlapping this region, as X,Y,WIDTH,HEIGHT
    #[arg(long, value_parser = parse_region)]
    region: Option<Region>,

    /// Bias correction: none, serial-parallel, target-level, target-level-guarded
    #[arg(long, default_value = "none")]
    bias: String,

    /// Scale every amplifier by one merged histogram
    #[arg(long)]
    global: bool,

    /// Render the region (or the whole mosaic) to this binary PPM file
    #[arg(long)]
    render: Option<PathBuf>,

    /// Render whole readouts, overscan included
    #[arg(long)]
    overscan: bool,
}

fn parse_numbers<T: std::str::FromStr>(s: &str, n: usize) -> Result<Vec<T>, String> {
    let parts: Vec<T> = s
        .split(',')
        .map(|p| p.trim().parse().map_err(|_| format!("invalid number {p:?}")))
        .collect::<Result<_, _>>()?;
    if parts.len() != n {
        return Err(format!("expected {n} comma-separated numbers, got {}", parts.len()));
    }
    Ok(parts)
}

fn parse_point(s: &str) -> Result<(f64, f64), String> {
    let v = parse_numbers::<f64>(s, 2)?;
    Ok((v[0], v[1]))
}

fn parse_region(s: &str) -> Result<Region, String> {
    let v = parse_numbers::<i64>(s, 4)?;
    let narrow = |x: i64| i32::try_from(x).map_err(|_| format!("{x} out of range"));
    let size = |x: i64| u32::try_from(x).map_err(|_| format!("{x} is not a valid size"));
    Ok(Region::new(narrow(v[0])?, narrow(v[1])?, size(v[2])?, size(v[3])?))
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let bias = BiasCorrection::from_name(&args.bias).ok_or_else(|| format!("unknown bias correction {:?}", args.bias))?;
    let reader = CameraReader::from_env()?;

    let segments = match (args.point, args.region) {
        (Some((x, y)), _) => reader.segments_for_point(&args.descriptor, args.wcs, x, y)?,
        (None, Some(region)) => reader.segments_for_region(&args.descriptor, args.wcs, &region)?,
        (None, None) => reader.descriptor_segments(&args.descriptor, args.wcs)?,
    };

    for segment in &segments {
        let d = segment.datasec();
        let b = segment.bounds();
        println!(
            "{} {} {:<10} ch {:>2}  {}x{}  datasec {}x{}+{}+{}  bounds ({:.1}, {:.1})..({:.1}, {:.1}){}",
            segment.raft_bay(),
            segment.ccd_slot(),
            segment.name(),
            segment.channel(),
            segment.naxis1(),
            segment.naxis2(),
            d.width,
            d.height,
            d.x,
            d.y,
            b.min.x,
            b.min.y,
            b.max.x,
            b.max.y,
            if segment.compression().is_some() { "  GZIP_2" } else { "" },
        );
        if let Some((x, y)) = args.point {
            if let Some((px, py)) = segment.world_to_pixel(DVec2::new(x, y)) {
                let raw = reader.pixel_for_segment(segment, px, py)?;
                let rgb = reader.rgb_for_segment(segment, bias, px, py)?;
                let factors = reader.correction_factors_for_segment(segment, bias)?;
                let cf = factors.factor(px, py);
                println!(
                    "    pixel ({px}, {py}) raw {} cf {cf} rgb {:?}",
                    raw.map_or_else(|| "-".to_string(), |v| v.to_string()),
                    rgb
                );
            }
        }
    }
    println!("{} segments", segments.len());

    if let Some(out) = &args.render {
        let mut request = RenderRequest::new(&args.descriptor)
            .wcs(args.wcs)
            .bias(bias)
            .include_overscan(args.overscan)
            .scale(if args.global { ScaleMode::Global } else { ScaleMode::PerAmplifier });
        request.region = args.region;
        let canvas = reader.render(&request)?;
        let mut ppm = format!("P6\n{} {}\n255\n", canvas.width(), canvas.height()).into_bytes();
        ppm.extend_from_slice(canvas.as_bytes());
        fs::write(out, ppm)?;
        println!("wrote {}x{} to {}", canvas.width(), canvas.height(), out.display());
        reader.stats().report();
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
