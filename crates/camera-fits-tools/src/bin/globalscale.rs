//! Precompute the merged global histogram of a mosaic.
//!
//! The unshrunk counts of every bin are written as big-endian 64-bit
//! integers to `<descriptor>.counts`, next to the descriptor.

use std::fs;
use std::path::PathBuf;
use std::process;

use camera_fits::endian::encode_u64_be;
use camera_fits::{BiasCorrection, CameraReader};
use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Write the merged histogram counts of a camera mosaic")]
struct Args {
    /// Descriptor file listing the camera files, one per line
    descriptor: PathBuf,

    /// WCS letter selecting the placement keywords
    #[arg(long, default_value_t = 'Q')]
    wcs: char,

    /// Bias correction: none, serial-parallel, target-level, target-level-guarded
    #[arg(long, default_value = "serial-parallel")]
    bias: String,

    /// Output file; defaults to the descriptor path with `.counts` appended
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let bias = BiasCorrection::from_name(&args.bias).ok_or_else(|| format!("unknown bias correction {:?}", args.bias))?;
    let reader = CameraReader::from_env()?;
    let counts = reader.global_histogram_counts(&args.descriptor, args.wcs, bias)?;

    let output = args.output.clone().unwrap_or_else(|| {
        let mut name = args.descriptor.clone().into_os_string();
        name.push(".counts");
        PathBuf::from(name)
    });
    fs::write(&output, encode_u64_be(&counts))?;

    let total: u64 = counts.iter().sum();
    let lowest = counts.iter().position(|&c| c > 0);
    let highest = counts.iter().rposition(|&c| c > 0);
    info!("bins {lowest:?}..={highest:?}");
    println!("{total} pixels in {} bins written to {}", counts.len(), output.display());
    reader.stats().report();
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
