use std::{env, process};

use ansi_term::Colour::{Cyan, Green, Red, Yellow};
use deflate_profiler::archive::{is_zip, Archive};
use deflate_profiler::ProfileModel;

const HISTOGRAM_BUCKETS: usize = 32;
const HISTOGRAM_WIDTH: f64 = 60.0;

#[derive(Debug, Default)]
struct Opts {
  json: bool,
  histogram: bool,
  files: Vec<String>,
}

fn print_usage(prog_name: &str) {
  println!("Usage: {} [--json] [--histogram] <file>...", prog_name);
  println!(
    r#"Decodes zlib streams (or every entry of a zip archive) and reports how the
compressed bits were spent: literals, back-references, and how much of the
output each literal ended up producing.
    --json       print each profile summary as JSON
    --histogram  plot literal contributions across the output
Set RUST_LOG=debug for per-block details.
"#
  );
}

fn program_name(args: &[String]) -> &str {
  args.first().map_or("zprof", String::as_str)
}

fn try_parse_args(args: &[String]) -> Option<Opts> {
  let mut opts = Opts::default();
  for arg in args.iter().skip(1) {
    match arg.as_str() {
      "--json" => opts.json = true,
      "--histogram" => opts.histogram = true,
      flag if flag.starts_with("--") => return None,
      file => opts.files.push(file.to_owned()),
    }
  }
  if opts.files.is_empty() {
    return None;
  }
  Some(opts)
}

fn print_histogram(model: &ProfileModel) {
  let histogram = model.contribution_histogram(HISTOGRAM_BUCKETS);
  let peak = histogram.iter().cloned().fold(0.0, f64::max);
  if peak == 0.0 {
    return;
  }
  let bucket_size = (model.inflated_size() as usize + HISTOGRAM_BUCKETS - 1) / HISTOGRAM_BUCKETS;
  for (i, value) in histogram.iter().enumerate() {
    let bar = "#".repeat((value / peak * HISTOGRAM_WIDTH).round() as usize);
    // Literal density of the bucket: near 1 is incompressible, near 0 is all copies.
    let density = value / bucket_size.max(1) as f64;
    let painted = if density > 0.5 {
      Red.paint(bar)
    } else if density > 0.1 {
      Yellow.paint(bar)
    } else {
      Green.paint(bar)
    };
    println!("{:>8} {:>8.2} {}", i * bucket_size, value, painted);
  }
}

fn report(name: &str, model: &ProfileModel, opts: &Opts) {
  let summary = model.summary();
  if opts.json {
    match serde_json::to_string_pretty(&summary) {
      Ok(json) => println!("{}", json),
      Err(e) => eprintln!("Could not serialize summary for {}: {}", name, e),
    }
  } else {
    println!("{}", Cyan.bold().paint(name));
    println!(
      "  {} -> {} bytes ({:.2}x), {} blocks",
      summary.deflated_size, summary.inflated_size, summary.compression_ratio, summary.block_count
    );
    println!(
      "  {} literals, {} back-references, heaviest literal produced {} bytes",
      summary.literal_count, summary.copy_count, summary.max_literal_weight
    );
    for (i, block) in summary.blocks.iter().enumerate() {
      println!(
        "  block {}: {:?}, {} bits{}",
        i,
        block.block_type,
        block.bit_size,
        if block.is_final { " (final)" } else { "" }
      );
    }
  }
  if opts.histogram {
    print_histogram(model);
  }
}

fn profile_file(path: &str, opts: &Opts) -> Result<(), Box<dyn std::error::Error>> {
  let data = std::fs::read(path)?;
  if is_zip(&data) {
    let archive = Archive::new(&data)?;
    for entry in archive.entries() {
      let model = archive.profile(entry)?;
      report(&format!("{}:{}", path, entry), &model, opts);
    }
  } else {
    let model = deflate_profiler::decode_zlib(&data)?;
    report(path, &model, opts);
  }
  Ok(())
}

fn main() {
  pretty_env_logger::init();
  let args: Vec<String> = env::args().collect();

  let opts = match try_parse_args(&args) {
    Some(opts) => opts,
    None => {
      print_usage(program_name(&args));
      process::exit(1);
    }
  };

  let mut failed = false;
  for path in opts.files.iter() {
    if let Err(e) = profile_file(path, &opts) {
      eprintln!("{}: {}", Red.paint(path.as_str()), e);
      failed = true;
    }
  }
  if failed {
    process::exit(2);
  }
}
