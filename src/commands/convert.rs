use std::io::{self, Write};

use anyhow::{bail, Result};
use fitsync_cache::{BestEffortTranscoder, Transcoder};

use crate::cli::ConvertArgs;

/// `fitsync convert` (spec §6): a standalone transcode, no catalog or
/// adapter involved — useful for spot-checking a downloaded file or
/// preparing one for a platform that only accepts GPX.
pub fn run(args: ConvertArgs) -> Result<i32> {
    let input_format = infer_format(&args.input)?;
    let output_format = args.format.into();

    let bytes = std::fs::read(&args.input)?;
    let transcoder = BestEffortTranscoder;

    if !transcoder.supports(input_format, output_format) {
        eprintln!(
            "cannot convert {} -> {}",
            input_format.extension(),
            output_format.extension()
        );
        return Ok(1);
    }

    let converted = match transcoder.convert(&bytes, input_format, output_format) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("conversion failed: {}", err);
            return Ok(1);
        }
    };

    if args.info {
        println!(
            "{}: {} bytes {} -> {} bytes {}",
            args.input.display(),
            bytes.len(),
            input_format.extension(),
            converted.len(),
            output_format.extension()
        );
        return Ok(0);
    }

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension(output_format.extension()));

    if output_path.exists() && args.interactive && !args.batch {
        print!("{} exists, overwrite? [y/N] ", output_path.display());
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("skipped");
            return Ok(0);
        }
    }

    std::fs::write(&output_path, converted)?;
    println!("wrote {}", output_path.display());
    Ok(0)
}

fn infer_format(path: &std::path::Path) -> Result<fitsync_adapters::FileFormat> {
    use fitsync_adapters::FileFormat;
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()) {
        Some(ext) if ext == "fit" => Ok(FileFormat::Fit),
        Some(ext) if ext == "tcx" => Ok(FileFormat::Tcx),
        Some(ext) if ext == "gpx" => Ok(FileFormat::Gpx),
        other => bail!("cannot infer file format from extension {:?}", other),
    }
}
