use std::error::Error;
use std::process::ExitCode;

use thaw::{decode_woff1, decode_woff2};

fn run(infile: &str, outfile: &str) -> Result<(), Box<dyn Error>> {
    log::info!("Reading from {infile}");
    let woff = std::fs::read(infile)?;

    let font = if woff.starts_with(b"wOFF") {
        log::info!("Decoding woff1");
        decode_woff1(&woff)?
    } else {
        log::info!("Decoding woff2");
        decode_woff2(&woff)?
    };

    for table in &font.tables {
        log::debug!(
            "'{}' offset {} length {} checksum {:#010x}",
            table.tag,
            table.offset,
            table.length,
            table.checksum
        );
    }

    log::info!("Writing {} bytes to {outfile}", font.data.len());
    std::fs::write(outfile, &font.data)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args();
    let (Some(infile), Some(outfile)) = (args.nth(1), args.next()) else {
        eprintln!("usage: thaw <in.woff2|in.woff> <out.ttf>");
        return ExitCode::FAILURE;
    };

    match run(&infile, &outfile) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{infile}: {err}");
            ExitCode::FAILURE
        }
    }
}
