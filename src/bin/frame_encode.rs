//! frame_encode - Write image files to stdout as detection worker frames.
//!
//! Producer side of the worker's input protocol, for feeding recorded
//! snapshots through a worker:
//!
//! ```text
//! frame_encode --source cam snap1.jpg snap2.jpg | detect_worker --protocol tagged
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use detect_worker::{encode_tagged, write_frame};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Encode image files as length-prefixed detection worker frames"
)]
struct Args {
    /// Source id to tag each frame with (tagged layout). Omit for untagged frames.
    #[arg(long)]
    source: Option<String>,

    /// Number of times to emit the full list of images.
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Encoded image files (JPEG or PNG).
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut payloads = Vec::with_capacity(args.images.len());
    for path in &args.images {
        let image = std::fs::read(path)
            .with_context(|| format!("failed to read image {}", path.display()))?;
        if image.is_empty() {
            return Err(anyhow!("image {} is empty", path.display()));
        }
        let payload = match args.source.as_deref() {
            Some(source) => encode_tagged(source, &image)?,
            None => image,
        };
        payloads.push(payload);
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut written = 0u64;
    for _ in 0..args.repeat {
        for payload in &payloads {
            write_frame(&mut out, payload).context("failed to write frame")?;
            written += 1;
        }
    }
    out.flush().context("failed to flush frames")?;

    log::info!("wrote {} frames", written);
    Ok(())
}
