use std::{fs, path::PathBuf};

use anyhow::Context;
use bank::payloads::Answer;
use clap::Parser;
use prost::Message;

/// Writes an answer payload for posting to `/surveys/{id}/answer` by hand.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    option_index: u32,

    #[arg(short, long, default_value = "answer.bin")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let answer = Answer {
        option_index: args.option_index,
    };
    let bytes = answer.encode_to_vec();
    println!("{:?}", bytes);

    fs::write(&args.output, bytes)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    Ok(())
}
