mod bitrate;
mod command;
mod error;
mod ffmpeg;
mod ffprobe;
mod logger;
mod process;
mod progress;

use crate::error::Error;
use clap::Parser;
use console::style;
use log::error;
use std::process::ExitCode;
use tokio::signal;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = command::compress::Args::parse();

    let out = tokio::select! {
        r = command::compress(args) => r,
        _ = signal::ctrl_c() => Err(Error::Interrupted),
    };
    // an interrupted encode leaves a killed ffmpeg to reap
    process::child::wait().await;

    match out {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            if let Error::Encode { stderr_tail, .. } = &err {
                for line in stderr_tail {
                    error!(target: "ffmpeg", "{line}");
                }
            }
            eprintln!("{} {err}", style("Error:").red().bold());
            ExitCode::from(&err)
        }
    }
}
