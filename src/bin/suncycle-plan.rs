use chrono::DateTime;
use clap::Parser;
use suncycle::*;
use tokio::io::{self, AsyncBufReadExt, BufReader};

/// Answers, for each RFC 3339 instant read from stdin, what the scheduler
/// would decide at that instant
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    windows: WindowArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let schedule = cli.windows.schedule()?;

    // Inform about successful initialization
    println!("OK");

    // Mainloop: one RFC 3339 instant per line
    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        println!("{}", answer(&cli.windows, &schedule, input));
    }

    Ok(())
}

fn answer(args: &WindowArgs, schedule: &Schedule, input: &str) -> String {
    match DateTime::parse_from_rfc3339(input) {
        Ok(instant) => {
            let instant = args.localize(instant);
            let state = schedule.classify(&instant);
            let deadline = schedule.next_wake(&instant, state);
            format!(
                "OK {state} {} {deadline} capture={}",
                deadline.epoch_seconds(),
                schedule.is_capture_hour(&instant)
            )
        }
        Err(e) => format!("ERR Invalid instant {input:?}: {e}"),
    }
}
