//! Log command

use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use ghost_core::Error;
use ghost_lifecycle::process::log_tail;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::Session;
use crate::cli::LogArgs;

/// How often `--follow` polls the log file
const FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run(session: &Session, args: LogArgs) -> Result<()> {
    let mut instance = session.instance(args.instance.name.as_deref())?;
    if !instance.is_running().await? {
        instance.check_environment();
    }

    let path = instance.log_file(args.error)?;
    if !path.is_file() {
        return Err(Error::cli(format!("Log file {} does not exist", path.display()))
            .with_help("Ghost writes its log once it has been started with file logging enabled")
            .into());
    }

    if let Some(tail) = log_tail(&path, args.number) {
        println!("{}", tail);
    }
    if args.follow {
        follow(&path).await?;
    }
    Ok(())
}

/// Print lines appended to `path` until interrupted
async fn follow(path: &Path) -> Result<()> {
    let mut file = File::open(path).await?;
    let mut offset = file.seek(SeekFrom::End(0)).await?;
    let mut stdout = tokio::io::stdout();
    let mut interval = tokio::time::interval(FOLLOW_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = interval.tick() => {}
        }

        let len = tokio::fs::metadata(path).await?.len();
        if len < offset {
            // truncated or rotated
            file = File::open(path).await?;
            offset = 0;
        }
        if len == offset {
            continue;
        }

        file.seek(SeekFrom::Start(offset)).await?;
        let mut appended = Vec::new();
        offset += file.read_to_end(&mut appended).await? as u64;
        stdout.write_all(&appended).await?;
        stdout.flush().await?;
    }
}
