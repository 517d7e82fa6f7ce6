use std::error::Error;
use std::fs;
use std::process::ExitCode;

use clap::Parser;
use log::{debug, error, info};

use ccore::hash::{self, Digest};
use ccore::id::RecordId;
use chainfile::progress::Progress;
use chainfile::transmit::TransmitOptions;
use chainfile::{Chainfile, Config};

mod cli;
use crate::cli::CacheCommands;
use crate::cli::Cli;
use crate::cli::Commands;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn report(p: Progress) {
    match p.chunk() {
        Some((index, state)) => debug!("chunk {}/{} {}", index + 1, p.total, state),
        None => info!("{} {}/{}", p.phase, p.current, p.total),
    }
}

fn parse_hash(raw: &str) -> Result<Digest, Box<dyn Error>> {
    Ok(hash::from_hex(raw.trim())?)
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = Config::load(cli.config.as_deref())?;
    let mut client = Chainfile::open(config)?;

    match cli.command {
        Commands::Put {
            file,
            mime,
            chunk_size,
            policy,
            compress,
        } => {
            let opts = TransmitOptions {
                policy: policy.sizing(chunk_size),
                concurrency: client.config().concurrency,
                compress,
                mime_type: mime,
                charset: None,
            };
            let done = client.put_file(&file, &opts, &mut report).await?;

            println!("{}", done.main_id);
            info!(
                "{} chunks of {} bytes, file hash {}",
                done.total_chunks, done.chunk_size, done.file_hash
            );
        }
        Commands::Get {
            id,
            output,
            no_verify,
        } => {
            let main_id = RecordId::from_display_hex(&id)?;
            let out = client.get(main_id, !no_verify, &mut report).await?;

            fs::write(&output, &out.data)?;
            info!(
                "Wrote {} bytes of {} to {}",
                out.data.len(),
                out.content_info.mime_type,
                output.display()
            );
        }
        Commands::Sessions => {
            for s in client.list_sessions()? {
                let main_id = s
                    .main_record_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}\t{:?}\t{}/{}\t{}\t{}",
                    s.file_hash,
                    s.status,
                    s.committed.len(),
                    s.total_chunks,
                    s.file_name,
                    main_id
                );
            }
        }
        Commands::Resume { file } => {
            let file_hash = hash::hash(&mut fs::File::open(&file)?)?;
            let data = fs::read(&file)?;
            let done = client.resume_session(&file_hash, &data, &mut report).await?;
            println!("{}", done.main_id);
        }
        Commands::Pause { hash } => {
            if !client.pause_session(&parse_hash(&hash)?)? {
                info!("Nothing to pause for {}", hash);
            }
        }
        Commands::Forget { hash } => {
            client.delete_session(&parse_hash(&hash)?)?;
        }
        Commands::Cache { command } => match command {
            CacheCommands::Stats => {
                let stats = client.cache_stats();
                println!(
                    "{} files, {}/{} bytes",
                    stats.items, stats.size_bytes, stats.max_size_bytes
                );
            }
            CacheCommands::Clear => client.clear_cache()?,
        },
    }
    Ok(())
}
