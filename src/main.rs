#[macro_use]
extern crate clap;

use std::process;

use clap::{Arg, Command};

#[macro_use]
mod logging;

mod archiver;
mod backup;
mod cleanup;
mod configuration;
mod formatter;
mod uploader;

use archiver::Archiver;
use backup::Backup;
use cleanup::Cleanup;
use configuration::{destination::resolve_region, Configuration, SetupError};
use logging::LogSink;
use uploader::S3Uploader;

struct Arguments {
    config_file: Option<String>,
}

async fn start_main(arguments: Arguments, bootstrap: &LogSink) -> Result<(), SetupError> {
    let config_file = Configuration::find_file(arguments.config_file.as_deref())?;
    log_info!(bootstrap, "read settings from {}", config_file);
    let configuration = Configuration::load(&config_file)?;

    let sink = LogSink::with_log_file(&configuration.env.logs)?;
    let region = resolve_region(
        configuration.env.region.as_deref(),
        configuration.env.endpoint.as_deref(),
    )?;
    log_info!(
        sink,
        "starting backup run: {} configured, root path {}, staging in {}",
        configuration.backups().len(),
        configuration.env.root_path,
        configuration.env.staging_dir
    );

    let backup = Backup::new(
        Archiver::new(&configuration.env.staging_dir, sink.clone()),
        S3Uploader::new(region, sink.clone()),
        Cleanup::new(sink.clone()),
        sink.clone(),
    );
    let report = backup
        .run(configuration.backups(), &configuration.env.root_path)
        .await;

    for remote_key in report.remote_keys() {
        log_debug!(sink, "uploaded object: {}", remote_key);
    }
    for archive in report.retained_archives() {
        log_info!(sink, "retained for manual upload: {}", archive.display());
    }
    sink.flush();

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let bootstrap = match LogSink::bootstrap() {
        Ok(bootstrap) => bootstrap,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    };

    if let Err(err) = start_main(get_arguments(), &bootstrap).await {
        log_error!(bootstrap, "Error: {}", err);
        bootstrap.flush();
        process::exit(1);
    }
}

fn get_arguments() -> Arguments {
    let matches = Command::new("backup-s3")
        .version(crate_version!())
        .author(crate_authors!())
        .about("Archives configured directories and uploads them to S3.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help(
                    "The YAML config file \
                     (default: config.yml, ~/.backup-s3.yml or /etc/backup-s3.yml)",
                ),
        )
        .get_matches();

    Arguments {
        config_file: matches.get_one::<String>("config").cloned(),
    }
}
