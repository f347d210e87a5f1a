//! sitedeploy - synthesize, deploy, sync and tear down a static website stack.
//!
//! - `sitedeploy synth` - write the cloudformation template
//! - `sitedeploy deploy` - check the certificate, deploy the stack, then sync the site files
//! - `sitedeploy sync` - only sync the site files to an existing stack
//! - `sitedeploy destroy` - delete the stack

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use asset_sync::{AssetSync, CloudFrontCache, S3Store, SyncTarget};
use aws_acm_cert::{resolve_certificate, AcmLookup};
use aws_cfn_stack::StackDeployer;
use clap::{Parser, Subcommand};
use sitedeploy::{SiteConfig, SiteDescriptor};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sitedeploy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Site config file
    #[arg(long, global = true, default_value = "site.toml")]
    config: PathBuf,

    /// KEY=VALUE overrides applied on top of the config file
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the cloudformation template as json
    Synth {
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Deploy the stack and sync the site files
    Deploy {
        /// Only deploy the stack
        #[arg(long)]
        skip_sync: bool,
    },
    /// Sync the site files to an already deployed stack
    Sync,
    /// Delete the stack
    Destroy,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// a relative source dir is relative to the directory of the config file.
fn resolve_source_dir(config_path: &Path, source_dir: &Path) -> PathBuf {
    if source_dir.is_absolute() {
        return source_dir.to_path_buf();
    }
    match config_path.parent() {
        Some(parent) => parent.join(source_dir),
        None => source_dir.to_path_buf(),
    }
}

fn print_outputs(outputs: &HashMap<String, String>) {
    let mut keys: Vec<&String> = outputs.keys().collect();
    keys.sort();
    for key in keys {
        println!("{key}: {}", outputs[key]);
    }
}

async fn synth(conf: &SiteConfig, out: Option<&Path>) -> Result<()> {
    let json = sitedeploy::synthesize_json(conf)?;
    match out {
        Some(path) => {
            tokio::fs::write(path, json).await
                .with_context(|| format!("Failed to write template to {:?}", path))?;
            info!(path = ?path, "wrote template");
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn deploy(conf: &SiteConfig, source_dir: &Path, skip_sync: bool) -> Result<()> {
    let descriptor = SiteDescriptor::from_config(conf)?;
    // certificate problems must surface before the stack is touched
    if let Some(certificate) = &descriptor.certificate {
        let lookup = AcmLookup::for_certificate(certificate).await;
        resolve_certificate(&lookup, certificate).await
            .context("Certificate check failed, the stack was not changed")?;
    }
    let template = descriptor.synthesize()?;
    let deployer = StackDeployer::from_env(&conf.region).await;
    let outputs = deployer.deploy(&conf.stack_name, &template).await
        .with_context(|| format!("Failed to deploy stack {}", conf.stack_name))?;
    print_outputs(&outputs);
    if skip_sync {
        info!("skipping asset sync");
        return Ok(());
    }
    sync_to(conf, source_dir, &outputs).await
}

async fn sync(conf: &SiteConfig, source_dir: &Path) -> Result<()> {
    let deployer = StackDeployer::from_env(&conf.region).await;
    let outputs = deployer.outputs(&conf.stack_name).await
        .with_context(|| format!("Failed to read outputs of stack {}", conf.stack_name))?;
    sync_to(conf, source_dir, &outputs).await
}

async fn sync_to(conf: &SiteConfig, source_dir: &Path, outputs: &HashMap<String, String>) -> Result<()> {
    let target = SyncTarget::from_outputs(outputs)?;
    let store = S3Store::from_env(&conf.region, &target.bucket_name).await;
    let cache = CloudFrontCache::from_env(&target.distribution_id).await;
    let report = AssetSync::new(source_dir).run(&store, &cache).await
        .with_context(|| format!("Failed to sync {:?} to bucket {}", source_dir, target.bucket_name))?;
    println!(
        "uploaded {}, deleted {}, unchanged {}, invalidation {}",
        report.uploaded, report.deleted, report.unchanged, report.invalidation_id,
    );
    Ok(())
}

async fn destroy(conf: &SiteConfig) -> Result<()> {
    let deployer = StackDeployer::from_env(&conf.region).await;
    deployer.destroy(&conf.stack_name).await
        .with_context(|| format!("Failed to delete stack {}", conf.stack_name))?;
    println!("deleted stack {}", conf.stack_name);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let conf = SiteConfig::load_layered(&cli.config, &cli.env_file)
        .with_context(|| format!("Failed to load {:?}", cli.config))?;
    let source_dir = resolve_source_dir(&cli.config, &conf.source_dir);

    match cli.command {
        Commands::Synth { out } => synth(&conf, out.as_deref()).await,
        Commands::Deploy { skip_sync } => deploy(&conf, &source_dir, skip_sync).await,
        Commands::Sync => sync(&conf, &source_dir).await,
        Commands::Destroy => destroy(&conf).await,
    }
}
