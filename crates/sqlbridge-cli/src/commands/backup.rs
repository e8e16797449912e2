//! Export and import commands
//!
//! Both run through a short-lived context and the ordinary protocol, so the
//! snapshot store sees exactly what a protocol caller would produce.

use clap::Args;
use sqlbridge_core::config::BridgeConfig;
use sqlbridge_engine::BridgeClient;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Destination file for the database image
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Database image to restore
    #[arg(long = "in")]
    pub input: PathBuf,
}

pub fn export(config: BridgeConfig, args: ExportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let database = config.database.clone();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let image = runtime.block_on(async {
        let (client, handle) = BridgeClient::spawn(config)?;
        let ack = client.init().await?;
        if let Some(warning) = ack.warning {
            return Err(format!("stored snapshot is unusable: {}", warning).into());
        }
        let image = client.export().await?;
        client.close().await?;
        drop(client);
        handle.join()?;
        Ok::<_, Box<dyn std::error::Error>>(image)
    })?;

    std::fs::write(&args.out, &image)?;
    println!(
        "Exported '{}' ({} bytes) to {}",
        database,
        image.len(),
        args.out.display()
    );
    Ok(())
}

pub fn import(config: BridgeConfig, args: ImportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let database = config.database.clone();
    let image = std::fs::read(&args.input)?;
    let size = image.len();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let (client, handle) = BridgeClient::spawn(config)?;
        client.init().await?;
        client.import(image).await?;
        client.close().await?;
        drop(client);
        handle.join()?;
        Ok::<_, Box<dyn std::error::Error>>(())
    })?;

    println!(
        "Imported {} ({} bytes) into '{}'",
        args.input.display(),
        size,
        database
    );
    Ok(())
}
