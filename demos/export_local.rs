//! Local export example
//!
//! This example demonstrates an end-to-end dataset export:
//! - Loading a study catalog from a JSON file
//! - Reading blobs from a directory on disk
//! - Subscribing to progress events
//! - Writing the archive to a file
//!
//! ```bash
//! cargo run --example export_local -- catalog.json /var/lib/blobs dcm 01 [region] [projection]
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use dataset_export::{CatalogRepository, Config, DatasetExporter, ExportEvent, ToHttpStatus};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 4 {
        eprintln!("usage: export_local <catalog.json> <blob-dir> <dcm|jpg> <study-type> [region] [projection]");
        std::process::exit(2);
    }

    let mut config = Config::default();
    config.blob_store.root_dir = Some(args[1].clone().into());

    let catalog = CatalogRepository::load(&args[0]).await?;
    let exporter = DatasetExporter::from_config(&config, Arc::new(catalog))?;

    let mut params = HashMap::from([
        ("type".to_string(), args[2].clone()),
        ("tipoEstudio".to_string(), args[3].clone()),
    ]);
    if let Some(region) = args.get(4) {
        params.insert("region".to_string(), region.clone());
    }
    if let Some(projection) = args.get(5) {
        params.insert("proyeccion".to_string(), projection.clone());
    }

    // Print progress as entries land in the archive
    let mut events = exporter.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExportEvent::Started { candidates } => println!("exporting {candidates} images"),
                ExportEvent::EntryWritten { serial, path } => println!("  [{serial:>4}] {path}"),
                ExportEvent::ImageSkipped { key, reason, .. } => println!("  skipped {key}: {reason}"),
                ExportEvent::MetadataWritten { group, records } => {
                    println!("  metadata {group}: {records} records")
                }
                ExportEvent::Finished { written, skipped } => {
                    println!("done: {written} written, {skipped} skipped")
                }
            }
        }
    });

    // Ctrl-C aborts the export without leaving a finished archive behind
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let staging = std::path::PathBuf::from(format!(".dataset-export-{}.zip.partial", std::process::id()));
    let file = std::fs::File::create(&staging)?;

    match exporter.export_query(&params, file, cancel).await {
        Ok(response) => {
            drop(response.body);
            std::fs::rename(&staging, &response.file_name)?;
            println!("{}", response.content_disposition);
            Ok(())
        }
        Err(e) => {
            std::fs::remove_file(&staging).ok();
            eprintln!("export failed ({} {}): {e}", e.status_code(), e.error_code());
            std::process::exit(1);
        }
    }
}
